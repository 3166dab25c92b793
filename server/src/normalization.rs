use serde::{Deserialize, Deserializer};

/// The length of a canonical event code.
pub const EVENT_CODE_LENGTH: usize = 6;

/// Normalizes a name by stripping surrounding whitespace and decomposing
/// it into Unicode Normalization Form D.
///
/// ```
/// use backend::normalization::normalize_name;
/// assert_eq!(normalize_name(" hï "), "hï");
/// ```
pub fn normalize_name(name: impl AsRef<str>) -> String {
    use unicode_normalization::UnicodeNormalization;

    name.as_ref().trim().nfd().to_string()
}

/// Deserializes a `String` after running it through `normalize_name`.
pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Ok(normalize_name(s))
}

/// Deserializes an optional `String` after running it through `normalize_name`.
pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let o: Option<String> = Deserialize::deserialize(deserializer)?;
    Ok(o.map(normalize_name))
}

/// Returns the lookup variants of a submitted event code, most literal
/// first: as entered, left-padded with zeros to the canonical length,
/// and with leading zeros stripped. Users copy codes from invitations
/// and habitually drop or add the leading zeros.
pub fn code_variants(raw: &str) -> Vec<String> {
    let entered = raw.trim().to_owned();
    let mut variants = vec![entered.clone()];

    if !entered.is_empty() && entered.chars().all(|c| c.is_ascii_digit()) {
        let padded = format!("{:0>width$}", entered, width = EVENT_CODE_LENGTH);
        if !variants.contains(&padded) {
            variants.push(padded);
        }

        let stripped = entered.trim_start_matches('0');
        if !stripped.is_empty() && !variants.contains(&stripped.to_owned()) {
            variants.push(stripped.to_owned());
        }
    }

    variants
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use unicode_normalization::is_nfd;

    use super::{code_variants, normalize_name};

    fn count_whitespace(s: impl AsRef<str>) -> usize {
        s.as_ref().chars().filter(|c| c.is_whitespace()).count()
    }

    #[test]
    fn code_variants_pad_short_codes() {
        assert_eq!(code_variants("42913"), vec!["42913", "042913"]);
    }

    #[test]
    fn code_variants_strip_leading_zeros() {
        assert_eq!(code_variants("042913"), vec!["042913", "42913"]);
    }

    #[test]
    fn code_variants_keep_canonical_codes_single() {
        assert_eq!(code_variants("123456"), vec!["123456"]);
    }

    #[test]
    fn code_variants_trim_and_pass_through_non_numeric_input() {
        assert_eq!(code_variants(" abc123 "), vec!["abc123"]);
        assert_eq!(code_variants(""), vec![""]);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 10000, ..ProptestConfig::default()
        })]

        #[test]
        fn normalization_works(string in "(\\S.*\\S|\\S+)", space_before in "\\s*", space_after in "\\s*") {
            let normalized = normalize_name(format!("{}{}{}", space_before, string, space_after));

            prop_assert!(is_nfd(&normalized), "{:?} (normalized form of {:?}) is in NFD", normalized, string);

            prop_assert!(!normalized.starts_with(char::is_whitespace) && !normalized.ends_with(char::is_whitespace), "{:?} (normalized form of {:?}) has no leading or trailing whitespace", normalized, string);

            let trimmed = normalized.trim();

            prop_assert_eq!(count_whitespace(&normalized), count_whitespace(&trimmed), "{:?} (normalized form of {:?}) preserves inner whitespace", normalized, string);
        }

        #[test]
        fn numeric_code_variants_stay_numeric(code in "[0-9]{1,8}") {
            for variant in code_variants(&code) {
                prop_assert!(variant.chars().all(|c| c.is_ascii_digit()));
            }
        }
    }
}
