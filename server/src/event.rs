use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use crate::normalization;

/// The event ID reserved for a user's default selfie record. Never
/// produced by the ID generator, since generation rejects existing IDs
/// and nothing else writes events with it.
pub const DEFAULT_SELFIE_EVENT_ID: &str = "000000";

/// A single event in the directory.
#[derive(Clone, Debug, Serialize)]
pub struct Event {
    /// The 6-digit event code.
    pub id: String,

    /// The name provided by the organizer.
    pub name: String,

    /// The date of the event, as entered on the creation form.
    pub event_date: String,

    /// The description provided, if any.
    pub description: Option<String>,

    /// The public URL of the cover image, if one was uploaded.
    pub cover_url: Option<Url>,

    /// The user who created the event and may delete it.
    pub owner_id: String,

    /// The number of photos uploaded so far.
    pub photo_count: i32,

    /// The number of videos uploaded so far.
    pub video_count: i32,

    /// The number of guests recorded so far.
    pub guest_count: i32,

    /// The times it was created and updated.
    #[serde(flatten)]
    pub times: Times,
}

/// A single event in the directory before its cover image is stored.
#[derive(Clone, Debug)]
pub struct NewEvent {
    /// The 6-digit event code.
    pub id: String,

    /// The times it was created and updated.
    pub times: Times,

    /// The organizer-submitted metadata.
    pub metadata: EventMetadata,

    /// The user who created the event.
    pub owner_id: String,
}

impl NewEvent {
    pub fn new(id: String, times: Times, metadata: EventMetadata, owner_id: String) -> Self {
        NewEvent {
            id,
            times,
            metadata,
            owner_id,
        }
    }
}

/// The metadata for a single event, as submitted on creation.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EventMetadata {
    /// The name provided.
    #[serde(deserialize_with = "normalization::deserialize")]
    pub name: String,

    /// The date of the event.
    pub event_date: String,

    /// The description provided.
    #[serde(default)]
    #[serde(deserialize_with = "normalization::deserialize_option")]
    pub description: Option<String>,

    /// The expected number of guests, if given.
    #[serde(default)]
    pub guest_count: Option<i32>,
}

/// A persisted record of one user's matches for one event.
#[derive(Clone, Debug, Serialize)]
pub struct MatchRecord {
    /// The user the matches belong to.
    pub user_id: String,

    /// The event the photos were matched from.
    pub event_id: String,

    /// The public URL of the selfie the matches were computed against.
    pub selfie_url: Url,

    /// The matched photos, best match first, no duplicates.
    pub photo_urls: Vec<Url>,

    /// The time the record was first written.
    #[serde(with = "time::serde::timestamp")]
    pub uploaded_at: OffsetDateTime,

    /// The time the record was last updated.
    #[serde(with = "time::serde::timestamp")]
    pub updated_at: OffsetDateTime,
}

/// A candidate photo produced during one matching pass. Discarded once
/// the surviving candidates are persisted as a [`MatchRecord`].
#[derive(Clone, Debug, Serialize)]
pub struct MatchCandidate {
    /// The object key of the photo within the store.
    #[serde(skip_serializing)]
    pub key: String,

    /// The public URL of the photo.
    pub url: Url,

    /// The similarity score reported by the comparison service, in [0, 100].
    pub similarity: f32,
}

/// A user profile, upserted on every sign-in.
#[derive(Clone, Debug, Serialize)]
pub struct UserProfile {
    /// The user's email, which identifies them everywhere.
    pub email: String,

    /// The display name provided, if any.
    pub display_name: Option<String>,

    /// The contact number provided, if any.
    pub mobile_number: Option<String>,

    /// The user's role.
    pub role: Role,

    /// The IDs of the events the user has created.
    pub created_events: Vec<String>,

    /// The times the profile was created and updated.
    #[serde(flatten)]
    pub times: Times,
}

/// The role a user signed in under.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Organizer,
    Attendee,
    Unset,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Organizer => "organizer",
            Role::Attendee => "attendee",
            Role::Unset => "unset",
        }
    }

    /// Parses a stored role, falling back to [`Role::Unset`] for
    /// anything unrecognized.
    pub fn from_stored(raw: &str) -> Role {
        match raw {
            "organizer" => Role::Organizer,
            "attendee" => Role::Attendee,
            _ => Role::Unset,
        }
    }
}

/// Creation and modification times of a record.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct Times {
    /// The date and time it was created.
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,

    /// The date and time it was last modified.
    #[serde(with = "time::serde::timestamp")]
    pub updated_at: OffsetDateTime,
}

/// Aggregate statistics over one user's match records.
#[derive(Clone, Debug, Serialize)]
pub struct UserStatistics {
    /// The number of events the user has matches for.
    pub event_count: usize,

    /// The total number of matched photos across those events.
    pub photo_count: usize,

    /// The earliest record creation time as a Unix timestamp, if any
    /// records exist.
    pub first_uploaded_at: Option<i64>,

    /// The latest record update time as a Unix timestamp, if any
    /// records exist.
    pub last_updated_at: Option<i64>,
}

/// Computes statistics by scanning the user's match records. The
/// reserved default-selfie record is not a real event and is skipped.
pub fn statistics(records: &[MatchRecord]) -> UserStatistics {
    let mut stats = UserStatistics {
        event_count: 0,
        photo_count: 0,
        first_uploaded_at: None,
        last_updated_at: None,
    };

    for record in records {
        if record.event_id == DEFAULT_SELFIE_EVENT_ID {
            continue;
        }

        stats.event_count += 1;
        stats.photo_count += record.photo_urls.len();

        let uploaded = record.uploaded_at.unix_timestamp();
        let updated = record.updated_at.unix_timestamp();

        stats.first_uploaded_at = Some(match stats.first_uploaded_at {
            Some(first) if first <= uploaded => first,
            _ => uploaded,
        });
        stats.last_updated_at = Some(match stats.last_updated_at {
            Some(last) if last >= updated => last,
            _ => updated,
        });
    }

    stats
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;
    use url::Url;

    use super::{statistics, MatchRecord, DEFAULT_SELFIE_EVENT_ID};

    fn record(event_id: &str, photos: usize, uploaded: i64, updated: i64) -> MatchRecord {
        let selfie_url = Url::parse("https://bucket.s3.example.com/users/a/selfies/s.jpg").unwrap();
        let photo_urls = (0..photos)
            .map(|n| {
                Url::parse(&format!(
                    "https://bucket.s3.example.com/events/shared/{}/images/{}.jpg",
                    event_id, n
                ))
                .unwrap()
            })
            .collect();

        MatchRecord {
            user_id: "a@example.com".to_owned(),
            event_id: event_id.to_owned(),
            selfie_url,
            photo_urls,
            uploaded_at: OffsetDateTime::from_unix_timestamp(uploaded),
            updated_at: OffsetDateTime::from_unix_timestamp(updated),
        }
    }

    #[test]
    fn statistics_scan_all_records() {
        let records = vec![
            record("123456", 3, 1_000, 2_000),
            record("654321", 2, 500, 5_000),
        ];

        let stats = statistics(&records);

        assert_eq!(stats.event_count, 2);
        assert_eq!(stats.photo_count, 5);
        assert_eq!(stats.first_uploaded_at, Some(500));
        assert_eq!(stats.last_updated_at, Some(5_000));
    }

    #[test]
    fn statistics_skip_the_default_selfie_record() {
        let records = vec![record(DEFAULT_SELFIE_EVENT_ID, 0, 100, 100)];

        let stats = statistics(&records);

        assert_eq!(stats.event_count, 0);
        assert_eq!(stats.photo_count, 0);
        assert_eq!(stats.first_uploaded_at, None);
        assert_eq!(stats.last_updated_at, None);
    }

    #[test]
    fn statistics_over_no_records_are_empty() {
        let stats = statistics(&[]);

        assert_eq!(stats.event_count, 0);
        assert_eq!(stats.photo_count, 0);
        assert!(stats.first_uploaded_at.is_none());
    }
}
