/// An image format recognized by the upload checker.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageFormat {
    /// The MIME essence, e.g. `image/jpeg`.
    pub essence: String,

    /// The conventional file extension, without the dot.
    pub extension: String,
}

impl ImageFormat {
    pub fn new(essence: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            essence: essence.into(),
            extension: extension.into(),
        }
    }
}
