use serde::Deserialize;

/// Query parameters of the passthrough download route.
#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    /// The object key to fetch.
    pub key: String,
}
