use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use rusoto_s3::{GetObjectRequest, ListObjectsV2Request, PutObjectRequest, S3Client, StreamingBody, S3};
use url::{ParseError, Url};

use crate::errors::BackendError;

#[cfg(test)]
pub(crate) mod mock;

/// Every object is world-readable; the whole point of the bucket is to
/// hand its URLs straight to browsers.
const PUBLIC_READ_ACL: &str = "public-read";

/// Upper bound on the keys a single `list` call will accumulate while
/// following continuation tokens.
const MAX_LISTED_KEYS: usize = 5_000;

/// Constructors for the bucket's key namespace.
pub mod keys {
    /// Prefix holding every photo uploaded to an event.
    pub fn event_images_prefix(event_id: &str) -> String {
        format!("events/shared/{}/images/", event_id)
    }

    pub fn event_image(event_id: &str, filename: &str) -> String {
        format!("events/shared/{}/images/{}", event_id, filename)
    }

    pub fn event_cover(event_id: &str) -> String {
        format!("events/shared/{}/cover.jpg", event_id)
    }

    pub fn event_selfie(event_id: &str, filename: &str) -> String {
        format!("events/shared/{}/selfies/{}", event_id, filename)
    }

    pub fn user_selfie(user_id: &str, filename: &str) -> String {
        format!("users/{}/selfies/{}", user_id, filename)
    }
}

/// A store for binary image objects.
pub trait Store: Send + Sync {
    /// Saves the given data under the given key and returns its public URL.
    fn save(
        &self,
        key: &str,
        content_type: String,
        raw: Vec<u8>,
    ) -> BoxFuture<Result<Url, BackendError>>;

    /// Lists the keys under the given prefix.
    fn list(&self, prefix: &str) -> BoxFuture<Result<Vec<String>, BackendError>>;

    /// Fetches the object stored under the given key.
    fn retrieve(&self, key: &str) -> BoxFuture<Result<Vec<u8>, BackendError>>;

    /// Returns the public URL for the given key.
    fn url_for(&self, key: &str) -> Result<Url, ParseError>;

    /// Returns the key a public URL of this store points at, or `None`
    /// for URLs outside it.
    fn key_for(&self, url: &Url) -> Option<String>;
}

/// A store that saves its data to S3.
pub struct S3Store {
    client: Arc<S3Client>,
    bucket: String,
    base_url: Url,
}

impl S3Store {
    /// Creates a new instance.
    pub fn new(client: Arc<S3Client>, bucket: String, base_url: Url) -> Self {
        Self {
            client,
            bucket,
            base_url,
        }
    }

    pub fn from_env() -> Result<Self, rusoto_core::request::TlsError> {
        use rusoto_core::request::HttpClient;
        use rusoto_core::Region;
        use rusoto_credential::StaticProvider;

        use crate::config::get_variable;

        let access_key = get_variable("S3_ACCESS_KEY");
        let secret_access_key = get_variable("S3_SECRET_ACCESS_KEY");

        let region = Region::Custom {
            name: get_variable("S3_REGION_NAME"),
            endpoint: get_variable("S3_ENDPOINT"),
        };

        let bucket = get_variable("S3_BUCKET_NAME");

        let client = Arc::new(S3Client::new_with(
            HttpClient::new()?,
            StaticProvider::new_minimal(access_key, secret_access_key),
            region,
        ));

        let base_url = Url::parse(&get_variable("S3_BASE_URL")).expect("parse S3_BASE_URL");

        Ok(S3Store::new(client, bucket, base_url))
    }
}

impl Store for S3Store {
    fn save(
        &self,
        key: &str,
        content_type: String,
        raw: Vec<u8>,
    ) -> BoxFuture<Result<Url, BackendError>> {
        upload(self, key.to_owned(), content_type, raw).boxed()
    }

    fn list(&self, prefix: &str) -> BoxFuture<Result<Vec<String>, BackendError>> {
        list(self, prefix.to_owned()).boxed()
    }

    fn retrieve(&self, key: &str) -> BoxFuture<Result<Vec<u8>, BackendError>> {
        download(self, key.to_owned()).boxed()
    }

    fn url_for(&self, key: &str) -> Result<Url, ParseError> {
        self.base_url.join(key)
    }

    fn key_for(&self, url: &Url) -> Option<String> {
        url.as_str()
            .strip_prefix(self.base_url.as_str())
            .map(str::to_owned)
    }
}

async fn upload(
    store: &S3Store,
    key: String,
    content_type: String,
    raw: Vec<u8>,
) -> Result<Url, BackendError> {
    use std::convert::TryFrom;

    let len = i64::try_from(raw.len()).expect("raw data length must be within range of i64");

    let request = PutObjectRequest {
        acl: Some(PUBLIC_READ_ACL.to_owned()),
        body: Some(StreamingBody::from(raw)),
        bucket: store.bucket.clone(),
        content_length: Some(len),
        content_type: Some(content_type),
        key: key.clone(),
        ..Default::default()
    };

    store
        .client
        .put_object(request)
        .await
        .map_err(|source| BackendError::UploadFailed { source })?;

    store
        .url_for(&key)
        .map_err(|source| BackendError::FailedToGenerateUrl { source })
}

async fn list(store: &S3Store, prefix: String) -> Result<Vec<String>, BackendError> {
    let mut keys = vec![];
    let mut continuation_token = None;

    loop {
        let request = ListObjectsV2Request {
            bucket: store.bucket.clone(),
            prefix: Some(prefix.clone()),
            continuation_token,
            ..Default::default()
        };

        let output = store
            .client
            .list_objects_v2(request)
            .await
            .map_err(|source| BackendError::ListFailed { source })?;

        keys.extend(
            output
                .contents
                .unwrap_or_default()
                .into_iter()
                .filter_map(|object| object.key),
        );

        continuation_token = output.next_continuation_token;

        if continuation_token.is_none() || keys.len() >= MAX_LISTED_KEYS {
            break;
        }
    }

    keys.truncate(MAX_LISTED_KEYS);

    Ok(keys)
}

async fn download(store: &S3Store, key: String) -> Result<Vec<u8>, BackendError> {
    use tokio::io::AsyncReadExt;

    let request = GetObjectRequest {
        bucket: store.bucket.clone(),
        key,
        ..Default::default()
    };

    let output = store
        .client
        .get_object(request)
        .await
        .map_err(|source| BackendError::DownloadFailed { source })?;

    let mut data = vec![];

    if let Some(body) = output.body {
        body.into_async_read()
            .read_to_end(&mut data)
            .await
            .map_err(|source| BackendError::ObjectReadFailed { source })?;
    }

    Ok(data)
}
