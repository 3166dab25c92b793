use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use rusoto_rekognition::{
    CompareFacesRequest, Image, Rekognition, RekognitionClient, S3Object,
};

use crate::errors::BackendError;

#[cfg(test)]
pub(crate) mod mock;

/// The similarity threshold passed to the comparison call itself. The
/// acceptance filter in the matching flow is looser (70); both values
/// are carried over from the original service unchanged.
pub const COMPARE_SIMILARITY_THRESHOLD: f32 = 80.0;

/// Compares two stored face images.
pub trait FaceMatcher: Send + Sync {
    /// Returns the best similarity score in [0, 100] across the detected
    /// face matches, or `None` when the service reports no match.
    fn compare(
        &self,
        source_key: &str,
        target_key: &str,
    ) -> BoxFuture<Result<Option<f32>, BackendError>>;
}

/// A matcher backed by the managed face comparison service.
pub struct RekognitionMatcher {
    client: Arc<RekognitionClient>,
    bucket: String,
}

impl RekognitionMatcher {
    /// Creates a new instance.
    pub fn new(client: Arc<RekognitionClient>, bucket: String) -> Self {
        Self { client, bucket }
    }

    pub fn from_env() -> Result<Self, rusoto_core::request::TlsError> {
        use rusoto_core::request::HttpClient;
        use rusoto_core::Region;
        use rusoto_credential::StaticProvider;

        use crate::config::get_variable;

        let access_key = get_variable("REKOGNITION_ACCESS_KEY");
        let secret_access_key = get_variable("REKOGNITION_SECRET_ACCESS_KEY");

        let region: Region = get_variable("REKOGNITION_REGION")
            .parse()
            .expect("parse REKOGNITION_REGION as region");

        let bucket = get_variable("S3_BUCKET_NAME");

        let client = Arc::new(RekognitionClient::new_with(
            HttpClient::new()?,
            StaticProvider::new_minimal(access_key, secret_access_key),
            region,
        ));

        Ok(RekognitionMatcher::new(client, bucket))
    }

    fn image(&self, key: &str) -> Image {
        Image {
            s3_object: Some(S3Object {
                bucket: Some(self.bucket.clone()),
                name: Some(key.to_owned()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

impl FaceMatcher for RekognitionMatcher {
    fn compare(
        &self,
        source_key: &str,
        target_key: &str,
    ) -> BoxFuture<Result<Option<f32>, BackendError>> {
        compare(self, self.image(source_key), self.image(target_key)).boxed()
    }
}

async fn compare(
    matcher: &RekognitionMatcher,
    source_image: Image,
    target_image: Image,
) -> Result<Option<f32>, BackendError> {
    let request = CompareFacesRequest {
        similarity_threshold: Some(COMPARE_SIMILARITY_THRESHOLD),
        source_image,
        target_image,
        ..Default::default()
    };

    let response = matcher
        .client
        .compare_faces(request)
        .await
        .map_err(|source| BackendError::ComparisonFailed { source })?;

    // the service may report several matched faces in the target; the
    // best one decides
    let best = response
        .face_matches
        .unwrap_or_default()
        .into_iter()
        .filter_map(|face_match| face_match.similarity)
        .fold(None, |best: Option<f32>, similarity| match best {
            Some(b) if b >= similarity => Some(b),
            _ => Some(similarity),
        });

    Ok(best)
}
