use std::sync::Arc;

use log::Logger;
use serde::Serialize;
use url::Url;

use crate::errors::BackendError;

pub mod format;

use format::ImageFormat;

/// The per-file upload size limit.
pub const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024;

/// Builds the checker closure handed to the environment.
pub fn make_wrapper(
    logger: Arc<Logger>,
) -> impl Fn(&[u8]) -> Result<ImageFormat, BackendError> + Send + Sync {
    move |data: &[u8]| {
        let format = identify(data);

        if format.is_err() {
            log::debug!(logger, "Rejected unrecognized image contents"; "len" => data.len());
        }

        format
    }
}

/// Identifies the format of the given bytes from their magic numbers.
/// Only formats the comparison service accepts count as images here.
pub fn identify(data: &[u8]) -> Result<ImageFormat, BackendError> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Ok(ImageFormat::new(mime::IMAGE_JPEG.as_ref(), "jpg"));
    }

    if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Ok(ImageFormat::new(mime::IMAGE_PNG.as_ref(), "png"));
    }

    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Ok(ImageFormat::new(mime::IMAGE_GIF.as_ref(), "gif"));
    }

    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Ok(ImageFormat::new("image/webp", "webp"));
    }

    Err(BackendError::UnrecognizedImageFormat)
}

/// Returns the MIME essence to serve a stored object under, from its
/// key's extension.
pub fn essence_for_key(key: &str) -> &'static str {
    let extension = key.rsplit('.').next().unwrap_or_default();

    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Whether a filename indicates a selfie rather than an event photo.
/// Selfies travel through the matching flow, never through bulk upload.
pub fn is_selfie_filename(filename: &str) -> bool {
    let basename = filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();

    basename.to_ascii_lowercase().starts_with("selfie")
}

/// Validates one file of a bulk upload before any network call.
pub fn validate_upload(
    checker: &(dyn Fn(&[u8]) -> Result<ImageFormat, BackendError> + Send + Sync),
    filename: &str,
    data: &[u8],
) -> Result<ImageFormat, BackendError> {
    if is_selfie_filename(filename) {
        return Err(BackendError::SelfieFilenameRejected {
            filename: filename.to_owned(),
        });
    }

    if data.len() > MAX_IMAGE_BYTES {
        return Err(BackendError::ImageTooLarge {
            filename: filename.to_owned(),
            limit: MAX_IMAGE_BYTES,
        });
    }

    checker(data)
}

/// One successfully stored file of a bulk upload.
#[derive(Clone, Debug, Serialize)]
pub struct UploadedImage {
    pub filename: String,
    pub url: Url,
}

/// One file excluded from a bulk upload, with the user-facing reason.
#[derive(Clone, Debug, Serialize)]
pub struct RejectedImage {
    pub filename: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use log::{o, Discard, Logger};

    use super::{identify, is_selfie_filename, make_wrapper, validate_upload, MAX_IMAGE_BYTES};
    use crate::errors::BackendError;

    const JPEG_HEADER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00];
    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00];

    fn checker() -> impl Fn(&[u8]) -> Result<super::ImageFormat, BackendError> + Send + Sync {
        make_wrapper(Arc::new(Logger::root(Discard, o!())))
    }

    #[test]
    fn identify_recognizes_the_supported_formats() {
        assert_eq!(identify(JPEG_HEADER).unwrap().essence, "image/jpeg");
        assert_eq!(identify(PNG_HEADER).unwrap().essence, "image/png");
        assert_eq!(identify(b"GIF89a....").unwrap().essence, "image/gif");
        assert_eq!(
            identify(b"RIFF\x00\x00\x00\x00WEBPVP8 ").unwrap().essence,
            "image/webp"
        );
    }

    #[test]
    fn identify_rejects_everything_else() {
        assert!(matches!(
            identify(b"<html></html>"),
            Err(BackendError::UnrecognizedImageFormat)
        ));
        assert!(matches!(
            identify(&[]),
            Err(BackendError::UnrecognizedImageFormat)
        ));
    }

    #[test]
    fn selfie_filenames_are_detected() {
        assert!(is_selfie_filename("selfie_test.jpg"));
        assert!(is_selfie_filename("SELFIE.png"));
        assert!(is_selfie_filename("some/dir/selfie-1.jpg"));
        assert!(!is_selfie_filename("group_photo.jpg"));
        assert!(!is_selfie_filename("my_selfie_stick.jpg"));
    }

    #[test]
    fn validation_excludes_selfies_and_oversized_files() {
        let checker = checker();

        assert!(matches!(
            validate_upload(&checker, "selfie_test.jpg", JPEG_HEADER),
            Err(BackendError::SelfieFilenameRejected { .. })
        ));

        let mut oversized = JPEG_HEADER.to_vec();
        oversized.resize(MAX_IMAGE_BYTES + 1, 0);
        assert!(matches!(
            validate_upload(&checker, "big.jpg", &oversized),
            Err(BackendError::ImageTooLarge { .. })
        ));

        assert!(validate_upload(&checker, "party.jpg", JPEG_HEADER).is_ok());
    }
}
