use rusoto_core::RusotoError;
use rusoto_rekognition::CompareFacesError;
use rusoto_s3::{GetObjectError, ListObjectsV2Error, PutObjectError};
use thiserror::Error;
use url::Url;
use warp::reject;

/// Enumerates high-level errors returned by this library.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Represents an SQL error.
    #[error("database error")]
    Sqlx { source: sqlx::Error },

    /// Represents an error with the request.
    #[error("bad request")]
    BadRequest,

    /// Represents a request made without a signed-in user.
    #[error("sign in to continue")]
    AuthRequired,

    /// Represents an error caused by missing parts in a form submission.
    #[error("missing parts in submission")]
    PartsMissing,

    /// Represents an unreadable multipart submission.
    #[error("malformed form submission")]
    MalformedFormSubmission,

    /// Represents invalid JSON in the metadata part of a submission.
    #[error("malformed event metadata: {0}")]
    MalformedEventMetadata(#[from] serde_json::Error),

    /// Represents an event code that resolved to nothing, in any variant.
    #[error("event {code} not found")]
    EventNotFound { code: String },

    /// Represents a deletion attempted by someone other than the owner.
    #[error("only the event owner can delete event {id}")]
    NotEventOwner { id: String },

    /// Represents a generated event ID colliding with an existing row.
    #[error("event ID already exists")]
    IdAlreadyExists,

    /// Represents a matching run against an event with no uploaded photos.
    #[error("no photos have been uploaded for event {id} yet")]
    EventHasNoImages { id: String },

    /// Represents a matching run in which no candidate met the
    /// acceptance threshold.
    #[error("no matching faces found")]
    NoFacesMatched,

    /// Represents a matching run with neither an uploaded selfie nor a
    /// stored default selfie.
    #[error("no selfie on file; upload one to get your photos")]
    NoSelfieOnFile,

    /// Represents a stored selfie URL that does not point into our bucket.
    #[error("stored selfie URL {url} is outside the photo store")]
    ForeignSelfieUrl { url: Url },

    /// Represents a file whose contents are not a supported image format.
    #[error("unrecognized image format")]
    UnrecognizedImageFormat,

    /// Represents a file over the upload size limit.
    #[error("{filename} is over the {limit}-byte upload limit")]
    ImageTooLarge { filename: String, limit: usize },

    /// Represents a bulk upload containing a file named like a selfie.
    #[error("{filename} looks like a selfie, not an event photo")]
    SelfieFilenameRejected { filename: String },

    /// Represents an error returned by the store when uploading.
    #[error("upload failed")]
    UploadFailed { source: RusotoError<PutObjectError> },

    /// Represents an error returned by the store when listing keys.
    #[error("listing stored objects failed")]
    ListFailed {
        source: RusotoError<ListObjectsV2Error>,
    },

    /// Represents an error returned by the store when fetching an object.
    #[error("download failed")]
    DownloadFailed { source: RusotoError<GetObjectError> },

    /// Represents a failure while reading a fetched object's body.
    #[error("could not read object body")]
    ObjectReadFailed { source: std::io::Error },

    /// Represents an error returned by the face comparison service.
    #[error("face comparison failed")]
    ComparisonFailed {
        source: RusotoError<CompareFacesError>,
    },

    /// Represents a failure to derive the public URL for a stored object.
    #[error("could not generate URL")]
    FailedToGenerateUrl { source: url::ParseError },

    /// Represents an invalid URL stored in the database.
    #[error("could not parse {url} as URL")]
    UnableToParseUrl {
        url: String,
        source: url::ParseError,
    },
}

impl reject::Reject for BackendError {}
