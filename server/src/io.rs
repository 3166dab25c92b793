use bytes::Buf;
use futures::stream::StreamExt;
use warp::multipart::{FormData, Part};

use crate::errors::BackendError;

/// One part of a multipart submission, fully read into memory.
#[derive(Debug)]
pub struct NamedPart {
    /// The form field name.
    pub name: String,

    /// The filename the client attached, if any.
    pub filename: Option<String>,

    /// The raw contents.
    pub data: Vec<u8>,
}

/// Collects every part of a form submission.
pub async fn collect_parts(form: FormData) -> Result<Vec<NamedPart>, BackendError> {
    let parts = form.collect::<Vec<_>>().await;

    let mut collected = Vec::with_capacity(parts.len());

    for part in parts {
        let part = part.map_err(|_| BackendError::MalformedFormSubmission)?;
        let name = part.name().to_owned();
        let filename = part.filename().map(str::to_owned);
        let data = part_as_vec(part)
            .await
            .map_err(|_| BackendError::MalformedFormSubmission)?;

        collected.push(NamedPart {
            name,
            filename,
            data,
        });
    }

    Ok(collected)
}

/// Collects chunks of [`Part`].
pub async fn part_as_vec(raw: Part) -> Result<Vec<u8>, ()> {
    let chunks = raw.stream().collect::<Vec<_>>().await;

    let mut data = vec![];

    for chunk in chunks {
        let mut chunk = chunk.map_err(|_| ())?;

        while chunk.has_remaining() {
            let bytes = chunk.chunk();
            data.extend_from_slice(bytes);
            let advanced = bytes.len();
            chunk.advance(advanced);
        }
    }

    Ok(data)
}

/// Takes the first part with the given field name out of a collection.
pub fn take_part(parts: &mut Vec<NamedPart>, name: &str) -> Option<NamedPart> {
    parts
        .iter()
        .position(|part| part.name == name)
        .map(|index| parts.remove(index))
}
