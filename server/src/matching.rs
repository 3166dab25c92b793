use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, warn};
use uuid::Uuid;

use crate::environment::Environment;
use crate::errors::BackendError;
use crate::event::{Event, MatchCandidate, MatchRecord};
use crate::image::format::ImageFormat;
use crate::normalization;
use crate::store::keys;

/// Minimum similarity for a candidate to survive the acceptance filter.
/// Looser than the threshold the comparison call runs with
/// ([`crate::faces::COMPARE_SIMILARITY_THRESHOLD`]); both values are
/// carried over from the original service unchanged.
pub const ACCEPT_SIMILARITY_THRESHOLD: f32 = 70.0;

/// How many comparisons run concurrently before the flow pauses.
pub const COMPARISON_BATCH_SIZE: usize = 10;

/// The pause between comparison batches. The only backpressure against
/// the comparison service.
pub const BATCH_PAUSE: Duration = Duration::from_millis(1_000);

/// The states a matching run moves through. `Error` is reachable from
/// every one of them by returning early.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MatchPhase {
    LookupEvent,
    CheckExistingMatch,
    RunComparison,
    PersistResult,
    Done,
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            MatchPhase::LookupEvent => "lookup_event",
            MatchPhase::CheckExistingMatch => "check_existing_match",
            MatchPhase::RunComparison => "run_comparison",
            MatchPhase::PersistResult => "persist_result",
            MatchPhase::Done => "done",
        };

        f.write_str(name)
    }
}

/// The selfie a matching run compares against.
pub enum SelfieSource {
    /// A selfie submitted with the request, saved under the event's
    /// selfie prefix before comparison.
    Uploaded { data: Vec<u8>, format: ImageFormat },

    /// The user's stored default selfie.
    Default,
}

/// The result of a successful matching run.
pub enum MatchOutcome {
    /// A record already existed; no comparisons were issued.
    Cached(MatchRecord),

    /// A fresh comparison pass ran. `persisted` is false when the write
    /// of the record failed; the matches are still returned.
    Fresh {
        event: Event,
        matches: Vec<MatchCandidate>,
        persisted: bool,
    },
}

/// Resolves an event code to an event, tolerating dropped or added
/// leading zeros.
pub async fn lookup_event(
    environment: &Environment,
    raw_code: &str,
) -> Result<Event, BackendError> {
    for variant in normalization::code_variants(raw_code) {
        if let Some(event) = environment.db.retrieve_event(&variant).await? {
            return Ok(event);
        }
    }

    Err(BackendError::EventNotFound {
        code: raw_code.trim().to_owned(),
    })
}

/// Drives one matching run end to end.
pub async fn run(
    environment: &Environment,
    user_id: &str,
    raw_code: &str,
    selfie: SelfieSource,
) -> Result<MatchOutcome, BackendError> {
    use log::o;

    let logger = environment.logger.new(o!("user" => user_id.to_owned()));

    let mut phase = MatchPhase::LookupEvent;
    debug!(logger, "Looking up event..."; "phase" => %phase, "code" => raw_code);
    let event = lookup_event(environment, raw_code).await?;

    phase = MatchPhase::CheckExistingMatch;
    debug!(logger, "Checking for an existing record..."; "phase" => %phase, "event" => &event.id);
    if let Some(record) = environment.db.match_record(user_id, &event.id).await? {
        debug!(logger, "Returning cached matches"; "phase" => %phase, "count" => record.photo_urls.len());
        return Ok(MatchOutcome::Cached(record));
    }

    let selfie_key = resolve_selfie(environment, user_id, &event.id, selfie).await?;

    phase = MatchPhase::RunComparison;
    debug!(logger, "Comparing against event photos..."; "phase" => %phase, "selfie" => &selfie_key);
    let matches = run_comparison(environment, &logger, &event.id, &selfie_key).await?;

    if matches.is_empty() {
        return Err(BackendError::NoFacesMatched);
    }

    phase = MatchPhase::PersistResult;
    debug!(logger, "Persisting matches..."; "phase" => %phase, "count" => matches.len());
    let selfie_url = environment
        .store
        .url_for(&selfie_key)
        .map_err(|source| BackendError::FailedToGenerateUrl { source })?;
    let photo_urls: Vec<_> = matches.iter().map(|candidate| candidate.url.clone()).collect();

    // a failed write is logged and reported, not rolled back; the
    // computed matches are still worth returning
    let persisted = match environment
        .db
        .upsert_match(user_id, &event.id, &selfie_url, &photo_urls)
        .await
    {
        Ok(_) => true,
        Err(e) => {
            warn!(logger, "Failed to persist match record: {}", e; "phase" => %phase, "event" => &event.id);
            false
        }
    };

    phase = MatchPhase::Done;
    debug!(logger, "Matching complete"; "phase" => %phase, "count" => matches.len(), "persisted" => persisted);

    Ok(MatchOutcome::Fresh {
        event,
        matches,
        persisted,
    })
}

/// Saves an uploaded selfie under the event, or falls back to the
/// stored default selfie.
async fn resolve_selfie(
    environment: &Environment,
    user_id: &str,
    event_id: &str,
    selfie: SelfieSource,
) -> Result<String, BackendError> {
    match selfie {
        SelfieSource::Uploaded { data, format } => {
            let filename = format!("{}.{}", Uuid::new_v4(), format.extension);
            let key = keys::event_selfie(event_id, &filename);

            environment
                .store
                .save(&key, format.essence, data)
                .await?;

            Ok(key)
        }
        SelfieSource::Default => {
            let url = environment
                .db
                .default_selfie(user_id)
                .await?
                .ok_or(BackendError::NoSelfieOnFile)?;

            environment
                .store
                .key_for(&url)
                .ok_or(BackendError::ForeignSelfieUrl { url })
        }
    }
}

/// Lists the event's photos and compares each against the selfie in
/// concurrent batches, pausing between batches. Candidates at or above
/// the acceptance threshold come back sorted by descending similarity,
/// without duplicates.
async fn run_comparison(
    environment: &Environment,
    logger: &log::Logger,
    event_id: &str,
    selfie_key: &str,
) -> Result<Vec<MatchCandidate>, BackendError> {
    let keys = environment
        .store
        .list(&keys::event_images_prefix(event_id))
        .await?;

    if keys.is_empty() {
        return Err(BackendError::EventHasNoImages {
            id: event_id.to_owned(),
        });
    }

    let batches = keys.chunks(COMPARISON_BATCH_SIZE);
    let batch_count = batches.len();
    let mut candidates: Vec<MatchCandidate> = vec![];

    for (index, batch) in batches.enumerate() {
        let comparisons = batch.iter().map(|key| {
            let faces = environment.faces.clone();

            async move {
                let result = faces.compare(selfie_key, key).await;

                (key, result)
            }
        });

        for (key, result) in join_all(comparisons).await {
            // one failed comparison loses one candidate, not the batch
            let similarity = match result {
                Ok(similarity) => similarity,
                Err(e) => {
                    warn!(logger, "Comparison failed, treating as no match: {}", e; "key" => key);
                    None
                }
            };

            if let Some(similarity) = similarity.filter(|s| *s >= ACCEPT_SIMILARITY_THRESHOLD) {
                let url = environment
                    .store
                    .url_for(key)
                    .map_err(|source| BackendError::FailedToGenerateUrl { source })?;

                candidates.push(MatchCandidate {
                    key: key.clone(),
                    url,
                    similarity,
                });
            }
        }

        if index + 1 < batch_count {
            tokio::time::sleep(environment.config.batch_pause).await;
        }
    }

    candidates.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut seen = HashSet::new();
    candidates.retain(|candidate| seen.insert(candidate.key.clone()));

    Ok(candidates)
}
