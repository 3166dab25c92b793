use std::time::{Duration, Instant};

use futures::future::join_all;
use log::{debug, error};
use uuid::Uuid;
use warp::{
    filters::multipart::FormData,
    http::StatusCode,
    reject,
    reply::{json, with_header, with_status, Reply},
};

use crate::db::generate_event_id;
use crate::environment::Environment;
use crate::errors::BackendError;
use crate::event::{self, Event, EventMetadata, Role, DEFAULT_SELFIE_EVENT_ID};
use crate::image::{self, RejectedImage, UploadedImage};
use crate::io::{collect_parts, take_part};
use crate::matching::{self, MatchOutcome, SelfieSource};
use crate::routes::{
    query::DownloadQuery,
    rejection::{Context, Rejection},
    response::{EventView, SuccessResponse},
};
use crate::session::{Session, SignInRequest};
use crate::store::keys;

const SERVER_TIMING_HEADER: &str = "server-timing";
type RouteResult = Result<Box<dyn Reply>, reject::Rejection>;

macro_rules! timed {
    ($($expression:stmt);+) => {
        let start = Instant::now();

        let result = { $($expression)+ };

        Ok(Box::new(with_header(
            result,
            SERVER_TIMING_HEADER,
            format_server_timing(start.elapsed()),
        )) as Box<dyn Reply>)
    };
}

pub async fn create_event(
    environment: Environment,
    session: Session,
    content: FormData,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::create_event(None), e);

        debug!(environment.logger, "Parsing submission...");
        let mut parts = collect_parts(content).await.map_err(error_handler)?;

        let metadata = take_part(&mut parts, "metadata")
            .ok_or(BackendError::PartsMissing)
            .map_err(error_handler)?;
        let metadata: EventMetadata = serde_json::from_slice(&metadata.data)
            .map_err(BackendError::MalformedEventMetadata)
            .map_err(error_handler)?;

        // nothing goes over the network until the form is known-good
        if metadata.name.is_empty() || metadata.event_date.trim().is_empty() {
            return Err(error_handler(BackendError::PartsMissing).into());
        };

        debug!(environment.logger, "Generating event ID...");
        let id = generate_event_id(environment.db.as_ref())
            .await
            .map_err(error_handler)?;

        let error_handler =
            |e: BackendError| Rejection::new(Context::create_event(Some(id.clone())), e);

        debug!(environment.logger, "Writing event to directory..."; "id" => &id);
        let new_event = environment
            .db
            .insert_event(&id, metadata, &session.email)
            .await
            .map_err(&error_handler)?;

        let cover_url = match take_part(&mut parts, "cover") {
            Some(part) if !part.data.is_empty() => {
                debug!(environment.logger, "Storing cover image...");
                let format = (environment.checker)(&part.data).map_err(&error_handler)?;
                let url = environment
                    .store
                    .save(&keys::event_cover(&id), format.essence, part.data)
                    .await
                    .map_err(&error_handler)?;
                environment
                    .db
                    .update_cover_url(&id, &url)
                    .await
                    .map_err(&error_handler)?;

                Some(url)
            }
            _ => None,
        };

        debug!(environment.logger, "Recording creator profile...");
        let _ = environment
            .db
            .upsert_user(
                &session.email,
                session.display_name.clone(),
                None,
                Some(Role::Organizer),
            )
            .await
            .map_err(&error_handler)?;
        environment
            .db
            .record_created_event(&session.email, &id)
            .await
            .map_err(&error_handler)?;

        let event = Event {
            id: new_event.id.clone(),
            name: new_event.metadata.name.clone(),
            event_date: new_event.metadata.event_date.clone(),
            description: new_event.metadata.description.clone(),
            cover_url,
            owner_id: new_event.owner_id.clone(),
            photo_count: 0,
            video_count: 0,
            guest_count: new_event.metadata.guest_count.unwrap_or(0),
            times: new_event.times,
        };
        let response = SuccessResponse::Event(EventView::new(event, &environment.urls));

        with_header(
            with_status(json(&response), StatusCode::CREATED),
            "location",
            environment.urls.event(&id).as_str(),
        )
    }
}

pub async fn retrieve_event(environment: Environment, code: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::retrieve_event(code.clone()), e);

        debug!(environment.logger, "Retrieving event..."; "code" => &code);

        match matching::lookup_event(&environment, &code).await {
            Ok(event) => {
                let response = SuccessResponse::Event(EventView::new(event, &environment.urls));

                with_status(json(&response), StatusCode::OK)
            }
            Err(BackendError::EventNotFound { .. }) => with_status(json(&()), StatusCode::NOT_FOUND),
            Err(e) => return Err(error_handler(e).into()),
        }
    }
}

pub async fn delete_event(environment: Environment, code: String, session: Session) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::delete_event(code.clone()), e);

        debug!(environment.logger, "Deleting event..."; "code" => &code, "requester" => &session.email);

        let event = matching::lookup_event(&environment, &code)
            .await
            .map_err(error_handler)?;

        environment
            .db
            .delete_event(&event.id, &session.email)
            .await
            .map_err(error_handler)?;

        StatusCode::NO_CONTENT
    }
}

pub async fn owned_events(environment: Environment, session: Session) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::owned_events(session.email.clone()), e);

        debug!(environment.logger, "Listing owned events..."; "owner" => &session.email);

        let events = environment
            .db
            .events_by_owner(&session.email)
            .await
            .map_err(error_handler)?;

        let events = events
            .into_iter()
            .map(|event| EventView::new(event, &environment.urls))
            .collect();

        json(&SuccessResponse::Events { events })
    }
}

pub async fn upload_images(
    environment: Environment,
    code: String,
    _session: Session,
    content: FormData,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::upload_images(code.clone()), e);

        let event = matching::lookup_event(&environment, &code)
            .await
            .map_err(error_handler)?;

        debug!(environment.logger, "Parsing submission..."; "event" => &event.id);
        let parts = collect_parts(content).await.map_err(error_handler)?;

        // each file is validated before any network call and succeeds or
        // fails on its own
        let mut rejected = vec![];
        let mut uploads = vec![];

        for part in parts.into_iter().filter(|part| part.filename.is_some()) {
            let filename = part.filename.clone().expect("filtered on filename presence");

            match image::validate_upload(environment.checker.as_ref(), &filename, &part.data) {
                Ok(format) => uploads.push((filename, format, part.data)),
                Err(e) => rejected.push(RejectedImage {
                    filename,
                    reason: format!("{}", e),
                }),
            }
        };

        debug!(environment.logger, "Uploading validated files..."; "event" => &event.id, "count" => uploads.len());
        let results = join_all(uploads.into_iter().map(|(filename, format, data)| {
            let store = environment.store.clone();
            let key = keys::event_image(&event.id, &filename);

            async move {
                let result = store.save(&key, format.essence, data).await;

                (filename, result)
            }
        }))
        .await;

        let mut accepted = vec![];

        for (filename, result) in results {
            match result {
                Ok(url) => accepted.push(UploadedImage { filename, url }),
                Err(e) => {
                    error!(environment.logger, "Failed to store upload: {}", e; "filename" => &filename);
                    rejected.push(RejectedImage {
                        filename,
                        reason: format!("{}", e),
                    });
                }
            }
        };

        if !accepted.is_empty() {
            environment
                .db
                .adjust_photo_count(&event.id, accepted.len() as i32)
                .await
                .map_err(error_handler)?;
        };

        let response = SuccessResponse::Upload {
            accepted_count: accepted.len(),
            rejected_count: rejected.len(),
            accepted,
            rejected,
        };

        json(&response)
    }
}

pub async fn list_images(environment: Environment, code: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::list_images(code.clone()), e);

        let event = matching::lookup_event(&environment, &code)
            .await
            .map_err(error_handler)?;

        debug!(environment.logger, "Listing event photos..."; "event" => &event.id);

        let stored = environment
            .store
            .list(&keys::event_images_prefix(&event.id))
            .await
            .map_err(error_handler)?;

        let images = stored
            .iter()
            .map(|key| environment.store.url_for(key))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| error_handler(BackendError::FailedToGenerateUrl { source }))?;

        json(&SuccessResponse::Images {
            event_id: event.id,
            images,
        })
    }
}

pub async fn run_match(
    environment: Environment,
    code: String,
    session: Session,
    content: FormData,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::run_match(code.clone()), e);

        debug!(environment.logger, "Parsing submission..."; "code" => &code);
        let mut parts = collect_parts(content).await.map_err(error_handler)?;

        let selfie = match take_part(&mut parts, "selfie") {
            Some(part) if !part.data.is_empty() => {
                let format = (environment.checker)(&part.data).map_err(error_handler)?;

                SelfieSource::Uploaded {
                    data: part.data,
                    format,
                }
            }
            // no selfie attached: fall back to the stored default
            _ => SelfieSource::Default,
        };

        let outcome = matching::run(&environment, &session.email, &code, selfie)
            .await
            .map_err(error_handler)?;

        let response = match outcome {
            MatchOutcome::Cached(record) => SuccessResponse::Matches {
                event_id: record.event_id.clone(),
                cached: true,
                persisted: true,
                photos: record.photo_urls,
            },
            MatchOutcome::Fresh {
                event,
                matches,
                persisted,
            } => SuccessResponse::Matches {
                event_id: event.id,
                cached: false,
                persisted,
                photos: matches.into_iter().map(|candidate| candidate.url).collect(),
            },
        };

        json(&response)
    }
}

pub async fn cached_matches(
    environment: Environment,
    code: String,
    session: Session,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::cached_matches(code.clone()), e);

        let event = matching::lookup_event(&environment, &code)
            .await
            .map_err(error_handler)?;

        debug!(environment.logger, "Fetching stored matches..."; "event" => &event.id, "user" => &session.email);

        let record = environment
            .db
            .match_record(&session.email, &event.id)
            .await
            .map_err(error_handler)?;

        // a missing record is an empty state, not an error
        let response = match record {
            Some(record) => SuccessResponse::Matches {
                event_id: record.event_id.clone(),
                cached: true,
                persisted: true,
                photos: record.photo_urls,
            },
            None => SuccessResponse::Matches {
                event_id: event.id,
                cached: false,
                persisted: false,
                photos: vec![],
            },
        };

        json(&response)
    }
}

pub async fn my_photos(environment: Environment, session: Session) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::my_photos(session.email.clone()), e);

        debug!(environment.logger, "Fetching all matches..."; "user" => &session.email);

        let records = environment
            .db
            .matches_by_user(&session.email)
            .await
            .map_err(error_handler)?;

        let records = records
            .into_iter()
            .filter(|record| record.event_id != DEFAULT_SELFIE_EVENT_ID)
            .collect();

        json(&SuccessResponse::Photos { records })
    }
}

pub async fn statistics(environment: Environment, session: Session) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::statistics(session.email.clone()), e);

        let records = environment
            .db
            .matches_by_user(&session.email)
            .await
            .map_err(error_handler)?;

        json(&SuccessResponse::Statistics(event::statistics(&records)))
    }
}

pub async fn default_selfie(environment: Environment, session: Session) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::default_selfie(session.email.clone()), e);

        let url = environment
            .db
            .default_selfie(&session.email)
            .await
            .map_err(error_handler)?;

        json(&SuccessResponse::Selfie { url })
    }
}

pub async fn set_selfie(
    environment: Environment,
    session: Session,
    content: FormData,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::set_selfie(session.email.clone()), e);

        debug!(environment.logger, "Parsing submission..."; "user" => &session.email);
        let mut parts = collect_parts(content).await.map_err(error_handler)?;

        let part = take_part(&mut parts, "selfie")
            .ok_or(BackendError::PartsMissing)
            .map_err(error_handler)?;
        let format = (environment.checker)(&part.data).map_err(error_handler)?;

        debug!(environment.logger, "Storing selfie...");
        let filename = format!("{}.{}", Uuid::new_v4(), format.extension);
        let url = environment
            .store
            .save(
                &keys::user_selfie(&session.email, &filename),
                format.essence,
                part.data,
            )
            .await
            .map_err(error_handler)?;

        environment
            .db
            .set_default_selfie(&session.email, &url)
            .await
            .map_err(error_handler)?;

        // every existing record now points at the new selfie
        debug!(environment.logger, "Propagating selfie update...");
        let propagated = environment
            .db
            .propagate_selfie(&session.email, &url)
            .await
            .map_err(error_handler)?;

        json(&SuccessResponse::SelfieUpdated { url, propagated })
    }
}

pub async fn download(environment: Environment, query: DownloadQuery) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::download(query.key.clone()), e);

        // pacing carried over from the original client's bulk-download
        // loop; zero by default
        if environment.config.download_pause > Duration::from_millis(0) {
            tokio::time::sleep(environment.config.download_pause).await;
        };

        debug!(environment.logger, "Serving object..."; "key" => &query.key);

        let data = environment
            .store
            .retrieve(&query.key)
            .await
            .map_err(error_handler)?;

        warp::http::Response::builder()
            .header("content-type", image::essence_for_key(&query.key))
            .header("content-disposition", "attachment")
            .body(data)
            .map_err(|_| error_handler(BackendError::BadRequest))?
    }
}

pub async fn sign_in(environment: Environment, request: SignInRequest) -> RouteResult {
    timed! {
        let email = request.email.trim().to_owned();

        let error_handler =
            |e: BackendError| Rejection::new(Context::sign_in(Some(email.clone())), e);

        if email.is_empty() {
            return Err(error_handler(BackendError::PartsMissing).into());
        };

        debug!(environment.logger, "Upserting profile..."; "email" => &email);

        let profile = environment
            .db
            .upsert_user(
                &email,
                request.display_name,
                request.mobile_number,
                request.role,
            )
            .await
            .map_err(error_handler)?;

        json(&SuccessResponse::Profile(profile))
    }
}

fn format_server_timing(seconds: Duration) -> String {
    format!("handler;dur={}", seconds.as_secs_f64() * 1000.0)
}
