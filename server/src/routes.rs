use std::sync::Arc;

use log::{error, Logger};
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, with_status, Json, WithStatus};

use crate::errors::BackendError;

pub mod admin;
mod handlers;
mod query;
mod rejection;
mod response;

pub use internal::*;

/// The maximum form data size to accept. This should be enforced by
/// the HTTP gateway, so on the Rust side it’s set to an unreasonably
/// large number.
const MAX_CONTENT_LENGTH: u64 = 2 * 1024 * 1024 * 1024;

pub async fn format_rejection(
    logger: Arc<Logger>,
    rej: reject::Rejection,
) -> Result<WithStatus<Json>, reject::Rejection> {
    if let Some(r) = rej.find::<rejection::Rejection>() {
        let e = &r.error;
        error!(logger, "Backend error"; "context" => ?r.context, "error" => ?r.error, "status" => %status_code_for(e), "message" => %r.error);
        let flattened = r.flatten();

        return Ok(with_status(json(&flattened), status_code_for(e)));
    }

    if let Some(e) = rej.find::<BackendError>() {
        error!(logger, "Backend error"; "error" => ?e, "status" => %status_code_for(e), "message" => %e);

        return Ok(with_status(
            json(&serde_json::json!({ "message": format!("{}", e) })),
            status_code_for(e),
        ));
    }

    Err(rej)
}

fn status_code_for(e: &BackendError) -> StatusCode {
    use BackendError::*;

    match e {
        AuthRequired => StatusCode::UNAUTHORIZED,
        NotEventOwner { .. } => StatusCode::FORBIDDEN,
        EventNotFound { .. } | EventHasNoImages { .. } | NoFacesMatched | NoSelfieOnFile => {
            StatusCode::NOT_FOUND
        }
        BadRequest
        | PartsMissing
        | MalformedFormSubmission
        | MalformedEventMetadata(..)
        | ImageTooLarge { .. }
        | SelfieFilenameRejected { .. } => StatusCode::BAD_REQUEST,
        UnrecognizedImageFormat => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        IdAlreadyExists => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

mod internal {
    use warp::filters::multipart::form;
    use warp::filters::BoxedFilter;
    use warp::path::end;
    use warp::Filter;
    use warp::Reply;
    use warp::{body, delete, get as g, path as p, path::param as par, post, query};

    use super::rejection::{Context, Rejection};
    use super::{handlers, query as q, MAX_CONTENT_LENGTH};
    use crate::environment::Environment;
    use crate::errors::BackendError;
    use crate::session::{Session, USER_EMAIL_HEADER, USER_NAME_HEADER};

    type Route = BoxedFilter<(Box<dyn Reply>,)>;

    /// Extracts the signed-in user from the request headers or rejects
    /// with [`BackendError::AuthRequired`].
    fn session() -> impl Filter<Extract = (Session,), Error = warp::reject::Rejection> + Clone {
        warp::header::optional::<String>(USER_EMAIL_HEADER)
            .and(warp::header::optional::<String>(USER_NAME_HEADER))
            .and_then(|email: Option<String>, name: Option<String>| async move {
                Session::from_headers(email, name).ok_or_else(|| {
                    warp::reject::custom(Rejection::new(
                        Context::session(),
                        BackendError::AuthRequired,
                    ))
                })
            })
    }

    macro_rules! route_filter {
    ($route_variable:ident; $first:expr) => (let $route_variable = $route_variable.and($first););
    ($route_variable:ident; $first:expr, $($rest:expr),+) => (
        let $route_variable = $route_variable.and($first);
        route_filter!($route_variable; $($rest),+);
    )
}

    macro_rules! route {
    ($name:ident => $handler:ident, $route_variable:ident; $($filters:expr),+) => (
        pub fn $name(environment: Environment) -> Route {
            let r = environment.urls.events_path.clone();

            let $route_variable = warp::any()
                .map(move || environment.clone())
                .and(p(r));

            route_filter!($route_variable; $($filters),+);

            $route_variable.and_then(handlers::$handler)
                .boxed()
        }
    );
}

    route!(make_create_event_route => create_event, rt; end(), session(), post(), form().max_length(MAX_CONTENT_LENGTH));
    route!(make_retrieve_event_route => retrieve_event, rt; p("id"), par::<String>(), end(), g());
    route!(make_delete_event_route => delete_event, rt; p("id"), par::<String>(), end(), session(), delete());
    route!(make_owned_events_route => owned_events, rt; p("mine"), end(), session(), g());
    route!(make_upload_images_route => upload_images, rt; p!("id" / String / "images"), end(), session(), post(), form().max_length(MAX_CONTENT_LENGTH));
    route!(make_list_images_route => list_images, rt; p!("id" / String / "images"), end(), g());
    route!(make_run_match_route => run_match, rt; p!("id" / String / "matches"), end(), session(), post(), form().max_length(MAX_CONTENT_LENGTH));
    route!(make_cached_matches_route => cached_matches, rt; p!("id" / String / "matches"), end(), session(), g());
    route!(make_my_photos_route => my_photos, rt; p("photos"), end(), session(), g());
    route!(make_statistics_route => statistics, rt; p("statistics"), end(), session(), g());
    route!(make_default_selfie_route => default_selfie, rt; p("selfie"), end(), session(), g());
    route!(make_set_selfie_route => set_selfie, rt; p("selfie"), end(), session(), post(), form().max_length(MAX_CONTENT_LENGTH));
    route!(make_download_route => download, rt; p("download"), query::<q::DownloadQuery>(), end(), g());
    route!(make_sign_in_route => sign_in, rt; p("session"), end(), post(), body::json());
}
