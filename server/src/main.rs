use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use warp::Filter;

use backend::config::{get_optional_variable, get_variable};
use backend::db::PgDb;
use backend::environment::{Config, Environment};
use backend::faces::RekognitionMatcher;
use backend::image;
use backend::matching;
use backend::routes;
use backend::store::S3Store;
use backend::urls::Urls;
use futures::future::FutureExt;
use log::{info, initialize_logger};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    let logger = initialize_logger();

    let store = Arc::new(S3Store::from_env().expect("initialize S3 store from environment"));
    let faces = Arc::new(
        RekognitionMatcher::from_env().expect("initialize face matcher from environment"),
    );

    let main_port: u16 = get_variable("BACKEND_PORT")
        .parse()
        .expect("parse BACKEND_PORT as u16");
    let admin_port: u16 = get_variable("BACKEND_ADMIN_PORT")
        .parse()
        .expect("parse BACKEND_ADMIN_PORT as u16");

    info!(logger, "Starting..."; "main_port" => main_port, "admin_port" => admin_port);
    let logger = Arc::new(logger);

    let checker = Arc::new(image::make_wrapper(logger.clone()));

    info!(logger, "Creating database pool...");
    let connection_string = get_variable("BACKEND_DB_CONNECTION_STRING");
    let pool = sqlx::Pool::connect(&connection_string)
        .await
        .expect("create database pool from BACKEND_DB_CONNECTION_STRING");
    let db = Arc::new(PgDb::new(pool));

    let urls = Arc::new(Urls::new(
        get_variable("BACKEND_BASE_URL"),
        get_variable("BACKEND_EVENTS_PATH"),
    ));

    let config = Config::new(
        matching::BATCH_PAUSE,
        Duration::from_millis(get_optional_variable("BACKEND_DOWNLOAD_PAUSE_MS", 0)),
    );
    let environment = Environment::new(logger.clone(), db, urls, store, faces, checker, config);

    let (termination_sender, mut termination_receiver) = mpsc::channel::<()>(1);

    let terminate = Arc::new(move || {
        let termination_sender = termination_sender.clone();

        async move {
            let termination_sender = termination_sender.clone();
            termination_sender.send(()).await.unwrap();
        }
        .boxed()
    });

    let should_terminate = async move {
        termination_receiver.recv().await;
    }
    .shared();

    let ctrlc = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let signal = tokio::signal::ctrl_c();

        async move {
            let terminate = terminate.clone();

            tokio::select! {
                _ = should_terminate => {},
                _ = signal => {
                    terminate().await;
                }
            }
        }
    };

    let main_server = {
        let should_terminate = should_terminate.clone();

        let logger2 = logger.clone();

        let create_event_route = routes::make_create_event_route(environment.clone());
        let retrieve_event_route = routes::make_retrieve_event_route(environment.clone());
        let delete_event_route = routes::make_delete_event_route(environment.clone());
        let owned_events_route = routes::make_owned_events_route(environment.clone());
        let upload_images_route = routes::make_upload_images_route(environment.clone());
        let list_images_route = routes::make_list_images_route(environment.clone());
        let run_match_route = routes::make_run_match_route(environment.clone());
        let cached_matches_route = routes::make_cached_matches_route(environment.clone());
        let my_photos_route = routes::make_my_photos_route(environment.clone());
        let statistics_route = routes::make_statistics_route(environment.clone());
        let default_selfie_route = routes::make_default_selfie_route(environment.clone());
        let set_selfie_route = routes::make_set_selfie_route(environment.clone());
        let download_route = routes::make_download_route(environment.clone());
        let sign_in_route = routes::make_sign_in_route(environment.clone());

        let routes = create_event_route
            .or(retrieve_event_route)
            .or(delete_event_route)
            .or(owned_events_route)
            .or(upload_images_route)
            .or(list_images_route)
            .or(run_match_route)
            .or(cached_matches_route)
            .or(my_photos_route)
            .or(statistics_route)
            .or(default_selfie_route)
            .or(set_selfie_route)
            .or(download_route)
            .or(sign_in_route)
            .recover(move |r| routes::format_rejection(logger2.clone(), r));

        let (_, main_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], main_port), async {
                should_terminate.await;
            });

        main_server
    };

    let admin_server = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let routes = routes::admin::make_healthz_route(environment.clone()).or(
            routes::admin::make_termination_route(environment.clone(), terminate),
        );

        let (_, admin_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], admin_port), async {
                should_terminate.await;
            });

        admin_server
    };

    tokio::join!(ctrlc, main_server, admin_server);

    info!(logger, "Exiting gracefully...");

    Ok(())
}
