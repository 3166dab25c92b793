use std::sync::Arc;
use std::time::Duration;

use log::Logger;

use crate::db::Db;
use crate::errors::BackendError;
use crate::faces::FaceMatcher;
use crate::image::format::ImageFormat;
use crate::store::Store;
use crate::urls::Urls;

pub type Checker = dyn Fn(&[u8]) -> Result<ImageFormat, BackendError> + Send + Sync;

/// Everything a handler needs, bundled for cheap cloning.
#[derive(Clone)]
pub struct Environment {
    pub logger: Arc<Logger>,
    pub db: Arc<dyn Db + Send + Sync>,
    pub urls: Arc<Urls>,
    pub store: Arc<dyn Store>,
    pub faces: Arc<dyn FaceMatcher>,
    pub checker: Arc<Checker>,
    pub config: Config,
}

impl Environment {
    pub fn new(
        logger: Arc<Logger>,
        db: Arc<dyn Db + Send + Sync>,
        urls: Arc<Urls>,
        store: Arc<dyn Store>,
        faces: Arc<dyn FaceMatcher>,
        checker: Arc<Checker>,
        config: Config,
    ) -> Self {
        Self {
            logger,
            db,
            urls,
            store,
            faces,
            checker,
            config,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// The pause between comparison batches in a matching run.
    pub(crate) batch_pause: Duration,

    /// The pause before serving each passthrough download. Carried over
    /// from the original client's pacing of bulk downloads; nothing is
    /// known to depend on it.
    pub(crate) download_pause: Duration,
}

impl Config {
    pub fn new(batch_pause: Duration, download_pause: Duration) -> Self {
        Self {
            batch_pause,
            download_pause,
        }
    }
}
