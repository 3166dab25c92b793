use serde::Serialize;
use warp::reject;

use crate::errors::BackendError;

#[derive(Debug)]
pub struct Rejection {
    pub(crate) context: Context,
    pub(crate) error: BackendError,
}

impl Rejection {
    pub fn new(context: Context, error: BackendError) -> Self {
        Rejection { context, error }
    }

    pub fn flatten(&self) -> FlattenedRejection {
        FlattenedRejection {
            context: self.context.clone(),
            message: format!("{}", self.error),
        }
    }
}

impl reject::Reject for Rejection {}

#[derive(Debug, Serialize)]
pub struct FlattenedRejection {
    #[serde(flatten)]
    pub(crate) context: Context,
    pub(crate) message: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Context {
    CachedMatches { code: String },
    CreateEvent { id: Option<String> },
    DefaultSelfie { user: String },
    DeleteEvent { code: String },
    Download { key: String },
    ListImages { code: String },
    MyPhotos { user: String },
    OwnedEvents { owner: String },
    RetrieveEvent { code: String },
    RunMatch { code: String },
    Session {},
    SetSelfie { user: String },
    SignIn { email: Option<String> },
    Statistics { user: String },
    UploadImages { code: String },
}

impl Context {
    pub fn cached_matches(code: String) -> Context {
        Context::CachedMatches { code }
    }

    pub fn create_event(id: Option<String>) -> Context {
        Context::CreateEvent { id }
    }

    pub fn default_selfie(user: String) -> Context {
        Context::DefaultSelfie { user }
    }

    pub fn delete_event(code: String) -> Context {
        Context::DeleteEvent { code }
    }

    pub fn download(key: String) -> Context {
        Context::Download { key }
    }

    pub fn list_images(code: String) -> Context {
        Context::ListImages { code }
    }

    pub fn my_photos(user: String) -> Context {
        Context::MyPhotos { user }
    }

    pub fn owned_events(owner: String) -> Context {
        Context::OwnedEvents { owner }
    }

    pub fn retrieve_event(code: String) -> Context {
        Context::RetrieveEvent { code }
    }

    pub fn run_match(code: String) -> Context {
        Context::RunMatch { code }
    }

    pub fn session() -> Context {
        Context::Session {}
    }

    pub fn set_selfie(user: String) -> Context {
        Context::SetSelfie { user }
    }

    pub fn sign_in(email: Option<String>) -> Context {
        Context::SignIn { email }
    }

    pub fn statistics(user: String) -> Context {
        Context::Statistics { user }
    }

    pub fn upload_images(code: String) -> Context {
        Context::UploadImages { code }
    }
}
