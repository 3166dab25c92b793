use url::Url;

/// Convenience wrapper for URL generation functions.
#[derive(Clone)]
pub struct Urls {
    /// Top-level URL, including trailing slash.
    base: Url,

    /// Path for all events-related actions.
    pub(crate) events_path: String,

    /// Prefix for all events-related actions.
    events_prefix: String,
}

impl Urls {
    /// Create a new instance. `events_prefix` should *not* include a trailing slash.
    pub fn new(base: impl AsRef<str>, events_prefix: impl Into<String>) -> Self {
        let base =
            Url::parse(base.as_ref()).unwrap_or_else(|_| panic!("parse {} as URL", base.as_ref()));
        let events_path = events_prefix.into();
        let events_prefix = format!("{}/", events_path);

        Urls {
            base,
            events_path,
            events_prefix,
        }
    }

    pub fn events(&self) -> Url {
        self.base.join(&self.events_prefix).expect("get events URL")
    }

    /// The API location of a single event.
    pub fn event(&self, id: &str) -> Url {
        self.events()
            .join(&format!("id/{}", id))
            .unwrap_or_else(|_| panic!("get URL for event {}", id))
    }

    /// The link an organizer shares with attendees.
    pub fn attendee_dashboard(&self, event_id: &str) -> Url {
        let mut url = self
            .base
            .join("attendee-dashboard")
            .expect("get attendee dashboard URL");
        url.query_pairs_mut().append_pair("eventId", event_id);

        url
    }

    /// The link an organizer shares with photographers.
    pub fn upload_image(&self, event_id: &str) -> Url {
        let mut url = self.base.join("upload-image").expect("get upload URL");
        url.query_pairs_mut().append_pair("eventId", event_id);

        url
    }
}
