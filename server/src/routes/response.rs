use serde::Serialize;
use url::Url;

use crate::event::{Event, MatchRecord, UserProfile, UserStatistics};
use crate::image::{RejectedImage, UploadedImage};
use crate::urls::Urls;

/// An event as returned to clients, with the derived links attached.
#[derive(Debug, Serialize)]
pub struct EventView {
    #[serde(flatten)]
    pub event: Event,

    /// The link an organizer shares with attendees.
    pub share_url: Url,

    /// The link an organizer shares with photographers.
    pub upload_url: Url,
}

impl EventView {
    pub fn new(event: Event, urls: &Urls) -> Self {
        let share_url = urls.attendee_dashboard(&event.id);
        let upload_url = urls.upload_image(&event.id);

        EventView {
            event,
            share_url,
            upload_url,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SuccessResponse<'a> {
    Event(EventView),
    Events {
        events: Vec<EventView>,
    },
    Healthz {
        revision: Option<&'a str>,
        timestamp: Option<&'a str>,
        version: &'a str,
    },
    Images {
        event_id: String,
        images: Vec<Url>,
    },
    Matches {
        event_id: String,
        cached: bool,
        persisted: bool,
        photos: Vec<Url>,
    },
    Photos {
        records: Vec<MatchRecord>,
    },
    Profile(UserProfile),
    Selfie {
        url: Option<Url>,
    },
    SelfieUpdated {
        url: Url,
        propagated: u64,
    },
    Statistics(UserStatistics),
    Upload {
        accepted_count: usize,
        rejected_count: usize,
        accepted: Vec<UploadedImage>,
        rejected: Vec<RejectedImage>,
    },
}
