use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use futures::future::{ready, BoxFuture, FutureExt};
use time::OffsetDateTime;
use url::Url;

use crate::db::Db;
use crate::errors::BackendError;
use crate::event::{
    Event, EventMetadata, MatchRecord, NewEvent, Role, Times, UserProfile,
    DEFAULT_SELFIE_EVENT_ID,
};

/// An in-memory implementation of [`Db`] for tests.
#[derive(Default)]
pub(crate) struct MemoryDb {
    pub(crate) events: RwLock<HashMap<String, Event>>,
    pub(crate) matches: RwLock<HashMap<(String, String), MatchRecord>>,
    pub(crate) users: RwLock<HashMap<String, UserProfile>>,

    /// When set, every match upsert fails, to exercise soft-persistence
    /// paths.
    pub(crate) fail_match_upserts: AtomicBool,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    fn storage_error() -> BackendError {
        BackendError::Sqlx {
            source: sqlx::Error::PoolClosed,
        }
    }
}

impl Db for MemoryDb {
    fn insert_event(
        &self,
        id: &str,
        metadata: EventMetadata,
        owner_id: &str,
    ) -> BoxFuture<Result<NewEvent, BackendError>> {
        let mut events = self.events.write().unwrap();

        let result = if events.contains_key(id) {
            Err(BackendError::IdAlreadyExists)
        } else {
            let times = Times {
                created_at: Self::now(),
                updated_at: Self::now(),
            };

            events.insert(
                id.to_owned(),
                Event {
                    id: id.to_owned(),
                    name: metadata.name.clone(),
                    event_date: metadata.event_date.clone(),
                    description: metadata.description.clone(),
                    cover_url: None,
                    owner_id: owner_id.to_owned(),
                    photo_count: 0,
                    video_count: 0,
                    guest_count: metadata.guest_count.unwrap_or(0),
                    times,
                },
            );

            Ok(NewEvent::new(
                id.to_owned(),
                times,
                metadata,
                owner_id.to_owned(),
            ))
        };

        ready(result).boxed()
    }

    fn retrieve_event(&self, id: &str) -> BoxFuture<Result<Option<Event>, BackendError>> {
        let result = Ok(self.events.read().unwrap().get(id).cloned());

        ready(result).boxed()
    }

    fn event_exists(&self, id: &str) -> BoxFuture<Result<bool, BackendError>> {
        let result = Ok(self.events.read().unwrap().contains_key(id));

        ready(result).boxed()
    }

    fn delete_event(&self, id: &str, requester: &str) -> BoxFuture<Result<(), BackendError>> {
        let mut events = self.events.write().unwrap();

        let result = match events.get(id) {
            Some(event) if event.owner_id == requester => Ok(()),
            Some(_) => Err(BackendError::NotEventOwner { id: id.to_owned() }),
            None => Err(BackendError::EventNotFound {
                code: id.to_owned(),
            }),
        };

        if result.is_ok() {
            events.remove(id);
        }

        ready(result).boxed()
    }

    fn events_by_owner(&self, owner: &str) -> BoxFuture<Result<Vec<Event>, BackendError>> {
        let events = self
            .events
            .read()
            .unwrap()
            .values()
            .filter(|event| event.owner_id == owner)
            .cloned()
            .collect();

        ready(Ok(events)).boxed()
    }

    fn update_cover_url(&self, id: &str, url: &Url) -> BoxFuture<Result<(), BackendError>> {
        let mut events = self.events.write().unwrap();

        let result = match events.get_mut(id) {
            Some(event) => {
                event.cover_url = Some(url.clone());
                event.times.updated_at = Self::now();
                Ok(())
            }
            None => Err(BackendError::EventNotFound {
                code: id.to_owned(),
            }),
        };

        ready(result).boxed()
    }

    fn adjust_photo_count(&self, id: &str, delta: i32) -> BoxFuture<Result<(), BackendError>> {
        let mut events = self.events.write().unwrap();

        let result = match events.get_mut(id) {
            Some(event) => {
                event.photo_count += delta;
                event.times.updated_at = Self::now();
                Ok(())
            }
            None => Err(BackendError::EventNotFound {
                code: id.to_owned(),
            }),
        };

        ready(result).boxed()
    }

    fn upsert_match(
        &self,
        user_id: &str,
        event_id: &str,
        selfie_url: &Url,
        photo_urls: &[Url],
    ) -> BoxFuture<Result<MatchRecord, BackendError>> {
        let result = if self.fail_match_upserts.load(Ordering::SeqCst) {
            Err(Self::storage_error())
        } else {
            let mut matches = self.matches.write().unwrap();
            let key = (user_id.to_owned(), event_id.to_owned());

            let uploaded_at = matches
                .get(&key)
                .map(|existing| existing.uploaded_at)
                .unwrap_or_else(Self::now);

            let record = MatchRecord {
                user_id: user_id.to_owned(),
                event_id: event_id.to_owned(),
                selfie_url: selfie_url.clone(),
                photo_urls: photo_urls.to_vec(),
                uploaded_at,
                updated_at: Self::now(),
            };

            matches.insert(key, record.clone());

            Ok(record)
        };

        ready(result).boxed()
    }

    fn match_record(
        &self,
        user_id: &str,
        event_id: &str,
    ) -> BoxFuture<Result<Option<MatchRecord>, BackendError>> {
        let record = self
            .matches
            .read()
            .unwrap()
            .get(&(user_id.to_owned(), event_id.to_owned()))
            .cloned();

        ready(Ok(record)).boxed()
    }

    fn matches_by_user(&self, user_id: &str) -> BoxFuture<Result<Vec<MatchRecord>, BackendError>> {
        let mut records: Vec<MatchRecord> = self
            .matches
            .read()
            .unwrap()
            .values()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect();

        records.sort_by(|a, b| a.event_id.cmp(&b.event_id));

        ready(Ok(records)).boxed()
    }

    fn default_selfie(&self, user_id: &str) -> BoxFuture<Result<Option<Url>, BackendError>> {
        let url = self
            .matches
            .read()
            .unwrap()
            .get(&(user_id.to_owned(), DEFAULT_SELFIE_EVENT_ID.to_owned()))
            .map(|record| record.selfie_url.clone());

        ready(Ok(url)).boxed()
    }

    fn set_default_selfie(
        &self,
        user_id: &str,
        url: &Url,
    ) -> BoxFuture<Result<(), BackendError>> {
        let mut matches = self.matches.write().unwrap();
        let key = (user_id.to_owned(), DEFAULT_SELFIE_EVENT_ID.to_owned());
        let user_id = user_id.to_owned();
        let url = url.clone();

        matches
            .entry(key)
            .and_modify(|record| {
                record.selfie_url = url.clone();
                record.updated_at = Self::now();
            })
            .or_insert_with(|| MatchRecord {
                user_id,
                event_id: DEFAULT_SELFIE_EVENT_ID.to_owned(),
                selfie_url: url.clone(),
                photo_urls: vec![],
                uploaded_at: Self::now(),
                updated_at: Self::now(),
            });

        ready(Ok(())).boxed()
    }

    fn propagate_selfie(&self, user_id: &str, url: &Url) -> BoxFuture<Result<u64, BackendError>> {
        let mut matches = self.matches.write().unwrap();
        let mut count = 0;

        for record in matches.values_mut() {
            if record.user_id == user_id {
                record.selfie_url = url.clone();
                record.updated_at = Self::now();
                count += 1;
            }
        }

        ready(Ok(count)).boxed()
    }

    fn upsert_user(
        &self,
        email: &str,
        display_name: Option<String>,
        mobile_number: Option<String>,
        role: Option<Role>,
    ) -> BoxFuture<Result<UserProfile, BackendError>> {
        let mut users = self.users.write().unwrap();

        let profile = if users.contains_key(email) {
            let profile = users.get_mut(email).expect("checked for presence");

            if display_name.is_some() {
                profile.display_name = display_name;
            }
            if mobile_number.is_some() {
                profile.mobile_number = mobile_number;
            }
            if let Some(role) = role {
                profile.role = role;
            }
            profile.times.updated_at = Self::now();

            profile.clone()
        } else {
            let profile = UserProfile {
                email: email.to_owned(),
                display_name,
                mobile_number,
                role: role.unwrap_or(Role::Unset),
                created_events: vec![],
                times: Times {
                    created_at: Self::now(),
                    updated_at: Self::now(),
                },
            };

            users.insert(email.to_owned(), profile.clone());

            profile
        };

        ready(Ok(profile)).boxed()
    }

    fn record_created_event(
        &self,
        email: &str,
        event_id: &str,
    ) -> BoxFuture<Result<(), BackendError>> {
        let mut users = self.users.write().unwrap();

        if let Some(profile) = users.get_mut(email) {
            if !profile.created_events.iter().any(|id| id == event_id) {
                profile.created_events.push(event_id.to_owned());
                profile.times.updated_at = Self::now();
            }
        }

        ready(Ok(())).boxed()
    }
}
