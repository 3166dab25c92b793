use futures::future::BoxFuture;
use url::Url;

use crate::errors::BackendError;
use crate::event::{Event, EventMetadata, MatchRecord, NewEvent, Role, UserProfile};

#[cfg(test)]
pub(crate) mod mock;

/// How many candidate IDs `generate_event_id` will try before giving up
/// on finding a free one.
pub const EVENT_ID_ATTEMPTS: usize = 10;

/// The event directory, attendee match store, and user profiles.
pub trait Db {
    fn insert_event(
        &self,
        id: &str,
        metadata: EventMetadata,
        owner_id: &str,
    ) -> BoxFuture<Result<NewEvent, BackendError>>;

    fn retrieve_event(&self, id: &str) -> BoxFuture<Result<Option<Event>, BackendError>>;

    fn event_exists(&self, id: &str) -> BoxFuture<Result<bool, BackendError>>;

    /// Deletes an event. Fails with [`BackendError::NotEventOwner`] when
    /// the requester is not the recorded owner, leaving the event in place.
    fn delete_event(&self, id: &str, requester: &str) -> BoxFuture<Result<(), BackendError>>;

    /// Returns the events the given user owns. Rows imported from the
    /// previous system may only carry the owner under one of the legacy
    /// attributes; this lookup covers all of them and de-duplicates by
    /// event ID, so callers never see the compatibility machinery.
    fn events_by_owner(&self, owner: &str) -> BoxFuture<Result<Vec<Event>, BackendError>>;

    fn update_cover_url(&self, id: &str, url: &Url) -> BoxFuture<Result<(), BackendError>>;

    fn adjust_photo_count(&self, id: &str, delta: i32) -> BoxFuture<Result<(), BackendError>>;

    /// Writes the match record for (user, event), overwriting any
    /// existing one. The original upload time survives the overwrite.
    fn upsert_match(
        &self,
        user_id: &str,
        event_id: &str,
        selfie_url: &Url,
        photo_urls: &[Url],
    ) -> BoxFuture<Result<MatchRecord, BackendError>>;

    fn match_record(
        &self,
        user_id: &str,
        event_id: &str,
    ) -> BoxFuture<Result<Option<MatchRecord>, BackendError>>;

    fn matches_by_user(&self, user_id: &str) -> BoxFuture<Result<Vec<MatchRecord>, BackendError>>;

    fn default_selfie(&self, user_id: &str) -> BoxFuture<Result<Option<Url>, BackendError>>;

    fn set_default_selfie(&self, user_id: &str, url: &Url)
        -> BoxFuture<Result<(), BackendError>>;

    /// Updates the selfie reference on every existing record for the
    /// user and returns how many records were touched.
    fn propagate_selfie(&self, user_id: &str, url: &Url) -> BoxFuture<Result<u64, BackendError>>;

    /// Creates or refreshes a user profile. `role` only changes the
    /// stored role when given.
    fn upsert_user(
        &self,
        email: &str,
        display_name: Option<String>,
        mobile_number: Option<String>,
        role: Option<Role>,
    ) -> BoxFuture<Result<UserProfile, BackendError>>;

    /// Adds an event to the user's created-events list. Recording the
    /// same event twice leaves a single entry.
    fn record_created_event(
        &self,
        email: &str,
        event_id: &str,
    ) -> BoxFuture<Result<(), BackendError>>;
}

/// Produces a 6-digit event ID no existing event uses. After
/// [`EVENT_ID_ATTEMPTS`] collisions the last candidate is returned
/// anyway; the primary key constraint is the backstop for the residual
/// collision risk.
pub async fn generate_event_id(db: &(dyn Db + Send + Sync)) -> Result<String, BackendError> {
    let mut id = random_event_id();

    for _ in 1..EVENT_ID_ATTEMPTS {
        if !db.event_exists(&id).await? {
            return Ok(id);
        }

        id = random_event_id();
    }

    Ok(id)
}

fn random_event_id() -> String {
    use rand::Rng;

    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

pub use self::postgres::*;

mod postgres {
    use std::collections::HashSet;

    use futures::future::BoxFuture;
    use futures::FutureExt;
    use sqlx::postgres::{PgPool, PgRow};
    use time::OffsetDateTime;
    use url::Url;

    use crate::errors::BackendError;
    use crate::event::{
        Event, EventMetadata, MatchRecord, NewEvent, Role, Times, UserProfile,
    };

    const EVENTS_ID_CONSTRAINT: &str = "events_primary_key";

    pub struct PgDb {
        pool: PgPool,
    }

    impl PgDb {
        pub fn new(pool: PgPool) -> Self {
            PgDb { pool }
        }
    }

    // these can be simplified once async functions in traits are stabilized
    impl super::Db for PgDb {
        fn insert_event(
            &self,
            id: &str,
            metadata: EventMetadata,
            owner_id: &str,
        ) -> BoxFuture<Result<NewEvent, BackendError>> {
            let id = id.to_owned();
            let owner_id = owner_id.to_owned();

            async move {
                let query = sqlx::query_as(include_str!("queries/create_event.sql"));

                let (created_at, updated_at): (OffsetDateTime, OffsetDateTime) = query
                    .bind(&id)
                    .bind(&metadata.name)
                    .bind(&metadata.event_date)
                    .bind(&metadata.description)
                    .bind(&metadata.guest_count)
                    .bind(&owner_id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(NewEvent::new(
                    id,
                    Times {
                        created_at,
                        updated_at,
                    },
                    metadata,
                    owner_id,
                ))
            }
            .boxed()
        }

        fn retrieve_event(&self, id: &str) -> BoxFuture<Result<Option<Event>, BackendError>> {
            let id = id.to_owned();

            async move {
                let query = sqlx::query(include_str!("queries/retrieve_event.sql"));

                let event: Option<Event> = query
                    .bind(id)
                    .try_map(|row: PgRow| event_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(event)
            }
            .boxed()
        }

        fn event_exists(&self, id: &str) -> BoxFuture<Result<bool, BackendError>> {
            let id = id.to_owned();

            async move {
                let query = sqlx::query_as(include_str!("queries/event_exists.sql"));

                let (exists,): (bool,) = query
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(exists)
            }
            .boxed()
        }

        fn delete_event(&self, id: &str, requester: &str) -> BoxFuture<Result<(), BackendError>> {
            let id = id.to_owned();
            let requester = requester.to_owned();

            async move {
                let query = sqlx::query(include_str!("queries/delete_event.sql"));

                let count = query
                    .bind(&id)
                    .bind(&requester)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                if count > 0 {
                    return Ok(());
                }

                // nothing was deleted: either the event is unknown or
                // the requester does not own it
                if super::Db::event_exists(self, &id).await? {
                    Err(BackendError::NotEventOwner { id })
                } else {
                    Err(BackendError::EventNotFound { code: id })
                }
            }
            .boxed()
        }

        fn events_by_owner(&self, owner: &str) -> BoxFuture<Result<Vec<Event>, BackendError>> {
            let owner = owner.to_owned();

            async move {
                let lookups = [
                    include_str!("queries/events_by_owner.sql"),
                    include_str!("queries/events_by_organizer.sql"),
                    include_str!("queries/events_by_creator.sql"),
                ];

                let mut seen = HashSet::new();
                let mut events = vec![];

                for lookup in &lookups {
                    let rows: Vec<Event> = sqlx::query(lookup)
                        .bind(&owner)
                        .try_map(|row: PgRow| event_from_row(&row))
                        .fetch_all(&self.pool)
                        .await
                        .map_err(map_sqlx_error)?;

                    for event in rows {
                        if seen.insert(event.id.clone()) {
                            events.push(event);
                        }
                    }
                }

                Ok(events)
            }
            .boxed()
        }

        fn update_cover_url(&self, id: &str, url: &Url) -> BoxFuture<Result<(), BackendError>> {
            let id = id.to_owned();
            let url = url.clone();

            async move {
                let query = sqlx::query(include_str!("queries/update_cover_url.sql"));

                query
                    .bind(id)
                    .bind(url.as_str())
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(())
            }
            .boxed()
        }

        fn adjust_photo_count(&self, id: &str, delta: i32) -> BoxFuture<Result<(), BackendError>> {
            let id = id.to_owned();

            async move {
                let query = sqlx::query(include_str!("queries/adjust_photo_count.sql"));

                query
                    .bind(id)
                    .bind(delta)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(())
            }
            .boxed()
        }

        fn upsert_match(
            &self,
            user_id: &str,
            event_id: &str,
            selfie_url: &Url,
            photo_urls: &[Url],
        ) -> BoxFuture<Result<MatchRecord, BackendError>> {
            let user_id = user_id.to_owned();
            let event_id = event_id.to_owned();
            let selfie_url = selfie_url.clone();
            let photo_urls = photo_urls.to_vec();

            async move {
                let query = sqlx::query_as(include_str!("queries/upsert_match.sql"));

                let stored: Vec<String> =
                    photo_urls.iter().map(|url| url.as_str().to_owned()).collect();

                let (uploaded_at, updated_at): (OffsetDateTime, OffsetDateTime) = query
                    .bind(&user_id)
                    .bind(&event_id)
                    .bind(selfie_url.as_str())
                    .bind(&stored)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(MatchRecord {
                    user_id,
                    event_id,
                    selfie_url,
                    photo_urls,
                    uploaded_at,
                    updated_at,
                })
            }
            .boxed()
        }

        fn match_record(
            &self,
            user_id: &str,
            event_id: &str,
        ) -> BoxFuture<Result<Option<MatchRecord>, BackendError>> {
            let user_id = user_id.to_owned();
            let event_id = event_id.to_owned();

            async move {
                let query = sqlx::query(include_str!("queries/match_record.sql"));

                let record: Option<MatchRecord> = query
                    .bind(user_id)
                    .bind(event_id)
                    .try_map(|row: PgRow| match_record_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(record)
            }
            .boxed()
        }

        fn matches_by_user(
            &self,
            user_id: &str,
        ) -> BoxFuture<Result<Vec<MatchRecord>, BackendError>> {
            let user_id = user_id.to_owned();

            async move {
                let query = sqlx::query(include_str!("queries/matches_by_user.sql"));

                let records: Vec<MatchRecord> = query
                    .bind(user_id)
                    .try_map(|row: PgRow| match_record_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(records)
            }
            .boxed()
        }

        fn default_selfie(&self, user_id: &str) -> BoxFuture<Result<Option<Url>, BackendError>> {
            let user_id = user_id.to_owned();

            async move {
                let record = super::Db::match_record(
                    self,
                    &user_id,
                    crate::event::DEFAULT_SELFIE_EVENT_ID,
                )
                .await?;

                Ok(record.map(|record| record.selfie_url))
            }
            .boxed()
        }

        fn set_default_selfie(
            &self,
            user_id: &str,
            url: &Url,
        ) -> BoxFuture<Result<(), BackendError>> {
            let user_id = user_id.to_owned();
            let url = url.clone();

            async move {
                let query = sqlx::query(include_str!("queries/set_default_selfie.sql"));

                query
                    .bind(user_id)
                    .bind(crate::event::DEFAULT_SELFIE_EVENT_ID)
                    .bind(url.as_str())
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(())
            }
            .boxed()
        }

        fn propagate_selfie(
            &self,
            user_id: &str,
            url: &Url,
        ) -> BoxFuture<Result<u64, BackendError>> {
            let user_id = user_id.to_owned();
            let url = url.clone();

            async move {
                let query = sqlx::query(include_str!("queries/propagate_selfie.sql"));

                let count = query
                    .bind(user_id)
                    .bind(url.as_str())
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                Ok(count)
            }
            .boxed()
        }

        fn upsert_user(
            &self,
            email: &str,
            display_name: Option<String>,
            mobile_number: Option<String>,
            role: Option<Role>,
        ) -> BoxFuture<Result<UserProfile, BackendError>> {
            let email = email.to_owned();

            async move {
                let query = sqlx::query(include_str!("queries/upsert_user.sql"));

                let profile: UserProfile = query
                    .bind(email)
                    .bind(display_name)
                    .bind(mobile_number)
                    .bind(role.map(|role| role.as_str()))
                    .try_map(|row: PgRow| user_from_row(&row))
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(profile)
            }
            .boxed()
        }

        fn record_created_event(
            &self,
            email: &str,
            event_id: &str,
        ) -> BoxFuture<Result<(), BackendError>> {
            let email = email.to_owned();
            let event_id = event_id.to_owned();

            async move {
                let query = sqlx::query(include_str!("queries/record_created_event.sql"));

                query
                    .bind(email)
                    .bind(event_id)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(())
            }
            .boxed()
        }
    }

    fn event_from_row(row: &PgRow) -> Result<Event, sqlx::Error> {
        let cover_url: Option<String> = try_get(row, "cover_url")?;
        let cover_url = cover_url.map(|url| parse_url(url)).transpose()?;

        Ok(Event {
            id: try_get(row, "id")?,
            name: try_get(row, "name")?,
            event_date: try_get(row, "event_date")?,
            description: try_get(row, "description")?,
            cover_url,
            owner_id: try_get(row, "owner_id")?,
            photo_count: try_get(row, "photo_count")?,
            video_count: try_get(row, "video_count")?,
            guest_count: try_get(row, "guest_count")?,
            times: Times {
                created_at: try_get(row, "created_at")?,
                updated_at: try_get(row, "updated_at")?,
            },
        })
    }

    fn match_record_from_row(row: &PgRow) -> Result<MatchRecord, sqlx::Error> {
        let selfie_url: String = try_get(row, "selfie_url")?;
        let photo_urls: Vec<String> = try_get(row, "photo_urls")?;

        Ok(MatchRecord {
            user_id: try_get(row, "user_id")?,
            event_id: try_get(row, "event_id")?,
            selfie_url: parse_url(selfie_url)?,
            photo_urls: photo_urls
                .into_iter()
                .map(parse_url)
                .collect::<Result<Vec<_>, _>>()?,
            uploaded_at: try_get(row, "uploaded_at")?,
            updated_at: try_get(row, "updated_at")?,
        })
    }

    fn user_from_row(row: &PgRow) -> Result<UserProfile, sqlx::Error> {
        let role: String = try_get(row, "role")?;

        Ok(UserProfile {
            email: try_get(row, "email")?,
            display_name: try_get(row, "display_name")?,
            mobile_number: try_get(row, "mobile_number")?,
            role: Role::from_stored(&role),
            created_events: try_get(row, "created_events")?,
            times: Times {
                created_at: try_get(row, "created_at")?,
                updated_at: try_get(row, "updated_at")?,
            },
        })
    }

    // this should never fail, since we control the URLs that go into
    // the database, but just for completeness...
    fn parse_url(url: String) -> Result<Url, sqlx::Error> {
        Url::parse(&url).map_err(|source| {
            sqlx::Error::Decode(Box::new(BackendError::UnableToParseUrl { url, source }))
        })
    }

    fn try_get<'a, T: sqlx::Type<sqlx::Postgres> + sqlx::decode::Decode<'a, sqlx::Postgres>>(
        row: &'a PgRow,
        column: &str,
    ) -> Result<T, sqlx::Error> {
        use sqlx::prelude::*;

        row.try_get(column)
    }

    fn map_sqlx_error(error: sqlx::Error) -> BackendError {
        use sqlx::Error;

        match error {
            Error::Database(ref e) if e.constraint() == Some(EVENTS_ID_CONSTRAINT) => {
                BackendError::IdAlreadyExists
            }
            _ => BackendError::Sqlx { source: error },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{generate_event_id, mock::MemoryDb, Db};
    use crate::event::EventMetadata;

    fn metadata(name: &str) -> EventMetadata {
        EventMetadata {
            name: name.to_owned(),
            event_date: "2026-08-01".to_owned(),
            description: None,
            guest_count: None,
        }
    }

    #[tokio::test]
    async fn generated_ids_are_six_digit_strings() {
        let db = MemoryDb::new();

        for _ in 0..100 {
            let id = generate_event_id(&db).await.unwrap();

            assert_eq!(id.len(), 6);
            assert!(id.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn generated_ids_avoid_existing_events() {
        let db = MemoryDb::new();

        // a directory of events makes collisions likely enough for the
        // existence check to matter
        for n in 0..500 {
            let id = format!("{:06}", n * 2_000);
            db.insert_event(&id, metadata("seeded"), "owner@example.com")
                .await
                .unwrap();
        }

        for _ in 0..100 {
            let id = generate_event_id(&db).await.unwrap();
            assert!(
                !db.event_exists(&id).await.unwrap(),
                "{} is already taken",
                id
            );
        }
    }
}
