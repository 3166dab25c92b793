use std::collections::BTreeMap;
use std::sync::RwLock;

use futures::future::{BoxFuture, FutureExt};
use url::{ParseError, Url};

use crate::errors::BackendError;
use crate::store::Store;

/// An in-memory store for tests. Keys are ordered so listings are
/// deterministic.
pub(crate) struct MockStore {
    pub(crate) map: RwLock<BTreeMap<String, Vec<u8>>>,
    base_url: Url,
}

impl MockStore {
    pub fn new() -> Self {
        MockStore {
            map: RwLock::new(BTreeMap::new()),
            base_url: Url::parse("https://bucket.s3.example.com/").expect("parse mock base URL"),
        }
    }

    pub fn preloaded(keys: &[&str]) -> Self {
        let store = MockStore::new();

        {
            let mut map = store.map.write().unwrap();
            for key in keys {
                map.insert((*key).to_owned(), vec![0xFF, 0xD8, 0xFF]);
            }
        }

        store
    }
}

impl Store for MockStore {
    fn save(
        &self,
        key: &str,
        _content_type: String,
        raw: Vec<u8>,
    ) -> BoxFuture<Result<Url, BackendError>> {
        let key = key.to_owned();

        async move {
            self.map.write().unwrap().insert(key.clone(), raw);

            self.url_for(&key)
                .map_err(|source| BackendError::FailedToGenerateUrl { source })
        }
        .boxed()
    }

    fn list(&self, prefix: &str) -> BoxFuture<Result<Vec<String>, BackendError>> {
        let prefix = prefix.to_owned();

        async move {
            Ok(self
                .map
                .read()
                .unwrap()
                .keys()
                .filter(|key| key.starts_with(&prefix))
                .cloned()
                .collect())
        }
        .boxed()
    }

    fn retrieve(&self, key: &str) -> BoxFuture<Result<Vec<u8>, BackendError>> {
        let key = key.to_owned();

        async move {
            self.map
                .read()
                .unwrap()
                .get(&key)
                .cloned()
                .ok_or(BackendError::BadRequest)
        }
        .boxed()
    }

    fn url_for(&self, key: &str) -> Result<Url, ParseError> {
        self.base_url.join(key)
    }

    fn key_for(&self, url: &Url) -> Option<String> {
        url.as_str()
            .strip_prefix(self.base_url.as_str())
            .map(str::to_owned)
    }
}
