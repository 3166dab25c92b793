use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::{BoxFuture, FutureExt};

use crate::errors::BackendError;
use crate::faces::FaceMatcher;

/// A matcher for tests, scripted with a similarity score per target key.
/// Unknown targets report no match; targets scripted as `Err` fail the
/// single comparison.
pub(crate) struct MockMatcher {
    scores: HashMap<String, Result<f32, ()>>,
    pub(crate) calls: AtomicUsize,
}

impl MockMatcher {
    pub fn new(scores: Vec<(&str, Result<f32, ()>)>) -> Self {
        MockMatcher {
            scores: scores
                .into_iter()
                .map(|(key, score)| (key.to_owned(), score))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FaceMatcher for MockMatcher {
    fn compare(
        &self,
        _source_key: &str,
        target_key: &str,
    ) -> BoxFuture<Result<Option<f32>, BackendError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let result = match self.scores.get(target_key) {
            Some(Ok(similarity)) => Ok(Some(*similarity)),
            Some(Err(())) => Err(BackendError::ComparisonFailed {
                source: rusoto_core::RusotoError::Validation("scripted failure".to_owned()),
            }),
            None => Ok(None),
        };

        async move { result }.boxed()
    }
}
