// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The semantic-matcher boundary.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the matcher service.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("matcher unavailable: {0}")]
    Unavailable(String),
}

/// Computes the profile↔posting similarity for a job URL, in `[0, 1]`.
#[async_trait]
pub trait MatcherAdapter: Clone + Send + Sync + 'static {
    async fn score(&self, job_url: &str) -> Result<f64, MatchError>;
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{MatchError, MatcherAdapter};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Fixed-score matcher for tests. Scores are keyed by URL substring;
    /// unmatched URLs get the default score.
    #[derive(Clone)]
    pub struct FakeMatcherAdapter {
        scores: Arc<Mutex<HashMap<String, f64>>>,
        default: f64,
    }

    impl FakeMatcherAdapter {
        pub fn new(default: f64) -> Self {
            Self { scores: Arc::new(Mutex::new(HashMap::new())), default }
        }

        pub fn score_for(&self, url_fragment: impl Into<String>, score: f64) {
            self.scores.lock().insert(url_fragment.into(), score);
        }
    }

    impl Default for FakeMatcherAdapter {
        fn default() -> Self {
            Self::new(0.8)
        }
    }

    #[async_trait]
    impl MatcherAdapter for FakeMatcherAdapter {
        async fn score(&self, job_url: &str) -> Result<f64, MatchError> {
            let scores = self.scores.lock();
            for (fragment, score) in scores.iter() {
                if job_url.contains(fragment.as_str()) {
                    return Ok(*score);
                }
            }
            Ok(self.default)
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeMatcherAdapter;
