//! Freshness checks and cache read metadata.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// How old a value cached at `cached_at` is as of `now`.
///
/// Clock skew that puts `cached_at` in the future counts as zero staleness.
pub fn staleness_at(cached_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    now.signed_duration_since(cached_at)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// A value cached at `cached_at` is fresh iff its age does not exceed `ttl`.
pub fn is_fresh(cached_at: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    staleness_at(cached_at, now) <= ttl
}

/// A value served from cache, with the time it was cached.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    cached_at: DateTime<Utc>,
}

impl<T> CacheRead<T> {
    pub fn from_cache(value: T, cached_at: DateTime<Utc>) -> Self {
        Self { value, cached_at }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }
}
