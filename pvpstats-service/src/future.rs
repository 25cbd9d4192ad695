//! Deferred stats results.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use pvpstats_core::{StatsError, StatsResult};
use tokio::sync::oneshot;

enum Inner<T> {
    Ready(Option<T>),
    Deferred(oneshot::Receiver<T>),
}

/// The result of an orchestrator read.
///
/// Cache hits and blank-name short-circuits are ready immediately; misses
/// resolve when a background worker answers. A worker that fails or panics
/// drops its sender, and the future resolves to `T::default()`: absent stats,
/// unranked, or an empty leaderboard.
pub struct StatsFuture<T> {
    operation: &'static str,
    inner: Inner<T>,
}

impl<T> StatsFuture<T> {
    pub fn ready(operation: &'static str, value: T) -> Self {
        Self {
            operation,
            inner: Inner::Ready(Some(value)),
        }
    }

    pub(crate) fn deferred(operation: &'static str, receiver: oneshot::Receiver<T>) -> Self {
        Self {
            operation,
            inner: Inner::Deferred(receiver),
        }
    }

    /// Whether the value was available without a store round-trip.
    pub fn is_ready(&self) -> bool {
        matches!(self.inner, Inner::Ready(_))
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

impl<T: Default + Unpin> StatsFuture<T> {
    /// Wait at most `timeout`; on timeout yield the default value.
    pub async fn resolve_within(self, timeout: Duration) -> T {
        let operation = self.operation;
        match self.try_resolve_within(timeout).await {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(operation, error = %e, "Stats read fell back to default");
                T::default()
            }
        }
    }

    /// Wait at most `timeout`, reporting a timeout as [`StatsError::Timeout`].
    pub async fn try_resolve_within(self, timeout: Duration) -> StatsResult<T> {
        let operation = self.operation;
        tokio::time::timeout(timeout, self)
            .await
            .map_err(|_| StatsError::Timeout {
                operation,
                waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })
    }
}

impl<T: Default + Unpin> Future for StatsFuture<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        match &mut self.get_mut().inner {
            Inner::Ready(value) => Poll::Ready(value.take().unwrap_or_default()),
            Inner::Deferred(receiver) => Pin::new(receiver)
                .poll(cx)
                .map(|received| received.unwrap_or_default()),
        }
    }
}

impl<T> std::fmt::Debug for StatsFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsFuture")
            .field("operation", &self.operation)
            .field("ready", &self.is_ready())
            .finish()
    }
}
