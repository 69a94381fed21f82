use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    retry::{RetryError, RetryPolicy, retry},
    sink::{Sink, SinkError},
    types::EventRecord,
};

/// Wait used by [`RetrySink::new`] when the configured delay is zero.
pub const DEFAULT_SINK_DELAY: Duration = Duration::from_millis(1000);

/// Retries failed writes of an inner [`Sink`] under its own [`RetryPolicy`].
#[derive(Debug)]
pub struct RetrySink<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: Sink> RetrySink<S> {
    /// Zero attempts become one try and a zero delay becomes [`DEFAULT_SINK_DELAY`].
    #[must_use]
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        let policy = RetryPolicy {
            attempts: policy.attempts.max(1),
            delay: if policy.delay.is_zero() { DEFAULT_SINK_DELAY } else { policy.delay },
        };
        Self { inner, policy }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[must_use]
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: Sink> Sink for RetrySink<S> {
    /// `token` stops the retry loop; a write already in progress is left to finish.
    async fn write(&self, record: &EventRecord, token: &CancellationToken) -> Result<(), SinkError> {
        retry(&self.policy, token, "sink write", || self.inner.write(record, token)).await.map_err(
            |err| match err {
                RetryError::Cancelled => SinkError::Cancelled,
                RetryError::Exhausted(err) => err,
            },
        )
    }
}
