use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{
    error::ExtractorError,
    resilient_client::{AlloyConnector, Connector, ResilientClient},
    retry::{DEFAULT_ATTEMPTS, DEFAULT_DELAY, RetryPolicy},
};

/// Builder for a connected [`ResilientClient`].
///
/// Defaults to [`DEFAULT_ATTEMPTS`] tries spaced by [`DEFAULT_DELAY`] and dials through
/// [`AlloyConnector`].
#[derive(Debug)]
pub struct ResilientClientBuilder {
    url: String,
    connector: Arc<dyn Connector>,
    attempts: usize,
    delay: Duration,
}

impl ResilientClientBuilder {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connector: Arc::new(AlloyConnector),
            attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }

    /// Use a custom [`Connector`] instead of dialing through Alloy.
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Total number of tries per call. Zero is treated as one.
    #[must_use]
    pub fn attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    /// Wait between two tries of the same call.
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn policy(self, policy: RetryPolicy) -> Self {
        self.attempts(policy.attempts).delay(policy.delay)
    }

    /// Dials the endpoint and returns the connected client.
    ///
    /// # Errors
    ///
    /// * [`ExtractorError::Node`] if every dial attempt failed.
    /// * [`ExtractorError::Cancelled`] if `token` fired first.
    pub async fn connect(self, token: &CancellationToken) -> Result<ResilientClient, ExtractorError> {
        debug!(
            attempts = self.attempts,
            delay_ms = self.delay.as_millis(),
            "building resilient client"
        );
        let policy = RetryPolicy::new(self.attempts, self.delay);
        ResilientClient::connect(self.connector.as_ref(), &self.url, policy, token).await
    }
}
