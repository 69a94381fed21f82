//! Bounded, cancellable retry shared by remote calls, sink writes and checkpoint saves.
//!
//! Every fallible operation that talks to something outside the process goes through
//! [`retry`]: up to [`RetryPolicy::attempts`] tries with a constant [`RetryPolicy::delay`]
//! between them. The wait between tries is cut short when the caller's
//! [`CancellationToken`] fires, and no further try is started after that.

use std::{fmt::Display, time::Duration};

use backon::{ConstantBuilder, Retryable};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Default number of tries for every remote call.
pub const DEFAULT_ATTEMPTS: usize = 3;
/// Default wait between two tries.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(1500);

/// How often and how patiently an operation is retried.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of tries, including the first one. Zero behaves like one.
    pub attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: DEFAULT_ATTEMPTS, delay: DEFAULT_DELAY }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(attempts: usize, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// A single try, no waiting.
    #[must_use]
    pub const fn once() -> Self {
        Self { attempts: 1, delay: Duration::ZERO }
    }

    fn backoff(&self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.attempts.saturating_sub(1))
    }
}

/// Outcome of a retried operation that did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// The cancellation token fired before the operation could succeed.
    #[error("operation cancelled")]
    Cancelled,
    /// Every try failed; holds the error of the last one.
    #[error("{0}")]
    Exhausted(E),
}

impl<E> RetryError<E> {
    pub fn map<F, T>(self, f: F) -> RetryError<T>
    where
        F: FnOnce(E) -> T,
    {
        match self {
            RetryError::Cancelled => RetryError::Cancelled,
            RetryError::Exhausted(err) => RetryError::Exhausted(f(err)),
        }
    }
}

/// Runs `operation` under `policy`, returning the first success.
///
/// `label` names the operation in the retry log lines. A try that has already started is never
/// interrupted; cancellation is only observed before a try and while waiting between tries.
///
/// # Errors
///
/// * [`RetryError::Cancelled`] if `token` fires before a try succeeds.
/// * [`RetryError::Exhausted`] with the last error once all tries failed.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    label: &'static str,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.attempts.max(1);
    let sleep_token = token.clone();

    let result = (|| {
        let cancelled = token.is_cancelled();
        let call = (!cancelled).then(&mut operation);
        async move {
            match call {
                Some(call) => call.await.map_err(RetryError::Exhausted),
                None => Err(RetryError::Cancelled),
            }
        }
    })
    .retry(policy.backoff())
    .when(|err: &RetryError<E>| matches!(err, RetryError::Exhausted(_)) && !token.is_cancelled())
    .notify(|err: &RetryError<E>, wait: Duration| {
        warn!(
            operation = label,
            error = %err,
            wait_ms = wait.as_millis(),
            "operation failed, retrying"
        );
    })
    .sleep(move |wait: Duration| {
        let token = sleep_token.clone();
        async move {
            tokio::select! {
                () = tokio::time::sleep(wait) => {}
                () = token.cancelled() => {}
            }
        }
    })
    .await;

    match result {
        Ok(value) => Ok(value),
        Err(RetryError::Exhausted(err)) if !token.is_cancelled() => {
            error!(operation = label, attempts = attempts, error = %err, "all attempts failed");
            Err(RetryError::Exhausted(err))
        }
        Err(_) => {
            debug!(operation = label, "operation cancelled");
            Err(RetryError::Cancelled)
        }
    }
}
