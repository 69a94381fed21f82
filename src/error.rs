use thiserror::Error;

use crate::{
    config::ConfigError, range_scanner::CheckpointError, resilient_client::NodeError,
    retry::RetryError, sink::SinkError,
};

/// Errors that end an extraction run.
///
/// `ExtractorError` is `Clone` so the first fatal error of a run can be kept by the worker pool
/// and handed to every observer. Per-record problems (unknown events, decode failures, missing
/// enrichment) never surface here.
#[derive(Error, Debug, Clone)]
pub enum ExtractorError {
    /// A node call failed on every try.
    #[error(transparent)]
    Node(#[from] NodeError),

    /// A sink write failed on every try.
    #[error(transparent)]
    Sink(SinkError),

    /// Loading or saving the resume checkpoint failed.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// The job description was rejected before any work started.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A worker or finisher task ended without reporting a result.
    #[error("task failed: {0}")]
    Task(String),

    /// The run was cancelled. Cancellation is a terminal state, not a failure.
    #[error("extraction cancelled")]
    Cancelled,
}

impl ExtractorError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExtractorError::Cancelled)
    }
}

impl<E: Into<ExtractorError>> From<RetryError<E>> for ExtractorError {
    fn from(error: RetryError<E>) -> Self {
        match error {
            RetryError::Cancelled => ExtractorError::Cancelled,
            RetryError::Exhausted(err) => err.into(),
        }
    }
}

impl From<SinkError> for ExtractorError {
    fn from(error: SinkError) -> Self {
        match error {
            SinkError::Cancelled => ExtractorError::Cancelled,
            other => ExtractorError::Sink(other),
        }
    }
}

impl From<tokio::task::JoinError> for ExtractorError {
    fn from(error: tokio::task::JoinError) -> Self {
        if error.is_cancelled() {
            ExtractorError::Cancelled
        } else {
            ExtractorError::Task(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_cancellation_maps_to_cancelled() {
        let err: ExtractorError = RetryError::<NodeError>::Cancelled.into();
        assert!(err.is_cancelled());
    }

    #[test]
    fn exhausted_retry_keeps_the_underlying_error() {
        let err: ExtractorError = RetryError::Exhausted(NodeError::BlockNotFound(12)).into();
        assert!(matches!(err, ExtractorError::Node(NodeError::BlockNotFound(12))));
        assert_eq!(err.to_string(), "block 12 not found");
    }

    #[test]
    fn sink_errors_display_through() {
        let err: ExtractorError = SinkError::Rejected("disk full".into()).into();
        assert_eq!(err.to_string(), "sink rejected record: disk full");
    }

    #[test]
    fn cancelled_sink_write_is_a_cancellation() {
        let err: ExtractorError = SinkError::Cancelled.into();
        assert!(err.is_cancelled());
    }
}
