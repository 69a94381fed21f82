//! Record persistence.
//!
//! A [`Sink`] accepts one [`EventRecord`] at a time and must be safe to share between workers.
//! Delivery is at-least-once: after a resume the same record may be written again.

mod csv;
mod retry;

pub use csv::CsvSink;
#[cfg(any(test, feature = "test-utils"))]
pub(crate) use csv::decode_rows;
pub use retry::{DEFAULT_SINK_DELAY, RetrySink};

use std::{fmt::Debug, io, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::types::EventRecord;

#[derive(Error, Debug, Clone)]
pub enum SinkError {
    #[error("sink I/O error at {path}: {source}")]
    Io { path: PathBuf, source: Arc<io::Error> },

    #[error("sink rejected record: {0}")]
    Rejected(String),

    #[error("sink write cancelled")]
    Cancelled,
}

impl SinkError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SinkError::Io { path: path.into(), source: Arc::new(source) }
    }
}

#[async_trait]
pub trait Sink: Send + Sync + Debug {
    /// Persists one record. Returning `Ok` means the record is durably handed off.
    ///
    /// `token` is the caller's cancellation scope. Implementations that wait or retry stop when
    /// it fires.
    async fn write(&self, record: &EventRecord, token: &CancellationToken) -> Result<(), SinkError>;
}

#[async_trait]
impl<S: Sink + ?Sized> Sink for Arc<S> {
    async fn write(&self, record: &EventRecord, token: &CancellationToken) -> Result<(), SinkError> {
        (**self).write(record, token).await
    }
}
