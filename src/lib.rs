//! Event-Extractor pulls historical event logs of a set of EVM contracts into flat records.
//!
//! A job names an RPC endpoint, a start block, the contracts to follow (address, ABI and an
//! optional event allow-list) and where to write. The [`Extractor`] splits the span from the
//! start block to the chain head into fixed-width chunks and hands them to a pool of workers. Each
//! worker fetches the chunk's logs with at most two filter queries, decodes them against the
//! contract ABI, adds block timestamp, chain id and transaction sender, and writes one record per
//! event to a [`Sink`](sink::Sink).
//!
//! # Failure model
//!
//! Every node call and every sink write runs under a bounded retry policy that honours the job's
//! cancellation token. An error that outlives its retries is fatal: it cancels the remaining
//! workers and becomes the result of the run. Logs that cannot be decoded and enrichment lookups
//! that fail are not fatal; the former are skipped, the latter leave their field empty.
//!
//! # Resuming
//!
//! A checkpoint records the highest block up to which every chunk has been written. A restarted
//! job with the same endpoint and contracts starts after it. Records between the checkpoint and the
//! point of failure may be written twice.
//!
//! # Jobs
//!
//! [`JobRegistry`] runs extractions in the background and tracks their status, see [`jobs`].

#[macro_use]
mod logging;

pub mod config;
pub mod extractor;
pub mod jobs;
pub mod range_scanner;
pub mod resilient_client;
pub mod retry;
pub mod sink;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;

mod error;

pub use config::{ConfigError, JobSpec, ValidatedJob};
pub use error::ExtractorError;
pub use extractor::{Extractor, ExtractorBuilder, RunSummary};
pub use jobs::{JobRegistry, JobState, JobStatus};
pub use retry::RetryPolicy;
pub use sink::{CsvSink, Sink, SinkError};
pub use types::{BlockRange, EventRecord, FieldValue, LogRecord};
