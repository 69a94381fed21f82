//! Background extraction jobs.
//!
//! A [`JobRegistry`] validates a [`JobSpec`](crate::config::JobSpec), assigns it an id and runs it
//! on its own task. Jobs move `queued -> running -> finished | error`, and can be cancelled from
//! `queued` or `running`:
//!
//! ```rust,no_run
//! use event_extractor::{JobRegistry, JobSpec, jobs::JobState};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let registry = JobRegistry::new();
//! let id = registry.create(&JobSpec::load("job.json")?)?;
//!
//! let status = registry.wait(&id).await?;
//! assert!(status.state.is_terminal());
//! if status.state == JobState::Error {
//!     eprintln!("job {id} failed: {}", status.error.unwrap_or_default());
//! }
//! # Ok(()) }
//! ```

mod registry;
mod status;

pub use registry::{JobRegistry, RegistryError};
pub use status::{CancelOutcome, JobProgress, JobState, JobStatus};
