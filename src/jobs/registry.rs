use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    config::{ConfigError, JobSpec, ValidatedJob},
    error::ExtractorError,
    extractor::{ChunkProgress, ExtractorBuilder, ProgressCallback},
    jobs::status::{CancelOutcome, JobState, JobStatus},
    resilient_client::{AlloyConnector, Connector},
};

#[derive(Error, Debug, Clone)]
pub enum RegistryError {
    #[error("job {0} not found")]
    NotFound(String),

    #[error(transparent)]
    InvalidSpec(#[from] ConfigError),

    #[error("job {id} is still {state}")]
    NotTerminal { id: String, state: JobState },
}

#[derive(Debug)]
struct JobEntry {
    status: JobStatus,
    token: CancellationToken,
    state: watch::Sender<JobState>,
}

type Jobs = Arc<RwLock<HashMap<String, JobEntry>>>;

/// Directory of extraction jobs.
///
/// Each job runs as its own tokio task with its own cancellation token; the registry is the only
/// state jobs share. Status reads return snapshots.
#[derive(Clone, Debug)]
pub struct JobRegistry {
    jobs: Jobs,
    connector: Arc<dyn Connector>,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    /// Registry dialing nodes through Alloy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_connector(Arc::new(AlloyConnector))
    }

    #[must_use]
    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self { jobs: Arc::new(RwLock::new(HashMap::new())), connector }
    }

    /// Validates `spec`, registers a queued job and starts it in the background.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidSpec`] if validation fails; no job is registered then.
    pub fn create(&self, spec: &JobSpec) -> Result<String, RegistryError> {
        let job = spec.validate()?;
        let id = Uuid::new_v4().simple().to_string();
        let token = CancellationToken::new();

        let (state, _) = watch::channel(JobState::Queued);
        self.jobs.write().insert(
            id.clone(),
            JobEntry { status: JobStatus::queued(id.clone()), token: token.clone(), state },
        );
        info!(job_id = id.as_str(), contracts = job.contracts.len(), "job queued");

        tokio::spawn(run_job(self.jobs.clone(), id.clone(), job, self.connector.clone(), token));
        Ok(id)
    }

    /// # Errors
    ///
    /// [`RegistryError::NotFound`] for an unknown id.
    pub fn status(&self, id: &str) -> Result<JobStatus, RegistryError> {
        self.jobs
            .read()
            .get(id)
            .map(|entry| entry.status.clone())
            .ok_or_else(|| RegistryError::NotFound(id.to_owned()))
    }

    /// Snapshots of every registered job, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<JobStatus> {
        let mut statuses: Vec<_> =
            self.jobs.read().values().map(|entry| entry.status.clone()).collect();
        statuses.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.job_id.cmp(&b.job_id)));
        statuses
    }

    /// Cancels a queued or running job. The job is `cancelled` with a finish time as soon as
    /// this returns, even if its workers are still draining.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] for an unknown id.
    pub fn cancel(&self, id: &str) -> Result<CancelOutcome, RegistryError> {
        let mut jobs = self.jobs.write();
        let entry = jobs.get_mut(id).ok_or_else(|| RegistryError::NotFound(id.to_owned()))?;

        if entry.status.state.is_terminal() {
            debug!(job_id = id, state = %entry.status.state, "cancel on finished job ignored");
            return Ok(CancelOutcome::AlreadyTerminal(entry.status.state));
        }
        entry.token.cancel();
        entry.status.transition(JobState::Cancelled, None);
        entry.state.send_replace(JobState::Cancelled);
        info!(job_id = id, "job cancelled");
        Ok(CancelOutcome::Cancelled)
    }

    /// Removes a job that has ended and returns its last status.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] or [`RegistryError::NotTerminal`].
    pub fn evict(&self, id: &str) -> Result<JobStatus, RegistryError> {
        let mut jobs = self.jobs.write();
        let state =
            jobs.get(id).map(|entry| entry.status.state).ok_or_else(|| RegistryError::NotFound(id.to_owned()))?;
        if !state.is_terminal() {
            return Err(RegistryError::NotTerminal { id: id.to_owned(), state });
        }
        jobs.remove(id)
            .map(|entry| entry.status)
            .ok_or_else(|| RegistryError::NotFound(id.to_owned()))
    }

    /// Waits until the job reaches a terminal state and returns that status.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] for an unknown or evicted id.
    pub async fn wait(&self, id: &str) -> Result<JobStatus, RegistryError> {
        let mut state = self
            .jobs
            .read()
            .get(id)
            .map(|entry| entry.state.subscribe())
            .ok_or_else(|| RegistryError::NotFound(id.to_owned()))?;
        let _ = state.wait_for(|state| state.is_terminal()).await;
        self.status(id)
    }
}

/// Applies a transition and publishes the new state. Returns whether the transition happened.
fn transition(jobs: &Jobs, id: &str, next: JobState, error: Option<String>) -> bool {
    let mut jobs = jobs.write();
    let Some(entry) = jobs.get_mut(id) else {
        return false;
    };
    let moved = entry.status.transition(next, error);
    if moved {
        entry.state.send_replace(next);
    }
    moved
}

fn progress_recorder(jobs: Jobs, id: String) -> ProgressCallback {
    Arc::new(move |progress: &ChunkProgress| {
        if let Some(entry) = jobs.write().get_mut(&id) {
            let counters = &mut entry.status.progress;
            counters.chunks_completed += 1;
            counters.events_written += progress.report.events as u64;
            if progress.checkpoint.is_some() {
                counters.last_processed_block = progress.checkpoint;
            }
        }
    })
}

async fn run_job(
    jobs: Jobs,
    id: String,
    job: ValidatedJob,
    connector: Arc<dyn Connector>,
    token: CancellationToken,
) {
    if !transition(&jobs, &id, JobState::Running, None) {
        debug!(job_id = id.as_str(), "job cancelled before it started");
        return;
    }
    info!(job_id = id.as_str(), rpc_url = job.rpc_url.as_str(), "job running");

    let result = async {
        let extractor = ExtractorBuilder::from_job(&job)
            .connector(connector)
            .on_progress(progress_recorder(jobs.clone(), id.clone()))
            .connect(&token)
            .await?;
        extractor.run(&token).await
    }
    .await;

    match result {
        Ok(summary) => {
            if transition(&jobs, &id, JobState::Finished, None) {
                info!(
                    job_id = id.as_str(),
                    chunks = summary.chunks,
                    events = summary.events,
                    "job finished"
                );
            }
        }
        Err(ExtractorError::Cancelled) => {
            transition(&jobs, &id, JobState::Cancelled, None);
        }
        Err(err) => {
            if transition(&jobs, &id, JobState::Error, Some(err.to_string())) {
                error!(job_id = id.as_str(), error = %err, "job failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{ContractSpec, RetrySpec, StorageSpec},
        test_utils::{ERC20_ABI, MockConnector, MockNode},
    };
    use std::time::Duration;

    fn spec(output_dir: &std::path::Path) -> JobSpec {
        JobSpec {
            rpc_url: "http://localhost:8545".into(),
            start_block: 0,
            contracts: vec![ContractSpec {
                name: "C1".into(),
                address: "0x00000000000000000000000000000000000000c1".into(),
                abi: ERC20_ABI.into(),
                events: vec![],
            }],
            storage: StorageSpec::Csv { output_dir: output_dir.to_path_buf() },
            retry: RetrySpec { attempts: 2, delay_ms: 1 },
            sink_retry: None,
            chunk_size: Some(10),
            workers: Some(2),
            checkpoint_dir: None,
            base_dir: None,
        }
    }

    fn registry(node: Arc<MockNode>) -> JobRegistry {
        JobRegistry::with_connector(Arc::new(MockConnector::new(node)))
    }

    #[tokio::test]
    async fn job_runs_to_finished() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let registry = registry(Arc::new(MockNode::new(95)));

        let id = registry.create(&spec(dir.path()))?;
        let status = registry.wait(&id).await?;

        assert_eq!(status.state, JobState::Finished);
        assert!(status.finished_at.is_some());
        assert_eq!(status.progress.chunks_completed, 10);
        assert_eq!(status.progress.last_processed_block, Some(95));
        Ok(())
    }

    #[tokio::test]
    async fn invalid_spec_registers_nothing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let registry = registry(Arc::new(MockNode::new(95)));
        let mut bad = spec(dir.path());
        bad.contracts.clear();

        let err = registry.create(&bad).unwrap_err();

        assert!(matches!(err, RegistryError::InvalidSpec(ConfigError::NoContracts)));
        assert!(registry.list().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn failing_node_ends_in_error_with_message() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let node = Arc::new(MockNode::new(95));
        node.fail_logs_from(0);
        let registry = registry(node);

        let id = registry.create(&spec(dir.path()))?;
        let status = registry.wait(&id).await?;

        assert_eq!(status.state, JobState::Error);
        assert!(status.error.is_some_and(|message| !message.is_empty()));
        Ok(())
    }

    #[tokio::test]
    async fn cancel_is_immediate_and_idempotent() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let node = Arc::new(MockNode::new(1_000_000));
        node.set_logs_delay(Duration::from_millis(5));
        let registry = registry(node);
        let id = registry.create(&spec(dir.path()))?;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(registry.cancel(&id)?, CancelOutcome::Cancelled);
        let status = registry.status(&id)?;
        assert_eq!(status.state, JobState::Cancelled);
        let finished_at = status.finished_at;
        assert!(finished_at.is_some());

        assert_eq!(registry.cancel(&id)?, CancelOutcome::AlreadyTerminal(JobState::Cancelled));
        let settled = registry.wait(&id).await?;
        assert_eq!(settled.state, JobState::Cancelled);
        assert_eq!(settled.finished_at, finished_at);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_jobs_are_reported() {
        let registry = registry(Arc::new(MockNode::new(1)));
        assert!(matches!(registry.status("nope"), Err(RegistryError::NotFound(_))));
        assert!(matches!(registry.cancel("nope"), Err(RegistryError::NotFound(_))));
        assert!(matches!(registry.evict("nope"), Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn evicts_only_terminal_jobs() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let node = Arc::new(MockNode::new(1_000_000));
        node.set_logs_delay(Duration::from_millis(5));
        let registry = registry(node);
        let id = registry.create(&spec(dir.path()))?;

        assert!(matches!(registry.evict(&id), Err(RegistryError::NotTerminal { .. })));
        registry.cancel(&id)?;
        assert_eq!(registry.evict(&id)?.state, JobState::Cancelled);
        assert!(registry.list().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn job_ids_are_unique() -> anyhow::Result<()> {
        let (first_dir, second_dir) = (tempfile::tempdir()?, tempfile::tempdir()?);
        let registry = registry(Arc::new(MockNode::new(5)));

        let first = registry.create(&spec(first_dir.path()))?;
        let second = registry.create(&spec(second_dir.path()))?;

        assert_ne!(first, second);
        assert_eq!(first.len(), 32);
        assert_eq!(registry.list().len(), 2);
        registry.wait(&first).await?;
        registry.wait(&second).await?;
        Ok(())
    }
}
