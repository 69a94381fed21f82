mod common;

use std::{sync::Arc, time::Duration};

use event_extractor::{
    ConfigError, JobRegistry, JobSpec, JobState,
    jobs::{CancelOutcome, RegistryError},
    test_utils::{ERC20_ABI, MockConnector, MockNode},
};

use crate::common::{C1, SHORT_WAIT, job, seed_transfers};

fn registry(node: &Arc<MockNode>) -> JobRegistry {
    JobRegistry::with_connector(Arc::new(MockConnector::new(node.clone())))
}

#[tokio::test]
async fn finished_job_reports_progress() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let node = Arc::new(MockNode::new(2_500));
    seed_transfers(&node, C1, &[100, 1_500, 2_400]);
    let registry = registry(&node);

    let id = registry.create(&job(dir.path(), 100, 1_000, 2))?;
    let status = tokio::time::timeout(SHORT_WAIT, registry.wait(&id)).await??;

    assert_eq!(status.state, JobState::Finished);
    assert!(status.error.is_none());
    assert!(status.finished_at.is_some_and(|finished| finished >= status.started_at));
    assert_eq!(status.progress.chunks_completed, 3);
    assert_eq!(status.progress.events_written, 3);
    assert_eq!(status.progress.last_processed_block, Some(2_500));
    Ok(())
}

#[tokio::test]
async fn failed_job_keeps_the_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let node = Arc::new(MockNode::new(2_500));
    node.fail_logs_from(1_000);
    let registry = registry(&node);

    let id = registry.create(&job(dir.path(), 0, 500, 2))?;
    let status = tokio::time::timeout(SHORT_WAIT, registry.wait(&id)).await??;

    assert_eq!(status.state, JobState::Error);
    assert!(status.error.is_some_and(|message| message.contains("mock failure")));
    assert!(status.finished_at.is_some());
    Ok(())
}

#[tokio::test]
async fn cancelling_twice_reports_the_terminal_state() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let node = Arc::new(MockNode::new(5_000_000));
    node.set_logs_delay(Duration::from_millis(2));
    let registry = registry(&node);
    let id = registry.create(&job(dir.path(), 0, 10, 2))?;

    assert_eq!(registry.cancel(&id)?, CancelOutcome::Cancelled);
    let cancelled = registry.status(&id)?;
    assert_eq!(cancelled.state, JobState::Cancelled);
    assert!(cancelled.finished_at.is_some());

    assert_eq!(registry.cancel(&id)?, CancelOutcome::AlreadyTerminal(JobState::Cancelled));
    let settled = tokio::time::timeout(SHORT_WAIT, registry.wait(&id)).await??;
    assert_eq!(settled.state, JobState::Cancelled);
    assert_eq!(settled.finished_at, cancelled.finished_at);
    Ok(())
}

#[tokio::test]
async fn unknown_job_ids_are_not_found() {
    let registry = registry(&Arc::new(MockNode::new(1)));

    assert!(matches!(registry.status("missing"), Err(RegistryError::NotFound(id)) if id == "missing"));
    assert!(matches!(registry.cancel("missing"), Err(RegistryError::NotFound(_))));
    assert!(matches!(registry.wait("missing").await, Err(RegistryError::NotFound(_))));
}

#[tokio::test]
async fn invalid_jobs_are_rejected_up_front() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let registry = registry(&Arc::new(MockNode::new(1)));
    let mut spec = job(dir.path(), 0, 10, 1);
    spec.contracts[0].address = "not-an-address".into();

    let err = registry.create(&spec).unwrap_err();

    assert!(matches!(
        err,
        RegistryError::InvalidSpec(ConfigError::InvalidAddress { .. })
    ));
    assert!(registry.list().is_empty());
    Ok(())
}

#[tokio::test]
async fn job_file_resolves_abi_next_to_it() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("erc20.json"), ERC20_ABI)?;
    let job_file = dir.path().join("job.json");
    std::fs::write(
        &job_file,
        serde_json::json!({
            "rpc_url": "http://localhost:8545",
            "contracts": [{ "name": "C1", "address": C1.to_string(), "abi": "erc20.json", "events": ["Transfer"] }],
            "storage": { "type": "csv", "output_dir": dir.path().join("out") },
            "retry": { "attempts": 2, "delay_ms": 1 }
        })
        .to_string(),
    )?;
    let node = Arc::new(MockNode::new(100));
    seed_transfers(&node, C1, &[42]);
    let registry = registry(&node);

    let id = registry.create(&JobSpec::load(&job_file)?)?;
    let status = tokio::time::timeout(SHORT_WAIT, registry.wait(&id)).await??;

    assert_eq!(status.state, JobState::Finished);
    assert_eq!(status.progress.events_written, 1);
    assert!(dir.path().join("out").join("C1_Transfer.csv").exists());
    Ok(())
}
