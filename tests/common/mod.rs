#![allow(dead_code)]

use std::{path::Path, sync::Arc, time::Duration};

use alloy::primitives::{Address, address};
use event_extractor::{
    Extractor, ExtractorBuilder, ExtractorError, JobSpec, RunSummary,
    test_utils::{ERC20_ABI, MockConnector, MockNode, transfer_log, tx_hash},
};
use tokio_util::sync::CancellationToken;

pub const C1: Address = address!("0x00000000000000000000000000000000000000c1");
pub const C2: Address = address!("0x00000000000000000000000000000000000000c2");

/// Checksummed sender every mock transaction resolves to.
pub const SENDER: Address = address!("0x5000000000000000000000000000000000000005");

/// A CSV job over [`C1`] with retries fast enough for tests.
pub fn job_json(output_dir: &Path, start_block: u64, chunk_size: u64, workers: usize) -> String {
    serde_json::json!({
        "rpc_url": "http://localhost:8545",
        "start_block": start_block,
        "contracts": [{ "name": "C1", "address": C1.to_string(), "abi": ERC20_ABI }],
        "storage": { "type": "csv", "output_dir": output_dir },
        "retry": { "attempts": 2, "delay_ms": 1 },
        "chunk_size": chunk_size,
        "workers": workers,
    })
    .to_string()
}

pub fn job(output_dir: &Path, start_block: u64, chunk_size: u64, workers: usize) -> JobSpec {
    JobSpec::from_json_str(&job_json(output_dir, start_block, chunk_size, workers))
        .expect("test job parses")
}

/// Adds a `Transfer` from `emitter` at each block, with a known sender.
pub fn seed_transfers(node: &MockNode, emitter: Address, blocks: &[u64]) {
    for &block in blocks {
        node.push_log(transfer_log(emitter, block, 0));
        node.set_sender(tx_hash(block, 0), SENDER);
    }
}

pub async fn extractor(spec: &JobSpec, node: &Arc<MockNode>) -> Result<Extractor, ExtractorError> {
    let job = spec.validate()?;
    ExtractorBuilder::from_job(&job)
        .connector(Arc::new(MockConnector::new(node.clone())))
        .connect(&CancellationToken::new())
        .await
}

pub async fn run(spec: &JobSpec, node: &Arc<MockNode>) -> Result<RunSummary, ExtractorError> {
    extractor(spec, node).await?.run(&CancellationToken::new()).await
}

pub const SHORT_WAIT: Duration = Duration::from_secs(5);
