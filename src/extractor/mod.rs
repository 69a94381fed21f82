//! The extraction engine.
//!
//! An [`Extractor`] scans `[start, latest]` in fixed-width chunks with a pool of workers. Each
//! worker fetches a chunk's logs with at most two queries, decodes them against the tracked
//! contracts' ABIs, enriches them with block and transaction metadata, and writes them to a
//! [`Sink`]. A checkpoint records the highest block below which every chunk has been written, so a
//! later run resumes from there.
//!
//! ```rust,no_run
//! use event_extractor::{ExtractorBuilder, JobSpec};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let job = JobSpec::load("job.json")?.validate()?;
//! let token = CancellationToken::new();
//! let extractor = ExtractorBuilder::from_job(&job).connect(&token).await?;
//! let summary = extractor.run(&token).await?;
//! println!("{} events in {} chunks", summary.events, summary.chunks);
//! # Ok(()) }
//! ```

mod contracts;
mod decoder;
mod enrich;
mod filter;
mod pool;
mod processor;

pub use contracts::{ContractSet, TrackedContract};
pub use decoder::{AbiDecoder, DecodeError, EventDecoder};
pub use enrich::EnrichmentCache;
pub use filter::QueryPlan;
pub use pool::{ChunkProgress, ProgressCallback, RunSummary};
pub use processor::{ChunkProcessor, ChunkReport};

use std::{path::PathBuf, sync::Arc};

use alloy::primitives::BlockNumber;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{DEFAULT_CHUNK_SIZE, ValidatedJob, default_workers},
    error::ExtractorError,
    range_scanner::{
        CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, RangeScheduler,
        effective_start,
    },
    resilient_client::{AlloyConnector, Connector, ResilientClient, ResilientClientBuilder},
    retry::{RetryPolicy, retry},
    sink::{CsvSink, RetrySink, Sink, SinkError},
    types::EventRecord,
};

use pool::{PoolContext, run_pool};

/// A configured extraction run over a set of contracts.
pub struct Extractor {
    client: ResilientClient,
    contracts: Arc<ContractSet>,
    sink: Arc<dyn Sink>,
    checkpoint: Arc<dyn CheckpointStore>,
    start_block: BlockNumber,
    chunk_size: u64,
    workers: usize,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("contracts", &self.contracts.len())
            .field("start_block", &self.start_block)
            .field("chunk_size", &self.chunk_size)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl Extractor {
    #[must_use]
    pub fn contracts(&self) -> &ContractSet {
        &self.contracts
    }

    #[must_use]
    pub fn client(&self) -> &ResilientClient {
        &self.client
    }

    /// Scans from the resume point to the chain head as seen at start.
    ///
    /// Returns once every chunk was written, or with the first fatal error after the workers
    /// have drained.
    ///
    /// # Errors
    ///
    /// * [`ExtractorError::Cancelled`] when `token` fires.
    /// * The first node, sink or checkpoint error that outlived its retries.
    pub async fn run(&self, token: &CancellationToken) -> Result<RunSummary, ExtractorError> {
        let checkpoint = {
            let store = &self.checkpoint;
            retry(self.client.policy(), token, "checkpoint load", || store.load()).await?
        };
        let start = effective_start(self.start_block, checkpoint);
        let latest = self.client.latest_block_number(token).await?;

        let scheduler = RangeScheduler::new(start, latest, self.chunk_size);
        if scheduler.total_chunks() == 0 {
            info!(start = start, latest = latest, "nothing to scan");
            return Ok(RunSummary { checkpoint, ..RunSummary::default() });
        }

        info!(
            from = start,
            latest = latest,
            chunk_size = self.chunk_size,
            workers = self.workers,
            chunks = scheduler.total_chunks(),
            "starting extraction"
        );

        let ctx = PoolContext {
            processor: Arc::new(ChunkProcessor::new(
                self.client.clone(),
                self.contracts.clone(),
                self.sink.clone(),
            )),
            checkpoint: self.checkpoint.clone(),
            checkpoint_policy: *self.client.policy(),
            progress: self.progress.clone(),
            workers: self.workers,
        };
        let summary = run_pool(ctx, scheduler, start, checkpoint, token).await?;

        info!(
            chunks = summary.chunks,
            events = summary.events,
            checkpoint = summary.checkpoint.unwrap_or_default(),
            "extraction finished"
        );
        Ok(summary)
    }
}

enum SinkChoice {
    Csv { output_dir: PathBuf, policy: RetryPolicy },
    Custom(Arc<dyn Sink>),
}

enum CheckpointChoice {
    Dir(PathBuf),
    Custom(Arc<dyn CheckpointStore>),
}

/// Builder for an [`Extractor`].
pub struct ExtractorBuilder {
    rpc_url: String,
    connector: Arc<dyn Connector>,
    policy: RetryPolicy,
    contracts: Vec<TrackedContract>,
    sink: Option<SinkChoice>,
    checkpoint: Option<CheckpointChoice>,
    start_block: BlockNumber,
    chunk_size: u64,
    workers: usize,
    progress: Option<ProgressCallback>,
}

impl ExtractorBuilder {
    #[must_use]
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            connector: Arc::new(AlloyConnector),
            policy: RetryPolicy::default(),
            contracts: Vec::new(),
            sink: None,
            checkpoint: None,
            start_block: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: default_workers(),
            progress: None,
        }
    }

    /// Settings of a validated job: CSV storage, file checkpoint, both retry policies.
    #[must_use]
    pub fn from_job(job: &ValidatedJob) -> Self {
        let mut builder = Self::new(job.rpc_url.clone())
            .retry_policy(job.retry)
            .start_block(job.start_block)
            .chunk_size(job.chunk_size)
            .workers(job.workers)
            .checkpoint_dir(job.checkpoint_dir.clone());
        builder.contracts.clone_from(&job.contracts);
        builder.sink = Some(SinkChoice::Csv {
            output_dir: job.output_dir.clone(),
            policy: job.sink_retry,
        });
        builder
    }

    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Retry policy for node calls and checkpoint I/O.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn contract(mut self, contract: TrackedContract) -> Self {
        self.contracts.push(contract);
        self
    }

    /// Writes to `sink` as is. Wrap it in a [`RetrySink`] for retries.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = Some(SinkChoice::Custom(sink));
        self
    }

    /// Writes CSV files to `output_dir`, retrying writes under `policy`.
    #[must_use]
    pub fn csv_output(mut self, output_dir: impl Into<PathBuf>, policy: RetryPolicy) -> Self {
        self.sink = Some(SinkChoice::Csv { output_dir: output_dir.into(), policy });
        self
    }

    #[must_use]
    pub fn checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoint = Some(CheckpointChoice::Custom(store));
        self
    }

    /// Keeps the checkpoint in `dir`, in a file named after the endpoint and contract set.
    #[must_use]
    pub fn checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint = Some(CheckpointChoice::Dir(dir.into()));
        self
    }

    #[must_use]
    pub fn start_block(mut self, block: BlockNumber) -> Self {
        self.start_block = block;
        self
    }

    /// Blocks per chunk. Zero is treated as one.
    #[must_use]
    pub fn chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Number of concurrent workers, host parallelism by default. Zero is treated as one.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Called by the finisher after each completed chunk.
    #[must_use]
    pub fn on_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Dials the node and prepares sink and checkpoint.
    ///
    /// Without a configured sink, records are discarded after decoding; without a checkpoint
    /// configuration, progress is kept in memory only.
    ///
    /// # Errors
    ///
    /// Dial failures after retries, sink setup failures, or [`ExtractorError::Cancelled`].
    pub async fn connect(self, token: &CancellationToken) -> Result<Extractor, ExtractorError> {
        let client = ResilientClientBuilder::new(self.rpc_url.clone())
            .connector(self.connector.clone())
            .policy(self.policy)
            .connect(token)
            .await?;
        self.build(client).await
    }

    /// Uses an already connected client.
    ///
    /// # Errors
    ///
    /// Sink setup failures.
    pub async fn build(self, client: ResilientClient) -> Result<Extractor, ExtractorError> {
        let contracts = Arc::new(ContractSet::new(self.contracts));

        let sink: Arc<dyn Sink> = match self.sink {
            Some(SinkChoice::Custom(sink)) => sink,
            Some(SinkChoice::Csv { output_dir, policy }) => {
                let csv = CsvSink::new(output_dir).await?;
                Arc::new(RetrySink::new(csv, policy))
            }
            None => Arc::new(DiscardSink),
        };

        let checkpoint: Arc<dyn CheckpointStore> = match self.checkpoint {
            Some(CheckpointChoice::Custom(store)) => store,
            Some(CheckpointChoice::Dir(dir)) => {
                Arc::new(FileCheckpointStore::for_scope(&dir, &self.rpc_url, &contracts.addresses()))
            }
            None => Arc::new(MemoryCheckpointStore::default()),
        };

        Ok(Extractor {
            client,
            contracts,
            sink,
            checkpoint,
            start_block: self.start_block,
            chunk_size: self.chunk_size,
            workers: self.workers,
            progress: self.progress,
        })
    }
}

#[derive(Debug)]
struct DiscardSink;

#[async_trait]
impl Sink for DiscardSink {
    async fn write(&self, _record: &EventRecord, _token: &CancellationToken) -> Result<(), SinkError> {
        Ok(())
    }
}
