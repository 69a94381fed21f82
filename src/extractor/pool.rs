use std::sync::{Arc, OnceLock};

use alloy::primitives::BlockNumber;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::ExtractorError,
    extractor::processor::{ChunkProcessor, ChunkReport},
    range_scanner::{CheckpointStore, CheckpointTracker, RangeScheduler, chunk_queue},
    retry::{RetryPolicy, retry},
    types::BlockRange,
};

/// Progress of a run, reported once per finished chunk in finishing order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChunkProgress {
    pub report: ChunkReport,
    /// Checkpoint after this chunk, if it moved.
    pub checkpoint: Option<BlockNumber>,
}

pub type ProgressCallback = Arc<dyn Fn(&ChunkProgress) + Send + Sync>;

/// Totals of a run that ended without error.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub chunks: u64,
    pub events: u64,
    /// Highest block known to be fully written, including earlier runs.
    pub checkpoint: Option<BlockNumber>,
}

/// First fatal error of the run. Later errors and cancellations are not recorded.
#[derive(Debug, Default)]
struct FirstError(OnceLock<ExtractorError>);

impl FirstError {
    fn record(&self, error: ExtractorError, scope: &CancellationToken) {
        if error.is_cancelled() {
            return;
        }
        if self.0.set(error.clone()).is_ok() {
            error!(error = %error, "extraction failed, cancelling workers");
        } else {
            debug!(error = %error, "additional error after the first failure");
        }
        scope.cancel();
    }

    fn get(&self) -> Option<ExtractorError> {
        self.0.get().cloned()
    }
}

/// Everything one pool run needs besides the chunk span.
#[derive(Clone)]
pub(crate) struct PoolContext {
    pub processor: Arc<ChunkProcessor>,
    pub checkpoint: Arc<dyn CheckpointStore>,
    pub checkpoint_policy: RetryPolicy,
    pub progress: Option<ProgressCallback>,
    pub workers: usize,
}

/// Runs `scheduler`'s chunks through `workers` concurrent workers.
///
/// Workers share one bounded chunk queue. The first fatal error cancels the scope; workers finish
/// the call they are in and exit, and that error is the result of the run. Completed chunks are
/// reported to one finisher task that advances the checkpoint over the contiguous prefix.
pub(crate) async fn run_pool(
    ctx: PoolContext,
    scheduler: RangeScheduler,
    start: BlockNumber,
    previous_checkpoint: Option<BlockNumber>,
    token: &CancellationToken,
) -> Result<RunSummary, ExtractorError> {
    let scope = token.child_token();
    let first_error = Arc::new(FirstError::default());
    let (queue_tx, queue_rx) = chunk_queue(ctx.workers);
    let queue_rx = Arc::new(Mutex::new(queue_rx));
    let (report_tx, report_rx) = mpsc::unbounded_channel();

    let producer = tokio::spawn(scheduler.run(queue_tx, scope.clone()));

    let finisher = tokio::spawn(finish_chunks(
        report_rx,
        CheckpointTracker::new(start),
        previous_checkpoint,
        ctx.clone(),
        first_error.clone(),
        scope.clone(),
        token.clone(),
    ));

    let mut workers = JoinSet::new();
    for worker_id in 0..ctx.workers.max(1) {
        workers.spawn(worker(
            worker_id,
            ctx.processor.clone(),
            queue_rx.clone(),
            report_tx.clone(),
            first_error.clone(),
            scope.clone(),
        ));
    }
    drop(report_tx);

    while let Some(joined) = workers.join_next().await {
        if let Err(err) = joined {
            first_error.record(err.into(), &scope);
        }
    }
    // Workers are gone; unblock the producer if it is still waiting for queue space.
    drop(queue_rx);
    let scheduled = producer.await.unwrap_or_else(|err| {
        first_error.record(err.into(), &scope);
        0
    });
    let summary = match finisher.await {
        Ok(summary) => summary,
        Err(err) => {
            first_error.record(err.into(), &scope);
            RunSummary::default()
        }
    };

    if let Some(err) = first_error.get() {
        return Err(err);
    }
    if token.is_cancelled() {
        return Err(ExtractorError::Cancelled);
    }
    debug!(scheduled = scheduled, chunks = summary.chunks, "all chunks processed");
    Ok(summary)
}

async fn worker(
    worker_id: usize,
    processor: Arc<ChunkProcessor>,
    queue: Arc<Mutex<mpsc::Receiver<BlockRange>>>,
    reports: mpsc::UnboundedSender<ChunkReport>,
    first_error: Arc<FirstError>,
    scope: CancellationToken,
) {
    loop {
        let next = {
            let mut queue = queue.lock().await;
            tokio::select! {
                biased;

                () = scope.cancelled() => None,
                range = queue.recv() => range,
            }
        };
        let Some(range) = next else {
            break;
        };
        if scope.is_cancelled() {
            break;
        }

        match processor.process(range, &scope).await {
            Ok(report) => {
                info!(
                    worker = worker_id,
                    from = report.range.from,
                    to = report.range.to,
                    events = report.events,
                    elapsed_ms = report.elapsed.as_millis(),
                    "chunk processed"
                );
                if reports.send(report).is_err() {
                    break;
                }
            }
            Err(err) => {
                first_error.record(err, &scope);
                break;
            }
        }
    }
    trace!(worker = worker_id, "worker exiting");
}

async fn finish_chunks(
    mut reports: mpsc::UnboundedReceiver<ChunkReport>,
    mut tracker: CheckpointTracker,
    previous_checkpoint: Option<BlockNumber>,
    ctx: PoolContext,
    first_error: Arc<FirstError>,
    scope: CancellationToken,
    token: CancellationToken,
) -> RunSummary {
    let mut summary = RunSummary { checkpoint: previous_checkpoint, ..RunSummary::default() };

    while let Some(report) = reports.recv().await {
        summary.chunks += 1;
        summary.events += report.events as u64;

        let mut checkpoint = None;
        if let Some(block) = tracker.complete(report.range) {
            let store = &ctx.checkpoint;
            match retry(&ctx.checkpoint_policy, &token, "checkpoint save", || store.save(block))
                .await
            {
                Ok(()) => {
                    trace!(block = block, "checkpoint advanced");
                    summary.checkpoint = Some(block);
                    checkpoint = Some(block);
                }
                Err(err) => first_error.record(err.into(), &scope),
            }
        }

        if let Some(progress) = &ctx.progress {
            progress(&ChunkProgress { report, checkpoint });
        }
    }

    if tracker.pending() > 0 {
        debug!(pending = tracker.pending(), "chunks completed past an unfinished chunk");
    }
    summary
}
