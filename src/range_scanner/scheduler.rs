use alloy::primitives::BlockNumber;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{range_scanner::ChunkIterator, types::BlockRange};

/// Queue slots per worker. Keeps workers busy without materialising the whole range up front.
pub const QUEUE_SLOTS_PER_WORKER: usize = 2;

/// Creates the bounded chunk queue shared by `workers` consumers.
#[must_use]
pub fn chunk_queue(workers: usize) -> (mpsc::Sender<BlockRange>, mpsc::Receiver<BlockRange>) {
    mpsc::channel(workers.max(1) * QUEUE_SLOTS_PER_WORKER)
}

/// Feeds the chunks of `[start, latest]` into a bounded queue in ascending order.
#[derive(Debug, Clone)]
pub struct RangeScheduler {
    chunks: ChunkIterator,
}

impl RangeScheduler {
    #[must_use]
    pub fn new(start: BlockNumber, latest: BlockNumber, chunk_size: u64) -> Self {
        Self { chunks: ChunkIterator::new(start, latest, chunk_size) }
    }

    /// Number of chunks this scheduler will emit if it runs to completion.
    #[must_use]
    pub fn total_chunks(&self) -> u64 {
        self.chunks.remaining()
    }

    /// Pushes every chunk into `queue`, waiting for free slots, and returns how many were sent.
    ///
    /// Stops early when `token` fires or every receiver is gone. The queue is closed when this
    /// returns, which is how consumers learn that no more work is coming.
    pub async fn run(self, queue: mpsc::Sender<BlockRange>, token: CancellationToken) -> u64 {
        let mut sent = 0;
        for range in self.chunks {
            tokio::select! {
                biased;

                () = token.cancelled() => {
                    debug!(sent = sent, "chunk scheduling cancelled");
                    break;
                }
                res = queue.send(range) => {
                    if res.is_err() {
                        debug!(sent = sent, "chunk queue closed by consumers");
                        break;
                    }
                    sent += 1;
                }
            }
        }
        trace!(sent = sent, "chunk scheduling finished");
        sent
    }
}
