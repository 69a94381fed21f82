//! Chunking of the block span, the bounded chunk queue, and the resume checkpoint.

mod checkpoint;
mod chunks;
mod scheduler;

pub use checkpoint::{
    CheckpointError, CheckpointStore, CheckpointTracker, FileCheckpointStore,
    MemoryCheckpointStore, checkpoint_key,
};
pub use chunks::ChunkIterator;
pub use scheduler::{QUEUE_SLOTS_PER_WORKER, RangeScheduler, chunk_queue};

use alloy::primitives::BlockNumber;

/// First block to scan: the configured start, or the block after the checkpoint if that is later.
#[must_use]
pub fn effective_start(configured: BlockNumber, checkpoint: Option<BlockNumber>) -> BlockNumber {
    match checkpoint {
        Some(last) => configured.max(last.saturating_add(1)),
        None => configured,
    }
}
