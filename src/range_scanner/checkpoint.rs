use std::{
    collections::BTreeMap,
    fmt::Debug,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use alloy::{
    hex,
    primitives::{Address, BlockNumber, keccak256},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::types::BlockRange;

#[derive(Error, Debug, Clone)]
pub enum CheckpointError {
    #[error("checkpoint I/O error at {path}: {source}")]
    Io { path: PathBuf, source: Arc<io::Error> },

    #[error("checkpoint at {path} is unreadable: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

impl CheckpointError {
    fn io(path: &Path, source: io::Error) -> Self {
        CheckpointError::Io { path: path.to_path_buf(), source: Arc::new(source) }
    }
}

/// Durable record of the highest block whose records have all been written.
///
/// Saves are monotone: a value at or below the stored one is ignored.
#[async_trait]
pub trait CheckpointStore: Send + Sync + Debug {
    /// The last fully processed block, `None` when nothing was processed yet.
    async fn load(&self) -> Result<Option<BlockNumber>, CheckpointError>;

    async fn save(&self, block: BlockNumber) -> Result<(), CheckpointError>;
}

/// Identifies a checkpoint scope: the endpoint plus the set of tracked contract addresses.
///
/// The key ignores address order and duplicates, so two runs over the same contracts against the
/// same endpoint share one checkpoint whatever their job ids.
#[must_use]
pub fn checkpoint_key(endpoint: &str, addresses: &[Address]) -> String {
    let mut sorted = addresses.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut preimage = endpoint.trim_end_matches('/').as_bytes().to_vec();
    for address in &sorted {
        preimage.extend_from_slice(address.as_slice());
    }
    hex::encode(&keccak256(&preimage)[..8])
}

#[derive(Serialize, Deserialize)]
struct CheckpointFile {
    last_processed_block: BlockNumber,
}

/// JSON file checkpoint, replaced atomically on every save.
#[derive(Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
    last: Mutex<Option<BlockNumber>>,
}

impl FileCheckpointStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), last: Mutex::new(None) }
    }

    /// Store at `dir/checkpoint_<key>.json` for the given scope.
    #[must_use]
    pub fn for_scope(dir: &Path, endpoint: &str, addresses: &[Address]) -> Self {
        let key = checkpoint_key(endpoint, addresses);
        Self::new(dir.join(format!("checkpoint_{key}.json")))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A temp file name unique to this write, next to the checkpoint.
    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(ToOwned::to_owned).unwrap_or_default();
        name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
        self.path.with_file_name(name)
    }

    /// The value currently on disk, without touching the cached one.
    async fn read_stored(&self) -> Result<Option<BlockNumber>, CheckpointError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CheckpointError::io(&self.path, err)),
        };
        let file: CheckpointFile = serde_json::from_str(&raw).map_err(|err| {
            CheckpointError::Corrupt { path: self.path.clone(), reason: err.to_string() }
        })?;
        Ok(Some(file.last_processed_block))
    }

    fn remember(&self, block: Option<BlockNumber>) {
        let mut last = self.last.lock();
        *last = (*last).max(block);
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self) -> Result<Option<BlockNumber>, CheckpointError> {
        let stored = self.read_stored().await?;
        self.remember(stored);
        Ok(stored)
    }

    /// Other stores may share the file, so the stored value is re-read before each write.
    async fn save(&self, block: BlockNumber) -> Result<(), CheckpointError> {
        if self.last.lock().is_some_and(|last| last >= block) {
            trace!(block = block, "checkpoint already at or past block");
            return Ok(());
        }
        let stored = self.read_stored().await?;
        self.remember(stored);
        if let Some(stored) = stored.filter(|stored| *stored >= block) {
            debug!(block = block, stored = stored, "stored checkpoint is ahead");
            return Ok(());
        }

        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(|err| CheckpointError::io(dir, err))?;
        }
        let body = serde_json::to_vec(&CheckpointFile { last_processed_block: block })
            .map_err(|err| CheckpointError::Corrupt {
                path: self.path.clone(),
                reason: err.to_string(),
            })?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, body).await.map_err(|err| CheckpointError::io(&temp, err))?;
        if let Err(err) = tokio::fs::rename(&temp, &self.path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(CheckpointError::io(&self.path, err));
        }

        self.remember(Some(block));
        Ok(())
    }
}

/// In-process checkpoint. Keeps every accepted save for inspection.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    saved: Mutex<Vec<BlockNumber>>,
}

impl MemoryCheckpointStore {
    /// A store that already holds `block`.
    #[must_use]
    pub fn starting_at(block: BlockNumber) -> Self {
        Self { saved: Mutex::new(vec![block]) }
    }

    /// Every value accepted so far, in save order.
    #[must_use]
    pub fn history(&self) -> Vec<BlockNumber> {
        self.saved.lock().clone()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self) -> Result<Option<BlockNumber>, CheckpointError> {
        Ok(self.saved.lock().last().copied())
    }

    async fn save(&self, block: BlockNumber) -> Result<(), CheckpointError> {
        let mut saved = self.saved.lock();
        if saved.last().is_none_or(|&last| last < block) {
            saved.push(block);
        }
        Ok(())
    }
}

/// Turns out-of-order chunk completions into checkpoint advances.
///
/// Chunks are emitted gap-free starting at `start`; the tracker only moves past a chunk once every
/// chunk before it has completed, so the reported block never skips unfinished work.
#[derive(Debug)]
pub struct CheckpointTracker {
    next_expected: BlockNumber,
    completed: BTreeMap<BlockNumber, BlockNumber>,
}

impl CheckpointTracker {
    #[must_use]
    pub fn new(start: BlockNumber) -> Self {
        Self { next_expected: start, completed: BTreeMap::new() }
    }

    /// Records `range` as done and returns the new checkpoint if the contiguous prefix grew.
    pub fn complete(&mut self, range: BlockRange) -> Option<BlockNumber> {
        self.completed.insert(range.from, range.to);

        let mut advanced = None;
        while let Some(to) = self.completed.remove(&self.next_expected) {
            advanced = Some(to);
            self.next_expected = to.saturating_add(1);
        }
        advanced
    }

    /// Completed chunks still waiting for an earlier chunk.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.completed.len()
    }
}
