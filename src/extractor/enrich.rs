use std::{collections::HashMap, sync::Arc};

use alloy::primitives::{Address, B256, BlockNumber};
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::{
    error::ExtractorError,
    resilient_client::ResilientClient,
    types::{EventRecord, LogRecord, fields},
};

/// Shared, best-effort metadata lookups for event records.
///
/// Block timestamps are memoised per block: concurrent lookups of the same block wait for a single
/// header fetch. The chain id is fetched until it is known once. Failures only leave the optional
/// fields out; cancellation is the one outcome passed back to the caller.
#[derive(Debug)]
pub struct EnrichmentCache {
    client: ResilientClient,
    timestamps: Mutex<HashMap<BlockNumber, Arc<OnceCell<u64>>>>,
    chain_id: OnceCell<u64>,
}

impl EnrichmentCache {
    #[must_use]
    pub fn new(client: ResilientClient) -> Self {
        Self { client, timestamps: Mutex::new(HashMap::new()), chain_id: OnceCell::new() }
    }

    /// Timestamp of `block`, `None` if the header could not be fetched.
    ///
    /// # Errors
    ///
    /// Only [`ExtractorError::Cancelled`].
    pub async fn timestamp(
        &self,
        block: BlockNumber,
        token: &CancellationToken,
    ) -> Result<Option<u64>, ExtractorError> {
        let cell = self.timestamps.lock().entry(block).or_default().clone();
        let fetched = cell
            .get_or_try_init(|| async {
                self.client.header(block, token).await.map(|header| header.timestamp)
            })
            .await;
        best_effort(fetched.copied(), "block timestamp")
    }

    /// The chain id, fetched on first use and whenever earlier fetches failed.
    ///
    /// # Errors
    ///
    /// Only [`ExtractorError::Cancelled`].
    pub async fn chain_id(&self, token: &CancellationToken) -> Result<Option<u64>, ExtractorError> {
        let fetched = self.chain_id.get_or_try_init(|| self.client.chain_id(token)).await;
        best_effort(fetched.copied(), "chain id")
    }

    /// Sender of `tx`. Not attempted until the chain id is known.
    ///
    /// # Errors
    ///
    /// Only [`ExtractorError::Cancelled`].
    pub async fn sender(
        &self,
        tx: B256,
        token: &CancellationToken,
    ) -> Result<Option<Address>, ExtractorError> {
        if self.chain_id.get().is_none() {
            return Ok(None);
        }
        let fetched = self.client.transaction_sender(tx, token).await;
        Ok(best_effort(fetched, "transaction sender")?.flatten())
    }

    /// Adds timestamp, chain id and sender to `record` where they can be resolved.
    ///
    /// # Errors
    ///
    /// Only [`ExtractorError::Cancelled`].
    pub async fn enrich(
        &self,
        record: &mut EventRecord,
        log: &LogRecord,
        token: &CancellationToken,
    ) -> Result<(), ExtractorError> {
        if let Some(timestamp) = self.timestamp(log.block_number, token).await? {
            record.insert(fields::TIMESTAMP, timestamp);
        }
        if let Some(chain_id) = self.chain_id(token).await? {
            record.insert(fields::CHAIN_ID, chain_id);
        }
        if let Some(sender) = self.sender(log.transaction_hash, token).await? {
            record.insert(fields::TX_FROM, sender);
        }
        Ok(())
    }

    /// Number of blocks with a timestamp lookup started.
    #[must_use]
    pub fn cached_blocks(&self) -> usize {
        self.timestamps.lock().len()
    }
}

fn best_effort<T>(
    fetched: Result<T, ExtractorError>,
    what: &'static str,
) -> Result<Option<T>, ExtractorError> {
    match fetched {
        Ok(value) => Ok(Some(value)),
        Err(ExtractorError::Cancelled) => Err(ExtractorError::Cancelled),
        Err(err) => {
            debug!(lookup = what, error = %err, "enrichment lookup failed, field left empty");
            Ok(None)
        }
    }
}
