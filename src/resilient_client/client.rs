use std::sync::Arc;

use alloy::primitives::{Address, B256, BlockNumber};
use tokio_util::sync::CancellationToken;

use crate::{
    error::ExtractorError,
    resilient_client::{BlockHeader, Connector, LogQuery, NodeClient},
    retry::{RetryPolicy, retry},
    types::LogRecord,
};

/// Node client wrapper that runs every call under one [`RetryPolicy`].
///
/// All methods take the caller's [`CancellationToken`]; cancellation is honoured between tries,
/// never in the middle of a request.
#[derive(Clone, Debug)]
pub struct ResilientClient {
    pub(crate) node: Arc<dyn NodeClient>,
    pub(crate) policy: RetryPolicy,
}

impl ResilientClient {
    #[must_use]
    pub fn new(node: Arc<dyn NodeClient>, policy: RetryPolicy) -> Self {
        Self { node, policy }
    }

    /// Dials `url` through `connector`, retrying failed connection attempts.
    ///
    /// # Errors
    ///
    /// See [retry errors](#retry-errors).
    pub async fn connect(
        connector: &dyn Connector,
        url: &str,
        policy: RetryPolicy,
        token: &CancellationToken,
    ) -> Result<Self, ExtractorError> {
        let node = retry(&policy, token, "dial", || connector.dial(url)).await?;
        info!(url = url, "connected to node");
        Ok(Self { node, policy })
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Latest block number known to the node.
    ///
    /// # Errors
    ///
    /// See [retry errors](#retry-errors).
    pub async fn latest_block_number(
        &self,
        token: &CancellationToken,
    ) -> Result<BlockNumber, ExtractorError> {
        let node = &self.node;
        Ok(retry(&self.policy, token, "eth_blockNumber", || node.latest_block_number()).await?)
    }

    /// Header of block `number`. Only the header is fetched, never transaction bodies.
    ///
    /// # Errors
    ///
    /// See [retry errors](#retry-errors).
    pub async fn header(
        &self,
        number: BlockNumber,
        token: &CancellationToken,
    ) -> Result<BlockHeader, ExtractorError> {
        let node = &self.node;
        Ok(retry(&self.policy, token, "eth_getBlockByNumber", || node.header(number)).await?)
    }

    /// Logs matching `query`, in the order the node returned them.
    ///
    /// # Errors
    ///
    /// See [retry errors](#retry-errors).
    pub async fn logs(
        &self,
        query: &LogQuery,
        token: &CancellationToken,
    ) -> Result<Vec<LogRecord>, ExtractorError> {
        let node = &self.node;
        let logs = retry(&self.policy, token, "eth_getLogs", || node.logs(query)).await?;
        if !logs.is_empty() {
            debug!(
                range = %query.range,
                filtered = query.is_filtered(),
                log_count = logs.len(),
                "found logs in block range"
            );
        }
        Ok(logs)
    }

    /// # Errors
    ///
    /// See [retry errors](#retry-errors).
    pub async fn chain_id(&self, token: &CancellationToken) -> Result<u64, ExtractorError> {
        let node = &self.node;
        Ok(retry(&self.policy, token, "eth_chainId", || node.chain_id()).await?)
    }

    /// Sender of transaction `hash`, `None` if the node does not know it.
    ///
    /// # Errors
    /// <a name="retry-errors"></a>
    ///
    /// * [`ExtractorError::Cancelled`] if `token` fires before a try succeeds.
    /// * [`ExtractorError::Node`] carrying the last node error once every try failed.
    pub async fn transaction_sender(
        &self,
        hash: B256,
        token: &CancellationToken,
    ) -> Result<Option<Address>, ExtractorError> {
        let node = &self.node;
        Ok(retry(&self.policy, token, "eth_getTransactionByHash", || node.transaction_sender(hash))
            .await?)
    }
}
