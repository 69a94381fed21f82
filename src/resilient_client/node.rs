use std::{fmt::Debug, sync::Arc};

use alloy::{
    eips::BlockNumberOrTag,
    network::{Ethereum, TransactionResponse},
    primitives::{Address, B256, BlockNumber},
    providers::{Provider, RootProvider},
    rpc::types::Filter,
    transports::{RpcError, TransportErrorKind},
};
use async_trait::async_trait;
use thiserror::Error;

use crate::types::{BlockRange, LogRecord};

/// Errors returned by a [`NodeClient`].
#[derive(Error, Debug, Clone)]
pub enum NodeError {
    /// The RPC transport or the node itself returned an error.
    #[error("RPC error: {0}")]
    Rpc(Arc<RpcError<TransportErrorKind>>),

    /// The node does not know the requested block.
    #[error("block {0} not found")]
    BlockNotFound(BlockNumber),
}

impl From<RpcError<TransportErrorKind>> for NodeError {
    fn from(error: RpcError<TransportErrorKind>) -> Self {
        NodeError::Rpc(Arc::new(error))
    }
}

/// The subset of a block header the extractor needs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: BlockNumber,
    pub timestamp: u64,
}

/// One `eth_getLogs` request: a block range, a set of emitters and an optional first-topic set.
///
/// An empty `topic0` set means "any event".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogQuery {
    pub range: BlockRange,
    pub addresses: Vec<Address>,
    pub topic0: Vec<B256>,
}

impl LogQuery {
    #[must_use]
    pub fn is_filtered(&self) -> bool {
        !self.topic0.is_empty()
    }

    /// Whether a log satisfies this query, as the node is expected to evaluate it.
    #[must_use]
    pub fn matches(&self, log: &LogRecord) -> bool {
        let in_range = (self.range.from..=self.range.to).contains(&log.block_number);
        let from_address = self.addresses.contains(&log.address);
        let topic_ok =
            !self.is_filtered() || log.topic0().is_some_and(|topic| self.topic0.contains(topic));
        in_range && from_address && topic_ok
    }
}

impl From<&LogQuery> for Filter {
    fn from(query: &LogQuery) -> Self {
        let filter = Filter::new()
            .from_block(query.range.from)
            .to_block(query.range.to)
            .address(query.addresses.clone());
        if query.is_filtered() { filter.event_signature(query.topic0.clone()) } else { filter }
    }
}

/// Raw access to an EVM node. Calls are made once; retrying is the caller's concern.
#[async_trait]
pub trait NodeClient: Send + Sync + Debug {
    async fn latest_block_number(&self) -> Result<BlockNumber, NodeError>;

    /// Fetches the header of `number` without transaction bodies.
    async fn header(&self, number: BlockNumber) -> Result<BlockHeader, NodeError>;

    async fn logs(&self, query: &LogQuery) -> Result<Vec<LogRecord>, NodeError>;

    async fn chain_id(&self) -> Result<u64, NodeError>;

    /// Resolves the sender of a transaction, `None` if the node does not know the transaction.
    async fn transaction_sender(&self, hash: B256) -> Result<Option<Address>, NodeError>;
}

/// Opens [`NodeClient`] connections for an endpoint URL.
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    async fn dial(&self, url: &str) -> Result<Arc<dyn NodeClient>, NodeError>;
}

/// [`NodeClient`] backed by an Alloy [`RootProvider`].
#[derive(Clone, Debug)]
pub struct AlloyNode {
    provider: RootProvider<Ethereum>,
}

impl AlloyNode {
    #[must_use]
    pub fn new(provider: RootProvider<Ethereum>) -> Self {
        Self { provider }
    }

    #[must_use]
    pub fn provider(&self) -> &RootProvider<Ethereum> {
        &self.provider
    }
}

#[async_trait]
impl NodeClient for AlloyNode {
    async fn latest_block_number(&self) -> Result<BlockNumber, NodeError> {
        trace!("eth_blockNumber called");
        Ok(self.provider.get_block_number().await?)
    }

    async fn header(&self, number: BlockNumber) -> Result<BlockHeader, NodeError> {
        trace!(block = number, "eth_getBlockByNumber called");
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .await?
            .ok_or(NodeError::BlockNotFound(number))?;
        Ok(BlockHeader { number, timestamp: block.header.timestamp })
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<LogRecord>, NodeError> {
        trace!(range = %query.range, filtered = query.is_filtered(), "eth_getLogs called");
        let logs = self.provider.get_logs(&Filter::from(query)).await?;
        Ok(logs.into_iter().map(LogRecord::from).collect())
    }

    async fn chain_id(&self) -> Result<u64, NodeError> {
        trace!("eth_chainId called");
        Ok(self.provider.get_chain_id().await?)
    }

    async fn transaction_sender(&self, hash: B256) -> Result<Option<Address>, NodeError> {
        trace!(tx = %hash, "eth_getTransactionByHash called");
        let tx = self.provider.get_transaction_by_hash(hash).await?;
        Ok(tx.map(|tx| tx.from()))
    }
}

/// Dials HTTP or WebSocket endpoints through Alloy.
#[derive(Copy, Clone, Debug, Default)]
pub struct AlloyConnector;

#[async_trait]
impl Connector for AlloyConnector {
    async fn dial(&self, url: &str) -> Result<Arc<dyn NodeClient>, NodeError> {
        debug!(url = url, "connecting to node");
        let provider = RootProvider::<Ethereum>::connect(url).await?;
        Ok(Arc::new(AlloyNode::new(provider)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Bytes, address, b256};

    const TRANSFER: B256 =
        b256!("0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");
    const APPROVAL: B256 =
        b256!("0x8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925");
    const C1: Address = address!("0x00000000000000000000000000000000000000c1");

    fn log(block: u64, topic: B256) -> LogRecord {
        LogRecord {
            address: C1,
            block_number: block,
            transaction_hash: B256::ZERO,
            log_index: 0,
            topics: vec![topic],
            data: Bytes::new(),
        }
    }

    #[test]
    fn filtered_query_only_matches_listed_topics() {
        let query =
            LogQuery { range: BlockRange::new(10, 20), addresses: vec![C1], topic0: vec![TRANSFER] };

        assert!(query.matches(&log(10, TRANSFER)));
        assert!(!query.matches(&log(10, APPROVAL)));
        assert!(!query.matches(&log(21, TRANSFER)));
    }

    #[test]
    fn unfiltered_query_matches_any_topic() {
        let query = LogQuery { range: BlockRange::new(10, 20), addresses: vec![C1], topic0: vec![] };

        assert!(query.matches(&log(15, TRANSFER)));
        assert!(query.matches(&log(15, APPROVAL)));
    }

    #[test]
    fn filter_carries_range_addresses_and_topics() {
        let query =
            LogQuery { range: BlockRange::new(100, 1099), addresses: vec![C1], topic0: vec![TRANSFER] };
        let filter = Filter::from(&query);

        assert_eq!(filter.get_from_block(), Some(100));
        assert_eq!(filter.get_to_block(), Some(1099));
        assert!(filter.address.matches(&C1));
        assert!(filter.topics[0].matches(&TRANSFER));
        assert!(!filter.topics[0].matches(&APPROVAL));
    }
}
