use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use alloy::{
    primitives::{Address, B256, BlockNumber},
    transports::TransportErrorKind,
};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    resilient_client::{BlockHeader, Connector, LogQuery, NodeClient, NodeError},
    types::{BlockRange, LogRecord},
};

/// Timestamp of block 0 on the mock chain; every later block adds 12 seconds.
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

fn mock_failure() -> NodeError {
    NodeError::from(TransportErrorKind::custom_str("mock failure"))
}

#[derive(Debug, Default)]
struct MockState {
    latest: BlockNumber,
    chain_id: u64,
    logs: Vec<LogRecord>,
    senders: HashMap<B256, Address>,
    calls: HashMap<String, usize>,
    failures: HashMap<String, usize>,
    header_fetches: HashMap<BlockNumber, usize>,
    header_delay: Duration,
    logs_delay: Duration,
    failing_logs_from: Option<BlockNumber>,
    failing_logs_in: Vec<BlockRange>,
}

/// In-memory [`NodeClient`] with scripted failures and per-method call counters.
///
/// Method labels match the JSON-RPC names: `eth_blockNumber`, `eth_getBlockByNumber`,
/// `eth_getLogs`, `eth_chainId` and `eth_getTransactionByHash`.
#[derive(Debug, Default)]
pub struct MockNode {
    state: Mutex<MockState>,
}

impl MockNode {
    #[must_use]
    pub fn new(latest: BlockNumber) -> Self {
        Self { state: Mutex::new(MockState { latest, chain_id: 1, ..MockState::default() }) }
    }

    pub fn push_log(&self, log: LogRecord) {
        self.state.lock().logs.push(log);
    }

    pub fn set_latest(&self, latest: BlockNumber) {
        self.state.lock().latest = latest;
    }

    pub fn set_sender(&self, tx: B256, sender: Address) {
        self.state.lock().senders.insert(tx, sender);
    }

    /// Makes the next `times` calls of `method` fail.
    pub fn fail_next(&self, method: &'static str, times: usize) {
        self.state.lock().failures.insert(method.to_owned(), times);
    }

    /// Fails every log query reaching `block` or beyond.
    pub fn fail_logs_from(&self, block: BlockNumber) {
        self.state.lock().failing_logs_from = Some(block);
    }

    /// Fails every log query overlapping `range`.
    pub fn fail_logs_in(&self, range: BlockRange) {
        self.state.lock().failing_logs_in.push(range);
    }

    pub fn set_header_delay(&self, delay: Duration) {
        self.state.lock().header_delay = delay;
    }

    pub fn set_logs_delay(&self, delay: Duration) {
        self.state.lock().logs_delay = delay;
    }

    /// Calls made to `method`, failed ones included.
    #[must_use]
    pub fn calls(&self, method: &str) -> usize {
        self.state.lock().calls.get(method).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn header_fetches(&self, block: BlockNumber) -> usize {
        self.state.lock().header_fetches.get(&block).copied().unwrap_or_default()
    }

    /// Counts the call and consumes one scripted failure, if any.
    fn enter(&self, method: &str) -> Result<(), NodeError> {
        let mut state = self.state.lock();
        *state.calls.entry(method.to_owned()).or_default() += 1;
        match state.failures.get_mut(method) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(mock_failure())
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn latest_block_number(&self) -> Result<BlockNumber, NodeError> {
        self.enter("eth_blockNumber")?;
        Ok(self.state.lock().latest)
    }

    async fn header(&self, number: BlockNumber) -> Result<BlockHeader, NodeError> {
        let delay = {
            let mut state = self.state.lock();
            *state.header_fetches.entry(number).or_default() += 1;
            state.header_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.enter("eth_getBlockByNumber")?;
        if number > self.state.lock().latest {
            return Err(NodeError::BlockNotFound(number));
        }
        Ok(BlockHeader { number, timestamp: GENESIS_TIMESTAMP + number * 12 })
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<LogRecord>, NodeError> {
        let delay = self.state.lock().logs_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.enter("eth_getLogs")?;

        let state = self.state.lock();
        let range = query.range;
        let failing = state.failing_logs_from.is_some_and(|block| range.to >= block)
            || state.failing_logs_in.iter().any(|bad| bad.from <= range.to && range.from <= bad.to);
        if failing {
            return Err(mock_failure());
        }
        let mut logs: Vec<_> = state.logs.iter().filter(|log| query.matches(log)).cloned().collect();
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs)
    }

    async fn chain_id(&self) -> Result<u64, NodeError> {
        self.enter("eth_chainId")?;
        Ok(self.state.lock().chain_id)
    }

    async fn transaction_sender(&self, hash: B256) -> Result<Option<Address>, NodeError> {
        self.enter("eth_getTransactionByHash")?;
        Ok(self.state.lock().senders.get(&hash).copied())
    }
}

/// [`Connector`] that hands out one shared [`MockNode`].
#[derive(Debug)]
pub struct MockConnector {
    node: Arc<MockNode>,
    failing_dials: AtomicUsize,
    dials: AtomicUsize,
}

impl MockConnector {
    #[must_use]
    pub fn new(node: Arc<MockNode>) -> Self {
        Self { node, failing_dials: AtomicUsize::new(0), dials: AtomicUsize::new(0) }
    }

    pub fn fail_next_dials(&self, times: usize) {
        self.failing_dials.store(times, Ordering::SeqCst);
    }

    #[must_use]
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn dial(&self, _url: &str) -> Result<Arc<dyn NodeClient>, NodeError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failing_dials
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(mock_failure());
        }
        Ok(self.node.clone())
    }
}
