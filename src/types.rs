use std::{collections::BTreeMap, fmt};

use alloy::primitives::{Address, B256, BlockNumber, Bytes, I256, U256};

/// Record keys written for every event, ahead of the decoded parameters.
pub mod fields {
    pub const EVENT_NAME: &str = "event_name";
    pub const CONTRACT_NAME: &str = "contract_name";
    pub const CONTRACT: &str = "contract";
    pub const BLOCK_NUMBER: &str = "block_number";
    pub const TX_HASH: &str = "tx_hash";
    pub const TIMESTAMP: &str = "timestamp";
    pub const TX_FROM: &str = "tx_from";
    pub const CHAIN_ID: &str = "chain_id";

    /// Name used when the contract or event cannot be identified.
    pub const UNKNOWN: &str = "unknown";
}

/// An inclusive span of blocks scanned with one log query.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRange {
    pub from: BlockNumber,
    pub to: BlockNumber,
}

impl BlockRange {
    /// # Panics
    ///
    /// Panics if `from > to`.
    #[must_use]
    pub const fn new(from: BlockNumber, to: BlockNumber) -> Self {
        assert!(from <= to, "block range start must not exceed its end");
        Self { from, to }
    }

    #[must_use]
    pub const fn block_count(&self) -> u64 {
        self.to - self.from + 1
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.from, self.to)
    }
}

/// A raw log entry as returned by the node, before decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    pub address: Address,
    pub block_number: BlockNumber,
    pub transaction_hash: B256,
    pub log_index: u64,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

impl LogRecord {
    /// The event signature hash, if the log has any topics.
    #[must_use]
    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }
}

impl From<alloy::rpc::types::Log> for LogRecord {
    fn from(log: alloy::rpc::types::Log) -> Self {
        Self {
            address: log.address(),
            block_number: log.block_number.unwrap_or_default(),
            transaction_hash: log.transaction_hash.unwrap_or_default(),
            log_index: log.log_index.unwrap_or_default(),
            topics: log.topics().to_vec(),
            data: log.data().data.clone(),
        }
    }
}

/// A single value inside an [`EventRecord`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    Str(String),
    Uint(U256),
    Int(I256),
    Bool(bool),
    Bytes(Bytes),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(value) => f.write_str(value),
            FieldValue::Uint(value) => write!(f, "{value}"),
            FieldValue::Int(value) => write!(f, "{value}"),
            FieldValue::Bool(value) => write!(f, "{value}"),
            FieldValue::Bytes(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Uint(U256::from(value))
    }
}

impl From<U256> for FieldValue {
    fn from(value: U256) -> Self {
        FieldValue::Uint(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Address> for FieldValue {
    fn from(value: Address) -> Self {
        FieldValue::Str(value.to_checksum(None))
    }
}

impl From<B256> for FieldValue {
    fn from(value: B256) -> Self {
        FieldValue::Str(value.to_string())
    }
}

/// Decoded parameters of one event, keyed by parameter name.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// A decoded and enriched event, ready for a [`Sink`](crate::sink::Sink).
///
/// The key set depends on the event type: the metadata keys in [`fields`] come first
/// conceptually, decoded parameters follow. Keys iterate in sorted order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventRecord {
    values: FieldMap,
}

impl EventRecord {
    /// Starts a record carrying the log's location metadata.
    #[must_use]
    pub fn from_log(log: &LogRecord, contract_name: &str, event_name: &str) -> Self {
        let mut record = Self::default();
        record.insert(fields::EVENT_NAME, event_name);
        record.insert(fields::CONTRACT_NAME, contract_name);
        record.insert(fields::CONTRACT, log.address);
        record.insert(fields::BLOCK_NUMBER, log.block_number);
        record.insert(fields::TX_HASH, log.transaction_hash);
        record
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Adds decoded parameters. Metadata keys already present are not overwritten.
    pub fn extend_decoded(&mut self, decoded: FieldMap) {
        for (key, value) in decoded {
            self.values.entry(key).or_insert(value);
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn str_field(&self, key: &str) -> &str {
        match self.values.get(key) {
            Some(FieldValue::Str(value)) if !value.is_empty() => value,
            _ => fields::UNKNOWN,
        }
    }

    #[must_use]
    pub fn event_name(&self) -> &str {
        self.str_field(fields::EVENT_NAME)
    }

    #[must_use]
    pub fn contract_name(&self) -> &str {
        self.str_field(fields::CONTRACT_NAME)
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
