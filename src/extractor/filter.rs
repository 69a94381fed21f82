use std::collections::{BTreeSet, HashMap, HashSet};

use alloy::primitives::{Address, B256};

use crate::{
    extractor::contracts::ContractSet, resilient_client::LogQuery, types::BlockRange,
    types::LogRecord,
};

/// Splits tracked contracts into one filtered and one unfiltered log query per chunk.
///
/// Contracts with an event allow-list share a single query restricted to the union of their
/// selectors; every other contract is queried for all its events. A filtered contract whose
/// allow-list resolves to no selector at all is moved to the unfiltered side.
#[derive(Debug, Clone, Default)]
pub struct QueryPlan {
    filtered_addresses: Vec<Address>,
    filtered_topics: Vec<B256>,
    unfiltered_addresses: Vec<Address>,
    allowed: HashMap<Address, HashSet<B256>>,
}

impl QueryPlan {
    #[must_use]
    pub fn new(contracts: &ContractSet) -> Self {
        let mut filtered = BTreeSet::new();
        let mut unfiltered = BTreeSet::new();
        let mut topics = BTreeSet::new();
        let mut allowed = HashMap::new();

        for contract in contracts.iter() {
            if !contract.is_filtered() {
                unfiltered.insert(contract.address);
                continue;
            }
            let selectors = contract.allowed_selectors();
            if selectors.is_empty() {
                warn!(
                    contract = contract.name.as_str(),
                    "no configured event resolved, fetching all events"
                );
                unfiltered.insert(contract.address);
                continue;
            }
            filtered.insert(contract.address);
            topics.extend(selectors.iter().copied());
            allowed.insert(contract.address, selectors.into_iter().collect());
        }

        Self {
            filtered_addresses: filtered.into_iter().collect(),
            filtered_topics: topics.into_iter().collect(),
            unfiltered_addresses: unfiltered.into_iter().collect(),
            allowed,
        }
    }

    /// The queries covering `range`: at most one filtered and one unfiltered.
    #[must_use]
    pub fn queries(&self, range: BlockRange) -> Vec<LogQuery> {
        let mut queries = Vec::with_capacity(2);
        if !self.filtered_addresses.is_empty() {
            queries.push(LogQuery {
                range,
                addresses: self.filtered_addresses.clone(),
                topic0: self.filtered_topics.clone(),
            });
        }
        if !self.unfiltered_addresses.is_empty() {
            queries.push(LogQuery {
                range,
                addresses: self.unfiltered_addresses.clone(),
                topic0: Vec::new(),
            });
        }
        queries
    }

    /// Whether a fetched log belongs to the extraction.
    ///
    /// The filtered query matches the union of all allow-lists, so a log is checked against the
    /// allow-list of its own contract here.
    #[must_use]
    pub fn accepts(&self, log: &LogRecord) -> bool {
        match self.allowed.get(&log.address) {
            Some(selectors) => log.topic0().is_some_and(|topic| selectors.contains(topic)),
            None => self.unfiltered_addresses.binary_search(&log.address).is_ok(),
        }
    }

    #[must_use]
    pub fn filtered_addresses(&self) -> &[Address] {
        &self.filtered_addresses
    }

    #[must_use]
    pub fn filtered_topics(&self) -> &[B256] {
        &self.filtered_topics
    }

    #[must_use]
    pub fn unfiltered_addresses(&self) -> &[Address] {
        &self.unfiltered_addresses
    }
}
