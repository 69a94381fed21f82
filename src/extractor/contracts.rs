use std::{collections::HashMap, sync::Arc};

use alloy::primitives::{Address, B256};

use crate::extractor::decoder::EventDecoder;

/// A contract whose events are extracted.
#[derive(Debug, Clone)]
pub struct TrackedContract {
    pub name: String,
    pub address: Address,
    /// Event names to keep. Empty means every event the contract emits.
    pub events: Vec<String>,
    pub decoder: Arc<dyn EventDecoder>,
}

impl TrackedContract {
    #[must_use]
    pub fn new(name: impl Into<String>, address: Address, decoder: Arc<dyn EventDecoder>) -> Self {
        Self { name: name.into(), address, events: Vec::new(), decoder }
    }

    /// Restricts extraction to the named events.
    #[must_use]
    pub fn with_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events = events.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn is_filtered(&self) -> bool {
        !self.events.is_empty()
    }

    /// Signature hashes of the allow-listed events. Names the decoder does not know are logged
    /// and left out.
    #[must_use]
    pub fn allowed_selectors(&self) -> Vec<B256> {
        self.events
            .iter()
            .filter_map(|event| {
                let selector = self.decoder.event_selector(event);
                if selector.is_none() {
                    warn!(
                        contract = self.name.as_str(),
                        event = event.as_str(),
                        "event not found in contract ABI"
                    );
                }
                selector
            })
            .collect()
    }
}

/// Tracked contracts indexed by address.
#[derive(Debug, Clone, Default)]
pub struct ContractSet {
    contracts: Vec<TrackedContract>,
    by_address: HashMap<Address, usize>,
}

impl ContractSet {
    /// Builds the set. A repeated address keeps its first definition.
    #[must_use]
    pub fn new(contracts: Vec<TrackedContract>) -> Self {
        let mut set = Self::default();
        for contract in contracts {
            if set.by_address.contains_key(&contract.address) {
                warn!(
                    contract = contract.name.as_str(),
                    address = %contract.address,
                    "duplicate contract address ignored"
                );
                continue;
            }
            set.by_address.insert(contract.address, set.contracts.len());
            set.contracts.push(contract);
        }
        set
    }

    #[must_use]
    pub fn get(&self, address: &Address) -> Option<&TrackedContract> {
        self.by_address.get(address).map(|&index| &self.contracts[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedContract> {
        self.contracts.iter()
    }

    #[must_use]
    pub fn addresses(&self) -> Vec<Address> {
        self.contracts.iter().map(|contract| contract.address).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

impl FromIterator<TrackedContract> for ContractSet {
    fn from_iter<I: IntoIterator<Item = TrackedContract>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
