use std::sync::Arc;

use alloy::primitives::{Address, B256, BlockNumber, Bytes, U256, b256};

use crate::{
    extractor::{AbiDecoder, EventDecoder},
    types::LogRecord,
};

/// ABI with the two ERC-20 events.
pub const ERC20_ABI: &str = r#"[
  {
    "type": "event",
    "name": "Transfer",
    "anonymous": false,
    "inputs": [
      { "name": "from", "type": "address", "indexed": true },
      { "name": "to", "type": "address", "indexed": true },
      { "name": "value", "type": "uint256", "indexed": false }
    ]
  },
  {
    "type": "event",
    "name": "Approval",
    "anonymous": false,
    "inputs": [
      { "name": "owner", "type": "address", "indexed": true },
      { "name": "spender", "type": "address", "indexed": true },
      { "name": "value", "type": "uint256", "indexed": false }
    ]
  }
]"#;

/// `keccak256("Transfer(address,address,uint256)")`
pub const TRANSFER_TOPIC: B256 =
    b256!("0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

/// `keccak256("Approval(address,address,uint256)")`
pub const APPROVAL_TOPIC: B256 =
    b256!("0x8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925");

pub const TRANSFER_FROM: Address = Address::repeat_byte(0xaa);
pub const TRANSFER_TO: Address = Address::repeat_byte(0xbb);

#[must_use]
pub fn address_topic(address: Address) -> B256 {
    address.into_word()
}

/// # Panics
///
/// Never; [`ERC20_ABI`] is valid.
#[must_use]
pub fn erc20_decoder() -> Arc<dyn EventDecoder> {
    Arc::new(AbiDecoder::from_json(ERC20_ABI).expect("ERC20 ABI parses"))
}

/// Transaction hash the mock chain uses for the log at `(block, log_index)`.
#[must_use]
pub fn tx_hash(block: BlockNumber, log_index: u64) -> B256 {
    B256::from((U256::from(block) << 32_usize | U256::from(log_index)).to_be_bytes::<32>())
}

/// A well-formed `Transfer` log emitted by `address`. The value equals `block * 1000 + log_index`.
#[must_use]
pub fn transfer_log(address: Address, block: BlockNumber, log_index: u64) -> LogRecord {
    let value = U256::from(block * 1_000 + log_index);
    LogRecord {
        address,
        block_number: block,
        transaction_hash: tx_hash(block, log_index),
        log_index,
        topics: vec![TRANSFER_TOPIC, address_topic(TRANSFER_FROM), address_topic(TRANSFER_TO)],
        data: Bytes::from(value.to_be_bytes::<32>().to_vec()),
    }
}
