//! Mocks and fixtures for exercising the extractor without a live node.

mod erc20;
#[macro_use]
pub mod macros;
mod mock;
mod sink;

pub use erc20::{
    APPROVAL_TOPIC, ERC20_ABI, TRANSFER_FROM, TRANSFER_TO, TRANSFER_TOPIC, address_topic,
    erc20_decoder, transfer_log, tx_hash,
};
pub use macros::read_csv;
pub use mock::{GENESIS_TIMESTAMP, MockConnector, MockNode};
pub use sink::MemorySink;
