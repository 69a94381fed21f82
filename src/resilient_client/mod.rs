//! Retrying access to an EVM node.
//!
//! [`NodeClient`] is the raw capability: each call goes to the node exactly once.
//! [`ResilientClient`] wraps it so that every call (dial, latest height, header, logs, chain id,
//! transaction lookup) runs under the same bounded [`RetryPolicy`](crate::retry::RetryPolicy)
//! and honours the caller's cancellation token between tries.
//!
//! ```rust,no_run
//! use event_extractor::resilient_client::ResilientClientBuilder;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let token = CancellationToken::new();
//! let client = ResilientClientBuilder::new("http://localhost:8545")
//!     .attempts(5)
//!     .delay(Duration::from_millis(500))
//!     .connect(&token)
//!     .await?;
//! let latest = client.latest_block_number(&token).await?;
//! println!("latest block: {latest}");
//! # Ok(()) }
//! ```

mod builder;
mod client;
mod node;

pub use builder::ResilientClientBuilder;
pub use client::ResilientClient;
pub use node::{
    AlloyConnector, AlloyNode, BlockHeader, Connector, LogQuery, NodeClient, NodeError,
};
