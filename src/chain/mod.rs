//! Chain module - the RPC surface the engine depends on
//!
//! This module provides:
//! - The `ChainClient` trait the engine is written against
//! - An HTTP JSON-RPC implementation with multi-URL failover
//! - Bounded retry with backoff for transient network failures

pub mod provider;
pub mod retry;

pub use provider::RpcChainClient;
pub use retry::RetryPolicy;

use crate::error::VanityResult;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, TransactionReceipt, H256};

/// How a node answered a raw transaction submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Fresh submission accepted into the pool
    Accepted(H256),
    /// The node already holds this exact signed transaction
    AlreadyKnown,
}

/// Read and write access to one chain
///
/// Implementations classify node responses: a resubmission of an already
/// pooled transaction is `Ok(SubmitOutcome::AlreadyKnown)`, never an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Network chain id
    async fn chain_id(&self) -> VanityResult<u64>;

    /// Transaction count of `address` including pending transactions
    async fn pending_nonce(&self, address: Address) -> VanityResult<u64>;

    /// Submit signed transaction bytes
    async fn send_raw_transaction(&self, raw: Bytes) -> VanityResult<SubmitOutcome>;

    /// Receipt of `hash` if it is already included
    async fn transaction_receipt(&self, hash: H256) -> VanityResult<Option<TransactionReceipt>>;

    /// Suspend until `hash` is included, then return its receipt
    async fn wait_for_receipt(&self, hash: H256) -> VanityResult<TransactionReceipt>;
}
