//! Target transaction broadcast and confirmation

use crate::chain::{ChainClient, RetryPolicy, SubmitOutcome};
use crate::error::{VanityError, VanityResult};

use ethers::types::{Bytes, TransactionReceipt, H256, U64};
use serde::Serialize;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How the target transaction reached the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastPath {
    Submitted,
    /// The node already held it; only monitored from here on
    AlreadyKnown,
    /// Included before this submission started
    Mined,
}

/// A broadcast transaction awaiting inclusion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationHandle {
    pub hash: H256,
    pub path: BroadcastPath,
}

/// Submits signed bytes and waits for inclusion
#[derive(Debug, Clone)]
pub struct Broadcaster {
    retry: RetryPolicy,
    confirmation_timeout: Duration,
}

impl Broadcaster {
    pub fn new(retry: RetryPolicy, confirmation_timeout: Duration) -> Self {
        Self {
            retry,
            confirmation_timeout,
        }
    }

    /// Submit `raw`; an already-known transaction is monitored instead of failing
    pub async fn broadcast(
        &self,
        client: &dyn ChainClient,
        raw: &Bytes,
        hash: H256,
    ) -> VanityResult<ConfirmationHandle> {
        let outcome = self
            .retry
            .run("eth_sendRawTransaction", || {
                client.send_raw_transaction(raw.clone())
            })
            .await?;

        let path = match outcome {
            SubmitOutcome::Accepted(node_hash) => {
                if node_hash != hash {
                    warn!(
                        "Node reported hash {:?} for transaction {:?}; tracking the local hash",
                        node_hash, hash
                    );
                }
                info!("Target transaction broadcast: {:?}", hash);
                BroadcastPath::Submitted
            }
            SubmitOutcome::AlreadyKnown => {
                warn!(
                    "Transaction {:?} is already known by the node. Monitoring existing transaction",
                    hash
                );
                BroadcastPath::AlreadyKnown
            }
        };

        Ok(ConfirmationHandle { hash, path })
    }

    /// Wait for inclusion, bounded by the confirmation timeout and `cancel`
    pub async fn confirm(
        &self,
        client: &dyn ChainClient,
        handle: &ConfirmationHandle,
        cancel: &CancellationToken,
    ) -> VanityResult<TransactionReceipt> {
        let operation = format!("receipt of {:?}", handle.hash);

        let receipt = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(VanityError::Cancelled { operation });
            }
            result = timeout(self.confirmation_timeout, client.wait_for_receipt(handle.hash)) => {
                match result {
                    Ok(receipt) => receipt?,
                    Err(_) => return Err(VanityError::Timeout { operation }),
                }
            }
        };

        if receipt.status == Some(U64::zero()) {
            warn!(
                "Transaction {:?} was included in block {:?} but reverted",
                handle.hash, receipt.block_number
            );
        } else {
            info!(
                "Transaction {:?} mined in block {:?}",
                handle.hash, receipt.block_number
            );
        }

        Ok(receipt)
    }
}
