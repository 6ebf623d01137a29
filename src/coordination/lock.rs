//! Per-account mutual exclusion
//!
//! Nonces are account-global, so two searches or submissions against the same
//! account would race for the same nonces. Sessions that share an
//! `AccountLocks` run one sequence per account at a time.

use dashmap::DashMap;
use ethers::types::Address;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Registry of per-account locks
#[derive(Debug, Default)]
pub struct AccountLocks {
    locks: DashMap<Address, Arc<Mutex<()>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other sequence holds `address`, then hold it
    pub async fn acquire(&self, address: Address) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(address)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        match lock.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                debug!(
                    "Account {:?} busy, waiting for the active sequence to finish",
                    address
                );
                lock.lock_owned().await
            }
        }
    }

    /// Whether a sequence currently holds `address`
    #[cfg(test)]
    pub fn is_locked(&self, address: Address) -> bool {
        self.locks
            .get(&address)
            .map(|lock| {
                let busy = lock.try_lock().is_err();
                busy
            })
            .unwrap_or(false)
    }
}
