//! Nonce gap filling
//!
//! A vanity search usually skips nonces. The chain will not include the
//! winning transaction until every lower nonce is used, so each skipped nonce
//! is consumed by a zero-value transfer to the account itself. Fillers are
//! priced on a rising ladder so a later filler is never underpriced relative
//! to an earlier one still pending.

use super::builder::TransactionTemplate;
use super::gas::FeeSchedule;
use super::signer::TxSigner;
use crate::chain::{ChainClient, RetryPolicy, SubmitOutcome};
use crate::error::{VanityError, VanityResult};

use ethers::types::{H256, U256};
use serde::Serialize;
use tracing::{error, info};

/// Nonce range to fill, consumed once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillerSpec {
    pub start_nonce: u64,
    pub end_nonce_exclusive: u64,
    pub base_gas_price: U256,
}

impl FillerSpec {
    pub fn len(&self) -> u64 {
        self.end_nonce_exclusive.saturating_sub(self.start_nonce)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What happened to each filled nonce
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FillReport {
    /// Fresh submissions: nonce and transaction hash
    pub submitted: Vec<(u64, H256)>,
    /// Nonces whose filler the node already held
    pub already_known: Vec<u64>,
}

/// Submits filler transactions for skipped nonces
#[derive(Debug, Clone)]
pub struct NonceGapFiller {
    fees: FeeSchedule,
    retry: RetryPolicy,
}

impl NonceGapFiller {
    pub fn new(fees: FeeSchedule, retry: RetryPolicy) -> Self {
        Self { fees, retry }
    }

    /// Fill `[start_nonce, end_nonce_exclusive)` one nonce at a time, ascending
    ///
    /// Stops at the first nonce that cannot be filled; later nonces would stay
    /// blocked behind it anyway.
    pub async fn fill(
        &self,
        signer: &dyn TxSigner,
        client: &dyn ChainClient,
        chain_id: u64,
        spec: FillerSpec,
    ) -> VanityResult<FillReport> {
        let owner = signer.address();
        let mut report = FillReport::default();

        if spec.is_empty() {
            return Ok(report);
        }

        info!(
            "Submitting {} nonce fillers for {} to {}",
            spec.len(),
            spec.start_nonce,
            spec.end_nonce_exclusive - 1
        );

        for nonce in spec.start_nonce..spec.end_nonce_exclusive {
            let gas_price = self
                .fees
                .filler_gas_price(spec.base_gas_price, nonce - spec.start_nonce);
            let template = TransactionTemplate::self_transfer(
                owner,
                self.fees.filler_gas_limit(),
                gas_price,
                chain_id,
            );

            let outcome = self
                .submit(signer, client, &template, nonce)
                .await
                .map_err(|e| {
                    error!("Error submitting filler for nonce {}: {}", nonce, e);
                    crate::metrics::record_filler_failed(chain_id);
                    VanityError::GapFillAborted {
                        nonce,
                        source: Box::new(e),
                    }
                })?;

            match outcome {
                SubmitOutcome::Accepted(hash) => {
                    info!("Filler nonce {} submitted at {} wei: {:?}", nonce, gas_price, hash);
                    crate::metrics::record_filler_submitted(chain_id);
                    report.submitted.push((nonce, hash));
                }
                SubmitOutcome::AlreadyKnown => {
                    info!("Filler nonce {} already known, skipping", nonce);
                    crate::metrics::record_already_known(chain_id, "filler");
                    report.already_known.push(nonce);
                }
            }
        }

        info!("Filler submissions complete");
        Ok(report)
    }

    async fn submit(
        &self,
        signer: &dyn TxSigner,
        client: &dyn ChainClient,
        template: &TransactionTemplate,
        nonce: u64,
    ) -> VanityResult<SubmitOutcome> {
        let attempt = signer.sign(template, nonce)?;
        self.retry
            .run("eth_sendRawTransaction", || {
                client.send_raw_transaction(attempt.raw.clone())
            })
            .await
    }
}
