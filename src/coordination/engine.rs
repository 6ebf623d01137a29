//! Transfer orchestration: template, search, fill, broadcast, confirm

use super::lock::AccountLocks;
use crate::chain::{ChainClient, RetryPolicy};
use crate::config::{Settings, TokenConfig};
use crate::error::{VanityError, VanityResult};
use crate::tx::{
    BroadcastPath, Broadcaster, ConfirmationHandle, FeeSchedule, FeeTier, FillReport, FillerSpec,
    NonceGapFiller, SearchProgress, SearchResult, SuffixPattern, TemplateBuilder, TxSigner,
    VanitySearcher,
};

use ethers::types::{Address, Bytes, TransactionReceipt, H256};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Called with search progress from the search task
pub type ProgressCallback = Arc<dyn Fn(&SearchProgress) + Send + Sync>;

/// Operator inputs for one transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub receiver: String,
    pub amount: String,
    pub suffix: String,
    pub tier: Option<FeeTier>,
}

/// Where a session currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    Idle,
    BuildingTemplate,
    Searching,
    GapFilling,
    Broadcasting,
    Confirming,
    Done,
    Failed,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferStage::Idle => "idle",
            TransferStage::BuildingTemplate => "building_template",
            TransferStage::Searching => "searching",
            TransferStage::GapFilling => "gap_filling",
            TransferStage::Broadcasting => "broadcasting",
            TransferStage::Confirming => "confirming",
            TransferStage::Done => "done",
            TransferStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Account and network a session is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionIdentity {
    pub address: Address,
    pub chain_id: u64,
}

/// Result of a confirmed transfer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub receipt: TransactionReceipt,
    pub signed_raw_tx: Bytes,
    pub tx_hash: H256,
    pub path: BroadcastPath,
    pub fillers: FillReport,
}

/// Engine tuning, usually derived from `Settings`
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub token: TokenConfig,
    pub fees: FeeSchedule,
    pub retry: RetryPolicy,
    pub progress_interval: u64,
    pub confirmation_timeout: Duration,
    pub expected_chain_id: Option<u64>,
}

impl EngineOptions {
    #[cfg(test)]
    pub fn new(token: TokenConfig) -> Self {
        Self {
            token,
            fees: FeeSchedule::default(),
            retry: RetryPolicy::default(),
            progress_interval: 500,
            confirmation_timeout: Duration::from_secs(300),
            expected_chain_id: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> VanityResult<Self> {
        Ok(Self {
            token: settings.token.clone(),
            fees: FeeSchedule::from_config(&settings.fees)?,
            retry: RetryPolicy::from_config(&settings.retry),
            progress_interval: settings.search.progress_interval,
            confirmation_timeout: Duration::from_secs(settings.confirmation.timeout_secs),
            expected_chain_id: settings.chain.expected_chain_id,
        })
    }
}

/// One operator session against one account
///
/// Owned by whoever started it. Sessions that may touch the same account must
/// share one `AccountLocks`.
pub struct TransferOrchestrator {
    session_id: Uuid,
    signer: Arc<dyn TxSigner>,
    client: Arc<dyn ChainClient>,
    builder: TemplateBuilder,
    searcher: VanitySearcher,
    filler: NonceGapFiller,
    broadcaster: Broadcaster,
    retry: RetryPolicy,
    expected_chain_id: Option<u64>,
    locks: Arc<AccountLocks>,
    identity: Option<SessionIdentity>,
    stage: RwLock<TransferStage>,
}

impl TransferOrchestrator {
    /// Create a session; call `initialize` before anything else
    pub fn new(
        signer: Arc<dyn TxSigner>,
        client: Arc<dyn ChainClient>,
        options: EngineOptions,
        locks: Arc<AccountLocks>,
    ) -> VanityResult<Self> {
        let builder = TemplateBuilder::new(&options.token, options.fees.clone())?;

        Ok(Self {
            session_id: Uuid::new_v4(),
            signer,
            client,
            builder,
            searcher: VanitySearcher::new(options.progress_interval),
            filler: NonceGapFiller::new(options.fees, options.retry.clone()),
            broadcaster: Broadcaster::new(options.retry.clone(), options.confirmation_timeout),
            retry: options.retry,
            expected_chain_id: options.expected_chain_id,
            locks,
            identity: None,
            stage: RwLock::new(TransferStage::Idle),
        })
    }

    /// Resolve the account address and network identity
    pub async fn initialize(&mut self) -> VanityResult<SessionIdentity> {
        let address = self.signer.address();
        let client = self.client.clone();
        let chain_id = self
            .retry
            .run("eth_chainId", || client.chain_id())
            .await?;

        if let Some(expected) = self.expected_chain_id {
            if expected != chain_id {
                return Err(VanityError::ChainMismatch {
                    expected,
                    actual: chain_id,
                });
            }
        }

        info!(
            "Session {} using address {:?} on chain {}",
            self.session_id, address, chain_id
        );

        let identity = SessionIdentity { address, chain_id };
        self.identity = Some(identity);
        Ok(identity)
    }

    /// Resolved identity, or `UninitializedSigner`
    pub fn identity(&self) -> VanityResult<SessionIdentity> {
        self.identity.ok_or(VanityError::UninitializedSigner)
    }

    pub async fn stage(&self) -> TransferStage {
        *self.stage.read().await
    }

    /// Build the template and search for a matching hash
    ///
    /// Nothing is submitted; the result can be shown to the operator first.
    pub async fn generate_transaction(
        &self,
        request: &TransferRequest,
        cancel: &CancellationToken,
        progress: ProgressCallback,
    ) -> VanityResult<SearchResult> {
        let identity = self.identity()?;
        let _guard = self.locks.acquire(identity.address).await;

        let result = self.search_locked(identity, request, cancel, progress).await;
        if result.is_ok() {
            self.set_stage(TransferStage::Idle).await;
        }
        self.track(result).await
    }

    /// Fill skipped nonces, broadcast the found transaction and wait for it
    pub async fn submit_transfer_transaction(
        &self,
        result: &SearchResult,
        cancel: &CancellationToken,
    ) -> VanityResult<TransferReceipt> {
        let identity = self.identity()?;
        self.check_ownership(identity, result)?;
        let _guard = self.locks.acquire(identity.address).await;

        let receipt = self.submit_locked(identity, result, cancel).await;
        self.track(receipt).await
    }

    /// Search, then submit the match, holding the account for both
    pub async fn generate_and_submit(
        &self,
        request: &TransferRequest,
        cancel: &CancellationToken,
        progress: ProgressCallback,
    ) -> VanityResult<TransferReceipt> {
        let identity = self.identity()?;
        let _guard = self.locks.acquire(identity.address).await;

        let receipt = match self.search_locked(identity, request, cancel, progress).await {
            Ok(found) => self.submit_locked(identity, &found, cancel).await,
            Err(e) => Err(e),
        };
        self.track(receipt).await
    }

    async fn search_locked(
        &self,
        identity: SessionIdentity,
        request: &TransferRequest,
        cancel: &CancellationToken,
        progress: ProgressCallback,
    ) -> VanityResult<SearchResult> {
        self.set_stage(TransferStage::BuildingTemplate).await;
        let template = self.builder.build(
            &request.receiver,
            &request.amount,
            request.tier,
            identity.chain_id,
        )?;
        let pattern = SuffixPattern::parse(&request.suffix)?;

        self.set_stage(TransferStage::Searching).await;
        let client = self.client.clone();
        let initial_nonce = self
            .retry
            .run("eth_getTransactionCount", || {
                client.pending_nonce(identity.address)
            })
            .await?;

        let signer = self.signer.clone();
        let searcher = self.searcher.clone();
        let cancel = cancel.clone();
        let chain_id = identity.chain_id;
        let report = move |p: &SearchProgress| {
            debug!(
                "Attempts: {}, nonce: {}, last hash: {:?}",
                p.attempts, p.nonce, p.last_hash
            );
            crate::metrics::record_search_progress(chain_id, p.attempts);
            progress(p);
        };

        let started = Instant::now();
        let found = tokio::task::spawn_blocking(move || {
            searcher.search(
                signer.as_ref(),
                &template,
                &pattern,
                initial_nonce,
                &cancel,
                &report,
            )
        })
        .await
        .map_err(|e| VanityError::Internal(format!("Search task failed: {}", e)))??;

        crate::metrics::record_search_match(
            chain_id,
            found.attempts,
            started.elapsed().as_secs_f64(),
        );
        Ok(found)
    }

    async fn submit_locked(
        &self,
        identity: SessionIdentity,
        result: &SearchResult,
        cancel: &CancellationToken,
    ) -> VanityResult<TransferReceipt> {
        let client = self.client.clone();
        let pending = self
            .retry
            .run("eth_getTransactionCount", || {
                client.pending_nonce(identity.address)
            })
            .await?;

        if pending > result.nonce {
            return self.resume_used_nonce(identity, result, pending, cancel).await;
        }
        if pending != result.initial_nonce {
            warn!(
                "Account nonce moved since the search ({} -> {})",
                result.initial_nonce, pending
            );
        }

        let spec = FillerSpec {
            start_nonce: pending,
            end_nonce_exclusive: result.nonce,
            base_gas_price: result.gas_price,
        };

        let fillers = if spec.is_empty() {
            FillReport::default()
        } else {
            warn!("{} nonces skipped. Submitting fillers now", spec.len());
            self.set_stage(TransferStage::GapFilling).await;
            self.filler
                .fill(
                    self.signer.as_ref(),
                    self.client.as_ref(),
                    identity.chain_id,
                    spec,
                )
                .await?
        };

        self.set_stage(TransferStage::Broadcasting).await;
        info!("Broadcasting target transaction (nonce {})", result.nonce);
        let handle = self
            .broadcaster
            .broadcast(self.client.as_ref(), &result.signed_raw_tx, result.tx_hash)
            .await?;

        self.confirm_target(identity, result, handle, fillers, cancel)
            .await
    }

    /// The matched nonce is already used, most likely by an earlier submission
    /// of this same transaction. Pick that up instead of filling again.
    async fn resume_used_nonce(
        &self,
        identity: SessionIdentity,
        result: &SearchResult,
        pending: u64,
        cancel: &CancellationToken,
    ) -> VanityResult<TransferReceipt> {
        info!(
            "Nonce {} already used (account at {}), looking for {:?}",
            result.nonce, pending, result.tx_hash
        );

        let client = self.client.clone();
        let mined = self
            .retry
            .run("eth_getTransactionReceipt", || {
                client.transaction_receipt(result.tx_hash)
            })
            .await?;
        if let Some(receipt) = mined {
            info!("Transaction {:?} is already included", result.tx_hash);
            self.set_stage(TransferStage::Done).await;
            return Ok(TransferReceipt {
                receipt,
                signed_raw_tx: result.signed_raw_tx.clone(),
                tx_hash: result.tx_hash,
                path: BroadcastPath::Mined,
                fillers: FillReport::default(),
            });
        }

        self.set_stage(TransferStage::Broadcasting).await;
        let handle = match self
            .broadcaster
            .broadcast(self.client.as_ref(), &result.signed_raw_tx, result.tx_hash)
            .await
        {
            Ok(handle) => handle,
            // Another transaction took the nonce
            Err(VanityError::Rejected { code, message }) => {
                warn!("Node rejected the target ({}): {}", code, message);
                return Err(VanityError::StaleResult {
                    matched: result.nonce,
                    pending,
                });
            }
            Err(e) => return Err(e),
        };

        self.confirm_target(identity, result, handle, FillReport::default(), cancel)
            .await
    }

    async fn confirm_target(
        &self,
        identity: SessionIdentity,
        result: &SearchResult,
        handle: ConfirmationHandle,
        fillers: FillReport,
        cancel: &CancellationToken,
    ) -> VanityResult<TransferReceipt> {
        match handle.path {
            BroadcastPath::Submitted => crate::metrics::record_broadcast(identity.chain_id),
            BroadcastPath::AlreadyKnown | BroadcastPath::Mined => {
                crate::metrics::record_already_known(identity.chain_id, "target")
            }
        }

        self.set_stage(TransferStage::Confirming).await;
        let started = Instant::now();
        let receipt = self
            .broadcaster
            .confirm(self.client.as_ref(), &handle, cancel)
            .await?;
        crate::metrics::record_confirmation(identity.chain_id, started.elapsed().as_secs_f64());

        self.set_stage(TransferStage::Done).await;
        Ok(TransferReceipt {
            receipt,
            signed_raw_tx: result.signed_raw_tx.clone(),
            tx_hash: result.tx_hash,
            path: handle.path,
            fillers,
        })
    }

    /// The signed bytes, not the fields stored beside them, decide what gets sent
    fn check_ownership(&self, identity: SessionIdentity, result: &SearchResult) -> VanityResult<()> {
        let signed = self.signer.decode(&result.signed_raw_tx)?;

        if signed.from != identity.address || result.from != identity.address {
            return Err(VanityError::ResultMismatch(format!(
                "signed by {:?}, session account is {:?}",
                signed.from, identity.address
            )));
        }
        if signed.chain_id != Some(identity.chain_id) || result.chain_id != identity.chain_id {
            return Err(VanityError::ResultMismatch(format!(
                "signed for chain {:?}, session is on chain {}",
                signed.chain_id, identity.chain_id
            )));
        }
        if signed.nonce != result.nonce {
            return Err(VanityError::ResultMismatch(format!(
                "signed with nonce {}, result claims nonce {}",
                signed.nonce, result.nonce
            )));
        }
        if signed.hash != result.tx_hash {
            return Err(VanityError::ResultMismatch(format!(
                "signed bytes hash to {:?}, result claims {:?}",
                signed.hash, result.tx_hash
            )));
        }
        if result.nonce < result.initial_nonce {
            return Err(VanityError::ResultMismatch(format!(
                "matched nonce {} is below initial nonce {}",
                result.nonce, result.initial_nonce
            )));
        }
        Ok(())
    }

    async fn set_stage(&self, stage: TransferStage) {
        let mut current = self.stage.write().await;
        if *current != stage {
            debug!("Session {}: {} -> {}", self.session_id, *current, stage);
            *current = stage;
        }
    }

    /// Record a failed sequence before handing the error back
    async fn track<T>(&self, result: VanityResult<T>) -> VanityResult<T> {
        if let Err(e) = &result {
            let stage = self.stage().await;
            error!("Session {} failed while {}: {}", self.session_id, stage, e);
            crate::metrics::record_failure(&stage.to_string());
            self.set_stage(TransferStage::Failed).await;
        }
        result
    }
}
