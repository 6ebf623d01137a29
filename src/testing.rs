//! Test doubles shared by the unit tests

use crate::chain::{ChainClient, SubmitOutcome};
use crate::error::{VanityError, VanityResult};
use crate::tx::{encode_transfer, DecodedTx, SignedAttempt, TransactionTemplate, TxSigner};

use async_trait::async_trait;
use ethers::types::{Address, Bytes, TransactionReceipt, H160, H256, U256, U64};
use ethers::utils::keccak256;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub const OWNER: Address = H160([0x11; 20]);
pub const TOKEN: Address = H160([0x22; 20]);
pub const RECEIVER: Address = H160([0x33; 20]);

/// Transfer template with the default fee policy
pub fn transfer_template() -> TransactionTemplate {
    TransactionTemplate {
        to: TOKEN,
        value: U256::zero(),
        data: encode_transfer(RECEIVER, U256::exp10(18)),
        gas_limit: U256::from(45_000u64),
        gas_price: U256::from(130_000_000u64),
        chain_id: 56,
    }
}

/// Signer whose transfer hash ends in `0` only at `match_nonce`
///
/// Raw bytes are `nonce|gas_price|to|chain_id` so `RecordingClient` can read
/// back what was submitted.
pub struct FakeSigner {
    match_nonce: u64,
    signed: Mutex<Vec<u64>>,
}

impl FakeSigner {
    pub fn new(match_nonce: u64) -> Self {
        Self {
            match_nonce,
            signed: Mutex::new(Vec::new()),
        }
    }

    pub fn signed_nonces(&self) -> Vec<u64> {
        self.signed.lock().unwrap().clone()
    }

    fn hash(&self, raw: &Bytes, nonce: u64, to: Address) -> H256 {
        let mut hash = keccak256(raw.as_ref());
        hash[31] = if to != OWNER && nonce == self.match_nonce {
            0x00
        } else {
            0x11
        };
        H256::from(hash)
    }
}

/// Raw bytes in the `FakeSigner` layout
pub fn fake_raw(nonce: u64, gas_price: U256, to: Address, chain_id: u64) -> Bytes {
    Bytes::from(format!("{}|{}|{:?}|{}", nonce, gas_price, to, chain_id).into_bytes())
}

impl TxSigner for FakeSigner {
    fn address(&self) -> Address {
        OWNER
    }

    fn sign(&self, template: &TransactionTemplate, nonce: u64) -> VanityResult<SignedAttempt> {
        self.signed.lock().unwrap().push(nonce);

        let raw = fake_raw(nonce, template.gas_price, template.to, template.chain_id);
        let hash = self.hash(&raw, nonce, template.to);

        Ok(SignedAttempt { nonce, raw, hash })
    }

    fn decode(&self, raw: &Bytes) -> VanityResult<DecodedTx> {
        let tx = decode_raw(raw)
            .ok_or_else(|| VanityError::Encoding("not FakeSigner bytes".to_string()))?;

        Ok(DecodedTx {
            from: OWNER,
            nonce: tx.nonce,
            chain_id: Some(tx.chain_id),
            hash: self.hash(raw, tx.nonce, tx.to),
        })
    }
}

/// A submission seen by `RecordingClient`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTx {
    pub nonce: u64,
    pub gas_price: U256,
    pub to: Address,
    pub chain_id: u64,
    pub hash: H256,
}

/// In-memory chain that records submissions in order
///
/// The pending nonce moves past every accepted or already-known submission.
/// Resubmitting bytes the pool already holds is answered with `AlreadyKnown`,
/// other bytes below the pending nonce are rejected as "nonce too low".
pub struct RecordingClient {
    chain_id: u64,
    pending_nonce: Mutex<u64>,
    already_known: HashSet<u64>,
    rejected: HashSet<u64>,
    transient_failures: Mutex<HashMap<u64, u32>>,
    pool: Mutex<HashSet<Bytes>>,
    mined: Mutex<HashSet<H256>>,
    never_confirm: AtomicBool,
    sent: Mutex<Vec<SentTx>>,
    receipt_waits: Mutex<Vec<H256>>,
    calls: AtomicUsize,
}

impl RecordingClient {
    pub fn new(chain_id: u64, pending_nonce: u64) -> Self {
        Self {
            chain_id,
            pending_nonce: Mutex::new(pending_nonce),
            already_known: HashSet::new(),
            rejected: HashSet::new(),
            transient_failures: Mutex::new(HashMap::new()),
            pool: Mutex::new(HashSet::new()),
            mined: Mutex::new(HashSet::new()),
            never_confirm: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            receipt_waits: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Node answers "already known" for this nonce
    pub fn with_already_known(mut self, nonce: u64) -> Self {
        self.already_known.insert(nonce);
        self
    }

    /// Node rejects submissions at this nonce
    pub fn with_rejected(mut self, nonce: u64) -> Self {
        self.rejected.insert(nonce);
        self
    }

    /// First `count` submissions at this nonce fail at the transport level
    pub fn with_transient_failures(self, nonce: u64, count: u32) -> Self {
        self.transient_failures.lock().unwrap().insert(nonce, count);
        self
    }

    /// Receipts never arrive
    pub fn never_confirm(self) -> Self {
        self.set_confirming(false);
        self
    }

    /// Switch receipt delivery on or off between calls
    pub fn set_confirming(&self, confirming: bool) {
        self.never_confirm.store(!confirming, Ordering::SeqCst);
    }

    /// `hash` is included; receipt lookups find it
    pub fn mark_mined(&self, hash: H256) {
        self.mined.lock().unwrap().insert(hash);
    }

    pub fn pending(&self) -> u64 {
        *self.pending_nonce.lock().unwrap()
    }

    fn advance_past(&self, nonce: u64) {
        let mut pending = self.pending_nonce.lock().unwrap();
        if nonce >= *pending {
            *pending = nonce + 1;
        }
    }

    pub fn sent(&self) -> Vec<SentTx> {
        self.sent.lock().unwrap().clone()
    }

    pub fn receipt_waits(&self) -> Vec<H256> {
        self.receipt_waits.lock().unwrap().clone()
    }

    /// Total calls of any kind
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn decode_raw(raw: &Bytes) -> Option<SentTx> {
    let text = String::from_utf8(raw.to_vec()).ok()?;
    let mut parts = text.split('|');
    let nonce = parts.next()?.parse().ok()?;
    let gas_price = U256::from_dec_str(parts.next()?).ok()?;
    let to = parts.next()?.parse().ok()?;
    let chain_id = parts.next()?.parse().ok()?;

    Some(SentTx {
        nonce,
        gas_price,
        to,
        chain_id,
        hash: H256::from(keccak256(raw.as_ref())),
    })
}

#[async_trait]
impl ChainClient for RecordingClient {
    async fn chain_id(&self) -> VanityResult<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.chain_id)
    }

    async fn pending_nonce(&self, _address: Address) -> VanityResult<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.pending())
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> VanityResult<SubmitOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let tx = decode_raw(&raw).expect("FakeSigner raw bytes");
        self.sent.lock().unwrap().push(tx.clone());

        if let Some(remaining) = self.transient_failures.lock().unwrap().get_mut(&tx.nonce) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(VanityError::network("eth_sendRawTransaction", "connection reset"));
            }
        }

        if self.rejected.contains(&tx.nonce) {
            return Err(VanityError::Rejected {
                code: -32000,
                message: "insufficient funds for gas * price + value".to_string(),
            });
        }

        if self.already_known.contains(&tx.nonce) || self.pool.lock().unwrap().contains(&raw) {
            self.advance_past(tx.nonce);
            return Ok(SubmitOutcome::AlreadyKnown);
        }

        if tx.nonce < self.pending() {
            return Err(VanityError::Rejected {
                code: -32000,
                message: "nonce too low".to_string(),
            });
        }

        self.pool.lock().unwrap().insert(raw);
        self.advance_past(tx.nonce);
        Ok(SubmitOutcome::Accepted(tx.hash))
    }

    async fn transaction_receipt(&self, hash: H256) -> VanityResult<Option<TransactionReceipt>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .mined
            .lock()
            .unwrap()
            .contains(&hash)
            .then(|| receipt(hash)))
    }

    async fn wait_for_receipt(&self, hash: H256) -> VanityResult<TransactionReceipt> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.receipt_waits.lock().unwrap().push(hash);

        if self.never_confirm.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        Ok(receipt(hash))
    }
}

fn receipt(hash: H256) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: hash,
        block_number: Some(U64::from(1_000u64)),
        status: Some(U64::one()),
        ..Default::default()
    }
}
