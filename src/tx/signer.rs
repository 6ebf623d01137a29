//! Deterministic transaction signing

use super::builder::TransactionTemplate;
use crate::error::{VanityError, VanityResult};

use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, H256};
use ethers::utils::rlp::Rlp;
use sha3::{Digest, Keccak256};

/// One signed candidate transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedAttempt {
    pub nonce: u64,
    pub raw: Bytes,
    pub hash: H256,
}

/// What a signed transaction actually commits to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedTx {
    pub from: Address,
    pub nonce: u64,
    pub chain_id: Option<u64>,
    pub hash: H256,
}

/// Signs templates at a given nonce
///
/// Implementations must be deterministic: the same template and nonce always
/// produce the same bytes and hash.
pub trait TxSigner: Send + Sync {
    /// Address of the signing account
    fn address(&self) -> Address;

    /// Sign `template` at `nonce`
    fn sign(&self, template: &TransactionTemplate, nonce: u64) -> VanityResult<SignedAttempt>;

    /// Read back bytes produced by `sign`
    fn decode(&self, raw: &Bytes) -> VanityResult<DecodedTx> {
        decode_signed(raw)
    }
}

/// Decode RLP signed transaction bytes and recover the signer
pub fn decode_signed(raw: &Bytes) -> VanityResult<DecodedTx> {
    let (tx, signature) = TypedTransaction::decode_signed(&Rlp::new(raw.as_ref()))
        .map_err(|e| VanityError::Encoding(format!("Not a signed transaction: {}", e)))?;

    let from = signature
        .recover(tx.sighash())
        .map_err(|e| VanityError::Encoding(format!("Cannot recover signer: {}", e)))?;
    let nonce = tx
        .nonce()
        .map(|n| n.as_u64())
        .ok_or_else(|| VanityError::Encoding("Signed transaction has no nonce".to_string()))?;

    Ok(DecodedTx {
        from,
        nonce,
        chain_id: tx.chain_id().map(|id| id.as_u64()),
        hash: H256::from_slice(&Keccak256::digest(raw.as_ref())),
    })
}

/// Local secp256k1 wallet signer (RFC 6979 nonces, so signatures are deterministic)
pub struct WalletSigner {
    wallet: LocalWallet,
}

impl WalletSigner {
    /// Create a signer from a hex private key
    pub fn from_private_key(key: &str) -> VanityResult<Self> {
        let wallet = key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| VanityError::Wallet(format!("Invalid private key: {}", e)))?;

        Ok(Self { wallet })
    }

    /// Load the private key from the named environment variable
    pub fn from_env(var: &str) -> VanityResult<Self> {
        let key = std::env::var(var).map_err(|_| {
            VanityError::Wallet(format!("No wallet configured. Set {} to a private key", var))
        })?;

        Self::from_private_key(&key)
    }
}

impl TxSigner for WalletSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    fn sign(&self, template: &TransactionTemplate, nonce: u64) -> VanityResult<SignedAttempt> {
        let tx = template.to_typed(nonce);
        let signature = self
            .wallet
            .sign_transaction_sync(&tx)
            .map_err(|e| VanityError::Wallet(e.to_string()))?;

        let raw = tx.rlp_signed(&signature);
        let hash = H256::from_slice(&Keccak256::digest(raw.as_ref()));

        Ok(SignedAttempt { nonce, raw, hash })
    }
}
