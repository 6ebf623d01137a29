//! Error types for the vanity transfer engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum VanityError {
    #[error("Signer not initialized: resolve the account address before searching or submitting")]
    UninitializedSigner,

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Network error during {operation}: {message}")]
    Network { operation: String, message: String },

    #[error("Node rejected request (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("Gap filling aborted at nonce {nonce}: {source}")]
    GapFillAborted {
        nonce: u64,
        #[source]
        source: Box<VanityError>,
    },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Search cancelled after {attempts} attempts")]
    SearchCancelled { attempts: u64 },

    #[error("Cancelled while waiting for {operation}")]
    Cancelled { operation: String },

    #[error("Connected to chain {actual}, expected chain {expected}")]
    ChainMismatch { expected: u64, actual: u64 },

    #[error("Search result is stale: matched nonce {matched} but account is already at nonce {pending}")]
    StaleResult { matched: u64, pending: u64 },

    #[error("Search result does not belong to this session: {0}")]
    ResultMismatch(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VanityError {
    /// Check if error is retryable
    ///
    /// Only transport-level failures qualify. Node rejections and the
    /// already-known outcome never reach the retry loop as retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VanityError::Network { .. })
    }

    /// Shorthand for a transport failure on `operation`
    pub fn network(operation: impl Into<String>, message: impl ToString) -> Self {
        VanityError::Network {
            operation: operation.into(),
            message: message.to_string(),
        }
    }
}

/// Result type for engine operations
pub type VanityResult<T> = Result<T, VanityError>;
