//! Transfer orchestration
//!
//! A session:
//! 1. Builds the transfer template and searches nonces for a matching hash
//! 2. Fills the nonces the search skipped
//! 3. Broadcasts the match and waits for its receipt
//!
//! Sequences against one account are serialized through `AccountLocks`.

pub mod engine;
pub mod lock;

pub use engine::{EngineOptions, ProgressCallback, TransferOrchestrator, TransferRequest};
pub use lock::AccountLocks;
