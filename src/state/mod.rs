//! Persistence of search results between `search` and `submit`
//!
//! A found transaction is expensive to reproduce, so it is written to disk
//! before the operator decides whether to broadcast it.

mod store;

pub use store::ResultStore;
