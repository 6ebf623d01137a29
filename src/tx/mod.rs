//! Transaction construction, vanity search, gap filling and broadcast

mod broadcast;
mod builder;
mod filler;
mod gas;
mod signer;
mod vanity;

pub use broadcast::{BroadcastPath, Broadcaster, ConfirmationHandle};
pub use builder::TemplateBuilder;
pub use filler::{FillReport, FillerSpec, NonceGapFiller};
pub use gas::{FeeSchedule, FeeTier};
pub use signer::{TxSigner, WalletSigner};
pub use vanity::{SearchProgress, SearchResult, SuffixPattern, VanitySearcher};

#[cfg(test)]
pub use builder::{encode_transfer, TransactionTemplate};
#[cfg(test)]
pub use signer::{DecodedTx, SignedAttempt};
