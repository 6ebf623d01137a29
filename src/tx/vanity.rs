//! Brute-force nonce search for a transaction hash with a chosen suffix
//!
//! Each nonce changes the signed bytes and therefore the hash, so walking the
//! nonce upward from the account's pending count eventually lands on a hash
//! ending in the requested hex digits. Expected attempts are `16^len(suffix)`.

use super::builder::TransactionTemplate;
use super::signer::TxSigner;
use crate::error::{VanityError, VanityResult};

use chrono::{DateTime, Utc};
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Longest suffix a 32-byte hash can carry
const MAX_SUFFIX_LEN: usize = 64;

/// Case-insensitive hex suffix a transaction hash must end with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuffixPattern {
    digits: String,
    nibbles: Vec<u8>,
}

impl SuffixPattern {
    pub fn parse(input: &str) -> VanityResult<Self> {
        let digits = input.trim().to_ascii_lowercase();

        if digits.is_empty() || digits.len() > MAX_SUFFIX_LEN {
            return Err(VanityError::Encoding(format!(
                "Target suffix must be 1 to {} hex characters, got {:?}",
                MAX_SUFFIX_LEN, input
            )));
        }

        let nibbles = digits
            .chars()
            .map(|c| c.to_digit(16).map(|d| d as u8))
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(|| {
                VanityError::Encoding(format!("Target suffix is not hexadecimal: {:?}", input))
            })?;

        Ok(Self { digits, nibbles })
    }

    pub fn len(&self) -> usize {
        self.nibbles.len()
    }

    /// Compare the trailing `len()` hex digits of `hash`
    pub fn matches(&self, hash: &H256) -> bool {
        let bytes = hash.as_bytes();
        self.nibbles.iter().rev().enumerate().all(|(i, want)| {
            let byte = bytes[bytes.len() - 1 - i / 2];
            let got = if i % 2 == 0 { byte & 0x0f } else { byte >> 4 };
            got == *want
        })
    }

    /// Mean number of signatures needed to hit this suffix
    pub fn expected_attempts(&self) -> f64 {
        16f64.powi(self.len() as i32)
    }
}

impl FromStr for SuffixPattern {
    type Err = VanityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SuffixPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digits)
    }
}

/// Winning transaction of a search, kept until it is submitted or discarded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub signed_raw_tx: Bytes,
    pub tx_hash: H256,
    /// Nonce the matching transaction was signed with
    pub nonce: u64,
    /// Pending nonce of the account when the search started
    pub initial_nonce: u64,
    pub gas_price: U256,
    pub attempts: u64,
    pub from: Address,
    pub chain_id: u64,
    pub suffix: String,
    pub found_at: DateTime<Utc>,
}

impl SearchResult {
    /// Nonces the search skipped, which fillers must consume first
    pub fn skipped_nonces(&self) -> u64 {
        self.nonce - self.initial_nonce
    }
}

/// Periodic search status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchProgress {
    pub attempts: u64,
    pub nonce: u64,
    pub last_hash: H256,
}

/// Sequential nonce search
#[derive(Debug, Clone)]
pub struct VanitySearcher {
    progress_interval: u64,
}

impl VanitySearcher {
    pub fn new(progress_interval: u64) -> Self {
        Self {
            progress_interval: progress_interval.max(1),
        }
    }

    /// Sign `template` at `initial_nonce`, `initial_nonce + 1`, ... until the
    /// hash ends in `pattern`
    ///
    /// Runs until a match is found or `cancel` fires. `progress` is invoked
    /// every `progress_interval` attempts and has no effect on the outcome.
    pub fn search(
        &self,
        signer: &dyn TxSigner,
        template: &TransactionTemplate,
        pattern: &SuffixPattern,
        initial_nonce: u64,
        cancel: &CancellationToken,
        progress: &(dyn Fn(&SearchProgress) + Send + Sync),
    ) -> VanityResult<SearchResult> {
        info!(
            "Searching for hash suffix {} from nonce {} (~{:.0} attempts expected)",
            pattern,
            initial_nonce,
            pattern.expected_attempts()
        );

        let mut nonce = initial_nonce;
        let mut attempts = 0u64;

        loop {
            if cancel.is_cancelled() {
                debug!("Search cancelled at nonce {} after {} attempts", nonce, attempts);
                return Err(VanityError::SearchCancelled { attempts });
            }

            let attempt = signer.sign(template, nonce)?;
            attempts += 1;

            if pattern.matches(&attempt.hash) {
                info!(
                    "Found hash {:?} at nonce {} after {} attempts",
                    attempt.hash, nonce, attempts
                );

                return Ok(SearchResult {
                    signed_raw_tx: attempt.raw,
                    tx_hash: attempt.hash,
                    nonce,
                    initial_nonce,
                    gas_price: template.gas_price,
                    attempts,
                    from: signer.address(),
                    chain_id: template.chain_id,
                    suffix: pattern.to_string(),
                    found_at: Utc::now(),
                });
            }

            if attempts % self.progress_interval == 0 {
                progress(&SearchProgress {
                    attempts,
                    nonce,
                    last_hash: attempt.hash,
                });
            }

            nonce = nonce
                .checked_add(1)
                .ok_or_else(|| VanityError::Internal("Nonce space exhausted".to_string()))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{transfer_template, FakeSigner, OWNER};
    use crate::tx::signer::WalletSigner;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    fn no_progress(_: &SearchProgress) {}

    #[test]
    fn test_pattern_parsing() {
        assert_eq!(SuffixPattern::parse("AbC").unwrap().to_string(), "abc");
        assert_eq!(SuffixPattern::parse(" 0 ").unwrap().len(), 1);
        assert!(matches!(SuffixPattern::parse(""), Err(VanityError::Encoding(_))));
        assert!(matches!(SuffixPattern::parse("xyz"), Err(VanityError::Encoding(_))));
        assert!(SuffixPattern::parse(&"a".repeat(65)).is_err());
        assert!(SuffixPattern::parse(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn test_pattern_matches_full_suffix_case_insensitively() {
        let mut bytes = [0x11u8; 32];
        bytes[30] = 0x5a;
        bytes[31] = 0xb0;
        let hash = H256::from(bytes);

        assert!(SuffixPattern::parse("0").unwrap().matches(&hash));
        assert!(SuffixPattern::parse("B0").unwrap().matches(&hash));
        assert!(SuffixPattern::parse("ab0").unwrap().matches(&hash));
        assert!(SuffixPattern::parse("5AB0").unwrap().matches(&hash));
        // Only the last digit agrees: must not match
        assert!(!SuffixPattern::parse("a0").unwrap().matches(&hash));
        assert!(SuffixPattern::parse("15ab0").unwrap().matches(&hash));
        assert!(!SuffixPattern::parse("25ab0").unwrap().matches(&hash));
    }

    #[test]
    fn test_search_stops_at_first_matching_nonce() {
        let signer = FakeSigner::new(8);
        let template = transfer_template();
        let pattern = SuffixPattern::parse("0").unwrap();

        let result = VanitySearcher::new(500)
            .search(&signer, &template, &pattern, 5, &CancellationToken::new(), &no_progress)
            .unwrap();

        assert_eq!(result.nonce, 8);
        assert_eq!(result.initial_nonce, 5);
        assert_eq!(result.attempts, 4);
        assert_eq!(result.skipped_nonces(), 3);
        assert_eq!(result.gas_price, template.gas_price);
        assert_eq!(result.from, OWNER);
        assert_eq!(result.suffix, "0");
        assert_eq!(signer.signed_nonces(), vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_match_at_initial_nonce_needs_no_gap() {
        let signer = FakeSigner::new(5);
        let pattern = SuffixPattern::parse("0").unwrap();

        let result = VanitySearcher::new(500)
            .search(
                &signer,
                &transfer_template(),
                &pattern,
                5,
                &CancellationToken::new(),
                &no_progress,
            )
            .unwrap();

        assert_eq!(result.nonce, result.initial_nonce);
        assert_eq!(result.attempts, 1);
    }

    #[test]
    fn test_real_signer_only_matches_at_returned_nonce() {
        let signer = WalletSigner::from_private_key(
            "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
        )
        .unwrap();
        let template = transfer_template();
        let pattern = SuffixPattern::parse("C").unwrap();

        let result = VanitySearcher::new(500)
            .search(&signer, &template, &pattern, 40, &CancellationToken::new(), &no_progress)
            .unwrap();

        for nonce in result.initial_nonce..result.nonce {
            let attempt = signer.sign(&template, nonce).unwrap();
            assert!(!pattern.matches(&attempt.hash), "nonce {} should not match", nonce);
        }
        let winner = signer.sign(&template, result.nonce).unwrap();
        assert!(pattern.matches(&winner.hash));
        assert_eq!(winner.hash, result.tx_hash);
        assert_eq!(winner.raw, result.signed_raw_tx);
        assert!(format!("{:x}", result.tx_hash).ends_with('c'));
    }

    #[test]
    fn test_progress_reported_at_interval() {
        let signer = FakeSigner::new(25);
        let seen = Mutex::new(Vec::new());
        let progress = |p: &SearchProgress| seen.lock().unwrap().push((p.attempts, p.nonce));

        let result = VanitySearcher::new(10)
            .search(
                &signer,
                &transfer_template(),
                &SuffixPattern::parse("0").unwrap(),
                0,
                &CancellationToken::new(),
                &progress,
            )
            .unwrap();

        assert_eq!(result.nonce, 25);
        assert_eq!(*seen.lock().unwrap(), vec![(10, 9), (20, 19)]);
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = VanitySearcher::new(10)
            .search(
                &FakeSigner::new(8),
                &transfer_template(),
                &SuffixPattern::parse("0").unwrap(),
                0,
                &cancel,
                &no_progress,
            )
            .unwrap_err();

        assert!(matches!(err, VanityError::SearchCancelled { attempts: 0 }));
    }

    #[test]
    fn test_cancel_from_progress_callback_stops_search() {
        let cancel = CancellationToken::new();
        let reports = AtomicU64::new(0);
        let progress = |_: &SearchProgress| {
            reports.fetch_add(1, Ordering::SeqCst);
            cancel.cancel();
        };

        let err = VanitySearcher::new(10)
            .search(
                &FakeSigner::new(u64::MAX),
                &transfer_template(),
                &SuffixPattern::parse("0").unwrap(),
                0,
                &cancel,
                &progress,
            )
            .unwrap_err();

        assert!(matches!(err, VanityError::SearchCancelled { attempts: 10 }));
        assert_eq!(reports.load(Ordering::SeqCst), 1);
    }
}
