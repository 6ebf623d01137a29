//! JSON-RPC chain client with multi-RPC support and automatic failover

use super::{ChainClient, SubmitOutcome};
use crate::config::ChainConfig;
use crate::error::{VanityError, VanityResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider, ProviderError, RpcError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Node messages meaning "this exact transaction is already in the pool".
/// Wording differs between client implementations.
const ALREADY_KNOWN_MARKERS: &[&str] = &[
    "already known",
    "alreadyknown",
    "known transaction",
    "already imported",
];

/// HTTP chain client with failover across configured RPC URLs
pub struct RpcChainClient {
    /// Chain configuration
    config: ChainConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
    /// Delay between receipt polls
    poll_interval: Duration,
}

impl RpcChainClient {
    /// Create a new chain client
    pub fn new(config: ChainConfig) -> VanityResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.name, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(VanityError::Config(format!(
                "No valid RPC providers for chain {}",
                config.name
            )));
        }

        let poll_interval = Duration::from_millis(config.receipt_poll_interval_ms);

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
            poll_interval,
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        if self.http_providers.len() < 2 {
            return;
        }
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.config.name, next);
    }

    /// Map a provider error, failing over when the transport itself broke
    fn provider_error(&self, operation: &str, err: ProviderError) -> VanityError {
        let err = classify_error(operation, &err);
        if err.is_retryable() {
            self.failover();
        }
        err
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn chain_id(&self) -> VanityResult<u64> {
        self.http()
            .get_chainid()
            .await
            .map(|id| id.as_u64())
            .map_err(|e| self.provider_error("eth_chainId", e))
    }

    async fn pending_nonce(&self, address: Address) -> VanityResult<u64> {
        let nonce = self
            .http()
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| self.provider_error("eth_getTransactionCount", e))?;

        debug!("Pending nonce for {:?} on {}: {}", address, self.config.name, nonce);
        Ok(nonce.as_u64())
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> VanityResult<SubmitOutcome> {
        match self.http().send_raw_transaction(raw).await {
            Ok(pending_tx) => Ok(SubmitOutcome::Accepted(pending_tx.tx_hash())),
            Err(e) => {
                if is_already_known(&e) {
                    debug!("Node reports transaction already known: {}", e);
                    return Ok(SubmitOutcome::AlreadyKnown);
                }
                Err(self.provider_error("eth_sendRawTransaction", e))
            }
        }
    }

    async fn transaction_receipt(&self, hash: H256) -> VanityResult<Option<TransactionReceipt>> {
        self.http()
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| self.provider_error("eth_getTransactionReceipt", e))
    }

    async fn wait_for_receipt(&self, hash: H256) -> VanityResult<TransactionReceipt> {
        loop {
            match self.transaction_receipt(hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(err) => {
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    warn!("Receipt poll for {:?} failed, will retry: {}", hash, err);
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Node error responses become `Rejected`; everything else is transport trouble
fn classify_error(operation: &str, err: &ProviderError) -> VanityError {
    match RpcError::as_error_response(err) {
        Some(response) => VanityError::Rejected {
            code: response.code,
            message: response.message.clone(),
        },
        None => VanityError::network(operation, err),
    }
}

fn is_already_known(err: &ProviderError) -> bool {
    RpcError::as_error_response(err)
        .map(|response| is_already_known_message(&response.message))
        .unwrap_or(false)
}

fn is_already_known_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    ALREADY_KNOWN_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::{HttpClientError, JsonRpcError};

    fn config(urls: &[&str]) -> ChainConfig {
        ChainConfig {
            name: "test".to_string(),
            rpc_urls: urls.iter().map(|u| u.to_string()).collect(),
            expected_chain_id: None,
            receipt_poll_interval_ms: 10,
        }
    }

    #[test]
    fn test_already_known_wording_variants() {
        assert!(is_already_known_message("already known"));
        assert!(is_already_known_message("AlreadyKnown"));
        assert!(is_already_known_message("Known transaction: 0xabc"));
        assert!(is_already_known_message(
            "Transaction with the same hash was already imported."
        ));
        assert!(!is_already_known_message("nonce too low"));
        assert!(!is_already_known_message("replacement transaction underpriced"));
    }

    fn node_error(code: i64, message: &str) -> ProviderError {
        ProviderError::JsonRpcClientError(Box::new(HttpClientError::JsonRpcError(
            JsonRpcError {
                code,
                message: message.to_string(),
                data: None,
            },
        )))
    }

    #[test]
    fn test_node_error_responses_are_classified() {
        let err = node_error(-32000, "already known");
        assert!(is_already_known(&err));
        assert!(matches!(
            classify_error("eth_sendRawTransaction", &err),
            VanityError::Rejected { code: -32000, .. }
        ));

        let err = node_error(-32000, "nonce too low");
        assert!(!is_already_known(&err));
        match classify_error("eth_sendRawTransaction", &err) {
            VanityError::Rejected { message, .. } => assert_eq!(message, "nonce too low"),
            other => panic!("unexpected error: {}", other),
        }

        let err = ProviderError::CustomError("connection reset".to_string());
        assert!(!is_already_known(&err));
        assert!(classify_error("eth_sendRawTransaction", &err).is_retryable());
    }

    #[test]
    fn test_rejects_config_without_valid_urls() {
        assert!(matches!(
            RpcChainClient::new(config(&["not a url"])),
            Err(VanityError::Config(_))
        ));
    }

    #[test]
    fn test_failover_rotates_providers() {
        let client =
            RpcChainClient::new(config(&["http://127.0.0.1:8545", "http://127.0.0.1:8546"]))
                .unwrap();

        assert_eq!(client.current_provider.load(Ordering::Relaxed), 0);
        client.failover();
        assert_eq!(client.current_provider.load(Ordering::Relaxed), 1);
        client.failover();
        assert_eq!(client.current_provider.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_unreachable_node_is_a_network_error() {
        let client = RpcChainClient::new(config(&["http://127.0.0.1:9"])).unwrap();

        let err = client.chain_id().await.unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {}", err);
    }
}
