//! Configuration management for the vanity transfer engine
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

use crate::tx::FeeSchedule;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub chain: ChainConfig,
    pub token: TokenConfig,
    #[serde(default)]
    pub fees: FeeConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    pub rpc_urls: Vec<String>,
    /// Refuse to run against any other network when set
    pub expected_chain_id: Option<u64>,
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
}

/// The ERC-20 contract the transfer is addressed to
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub symbol: String,
    pub address: String,
    pub decimals: u32,
}

/// Gas prices are decimal gwei strings so sub-gwei values stay exact
#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    pub average_gwei: String,
    pub fast_gwei: String,
    pub instant_gwei: String,
    pub filler_increment_gwei: String,
    pub transfer_gas_limit: u64,
    pub filler_gas_limit: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Attempts between progress reports
    pub progress_interval: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmationConfig {
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub private_key_env: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub results_dir: PathBuf,
}

fn default_receipt_poll_interval_ms() -> u64 {
    1_000
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            average_gwei: "0.13".to_string(),
            fast_gwei: "0.5".to_string(),
            instant_gwei: "1".to_string(),
            filler_increment_gwei: "0.005".to_string(),
            transfer_gas_limit: 45_000,
            filler_gas_limit: 21_000,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            progress_interval: 500,
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self { timeout_secs: 300 }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 250,
            max_delay_ms: 5_000,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9464,
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key_env: "VANITY_PRIVATE_KEY".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
        }
    }
}

impl Settings {
    /// Load settings from the file named by `VANITY_CONFIG`, or the default path
    pub fn load() -> Result<Self> {
        let config_path = env::var("VANITY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    /// Parse settings from TOML text
    pub fn parse(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.chain.rpc_urls.is_empty() {
            anyhow::bail!("Chain {} has no RPC URLs configured", self.chain.name);
        }

        if self.token.address.is_empty() {
            anyhow::bail!("Token {} has no contract address", self.token.symbol);
        }

        // U256 holds at most 77 decimal digits
        if self.token.decimals > 77 {
            anyhow::bail!(
                "Token {} has unsupported precision: {} decimals",
                self.token.symbol,
                self.token.decimals
            );
        }

        if self.fees.filler_gas_limit >= self.fees.transfer_gas_limit {
            anyhow::bail!(
                "Filler gas limit ({}) must be lower than the transfer gas limit ({})",
                self.fees.filler_gas_limit,
                self.fees.transfer_gas_limit
            );
        }

        let schedule = FeeSchedule::from_config(&self.fees)
            .with_context(|| "Invalid fee configuration")?;
        if schedule.filler_increment().is_zero() {
            anyhow::bail!("Filler gas increment must be greater than zero");
        }

        if self.search.progress_interval == 0 {
            anyhow::bail!("Search progress interval must be greater than zero");
        }

        if self.confirmation.timeout_secs == 0 {
            anyhow::bail!("Confirmation timeout must be greater than zero");
        }

        if self.chain.expected_chain_id.is_none() {
            tracing::warn!(
                "Chain {} has no expected_chain_id - network identity will not be checked",
                self.chain.name
            );
        }

        Ok(())
    }
}

lazy_static! {
    static ref ENV_VAR_PATTERN: Regex =
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static pattern");
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR_PATTERN.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
