//! Fixed fee policy: three gas price tiers and the filler price ladder

use crate::config::FeeConfig;
use crate::error::{VanityError, VanityResult};

use ethers::types::U256;
use ethers::utils::parse_units;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Gas price tier selected by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FeeTier {
    Average,
    Fast,
    Instant,
}

impl fmt::Display for FeeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeeTier::Average => "average",
            FeeTier::Fast => "fast",
            FeeTier::Instant => "instant",
        };
        f.write_str(name)
    }
}

/// Gas prices and limits resolved to wei
#[derive(Debug, Clone)]
pub struct FeeSchedule {
    average: U256,
    fast: U256,
    instant: U256,
    filler_increment: U256,
    transfer_gas_limit: U256,
    filler_gas_limit: U256,
}

impl FeeSchedule {
    /// Resolve the configured gwei table
    pub fn from_config(config: &FeeConfig) -> VanityResult<Self> {
        Ok(Self {
            average: parse_gwei("average_gwei", &config.average_gwei)?,
            fast: parse_gwei("fast_gwei", &config.fast_gwei)?,
            instant: parse_gwei("instant_gwei", &config.instant_gwei)?,
            filler_increment: parse_gwei(
                "filler_increment_gwei",
                &config.filler_increment_gwei,
            )?,
            transfer_gas_limit: U256::from(config.transfer_gas_limit),
            filler_gas_limit: U256::from(config.filler_gas_limit),
        })
    }

    /// Gas price for a tier; no tier means the flat low-cost default
    pub fn gas_price(&self, tier: Option<FeeTier>) -> U256 {
        match tier.unwrap_or(FeeTier::Average) {
            FeeTier::Average => self.average,
            FeeTier::Fast => self.fast,
            FeeTier::Instant => self.instant,
        }
    }

    /// Price for the filler `offset` positions after the first skipped nonce
    pub fn filler_gas_price(&self, base: U256, offset: u64) -> U256 {
        base + self.filler_increment * U256::from(offset)
    }

    pub fn filler_increment(&self) -> U256 {
        self.filler_increment
    }

    pub fn transfer_gas_limit(&self) -> U256 {
        self.transfer_gas_limit
    }

    pub fn filler_gas_limit(&self) -> U256 {
        self.filler_gas_limit
    }
}

impl Default for FeeSchedule {
    /// Same values as `FeeConfig::default()`, in wei
    fn default() -> Self {
        Self {
            average: U256::from(130_000_000u64),
            fast: U256::from(500_000_000u64),
            instant: U256::from(1_000_000_000u64),
            filler_increment: U256::from(5_000_000u64),
            transfer_gas_limit: U256::from(45_000u64),
            filler_gas_limit: U256::from(21_000u64),
        }
    }
}

fn parse_gwei(field: &str, value: &str) -> VanityResult<U256> {
    let value = value.trim();
    if value.starts_with('-') {
        return Err(VanityError::Config(format!(
            "{} must not be negative: {}",
            field, value
        )));
    }

    parse_units(value, "gwei")
        .map(Into::into)
        .map_err(|e| VanityError::Config(format!("{} is not a gwei amount ({}): {}", field, value, e)))
}
