//! Transaction templates for the token transfer and for nonce fillers

use super::gas::{FeeSchedule, FeeTier};
use crate::config::TokenConfig;
use crate::error::{VanityError, VanityResult};

use alloy_sol_types::{sol, SolCall};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use ethers::utils::{parse_units, to_checksum};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

sol! {
    function transfer(address to, uint256 amount) external returns (bool);
}

lazy_static! {
    static ref AMOUNT_PATTERN: Regex = Regex::new(r"^\d+(\.\d+)?$").expect("static pattern");
}

/// Everything about a transaction except its nonce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionTemplate {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub gas_limit: U256,
    pub gas_price: U256,
    pub chain_id: u64,
}

impl TransactionTemplate {
    /// Zero-value transfer to `owner` itself, used to consume a nonce
    pub fn self_transfer(owner: Address, gas_limit: U256, gas_price: U256, chain_id: u64) -> Self {
        Self {
            to: owner,
            value: U256::zero(),
            data: Bytes::default(),
            gas_limit,
            gas_price,
            chain_id,
        }
    }

    /// Legacy (EIP-155) transaction for this template at `nonce`
    pub fn to_typed(&self, nonce: u64) -> TypedTransaction {
        TransactionRequest::new()
            .to(self.to)
            .value(self.value)
            .data(self.data.clone())
            .gas(self.gas_limit)
            .gas_price(self.gas_price)
            .nonce(nonce)
            .chain_id(self.chain_id)
            .into()
    }
}

/// Builds token transfer templates against a fixed token contract
#[derive(Debug, Clone)]
pub struct TemplateBuilder {
    token: Address,
    decimals: u32,
    fees: FeeSchedule,
}

impl TemplateBuilder {
    /// Create a builder for the configured token
    pub fn new(token: &TokenConfig, fees: FeeSchedule) -> VanityResult<Self> {
        let address = parse_address(&token.address)
            .map_err(|e| VanityError::Config(format!("Invalid token address: {}", e)))?;

        Ok(Self {
            token: address,
            decimals: token.decimals,
            fees,
        })
    }

    /// Build the transfer template for `amount` tokens to `receiver`
    pub fn build(
        &self,
        receiver: &str,
        amount: &str,
        tier: Option<FeeTier>,
        chain_id: u64,
    ) -> VanityResult<TransactionTemplate> {
        let receiver = parse_address(receiver)?;
        let amount = self.parse_amount(amount)?;
        let gas_price = self.fees.gas_price(tier);

        debug!(
            "Built transfer template: {} base units to {:?}, gas price {} wei",
            amount, receiver, gas_price
        );

        Ok(TransactionTemplate {
            to: self.token,
            value: U256::zero(),
            data: encode_transfer(receiver, amount),
            gas_limit: self.fees.transfer_gas_limit(),
            gas_price,
            chain_id,
        })
    }

    /// Scale a decimal string to the token's base units
    pub fn parse_amount(&self, amount: &str) -> VanityResult<U256> {
        let amount = amount.trim();
        if !AMOUNT_PATTERN.is_match(amount) {
            return Err(VanityError::Encoding(format!(
                "Amount is not a non-negative decimal number: {:?}",
                amount
            )));
        }

        let fraction_digits = amount.split_once('.').map(|(_, f)| f.len()).unwrap_or(0);
        if fraction_digits > self.decimals as usize {
            return Err(VanityError::Encoding(format!(
                "Amount {} has {} fractional digits, token supports {}",
                amount, fraction_digits, self.decimals
            )));
        }

        parse_units(amount, self.decimals)
            .map(Into::into)
            .map_err(|e| VanityError::Encoding(format!("Amount {} out of range: {}", amount, e)))
    }
}

/// ABI-encode `transfer(receiver, amount)`
pub fn encode_transfer(receiver: Address, amount: U256) -> Bytes {
    let mut amount_be = [0u8; 32];
    amount.to_big_endian(&mut amount_be);

    let call = transferCall {
        to: alloy_primitives::Address::from(receiver.0),
        amount: alloy_primitives::U256::from_be_bytes(amount_be),
    };

    Bytes::from(call.abi_encode())
}

/// Parse a 20-byte hex address, `0x` prefix optional
pub fn parse_address(value: &str) -> VanityResult<Address> {
    let value = value.trim();
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);

    if digits.len() != 40 {
        return Err(VanityError::Encoding(format!(
            "Address must be 40 hex characters: {:?}",
            value
        )));
    }

    let bytes = hex::decode(digits)
        .map_err(|e| VanityError::Encoding(format!("Address {:?} is not hex: {}", value, e)))?;
    let address = Address::from_slice(&bytes);

    // Mixed case carries an EIP-55 checksum
    let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        let checksummed = to_checksum(&address, None);
        if checksummed.trim_start_matches("0x") != digits {
            return Err(VanityError::Encoding(format!(
                "Address {:?} has an invalid checksum, expected {}",
                value, checksummed
            )));
        }
    }

    Ok(address)
}
