//! Fee Manager Module
//!
//! Computes the transfer fee and enforces the per-transaction amount bounds.
//!
//! ## Fee Structure
//!
//! | Parameter     | Default                | Bound                  |
//! |---------------|------------------------|------------------------|
//! | Fee rate      | 2.5% (250 bps)         | 0 - 10% (0 - 1000 bps) |
//! | Minimum       | 10^15 (0.001 token)    | <= maximum             |
//! | Maximum       | 10^21 (1000 tokens)    | >= minimum             |
//!
//! The fee is truncated toward zero, so it never exceeds the configured rate.

use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

use crate::error::{BridgeError, BridgeResult};
use crate::types::Amount;

// ============================================================================
// Constants
// ============================================================================

/// Maximum fee in basis points (10% = 1000 bps)
pub const MAX_FEE_BPS: u32 = 1000;

/// Default fee in basis points (2.5% = 250 bps)
pub const DEFAULT_FEE_BPS: u32 = 250;

/// Default minimum transfer (0.001 of an 18-decimal token)
pub const DEFAULT_MIN_AMOUNT: Amount = 1_000_000_000_000_000;

/// Default maximum transfer (1000 of an 18-decimal token)
pub const DEFAULT_MAX_AMOUNT: Amount = 1_000_000_000_000_000_000_000;

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: u128 = 10_000;

// ============================================================================
// Data Structures
// ============================================================================

/// Fee configuration parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Fee in basis points (default 250 = 2.5%)
    pub fee_bps: u32,
    /// Minimum gross amount per transaction
    pub min_amount: Amount,
    /// Maximum gross amount per transaction
    pub max_amount: Amount,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            fee_bps: DEFAULT_FEE_BPS,
            min_amount: DEFAULT_MIN_AMOUNT,
            max_amount: DEFAULT_MAX_AMOUNT,
        }
    }
}

impl FeeConfig {
    /// Validate the fee configuration
    pub fn validate(&self) -> BridgeResult<()> {
        if self.fee_bps > MAX_FEE_BPS {
            return Err(BridgeError::InvalidFeeConfig {
                reason: format!("fee {} bps exceeds max {}", self.fee_bps, MAX_FEE_BPS),
            });
        }
        if self.min_amount > self.max_amount {
            return Err(BridgeError::InvalidFeeConfig {
                reason: format!(
                    "minimum amount {} exceeds maximum amount {}",
                    self.min_amount, self.max_amount
                ),
            });
        }
        Ok(())
    }
}

/// Fee breakdown for a single transfer; `net + fee == gross` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuote {
    pub gross_amount: Amount,
    pub fee: Amount,
    pub net_amount: Amount,
}

// ============================================================================
// Fee Calculation Functions
// ============================================================================

/// Calculate fee amount from amount and bps, truncating toward zero.
///
/// Splits `amount` into `q * 10000 + r` so the product never overflows.
pub fn calculate_fee_from_bps(amount: Amount, fee_bps: u32) -> Amount {
    let bps = fee_bps as u128;
    let quotient = amount / BPS_DENOMINATOR;
    let remainder = amount % BPS_DENOMINATOR;
    quotient * bps + remainder * bps / BPS_DENOMINATOR
}

/// Check the amount bounds and split `gross_amount` into fee and net amount.
pub fn compute_fee(
    gross_amount: Amount,
    fee_bps: u32,
    min_amount: Amount,
    max_amount: Amount,
) -> BridgeResult<FeeQuote> {
    if gross_amount == 0 {
        return Err(BridgeError::InvalidAmount {
            reason: "amount must be greater than zero".to_string(),
        });
    }
    if gross_amount < min_amount {
        return Err(BridgeError::BelowMinimumAmount {
            min_amount,
            amount: gross_amount,
        });
    }
    if gross_amount > max_amount {
        return Err(BridgeError::AboveMaximumAmount {
            max_amount,
            amount: gross_amount,
        });
    }

    let fee = calculate_fee_from_bps(gross_amount, fee_bps.min(MAX_FEE_BPS));
    Ok(FeeQuote {
        gross_amount,
        fee,
        net_amount: gross_amount - fee,
    })
}

// ============================================================================
// Fee Engine
// ============================================================================

/// Holds the live fee configuration
///
/// Quotes are computed once at transaction creation; later configuration
/// changes never touch existing transactions.
#[derive(Debug)]
pub struct FeeEngine {
    config: RwLock<FeeConfig>,
}

impl FeeEngine {
    pub fn new(config: FeeConfig) -> BridgeResult<Self> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(config),
        })
    }

    pub fn config(&self) -> FeeConfig {
        *self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the configuration; rejected configurations leave the old one in place.
    pub fn set_config(&self, config: FeeConfig) -> BridgeResult<()> {
        config.validate()?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    pub fn quote(&self, gross_amount: Amount) -> BridgeResult<FeeQuote> {
        let config = self.config();
        compute_fee(
            gross_amount,
            config.fee_bps,
            config.min_amount,
            config.max_amount,
        )
    }
}
