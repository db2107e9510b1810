//! Error types for the bridge protocol core
//!
//! Every entry point returns a [`BridgeResult`]. All variants are local,
//! synchronous conditions the caller can act on; none of them indicate a
//! corrupted ledger.

use thiserror::Error;

use crate::types::{Address, Amount, ChainId, TransactionStatus, TxId};

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    // ========================================================================
    // Authorization Errors
    // ========================================================================
    #[error("Unauthorized: only admin can perform this action")]
    Unauthorized,

    // ========================================================================
    // Bridge State Errors
    // ========================================================================
    #[error("Bridge is paused")]
    Paused,

    #[error("Chain not configured: {chain_id}")]
    ChainNotConfigured { chain_id: ChainId },

    #[error("Chain inactive: {chain_id}")]
    ChainInactive { chain_id: ChainId },

    // ========================================================================
    // Amount & Volume Errors
    // ========================================================================
    #[error("Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    #[error("Minimum bridge amount is {min_amount}, got {amount}")]
    BelowMinimumAmount { min_amount: Amount, amount: Amount },

    #[error("Maximum bridge amount is {max_amount}, got {amount}")]
    AboveMaximumAmount { max_amount: Amount, amount: Amount },

    #[error(
        "Daily volume exceeded for chain {chain_id}: limit {limit}, used {used}, requested {requested}"
    )]
    VolumeExceeded {
        chain_id: ChainId,
        limit: Amount,
        used: Amount,
        requested: Amount,
    },

    // ========================================================================
    // Replay Errors
    // ========================================================================
    #[error("Duplicate transaction: {id}")]
    DuplicateTransaction { id: TxId },

    #[error("Duplicate attestation from {validator} for {id}")]
    DuplicateAttestation { id: TxId, validator: Address },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    #[error("Transaction not found: {id}")]
    NotFound { id: TxId },

    #[error("Transaction {id} is already {status}")]
    AlreadyTerminal { id: TxId, status: TransactionStatus },

    #[error("Transaction {id} timed out and no longer accepts attestations")]
    TransactionExpired { id: TxId },

    #[error("Refund timeout not elapsed: {remaining_seconds} seconds remaining")]
    TimeoutNotElapsed { remaining_seconds: u64 },

    // ========================================================================
    // Validator Errors
    // ========================================================================
    #[error("Unknown or inactive validator: {validator}")]
    UnknownValidator { validator: Address },

    #[error("Invalid attestation: {reason}")]
    InvalidAttestation { reason: String },

    // ========================================================================
    // Validation Errors
    // ========================================================================
    #[error("Invalid address: {reason}")]
    InvalidAddress { reason: String },

    #[error("Invalid transaction id: {reason}")]
    InvalidTransactionId { reason: String },

    #[error("Invalid fee configuration: {reason}")]
    InvalidFeeConfig { reason: String },

    #[error("Invalid validator set: {reason}")]
    InvalidValidatorSet { reason: String },
}

impl BridgeError {
    /// Stable machine-readable code, used by API responses and metrics labels
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::Unauthorized => "unauthorized",
            BridgeError::Paused => "paused",
            BridgeError::ChainNotConfigured { .. } => "chain_not_configured",
            BridgeError::ChainInactive { .. } => "chain_inactive",
            BridgeError::InvalidAmount { .. } => "invalid_amount",
            BridgeError::BelowMinimumAmount { .. } | BridgeError::AboveMaximumAmount { .. } => {
                "amount_out_of_range"
            }
            BridgeError::VolumeExceeded { .. } => "volume_exceeded",
            BridgeError::DuplicateTransaction { .. } => "duplicate_transaction",
            BridgeError::DuplicateAttestation { .. } => "duplicate_attestation",
            BridgeError::NotFound { .. } => "not_found",
            BridgeError::AlreadyTerminal { .. } => "already_terminal",
            BridgeError::TransactionExpired { .. } => "transaction_expired",
            BridgeError::TimeoutNotElapsed { .. } => "timeout_not_elapsed",
            BridgeError::UnknownValidator { .. } => "unknown_validator",
            BridgeError::InvalidAttestation { .. } => "invalid_attestation",
            BridgeError::InvalidAddress { .. } => "invalid_address",
            BridgeError::InvalidTransactionId { .. } => "invalid_transaction_id",
            BridgeError::InvalidFeeConfig { .. } => "invalid_fee_config",
            BridgeError::InvalidValidatorSet { .. } => "invalid_validator_set",
        }
    }

    /// Conditions a caller may retry later without changing the request
    ///
    /// `Paused` clears on unpause, `TimeoutNotElapsed` clears once the
    /// timeout passes, and a duplicate attestation is already recorded.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::Paused
                | BridgeError::TimeoutNotElapsed { .. }
                | BridgeError::DuplicateAttestation { .. }
        )
    }
}
