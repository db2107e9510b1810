//! Common types for the bridge protocol
//!
//! Chain identifiers, chain-agnostic account addresses, transaction IDs and
//! the transaction status machine shared by every component.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::{BridgeError, BridgeResult};

/// Token amount in the smallest unit (wei-style integer).
pub type Amount = u128;

/// Coarse wall-clock time in seconds since the Unix epoch.
pub type Timestamp = u64;

// ============================================================================
// Chain ID (4 bytes)
// ============================================================================

/// Represents a 4-byte chain ID
///
/// Serialized as a plain `u32` so that JSON configuration stays readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct ChainId(pub [u8; 4]);

impl ChainId {
    /// Create from u32
    pub fn from_u32(id: u32) -> Self {
        ChainId(id.to_be_bytes())
    }

    /// Convert to u32
    pub fn to_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Convert to hex string with 0x prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_u32())
    }
}

impl From<u32> for ChainId {
    fn from(id: u32) -> Self {
        ChainId::from_u32(id)
    }
}

impl From<ChainId> for u32 {
    fn from(id: ChainId) -> Self {
        id.to_u32()
    }
}

// ============================================================================
// Address
// ============================================================================

/// Chain-agnostic account or contract address.
///
/// The protocol never interprets addresses beyond identity comparison, so any
/// encoding (hex, bech32, base58) is accepted. Hex addresses are lowercased so
/// that checksummed and plain spellings compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Parse and normalize an address
    pub fn new(raw: impl AsRef<str>) -> BridgeResult<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(BridgeError::InvalidAddress {
                reason: "address is empty".to_string(),
            });
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(BridgeError::InvalidAddress {
                reason: format!("address contains whitespace: {:?}", trimmed),
            });
        }

        let normalized = if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
            let body = &trimmed[2..];
            if body.is_empty() || !body.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(BridgeError::InvalidAddress {
                    reason: format!("invalid hex address: {}", trimmed),
                });
            }
            format!("0x{}", body.to_ascii_lowercase())
        } else {
            trimmed.to_string()
        };

        Ok(Address(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Address::new(raw).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Transaction ID (32 bytes)
// ============================================================================

/// Unique identifier of a bridge transaction
///
/// Derived from `(source_chain, sender, nonce)` by [`crate::hash::compute_transaction_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxId(pub [u8; 32]);

impl TxId {
    /// Create from hex string (with or without 0x prefix)
    pub fn from_hex(hex_str: &str) -> BridgeResult<Self> {
        let stripped = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let bytes = hex::decode(stripped).map_err(|e| BridgeError::InvalidTransactionId {
            reason: format!("{}: {}", hex_str, e),
        })?;
        if bytes.len() != 32 {
            return Err(BridgeError::InvalidTransactionId {
                reason: format!("transaction id must be 32 bytes, got {}", bytes.len()),
            });
        }
        let mut result = [0u8; 32];
        result.copy_from_slice(&bytes);
        Ok(TxId(result))
    }

    /// Convert to hex string with 0x prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for TxId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TxId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TxId::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Transaction status
// ============================================================================

/// Lifecycle state of a bridge transaction
///
/// `Initiated -> Attesting -> Completed` on the happy path,
/// `Initiated/Attesting -> Refundable -> Refunded` on timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Initiated,
    Attesting,
    Completed,
    Refundable,
    Refunded,
}

impl TransactionStatus {
    /// Get the status as a lowercase string
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Initiated => "initiated",
            TransactionStatus::Attesting => "attesting",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Refundable => "refundable",
            TransactionStatus::Refunded => "refunded",
        }
    }

    /// No transition leaves a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Refunded
        )
    }

    /// Still collecting attestations
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Initiated | TransactionStatus::Attesting
        )
    }

    /// States a refund may be claimed from (once the timeout has elapsed)
    pub fn is_refund_eligible(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Initiated
                | TransactionStatus::Attesting
                | TransactionStatus::Refundable
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
