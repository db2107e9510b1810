//! Hash computation for bridge transaction IDs
//!
//! A transaction is identified by its origin, never by a local counter, so
//! that nonces from different source chains cannot collide:
//!
//! ```text
//! keccak256(srcChain (4) || len(sender) (4, BE) || sender || nonce (8, BE))
//! ```
//!
//! The sender is length-prefixed so that no two `(sender, nonce)` pairs share
//! an encoding.

use tiny_keccak::{Hasher, Keccak};

use crate::types::{Address, ChainId, TxId};

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Derive the transaction ID for a lock on `source_chain`
pub fn compute_transaction_id(source_chain: &ChainId, sender: &Address, nonce: u64) -> TxId {
    let sender_bytes = sender.as_bytes();
    let mut data = Vec::with_capacity(4 + 4 + sender_bytes.len() + 8);

    data.extend_from_slice(source_chain.as_bytes());
    data.extend_from_slice(&(sender_bytes.len() as u32).to_be_bytes());
    data.extend_from_slice(sender_bytes);
    data.extend_from_slice(&nonce.to_be_bytes());

    TxId(keccak256(&data))
}
