//! External capabilities the coordinator delegates to
//!
//! - [`Settlement`]: moving funds. `release` credits the receiver on the
//!   destination chain, `refund` returns the locked amount to the sender.
//!   Both are triggers, called exactly once per transaction after the
//!   corresponding terminal transition has been committed. Delivery,
//!   retries and gas are the implementor's concern.
//! - [`AttestationVerifier`]: proving that a submitted attestation really
//!   comes from the validator it names.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

use crate::error::BridgeResult;
use crate::ledger::Transaction;
use crate::types::{Address, TxId};

pub trait Settlement: Send + Sync {
    fn release(&self, tx: &Transaction);
    fn refund(&self, tx: &Transaction);
}

/// Attestation as submitted by a validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationPayload {
    /// Validator claiming to attest
    pub validator: Address,
    /// Signature over the transaction, opaque to the core
    #[serde(default)]
    pub signature: String,
}

pub trait AttestationVerifier: Send + Sync {
    /// Check `payload` against `tx` and return the proven validator address.
    fn verify(&self, tx: &Transaction, payload: &AttestationPayload) -> BridgeResult<Address>;
}

/// Accepts the claimed identity as-is.
///
/// For deployments where the transport already authenticates validators
/// (mutual TLS, per-validator credentials at the API boundary).
#[derive(Debug, Default, Clone, Copy)]
pub struct TrustedSubmitter;

impl AttestationVerifier for TrustedSubmitter {
    fn verify(&self, _tx: &Transaction, payload: &AttestationPayload) -> BridgeResult<Address> {
        Ok(payload.validator.clone())
    }
}

/// Settlement kind recorded by [`RecordingSettlement`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementAction {
    Release(TxId),
    Refund(TxId),
}

/// Records every trigger in order
#[derive(Debug, Default)]
pub struct RecordingSettlement {
    actions: Mutex<Vec<SettlementAction>>,
}

impl RecordingSettlement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<SettlementAction> {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn releases(&self, id: &TxId) -> usize {
        self.count(SettlementAction::Release(*id))
    }

    pub fn refunds(&self, id: &TxId) -> usize {
        self.count(SettlementAction::Refund(*id))
    }

    fn count(&self, action: SettlementAction) -> usize {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|a| **a == action)
            .count()
    }

    fn push(&self, action: SettlementAction) {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action);
    }
}

impl Settlement for RecordingSettlement {
    fn release(&self, tx: &Transaction) {
        self.push(SettlementAction::Release(tx.id));
    }

    fn refund(&self, tx: &Transaction) {
        self.push(SettlementAction::Refund(tx.id));
    }
}
