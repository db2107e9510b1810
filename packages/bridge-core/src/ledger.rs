//! Transaction Ledger
//!
//! Canonical record and state machine of every bridge transaction.
//!
//! Each transaction sits behind its own mutex. Every status transition
//! checks the current status under that mutex before writing, which makes
//! each transition a compare-and-set: of any number of concurrent callers,
//! exactly one observes a successful completion or refund.
//!
//! Records are never deleted; terminal transactions stay as an audit trail.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::error::{BridgeError, BridgeResult};
use crate::fee_manager::FeeQuote;
use crate::replay_guard::ReplayGuard;
use crate::shard::{ShardedMap, DEFAULT_SHARDS};
use crate::types::{Address, Amount, ChainId, Timestamp, TransactionStatus, TxId};

/// Bridge transaction record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub source_chain: ChainId,
    pub dest_chain: ChainId,
    pub sender: Address,
    pub receiver: Address,
    pub token: Address,
    pub gross_amount: Amount,
    /// Fixed at creation, never recomputed
    pub fee: Amount,
    pub net_amount: Amount,
    pub nonce: u64,
    pub status: TransactionStatus,
    pub created_at: Timestamp,
    /// Refunds are possible once the clock is strictly past this point
    pub expires_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub refunded_at: Option<Timestamp>,
    /// Validators whose attestation was recorded, each at most once
    pub attestations: BTreeSet<Address>,
}

impl Transaction {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }
}

/// Parameters for [`TransactionLedger::create`]
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub source_chain: ChainId,
    pub dest_chain: ChainId,
    pub sender: Address,
    pub receiver: Address,
    pub token: Address,
    pub nonce: u64,
    pub quote: FeeQuote,
    pub created_at: Timestamp,
    pub timeout_secs: u64,
}

/// Result of applying an attestation to a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttestationApplied {
    /// Recorded; status is now `Attesting`
    Recorded,
    /// The transaction completed earlier; nothing was recorded
    AlreadyCompleted,
}

pub struct TransactionLedger {
    transactions: ShardedMap<TxId, Arc<Mutex<Transaction>>>,
    replay: ReplayGuard,
}

impl Default for TransactionLedger {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

impl TransactionLedger {
    pub fn new(shards: usize) -> Self {
        Self {
            transactions: ShardedMap::new(shards),
            replay: ReplayGuard::new(shards),
        }
    }

    pub fn replay_guard(&self) -> &ReplayGuard {
        &self.replay
    }

    fn entry(&self, id: &TxId) -> BridgeResult<Arc<Mutex<Transaction>>> {
        self.transactions
            .lock(id)
            .get(id)
            .cloned()
            .ok_or(BridgeError::NotFound { id: *id })
    }

    fn lock(entry: &Mutex<Transaction>) -> MutexGuard<'_, Transaction> {
        entry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a transaction in `Initiated` state.
    ///
    /// Fails with `DuplicateTransaction` if `(source_chain, sender, nonce)`
    /// was used before.
    pub fn create(&self, params: NewTransaction) -> BridgeResult<Transaction> {
        let id = self
            .replay
            .reserve_id(&params.source_chain, &params.sender, params.nonce)?;

        let tx = Transaction {
            id,
            source_chain: params.source_chain,
            dest_chain: params.dest_chain,
            sender: params.sender,
            receiver: params.receiver,
            token: params.token,
            gross_amount: params.quote.gross_amount,
            fee: params.quote.fee,
            net_amount: params.quote.net_amount,
            nonce: params.nonce,
            status: TransactionStatus::Initiated,
            created_at: params.created_at,
            expires_at: params.created_at.saturating_add(params.timeout_secs),
            completed_at: None,
            refunded_at: None,
            attestations: BTreeSet::new(),
        };

        self.transactions
            .lock(&id)
            .insert(id, Arc::new(Mutex::new(tx.clone())));
        debug!(tx_id = %id, nonce = tx.nonce, "Transaction created");
        Ok(tx)
    }

    pub fn get(&self, id: &TxId) -> BridgeResult<Transaction> {
        let entry = self.entry(id)?;
        let tx = Self::lock(&entry);
        Ok(tx.clone())
    }

    /// Record `validator`'s attestation for `id`.
    ///
    /// Duplicate detection is delegated to the replay guard. A completed
    /// transaction accepts late attestations as no-ops; refunded or timed-out
    /// transactions reject them.
    pub fn apply_attestation(
        &self,
        id: &TxId,
        validator: &Address,
        now: Timestamp,
    ) -> BridgeResult<AttestationApplied> {
        let entry = self.entry(id)?;
        let mut tx = Self::lock(&entry);

        match tx.status {
            TransactionStatus::Completed => {
                if tx.attestations.contains(validator) {
                    return Err(BridgeError::DuplicateAttestation {
                        id: *id,
                        validator: validator.clone(),
                    });
                }
                return Ok(AttestationApplied::AlreadyCompleted);
            }
            TransactionStatus::Refunded => {
                return Err(BridgeError::AlreadyTerminal {
                    id: *id,
                    status: tx.status,
                });
            }
            TransactionStatus::Refundable => {
                return Err(BridgeError::TransactionExpired { id: *id });
            }
            TransactionStatus::Initiated | TransactionStatus::Attesting => {}
        }

        if tx.is_expired(now) {
            return Err(BridgeError::TransactionExpired { id: *id });
        }

        self.replay.record_attestation(id, validator)?;
        tx.attestations.insert(validator.clone());
        if tx.status == TransactionStatus::Initiated {
            tx.status = TransactionStatus::Attesting;
        }
        Ok(AttestationApplied::Recorded)
    }

    /// Complete `id` if it is still open and `threshold_met` holds.
    ///
    /// The check and the transition happen under the transaction lock, so
    /// for a given transaction exactly one call ever returns `Some`.
    pub fn try_complete(
        &self,
        id: &TxId,
        now: Timestamp,
        threshold_met: impl FnOnce(&Transaction) -> bool,
    ) -> BridgeResult<Option<Transaction>> {
        let entry = self.entry(id)?;
        let mut tx = Self::lock(&entry);

        if !tx.status.is_open() || tx.is_expired(now) || !threshold_met(&tx) {
            return Ok(None);
        }

        tx.status = TransactionStatus::Completed;
        tx.completed_at = Some(now);
        info!(tx_id = %id, attestations = tx.attestations.len(), "Transaction completed");
        Ok(Some(tx.clone()))
    }

    /// Move a timed-out open transaction to `Refundable`.
    ///
    /// Returns `false` if it already was refundable.
    pub fn mark_refundable(&self, id: &TxId, now: Timestamp) -> BridgeResult<bool> {
        let entry = self.entry(id)?;
        let mut tx = Self::lock(&entry);

        match tx.status {
            TransactionStatus::Refundable => Ok(false),
            TransactionStatus::Completed | TransactionStatus::Refunded => {
                Err(BridgeError::AlreadyTerminal {
                    id: *id,
                    status: tx.status,
                })
            }
            TransactionStatus::Initiated | TransactionStatus::Attesting => {
                if !tx.is_expired(now) {
                    return Err(BridgeError::TimeoutNotElapsed {
                        remaining_seconds: tx.expires_at - now + 1,
                    });
                }
                tx.status = TransactionStatus::Refundable;
                debug!(tx_id = %id, "Transaction refundable");
                Ok(true)
            }
        }
    }

    /// Move a timed-out transaction to `Refunded`. Succeeds at most once.
    pub fn mark_refunded(&self, id: &TxId, now: Timestamp) -> BridgeResult<Transaction> {
        let entry = self.entry(id)?;
        let mut tx = Self::lock(&entry);

        if !tx.status.is_refund_eligible() {
            return Err(BridgeError::AlreadyTerminal {
                id: *id,
                status: tx.status,
            });
        }
        if !tx.is_expired(now) {
            return Err(BridgeError::TimeoutNotElapsed {
                remaining_seconds: tx.expires_at - now + 1,
            });
        }

        tx.status = TransactionStatus::Refunded;
        tx.refunded_at = Some(now);
        info!(tx_id = %id, "Transaction refunded");
        Ok(tx.clone())
    }

    /// Snapshot of every transaction, unordered
    pub fn snapshot(&self) -> Vec<Transaction> {
        let mut out = Vec::with_capacity(self.transactions.len());
        self.transactions
            .for_each(|_, entry| out.push(Self::lock(entry).clone()));
        out
    }

    /// Non-terminal transactions, oldest first
    pub fn active(&self) -> Vec<Transaction> {
        let mut out = Vec::new();
        self.transactions.for_each(|_, entry| {
            let tx = Self::lock(entry);
            if !tx.status.is_terminal() {
                out.push(tx.clone());
            }
        });
        out.sort_by_key(|tx| (tx.created_at, tx.id));
        out
    }

    /// IDs of open transactions past their timeout
    pub fn expired(&self, now: Timestamp) -> Vec<TxId> {
        let mut out = Vec::new();
        self.transactions.for_each(|id, entry| {
            let tx = Self::lock(entry);
            if tx.status.is_open() && tx.is_expired(now) {
                out.push(*id);
            }
        });
        out
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: Timestamp = 1_700_000_000;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn new_tx(nonce: u64) -> NewTransaction {
        NewTransaction {
            source_chain: ChainId::from_u32(1),
            dest_chain: ChainId::from_u32(2),
            sender: addr("alice"),
            receiver: addr("bob"),
            token: addr("0x00000000000000000000000000000000000000f0"),
            nonce,
            quote: FeeQuote {
                gross_amount: 1000,
                fee: 25,
                net_amount: 975,
            },
            created_at: T0,
            timeout_secs: 3600,
        }
    }

    #[test]
    fn test_create_sets_initiated() {
        let ledger = TransactionLedger::default();
        let tx = ledger.create(new_tx(1)).unwrap();

        assert_eq!(tx.status, TransactionStatus::Initiated);
        assert_eq!(tx.net_amount + tx.fee, tx.gross_amount);
        assert_eq!(tx.expires_at, T0 + 3600);
        assert!(tx.attestations.is_empty());
        assert_eq!(ledger.get(&tx.id).unwrap(), tx);
    }

    #[test]
    fn test_create_duplicate_rejected() {
        let ledger = TransactionLedger::default();
        let tx = ledger.create(new_tx(1)).unwrap();
        assert_eq!(
            ledger.create(new_tx(1)),
            Err(BridgeError::DuplicateTransaction { id: tx.id })
        );
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_apply_attestation_moves_to_attesting() {
        let ledger = TransactionLedger::default();
        let tx = ledger.create(new_tx(1)).unwrap();

        let applied = ledger.apply_attestation(&tx.id, &addr("v1"), T0 + 5).unwrap();
        assert_eq!(applied, AttestationApplied::Recorded);

        let tx = ledger.get(&tx.id).unwrap();
        assert_eq!(tx.status, TransactionStatus::Attesting);
        assert!(tx.attestations.contains(&addr("v1")));
    }

    #[test]
    fn test_apply_attestation_duplicate() {
        let ledger = TransactionLedger::default();
        let tx = ledger.create(new_tx(1)).unwrap();

        ledger.apply_attestation(&tx.id, &addr("v1"), T0).unwrap();
        assert!(matches!(
            ledger.apply_attestation(&tx.id, &addr("v1"), T0),
            Err(BridgeError::DuplicateAttestation { .. })
        ));
        assert_eq!(ledger.get(&tx.id).unwrap().attestations.len(), 1);
    }

    #[test]
    fn test_apply_attestation_after_expiry() {
        let ledger = TransactionLedger::default();
        let tx = ledger.create(new_tx(1)).unwrap();

        assert_eq!(
            ledger.apply_attestation(&tx.id, &addr("v1"), T0 + 3601),
            Err(BridgeError::TransactionExpired { id: tx.id })
        );
        // Exactly at the timeout the transaction is still open
        assert!(ledger.apply_attestation(&tx.id, &addr("v1"), T0 + 3600).is_ok());
    }

    #[test]
    fn test_try_complete_exactly_once() {
        let ledger = TransactionLedger::default();
        let tx = ledger.create(new_tx(1)).unwrap();
        ledger.apply_attestation(&tx.id, &addr("v1"), T0).unwrap();

        assert!(ledger.try_complete(&tx.id, T0, |_| false).unwrap().is_none());

        let completed = ledger.try_complete(&tx.id, T0 + 1, |_| true).unwrap().unwrap();
        assert_eq!(completed.status, TransactionStatus::Completed);
        assert_eq!(completed.completed_at, Some(T0 + 1));

        assert!(ledger.try_complete(&tx.id, T0 + 2, |_| true).unwrap().is_none());
    }

    #[test]
    fn test_completed_accepts_late_attestation_as_noop() {
        let ledger = TransactionLedger::default();
        let tx = ledger.create(new_tx(1)).unwrap();
        ledger.apply_attestation(&tx.id, &addr("v1"), T0).unwrap();
        ledger.try_complete(&tx.id, T0, |_| true).unwrap();

        assert_eq!(
            ledger.apply_attestation(&tx.id, &addr("v2"), T0).unwrap(),
            AttestationApplied::AlreadyCompleted
        );
        let tx = ledger.get(&tx.id).unwrap();
        assert_eq!(tx.attestations.len(), 1);
        assert_eq!(tx.status, TransactionStatus::Completed);
    }

    #[test]
    fn test_refund_flow() {
        let ledger = TransactionLedger::default();
        let tx = ledger.create(new_tx(1)).unwrap();

        assert_eq!(
            ledger.mark_refunded(&tx.id, T0 + 3600).unwrap_err(),
            BridgeError::TimeoutNotElapsed {
                remaining_seconds: 1
            }
        );

        assert!(ledger.mark_refundable(&tx.id, T0 + 3601).unwrap());
        assert!(!ledger.mark_refundable(&tx.id, T0 + 3602).unwrap());

        let refunded = ledger.mark_refunded(&tx.id, T0 + 3602).unwrap();
        assert_eq!(refunded.status, TransactionStatus::Refunded);
        assert_eq!(refunded.refunded_at, Some(T0 + 3602));

        assert_eq!(
            ledger.mark_refunded(&tx.id, T0 + 3603).unwrap_err(),
            BridgeError::AlreadyTerminal {
                id: tx.id,
                status: TransactionStatus::Refunded
            }
        );
    }

    #[test]
    fn test_refund_never_from_completed() {
        let ledger = TransactionLedger::default();
        let tx = ledger.create(new_tx(1)).unwrap();
        ledger.try_complete(&tx.id, T0, |_| true).unwrap();

        assert!(matches!(
            ledger.mark_refunded(&tx.id, T0 + 10_000),
            Err(BridgeError::AlreadyTerminal { .. })
        ));
        assert!(matches!(
            ledger.mark_refundable(&tx.id, T0 + 10_000),
            Err(BridgeError::AlreadyTerminal { .. })
        ));
    }

    #[test]
    fn test_no_completion_after_expiry() {
        let ledger = TransactionLedger::default();
        let tx = ledger.create(new_tx(1)).unwrap();
        assert!(ledger
            .try_complete(&tx.id, T0 + 3601, |_| true)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_active_and_expired_views() {
        let ledger = TransactionLedger::default();
        let a = ledger.create(new_tx(1)).unwrap();
        let b = ledger.create(new_tx(2)).unwrap();
        ledger.try_complete(&b.id, T0, |_| true).unwrap();

        let active: Vec<TxId> = ledger.active().iter().map(|t| t.id).collect();
        assert_eq!(active, vec![a.id]);

        assert!(ledger.expired(T0 + 3600).is_empty());
        assert_eq!(ledger.expired(T0 + 3601), vec![a.id]);
        assert_eq!(ledger.snapshot().len(), 2);
    }

    #[test]
    fn test_unknown_id() {
        let ledger = TransactionLedger::default();
        let id = TxId([1u8; 32]);
        assert_eq!(ledger.get(&id), Err(BridgeError::NotFound { id }));
        assert_eq!(
            ledger.apply_attestation(&id, &addr("v1"), T0),
            Err(BridgeError::NotFound { id })
        );
    }
}
