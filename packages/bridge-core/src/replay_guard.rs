//! Replay protection
//!
//! Tracks every transaction ID ever reserved and, per transaction, the
//! validators that already attested. Both checks are insert-if-absent under
//! the shard lock of the transaction ID, so concurrent duplicates resolve to
//! exactly one winner.

use std::collections::hash_map::Entry;
use std::collections::BTreeSet;

use crate::error::{BridgeError, BridgeResult};
use crate::hash::compute_transaction_id;
use crate::shard::{ShardedMap, DEFAULT_SHARDS};
use crate::types::{Address, ChainId, TxId};

pub struct ReplayGuard {
    /// Reserved transaction IDs -> validators that attested
    seen: ShardedMap<TxId, BTreeSet<Address>>,
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

impl ReplayGuard {
    pub fn new(shards: usize) -> Self {
        Self {
            seen: ShardedMap::new(shards),
        }
    }

    /// Derive the ID for `(source_chain, sender, nonce)` and claim it.
    ///
    /// IDs are never released, so a triple can be used at most once.
    pub fn reserve_id(
        &self,
        source_chain: &ChainId,
        sender: &Address,
        nonce: u64,
    ) -> BridgeResult<TxId> {
        let id = compute_transaction_id(source_chain, sender, nonce);
        match self.seen.lock(&id).entry(id) {
            Entry::Occupied(_) => Err(BridgeError::DuplicateTransaction { id }),
            Entry::Vacant(slot) => {
                slot.insert(BTreeSet::new());
                Ok(id)
            }
        }
    }

    pub fn is_reserved(&self, id: &TxId) -> bool {
        self.seen.lock(id).contains_key(id)
    }

    /// Record that `validator` attested `id`; a second attestation fails.
    pub fn record_attestation(&self, id: &TxId, validator: &Address) -> BridgeResult<()> {
        let mut shard = self.seen.lock(id);
        let attesters = shard.get_mut(id).ok_or(BridgeError::NotFound { id: *id })?;
        if !attesters.insert(validator.clone()) {
            return Err(BridgeError::DuplicateAttestation {
                id: *id,
                validator: validator.clone(),
            });
        }
        Ok(())
    }

    pub fn has_attested(&self, id: &TxId, validator: &Address) -> bool {
        self.seen
            .lock(id)
            .get(id)
            .is_some_and(|attesters| attesters.contains(validator))
    }

    /// Number of reserved transaction IDs
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
