//! Read-only query surface
//!
//! Aggregate snapshots consumed by monitoring and reporting. Nothing here
//! mutates state. Aggregates are computed by scanning the ledger shard by
//! shard, so a snapshot taken under load may mix states from slightly
//! different instants.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::chain_registry::ChainConfig;
use crate::consensus::ValidatorSet;
use crate::coordinator::BridgeCoordinator;
use crate::error::{BridgeError, BridgeResult};
use crate::ledger::Transaction;
use crate::types::{Amount, ChainId, Timestamp, TransactionStatus, TxId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub total_transactions: u64,
    pub completed_transactions: u64,
    /// Not yet terminal (initiated, attesting or refundable)
    pub pending_transactions: u64,
    pub refunded_transactions: u64,
    /// Gross amount of every transaction ever initiated
    pub total_volume: Amount,
    /// Fees of completed transactions
    pub total_fees: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeInfo {
    pub fee_bps: u32,
    pub min_amount: Amount,
    pub max_amount: Amount,
    pub transaction_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainStatus {
    #[serde(flatten)]
    pub config: ChainConfig,
    /// Transactions initiated towards this chain
    pub initiated_transactions: u64,
    pub completed_transactions: u64,
    /// `None` when the chain has no daily limit
    pub remaining_daily_volume: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationalStatus {
    /// Accepting user flows (not paused)
    pub operational: bool,
    pub paused: bool,
    pub local_chain_id: ChainId,
    pub uptime_seconds: u64,
    pub last_activity: Timestamp,
    pub chain_count: usize,
    pub active_chain_count: usize,
    pub threshold: u64,
    pub total_active_weight: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct ChainCounts {
    initiated: u64,
    completed: u64,
}

impl BridgeCoordinator {
    pub fn get_transaction(&self, id: &TxId) -> BridgeResult<Transaction> {
        self.ledger().get(id)
    }

    pub fn get_bridge_stats(&self) -> BridgeStats {
        let mut stats = BridgeStats::default();
        for tx in self.ledger().snapshot() {
            stats.total_transactions += 1;
            stats.total_volume = stats.total_volume.saturating_add(tx.gross_amount);
            match tx.status {
                TransactionStatus::Completed => {
                    stats.completed_transactions += 1;
                    stats.total_fees = stats.total_fees.saturating_add(tx.fee);
                }
                TransactionStatus::Refunded => stats.refunded_transactions += 1,
                TransactionStatus::Initiated
                | TransactionStatus::Attesting
                | TransactionStatus::Refundable => stats.pending_transactions += 1,
            }
        }
        stats
    }

    pub fn get_fee_info(&self) -> FeeInfo {
        let config = self.fees().config();
        FeeInfo {
            fee_bps: config.fee_bps,
            min_amount: config.min_amount,
            max_amount: config.max_amount,
            transaction_timeout_secs: self.transaction_timeout_secs(),
        }
    }

    pub fn get_chain_count(&self) -> usize {
        self.registry().chain_count()
    }

    fn chain_counts(&self) -> BTreeMap<ChainId, ChainCounts> {
        let mut counts: BTreeMap<ChainId, ChainCounts> = BTreeMap::new();
        for tx in self.ledger().snapshot() {
            let entry = counts.entry(tx.dest_chain).or_default();
            entry.initiated += 1;
            if tx.status == TransactionStatus::Completed {
                entry.completed += 1;
            }
        }
        counts
    }

    fn chain_status(&self, config: ChainConfig, counts: ChainCounts, now: Timestamp) -> ChainStatus {
        ChainStatus {
            remaining_daily_volume: config.remaining_volume(now),
            initiated_transactions: counts.initiated,
            completed_transactions: counts.completed,
            config,
        }
    }

    pub fn get_chain_status(&self, chain_id: &ChainId) -> BridgeResult<ChainStatus> {
        let config = self
            .registry()
            .get(chain_id)
            .ok_or(BridgeError::ChainNotConfigured {
                chain_id: *chain_id,
            })?;
        let counts = self
            .chain_counts()
            .get(chain_id)
            .copied()
            .unwrap_or_default();
        Ok(self.chain_status(config, counts, self.now()))
    }

    /// Status of every configured chain, ordered by chain ID
    pub fn get_all_chain_status(&self) -> Vec<ChainStatus> {
        let counts = self.chain_counts();
        let now = self.now();
        self.registry()
            .chains()
            .into_iter()
            .map(|config| {
                let c = counts.get(&config.chain_id).copied().unwrap_or_default();
                self.chain_status(config, c, now)
            })
            .collect()
    }

    /// Non-terminal transactions, oldest first
    pub fn get_active_transactions(&self) -> Vec<Transaction> {
        self.ledger().active()
    }

    pub fn get_validator_set(&self) -> ValidatorSet {
        self.consensus().snapshot()
    }

    pub fn get_operational_status(&self) -> OperationalStatus {
        let paused = self.is_paused();
        let chains = self.registry().chains();
        let validators = self.consensus().snapshot();
        OperationalStatus {
            operational: !paused,
            paused,
            local_chain_id: self.local_chain_id(),
            uptime_seconds: self.now().saturating_sub(self.started_at()),
            last_activity: self.last_activity(),
            chain_count: chains.len(),
            active_chain_count: chains.iter().filter(|c| c.active).count(),
            threshold: validators.threshold,
            total_active_weight: validators.total_active_weight,
        }
    }
}
