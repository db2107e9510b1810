//! Bridge events
//!
//! Every state change the coordinator makes is published as a sequenced
//! [`EventRecord`] to an [`EventSink`]. Validators watch
//! `TransactionInitiated`; monitoring and report collaborators read the rest.
//!
//! Sinks are called synchronously after the state change is committed, from
//! whatever thread performed it, so they must not block.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use crate::types::{Address, Amount, ChainId, Timestamp, TxId};

/// Event kinds emitted by the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    TransactionInitiated {
        id: TxId,
        source: ChainId,
        dest: ChainId,
        sender: Address,
        receiver: Address,
        token: Address,
        amount: Amount,
        fee: Amount,
        timestamp: Timestamp,
    },
    TransactionAttested {
        id: TxId,
        validator: Address,
        attested_weight: u64,
        threshold: u64,
    },
    TransactionCompleted {
        id: TxId,
        receiver: Address,
        token: Address,
        net_amount: Amount,
    },
    TransactionRefundable {
        id: TxId,
    },
    TransactionRefunded {
        id: TxId,
    },
    ChainConfigured {
        chain_id: ChainId,
        active: bool,
    },
    ValidatorSetUpdated {
        active_validators: usize,
        total_active_weight: u64,
        threshold: u64,
    },
    FeeConfigUpdated {
        fee_bps: u32,
        min_amount: Amount,
        max_amount: Amount,
    },
    Paused,
    Unpaused,
}

impl BridgeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BridgeEvent::TransactionInitiated { .. } => "transaction_initiated",
            BridgeEvent::TransactionAttested { .. } => "transaction_attested",
            BridgeEvent::TransactionCompleted { .. } => "transaction_completed",
            BridgeEvent::TransactionRefundable { .. } => "transaction_refundable",
            BridgeEvent::TransactionRefunded { .. } => "transaction_refunded",
            BridgeEvent::ChainConfigured { .. } => "chain_configured",
            BridgeEvent::ValidatorSetUpdated { .. } => "validator_set_updated",
            BridgeEvent::FeeConfigUpdated { .. } => "fee_config_updated",
            BridgeEvent::Paused => "paused",
            BridgeEvent::Unpaused => "unpaused",
        }
    }
}

/// An event with its position in the coordinator's event stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Strictly increasing, starting at 1
    pub sequence: u64,
    pub emitted_at: Timestamp,
    #[serde(flatten)]
    pub event: BridgeEvent,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, record: &EventRecord);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _record: &EventRecord) {}
}

/// Default number of records an [`EventLog`] retains
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 10_000;

/// Bounded in-memory event log with cursor reads
///
/// When full, the oldest record is evicted. Readers that fall behind by more
/// than the capacity see a gap in sequence numbers.
#[derive(Debug)]
pub struct EventLog {
    records: Mutex<VecDeque<EventRecord>>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_LOG_CAPACITY)
    }
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Records with `sequence > after`, oldest first, at most `limit`
    pub fn events_since(&self, after: u64, limit: usize) -> Vec<EventRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records
            .iter()
            .filter(|r| r.sequence > after)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn latest_sequence(&self) -> u64 {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .map(|r| r.sequence)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for EventLog {
    fn emit(&self, record: &EventRecord) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record.clone());
    }
}

/// Delivers every record to each inner sink in order
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, record: &EventRecord) {
        for sink in &self.sinks {
            sink.emit(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sequence: u64) -> EventRecord {
        EventRecord {
            sequence,
            emitted_at: 1_000 + sequence,
            event: BridgeEvent::TransactionRefunded {
                id: TxId([sequence as u8; 32]),
            },
        }
    }

    #[test]
    fn test_event_log_cursor() {
        let log = EventLog::new(100);
        for seq in 1..=5 {
            log.emit(&record(seq));
        }

        let after_two: Vec<u64> = log.events_since(2, 100).iter().map(|r| r.sequence).collect();
        assert_eq!(after_two, vec![3, 4, 5]);
        assert_eq!(log.events_since(0, 2).len(), 2);
        assert!(log.events_since(5, 100).is_empty());
        assert_eq!(log.latest_sequence(), 5);
    }

    #[test]
    fn test_event_log_evicts_oldest() {
        let log = EventLog::new(3);
        for seq in 1..=5 {
            log.emit(&record(seq));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.events_since(0, 10)[0].sequence, 3);
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let a = Arc::new(EventLog::default());
        let b = Arc::new(EventLog::default());
        let fanout = FanoutSink::new().with(a.clone()).with(b.clone());

        fanout.emit(&record(1));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_record_serializes_flat_with_type_tag() {
        let rec = EventRecord {
            sequence: 7,
            emitted_at: 42,
            event: BridgeEvent::ChainConfigured {
                chain_id: ChainId::from_u32(56),
                active: true,
            },
        };
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["type"], "chain_configured");
        assert_eq!(json["chain_id"], 56);
        assert_eq!(json["sequence"], 7);

        let back: EventRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, rec);
        assert_eq!(back.event.name(), "chain_configured");
    }

    #[test]
    fn test_unit_variant_serializes() {
        let json = serde_json::to_value(BridgeEvent::Paused).unwrap();
        assert_eq!(json["type"], "paused");
    }
}
