//! Event monitor
//!
//! The coordinator emits events synchronously; [`BroadcastSink`] forwards
//! them onto a tokio broadcast channel and [`EventMonitor`] consumes that
//! channel to log each event and keep the per-type counters.

use std::sync::Arc;

use bridge_core::{BridgeEvent, EventRecord, EventSink};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::server::Metrics;

/// Capacity of the event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

pub struct BroadcastSink {
    tx: broadcast::Sender<EventRecord>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, record: &EventRecord) {
        // No subscribers is fine
        let _ = self.tx.send(record.clone());
    }
}

pub struct EventMonitor {
    rx: broadcast::Receiver<EventRecord>,
    metrics: Arc<Metrics>,
}

impl EventMonitor {
    pub fn new(rx: broadcast::Receiver<EventRecord>, metrics: Arc<Metrics>) -> Self {
        Self { rx, metrics }
    }

    /// Main run loop
    pub async fn run(&mut self, mut shutdown: mpsc::Receiver<()>) -> eyre::Result<()> {
        info!("Event monitor starting");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
                received = self.rx.recv() => match received {
                    Ok(record) => self.observe(&record),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event monitor lagged behind");
                        self.metrics.events_lagged_total.inc_by(skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Event channel closed");
                        break;
                    }
                },
            }
        }

        Ok(())
    }

    fn observe(&self, record: &EventRecord) {
        self.metrics
            .events_total
            .with_label_values(&[record.event.name()])
            .inc();

        let sequence = record.sequence;
        match &record.event {
            BridgeEvent::TransactionInitiated {
                id, dest, amount, ..
            } => {
                info!(sequence, tx_id = %id, dest_chain = %dest, amount = %amount, "Transaction initiated");
            }
            BridgeEvent::TransactionCompleted { id, net_amount, .. } => {
                info!(sequence, tx_id = %id, net_amount = %net_amount, "Transaction completed");
            }
            BridgeEvent::TransactionRefundable { id } => {
                info!(sequence, tx_id = %id, "Transaction refundable");
            }
            BridgeEvent::TransactionRefunded { id } => {
                info!(sequence, tx_id = %id, "Transaction refunded");
            }
            BridgeEvent::Paused => {
                self.metrics.paused.set(1);
                warn!(sequence, "Bridge paused");
            }
            BridgeEvent::Unpaused => {
                self.metrics.paused.set(0);
                info!(sequence, "Bridge unpaused");
            }
            other => debug!(sequence, event = other.name(), "Bridge event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::{Address, ChainId, TxId};
    use std::time::Duration;

    fn record(sequence: u64, event: BridgeEvent) -> EventRecord {
        EventRecord {
            sequence,
            emitted_at: 1_000,
            event,
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let sink = BroadcastSink::new(4);
        sink.emit(&record(1, BridgeEvent::Paused));
    }

    #[tokio::test]
    async fn test_monitor_counts_events() {
        let sink = BroadcastSink::new(16);
        let metrics = Arc::new(Metrics::new());
        let mut monitor = EventMonitor::new(sink.subscribe(), metrics.clone());

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let handle = tokio::spawn(async move { monitor.run(shutdown_rx).await });

        sink.emit(&record(1, BridgeEvent::Paused));
        sink.emit(&record(
            2,
            BridgeEvent::ChainConfigured {
                chain_id: ChainId::from_u32(56),
                active: true,
            },
        ));
        sink.emit(&record(
            3,
            BridgeEvent::TransactionAttested {
                id: TxId([7u8; 32]),
                validator: Address::new("v1").unwrap(),
                attested_weight: 1,
                threshold: 2,
            },
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).await.unwrap();
        handle.await.unwrap().unwrap();

        assert_eq!(metrics.paused.get(), 1);
        assert_eq!(
            metrics.events_total.with_label_values(&["paused"]).get(),
            1
        );
        assert_eq!(
            metrics
                .events_total
                .with_label_values(&["chain_configured"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .events_total
                .with_label_values(&["transaction_attested"])
                .get(),
            1
        );
    }
}
