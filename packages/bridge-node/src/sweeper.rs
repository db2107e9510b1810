//! Timeout sweeper
//!
//! Periodically marks timed-out transactions refundable so they stop
//! accepting attestations and show up as claimable.

use std::sync::Arc;
use std::time::Duration;

use bridge_core::{BridgeCoordinator, TxId};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::server::Metrics;

pub struct Sweeper {
    bridge: Arc<BridgeCoordinator>,
    metrics: Arc<Metrics>,
    interval: Duration,
}

impl Sweeper {
    pub fn new(bridge: Arc<BridgeCoordinator>, metrics: Arc<Metrics>, interval_ms: u64) -> Self {
        Self {
            bridge,
            metrics,
            interval: Duration::from_millis(interval_ms),
        }
    }

    /// Main run loop
    pub async fn run(&mut self, mut shutdown: mpsc::Receiver<()>) -> eyre::Result<()> {
        info!(interval_ms = self.interval.as_millis() as u64, "Timeout sweeper starting");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {
                    self.sweep_once();
                }
            }
        }

        Ok(())
    }

    /// One sweep pass; returns the transactions marked refundable
    pub fn sweep_once(&self) -> Vec<TxId> {
        debug!("Sweeping expired transactions");
        let marked = self.bridge.sweep_expired();

        let stats = self.bridge.get_bridge_stats();
        self.metrics
            .pending_transactions
            .set(stats.pending_transactions as i64);
        marked
    }
}
