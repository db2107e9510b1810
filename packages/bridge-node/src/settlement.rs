//! Settlement handoff
//!
//! The node does not hold chain keys. Release and refund triggers are logged
//! and counted; a writer process tails the event stream and submits the
//! actual chain transactions.

use std::sync::Arc;

use bridge_core::{Settlement, Transaction};
use tracing::info;

use crate::server::Metrics;

pub struct LoggingSettlement {
    metrics: Arc<Metrics>,
}

impl LoggingSettlement {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

impl Settlement for LoggingSettlement {
    fn release(&self, tx: &Transaction) {
        self.metrics.releases_total.inc();
        info!(
            tx_id = %tx.id,
            dest_chain = %tx.dest_chain,
            receiver = %tx.receiver,
            token = %tx.token,
            net_amount = %tx.net_amount,
            "Release triggered"
        );
    }

    fn refund(&self, tx: &Transaction) {
        self.metrics.refunds_total.inc();
        info!(
            tx_id = %tx.id,
            source_chain = %tx.source_chain,
            sender = %tx.sender,
            amount = %tx.gross_amount,
            "Refund triggered"
        );
    }
}
