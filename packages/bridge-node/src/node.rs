//! Node wiring
//!
//! Builds the coordinator from [`Config`] with the node's event sinks,
//! settlement handoff and genesis state.

use std::sync::Arc;

use bridge_core::{Address, BridgeCoordinator, EventLog, FanoutSink};
use eyre::{eyre, Result};
use tracing::{info, warn};

use crate::config::Config;
use crate::genesis::Genesis;
use crate::monitor::{BroadcastSink, EventMonitor, EVENT_CHANNEL_CAPACITY};
use crate::server::{AppState, Metrics};
use crate::settlement::LoggingSettlement;
use crate::sweeper::Sweeper;

pub struct Node {
    pub bridge: Arc<BridgeCoordinator>,
    pub events: Arc<EventLog>,
    pub broadcast: Arc<BroadcastSink>,
    pub metrics: Arc<Metrics>,
    admin_token: Arc<str>,
    watcher_token: Arc<str>,
    validator_tokens: Arc<[(Address, String)]>,
    sweep_interval_ms: u64,
}

impl Node {
    pub fn build(config: &Config) -> Result<Self> {
        let metrics = Arc::new(Metrics::new());
        let events = Arc::new(EventLog::default());
        let broadcast = Arc::new(BroadcastSink::new(EVENT_CHANNEL_CAPACITY));

        let sink = FanoutSink::new()
            .with(events.clone())
            .with(broadcast.clone());

        let bridge = BridgeCoordinator::new(config.bridge_settings()?)
            .map_err(|e| eyre!("Failed to create bridge coordinator: {}", e))?
            .with_event_sink(Arc::new(sink))
            .with_settlement(Arc::new(LoggingSettlement::new(metrics.clone())));

        if let Some(path) = &config.genesis_path {
            info!(path = %path.display(), "Applying genesis");
            Genesis::load(path)?.apply(&bridge, bridge.admin())?;
        }

        let validator_tokens = config.validator_credentials()?;
        for validator in bridge.consensus().snapshot().validators {
            if validator.active && !validator_tokens.iter().any(|(a, _)| *a == validator.address) {
                warn!(validator = %validator.address, "Validator has no API token and cannot attest");
            }
        }

        Ok(Self {
            bridge: Arc::new(bridge),
            events,
            broadcast,
            metrics,
            admin_token: Arc::from(config.admin_token.as_str()),
            watcher_token: Arc::from(config.watcher_token.as_str()),
            validator_tokens: Arc::from(validator_tokens),
            sweep_interval_ms: config.sweep_interval_ms,
        })
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            bridge: self.bridge.clone(),
            events: self.events.clone(),
            metrics: self.metrics.clone(),
            admin_token: self.admin_token.clone(),
            watcher_token: self.watcher_token.clone(),
            validator_tokens: self.validator_tokens.clone(),
        }
    }

    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(
            self.bridge.clone(),
            self.metrics.clone(),
            self.sweep_interval_ms,
        )
    }

    pub fn monitor(&self) -> EventMonitor {
        EventMonitor::new(self.broadcast.subscribe(), self.metrics.clone())
    }
}
