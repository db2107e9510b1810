//! Genesis bootstrap
//!
//! Initial chains, validators and threshold, applied once at startup through
//! the coordinator's admin operations.
//!
//! ```json
//! {
//!   "chains": [
//!     { "chain_id": 56, "counterpart_address": "0x...", "active": true,
//!       "required_confirmations": 15, "daily_volume_limit": 0 }
//!   ],
//!   "validators": [ { "address": "0x...", "weight": 1 } ],
//!   "threshold": 2
//! }
//! ```

use bridge_core::{Address, Amount, BridgeCoordinator, ChainId, ChainUpdate};
use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct GenesisChain {
    pub chain_id: ChainId,
    pub counterpart_address: Address,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub required_confirmations: u32,
    /// 0 = unlimited
    #[serde(default)]
    pub daily_volume_limit: Amount,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenesisValidator {
    pub address: Address,
    pub weight: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Genesis {
    #[serde(default)]
    pub chains: Vec<GenesisChain>,
    #[serde(default)]
    pub validators: Vec<GenesisValidator>,
    #[serde(default)]
    pub threshold: u64,
}

impl Genesis {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).wrap_err("Invalid genesis JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read genesis file {}", path.display()))?;
        Self::from_json(&raw)
    }

    /// Register every chain and install the validator set
    pub fn apply(&self, bridge: &BridgeCoordinator, admin: &Address) -> Result<()> {
        for chain in &self.chains {
            bridge
                .configure_chain(
                    admin,
                    chain.chain_id,
                    ChainUpdate {
                        counterpart_address: chain.counterpart_address.clone(),
                        active: chain.active,
                        required_confirmations: chain.required_confirmations,
                        daily_volume_limit: chain.daily_volume_limit,
                    },
                )
                .map_err(|e| eyre!("Genesis chain {}: {}", chain.chain_id, e))?;
        }

        if !self.validators.is_empty() {
            let set: Vec<(Address, u32)> = self
                .validators
                .iter()
                .map(|v| (v.address.clone(), v.weight))
                .collect();
            bridge
                .set_validators(admin, &set, self.threshold)
                .map_err(|e| eyre!("Genesis validator set: {}", e))?;
        }

        info!(
            chains = self.chains.len(),
            validators = self.validators.len(),
            threshold = self.threshold,
            "Genesis applied"
        );
        Ok(())
    }
}
