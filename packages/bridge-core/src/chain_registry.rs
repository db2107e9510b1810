//! Chain Registry
//!
//! Per-chain configuration, activity flag and daily volume window.
//!
//! Each chain entry has its own lock, so volume reservations for different
//! chains never contend and two reservations for the same chain are applied
//! one after the other.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::debug;

use crate::error::{BridgeError, BridgeResult};
use crate::types::{Address, Amount, ChainId, Timestamp};

/// Volume window length in seconds (24 hours)
pub const VOLUME_WINDOW_SECONDS: u64 = 86_400;

/// Supported chain configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: ChainId,
    /// Bridge contract on the counterpart chain
    pub counterpart_address: Address,
    /// Inactive chains reject new transactions; in-flight ones are unaffected
    pub active: bool,
    /// Source-chain confirmations validators wait for before attesting
    pub required_confirmations: u32,
    /// Maximum gross volume per 24h window (0 = unlimited)
    pub daily_volume_limit: Amount,
    /// Volume reserved in the current window
    pub volume_used_today: Amount,
    /// Start of the current window
    pub window_start: Timestamp,
}

impl ChainConfig {
    /// Window state as seen at `now`, rolled forward if it has expired
    fn rolled(&self, now: Timestamp) -> (Timestamp, Amount) {
        if now >= self.window_start.saturating_add(VOLUME_WINDOW_SECONDS) {
            (now, 0)
        } else {
            (self.window_start, self.volume_used_today)
        }
    }

    /// Volume still available in the window at `now`; `None` when unlimited
    pub fn remaining_volume(&self, now: Timestamp) -> Option<Amount> {
        if self.daily_volume_limit == 0 {
            return None;
        }
        let (_, used) = self.rolled(now);
        Some(self.daily_volume_limit.saturating_sub(used))
    }
}

/// Parameters of a configure-chain call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainUpdate {
    pub counterpart_address: Address,
    pub active: bool,
    pub required_confirmations: u32,
    pub daily_volume_limit: Amount,
}

/// Receipt for volume reserved by [`ChainRegistry::check_and_reserve_volume`]
///
/// Handed back to [`ChainRegistry::release_volume`] when the transaction it
/// was reserved for is not created after all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeReservation {
    pub chain_id: ChainId,
    pub amount: Amount,
    pub window_start: Timestamp,
}

#[derive(Debug, Default)]
pub struct ChainRegistry {
    chains: RwLock<BTreeMap<ChainId, Arc<Mutex<ChainConfig>>>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, chain_id: &ChainId) -> Option<Arc<Mutex<ChainConfig>>> {
        self.chains
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(chain_id)
            .cloned()
    }

    /// Insert or update a chain.
    ///
    /// Updating keeps the current window usage so that toggling a chain or
    /// raising its limit does not reset the daily volume.
    pub fn configure_chain(
        &self,
        chain_id: ChainId,
        update: ChainUpdate,
        now: Timestamp,
    ) -> ChainConfig {
        let mut chains = self.chains.write().unwrap_or_else(PoisonError::into_inner);

        match chains.get(&chain_id) {
            Some(existing) => {
                let mut config = existing.lock().unwrap_or_else(PoisonError::into_inner);
                config.counterpart_address = update.counterpart_address;
                config.active = update.active;
                config.required_confirmations = update.required_confirmations;
                config.daily_volume_limit = update.daily_volume_limit;
                debug!(chain_id = %chain_id, active = config.active, "Chain updated");
                config.clone()
            }
            None => {
                let config = ChainConfig {
                    chain_id,
                    counterpart_address: update.counterpart_address,
                    active: update.active,
                    required_confirmations: update.required_confirmations,
                    daily_volume_limit: update.daily_volume_limit,
                    volume_used_today: 0,
                    window_start: now,
                };
                chains.insert(chain_id, Arc::new(Mutex::new(config.clone())));
                debug!(chain_id = %chain_id, active = config.active, "Chain registered");
                config
            }
        }
    }

    pub fn is_active(&self, chain_id: &ChainId) -> bool {
        self.entry(chain_id)
            .map(|c| c.lock().unwrap_or_else(PoisonError::into_inner).active)
            .unwrap_or(false)
    }

    /// Fail unless the chain is configured and active
    pub fn ensure_active(&self, chain_id: &ChainId) -> BridgeResult<()> {
        let entry = self
            .entry(chain_id)
            .ok_or(BridgeError::ChainNotConfigured {
                chain_id: *chain_id,
            })?;
        if !entry.lock().unwrap_or_else(PoisonError::into_inner).active {
            return Err(BridgeError::ChainInactive {
                chain_id: *chain_id,
            });
        }
        Ok(())
    }

    /// Reserve `amount` of the chain's daily volume.
    ///
    /// Rolls the window forward once `window_start + 24h` has passed. Fails
    /// on the reservation that would take usage above the limit, leaving
    /// usage unchanged.
    pub fn check_and_reserve_volume(
        &self,
        chain_id: &ChainId,
        amount: Amount,
        now: Timestamp,
    ) -> BridgeResult<VolumeReservation> {
        let entry = self
            .entry(chain_id)
            .ok_or(BridgeError::ChainNotConfigured {
                chain_id: *chain_id,
            })?;
        let mut config = entry.lock().unwrap_or_else(PoisonError::into_inner);

        let (window_start, used) = config.rolled(now);
        if window_start != config.window_start {
            debug!(chain_id = %chain_id, window_start, "Volume window rolled");
            config.window_start = window_start;
            config.volume_used_today = used;
        }

        let new_used = used.checked_add(amount).ok_or(BridgeError::InvalidAmount {
            reason: "volume overflow".to_string(),
        })?;
        if config.daily_volume_limit != 0 && new_used > config.daily_volume_limit {
            return Err(BridgeError::VolumeExceeded {
                chain_id: *chain_id,
                limit: config.daily_volume_limit,
                used,
                requested: amount,
            });
        }

        config.volume_used_today = new_used;
        Ok(VolumeReservation {
            chain_id: *chain_id,
            amount,
            window_start,
        })
    }

    /// Return a reservation whose transaction was not created.
    ///
    /// A no-op once the window the volume was reserved in has rolled over.
    pub fn release_volume(&self, reservation: VolumeReservation) {
        let Some(entry) = self.entry(&reservation.chain_id) else {
            return;
        };
        let mut config = entry.lock().unwrap_or_else(PoisonError::into_inner);
        if config.window_start == reservation.window_start {
            config.volume_used_today = config.volume_used_today.saturating_sub(reservation.amount);
        }
    }

    pub fn get(&self, chain_id: &ChainId) -> Option<ChainConfig> {
        self.entry(chain_id)
            .map(|c| c.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    /// All chains ordered by chain ID
    pub fn chains(&self) -> Vec<ChainConfig> {
        self.chains
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|c| c.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect()
    }

    pub fn chain_count(&self) -> usize {
        self.chains
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: Timestamp = 1_700_000_000;

    fn update(active: bool, limit: Amount) -> ChainUpdate {
        ChainUpdate {
            counterpart_address: Address::new("0x00000000000000000000000000000000000000b1").unwrap(),
            active,
            required_confirmations: 12,
            daily_volume_limit: limit,
        }
    }

    fn registry_with(chain: u32, active: bool, limit: Amount) -> ChainRegistry {
        let registry = ChainRegistry::new();
        let _ = registry.configure_chain(ChainId::from_u32(chain), update(active, limit), T0);
        registry
    }

    #[test]
    fn test_configure_and_query() {
        let registry = registry_with(1, true, 1000);
        let chain = ChainId::from_u32(1);

        assert!(registry.is_active(&chain));
        assert!(!registry.is_active(&ChainId::from_u32(2)));
        assert_eq!(registry.chain_count(), 1);

        let config = registry.get(&chain).unwrap();
        assert_eq!(config.required_confirmations, 12);
        assert_eq!(config.window_start, T0);
        assert_eq!(config.volume_used_today, 0);
    }

    #[test]
    fn test_ensure_active_errors() {
        let registry = registry_with(1, false, 1000);

        assert_eq!(
            registry.ensure_active(&ChainId::from_u32(1)),
            Err(BridgeError::ChainInactive {
                chain_id: ChainId::from_u32(1)
            })
        );
        assert_eq!(
            registry.ensure_active(&ChainId::from_u32(9)),
            Err(BridgeError::ChainNotConfigured {
                chain_id: ChainId::from_u32(9)
            })
        );
    }

    #[test]
    fn test_reconfigure_keeps_window_usage() {
        let registry = registry_with(1, true, 1000);
        let chain = ChainId::from_u32(1);

        let _ = registry.check_and_reserve_volume(&chain, 400, T0 + 10).unwrap();
        let config = registry.configure_chain(chain, update(false, 2000), T0 + 20);

        assert!(!config.active);
        assert_eq!(config.daily_volume_limit, 2000);
        assert_eq!(config.volume_used_today, 400);
        assert_eq!(config.window_start, T0);
    }

    #[test]
    fn test_volume_fails_on_crossing_transaction() {
        let registry = registry_with(1, true, 1000);
        let chain = ChainId::from_u32(1);

        registry.check_and_reserve_volume(&chain, 600, T0).unwrap();
        registry.check_and_reserve_volume(&chain, 400, T0).unwrap(); // exactly at limit

        let err = registry.check_and_reserve_volume(&chain, 1, T0).unwrap_err();
        assert_eq!(
            err,
            BridgeError::VolumeExceeded {
                chain_id: chain,
                limit: 1000,
                used: 1000,
                requested: 1,
            }
        );
        assert_eq!(registry.get(&chain).unwrap().volume_used_today, 1000);
    }

    #[test]
    fn test_volume_window_rolls_after_24h() {
        let registry = registry_with(1, true, 1000);
        let chain = ChainId::from_u32(1);

        registry.check_and_reserve_volume(&chain, 1000, T0).unwrap();
        assert!(registry
            .check_and_reserve_volume(&chain, 1, T0 + VOLUME_WINDOW_SECONDS - 1)
            .is_err());

        let reservation = registry
            .check_and_reserve_volume(&chain, 700, T0 + VOLUME_WINDOW_SECONDS)
            .unwrap();
        assert_eq!(reservation.window_start, T0 + VOLUME_WINDOW_SECONDS);

        let config = registry.get(&chain).unwrap();
        assert_eq!(config.volume_used_today, 700);
        assert_eq!(config.remaining_volume(T0 + VOLUME_WINDOW_SECONDS), Some(300));
    }

    #[test]
    fn test_zero_limit_is_unlimited() {
        let registry = registry_with(1, true, 0);
        let chain = ChainId::from_u32(1);

        registry
            .check_and_reserve_volume(&chain, u128::MAX / 2, T0)
            .unwrap();
        assert_eq!(registry.get(&chain).unwrap().remaining_volume(T0), None);
    }

    #[test]
    fn test_release_volume() {
        let registry = registry_with(1, true, 1000);
        let chain = ChainId::from_u32(1);

        let reservation = registry.check_and_reserve_volume(&chain, 800, T0).unwrap();
        registry.release_volume(reservation);
        assert_eq!(registry.get(&chain).unwrap().volume_used_today, 0);

        // Release after the window rolled leaves the new window untouched
        let stale = registry.check_and_reserve_volume(&chain, 800, T0).unwrap();
        let _ = registry
            .check_and_reserve_volume(&chain, 100, T0 + VOLUME_WINDOW_SECONDS)
            .unwrap();
        registry.release_volume(stale);
        assert_eq!(registry.get(&chain).unwrap().volume_used_today, 100);
    }

    #[test]
    fn test_reserve_unknown_chain() {
        let registry = ChainRegistry::new();
        let result = registry.check_and_reserve_volume(&ChainId::from_u32(3), 1, T0);
        assert!(matches!(
            result,
            Err(BridgeError::ChainNotConfigured { .. })
        ));
    }

    #[test]
    fn test_chains_sorted() {
        let registry = ChainRegistry::new();
        for id in [5u32, 1, 3] {
            let _ = registry.configure_chain(ChainId::from_u32(id), update(true, 0), T0);
        }
        let ids: Vec<u32> = registry.chains().iter().map(|c| c.chain_id.to_u32()).collect();
        assert_eq!(ids, vec![1, 3, 5]);
    }
}
