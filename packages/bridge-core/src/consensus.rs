//! Validator Consensus
//!
//! Weighted validator set and threshold. A transaction is approved once the
//! summed weight of *currently active* validators among its attesters reaches
//! the threshold, so removing a validator mid-flight discounts its earlier
//! attestations.
//!
//! Every configuration change is validated as a whole before it is applied:
//! after any successful call the threshold is positive and no greater than
//! the total active weight.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

use crate::error::{BridgeError, BridgeResult};
use crate::types::Address;

/// Validator entry; removed validators stay in the set as inactive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub address: Address,
    pub weight: u32,
    pub active: bool,
}

/// Snapshot of the validator configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSet {
    pub validators: Vec<Validator>,
    pub threshold: u64,
    pub total_active_weight: u64,
}

#[derive(Debug, Clone, Default)]
struct State {
    validators: BTreeMap<Address, Validator>,
    /// 0 until the set is first configured; nothing is approved meanwhile
    threshold: u64,
}

impl State {
    fn total_active_weight(&self) -> u64 {
        self.validators
            .values()
            .filter(|v| v.active)
            .map(|v| v.weight as u64)
            .sum()
    }

    fn check(&self) -> BridgeResult<()> {
        if self.threshold == 0 {
            return Err(BridgeError::InvalidValidatorSet {
                reason: "threshold must be greater than zero".to_string(),
            });
        }
        let total = self.total_active_weight();
        if total < self.threshold {
            return Err(BridgeError::InvalidValidatorSet {
                reason: format!(
                    "total active weight {} is below threshold {}",
                    total, self.threshold
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ValidatorConsensus {
    state: RwLock<State>,
}

impl ValidatorConsensus {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `change` to a copy of the state and commit it only if the
    /// result is valid.
    fn update(&self, change: impl FnOnce(&mut State) -> BridgeResult<()>) -> BridgeResult<()> {
        let mut state = self.write();
        let mut next = state.clone();
        change(&mut next)?;
        next.check()?;
        *state = next;
        Ok(())
    }

    /// Replace the active set and threshold in one step.
    ///
    /// Validators missing from `validators` are kept as inactive.
    pub fn set_validators(&self, validators: &[(Address, u32)], threshold: u64) -> BridgeResult<()> {
        let mut seen = BTreeSet::new();
        for (address, weight) in validators {
            if *weight == 0 {
                return Err(BridgeError::InvalidValidatorSet {
                    reason: format!("validator {} has zero weight", address),
                });
            }
            if !seen.insert(address) {
                return Err(BridgeError::InvalidValidatorSet {
                    reason: format!("validator {} listed twice", address),
                });
            }
        }

        self.update(|state| {
            for v in state.validators.values_mut() {
                v.active = false;
            }
            for (address, weight) in validators {
                state.validators.insert(
                    address.clone(),
                    Validator {
                        address: address.clone(),
                        weight: *weight,
                        active: true,
                    },
                );
            }
            state.threshold = threshold;
            Ok(())
        })?;

        info!(
            validators = validators.len(),
            threshold, "Validator set replaced"
        );
        Ok(())
    }

    /// Add a validator, or reactivate a removed one with a new weight
    pub fn add_validator(&self, address: Address, weight: u32) -> BridgeResult<()> {
        if weight == 0 {
            return Err(BridgeError::InvalidValidatorSet {
                reason: format!("validator {} has zero weight", address),
            });
        }
        self.update(|state| {
            if state.validators.get(&address).is_some_and(|v| v.active) {
                return Err(BridgeError::InvalidValidatorSet {
                    reason: format!("validator {} already active", address),
                });
            }
            state.validators.insert(
                address.clone(),
                Validator {
                    address: address.clone(),
                    weight,
                    active: true,
                },
            );
            Ok(())
        })?;
        info!(validator = %address, weight, "Validator added");
        Ok(())
    }

    /// Deactivate a validator; fails if the remaining weight would fall
    /// below the threshold.
    pub fn remove_validator(&self, address: &Address) -> BridgeResult<()> {
        self.update(|state| match state.validators.get_mut(address) {
            Some(v) if v.active => {
                v.active = false;
                Ok(())
            }
            _ => Err(BridgeError::UnknownValidator {
                validator: address.clone(),
            }),
        })?;
        info!(validator = %address, "Validator removed");
        Ok(())
    }

    pub fn set_threshold(&self, threshold: u64) -> BridgeResult<()> {
        self.update(|state| {
            state.threshold = threshold;
            Ok(())
        })?;
        info!(threshold, "Threshold updated");
        Ok(())
    }

    pub fn threshold(&self) -> u64 {
        self.read().threshold
    }

    pub fn is_active_validator(&self, address: &Address) -> bool {
        self.read()
            .validators
            .get(address)
            .is_some_and(|v| v.active)
    }

    pub fn ensure_active_validator(&self, address: &Address) -> BridgeResult<()> {
        if self.is_active_validator(address) {
            Ok(())
        } else {
            Err(BridgeError::UnknownValidator {
                validator: address.clone(),
            })
        }
    }

    /// Summed active weight of `attesters` and the threshold, read from
    /// one configuration snapshot
    pub fn tally(&self, attesters: &BTreeSet<Address>) -> (u64, u64) {
        let state = self.read();
        let weight = attesters
            .iter()
            .filter_map(|a| state.validators.get(a))
            .filter(|v| v.active)
            .map(|v| v.weight as u64)
            .sum();
        (weight, state.threshold)
    }

    /// Summed weight of the active validators in `attesters`
    pub fn attested_weight(&self, attesters: &BTreeSet<Address>) -> u64 {
        self.tally(attesters).0
    }

    /// Whether `attesters` carry enough active weight to approve a release
    pub fn evaluate(&self, attesters: &BTreeSet<Address>) -> bool {
        let (weight, threshold) = self.tally(attesters);
        threshold > 0 && weight >= threshold
    }

    pub fn snapshot(&self) -> ValidatorSet {
        let state = self.read();
        ValidatorSet {
            validators: state.validators.values().cloned().collect(),
            threshold: state.threshold,
            total_active_weight: state.total_active_weight(),
        }
    }
}
