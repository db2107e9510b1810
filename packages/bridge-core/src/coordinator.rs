//! Bridge Coordinator
//!
//! Sequences the registry, fee engine, ledger, consensus and pause gate
//! into the three user-facing flows and the admin surface.
//!
//! ## Flows
//!
//! ```text
//! initiate:     pause -> chain active -> reserve volume -> fee -> ledger create
//!               -> TransactionInitiated
//! attest:       pause -> verify -> active validator -> record attestation
//!               -> evaluate + complete (one CAS) -> release -> TransactionCompleted
//! claim_refund: pause -> timeout elapsed -> mark refunded (one CAS) -> refund
//!               -> TransactionRefunded
//! ```
//!
//! No entry point blocks waiting for anything external; `attest` reports
//! how far the transaction is from its threshold instead.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::chain_registry::{ChainConfig, ChainRegistry, ChainUpdate};
use crate::clock::{Clock, SystemClock};
use crate::consensus::ValidatorConsensus;
use crate::error::{BridgeError, BridgeResult};
use crate::events::{BridgeEvent, EventRecord, EventSink, NoopSink};
use crate::fee_manager::{FeeConfig, FeeEngine};
use crate::ledger::{AttestationApplied, NewTransaction, Transaction, TransactionLedger};
use crate::pause::PauseController;
use crate::settlement::{
    AttestationPayload, AttestationVerifier, RecordingSettlement, Settlement, TrustedSubmitter,
};
use crate::types::{Address, Amount, ChainId, Timestamp, TransactionStatus, TxId};

/// Default refund timeout (1 hour)
pub const DEFAULT_TRANSACTION_TIMEOUT_SECS: u64 = 3600;

/// Construction parameters of a coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Chain this deployment locks funds on
    pub local_chain_id: ChainId,
    /// Authorized actor for configuration and pause
    pub admin: Address,
    pub fee: FeeConfig,
    pub transaction_timeout_secs: u64,
}

impl BridgeSettings {
    pub fn new(local_chain_id: ChainId, admin: Address) -> Self {
        Self {
            local_chain_id,
            admin,
            fee: FeeConfig::default(),
            transaction_timeout_secs: DEFAULT_TRANSACTION_TIMEOUT_SECS,
        }
    }
}

/// User request to lock funds for a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiateRequest {
    pub dest_chain: ChainId,
    pub receiver: Address,
    pub token: Address,
    /// Gross amount locked, fee included
    pub amount: Amount,
    /// Sender's nonce on the source chain
    pub nonce: u64,
}

/// Result of a successful `attest` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttestationOutcome {
    /// This attestation crossed the threshold; funds were released
    Released { tx_id: TxId },
    /// Recorded; the threshold is not reached yet
    Recorded {
        attested_weight: u64,
        threshold: u64,
        status: TransactionStatus,
    },
    /// The validator had already attested; nothing changed
    Duplicate,
    /// The transaction completed earlier; nothing changed
    AlreadyCompleted,
}

pub struct BridgeCoordinator {
    local_chain_id: ChainId,
    admin: Address,
    transaction_timeout_secs: u64,

    registry: ChainRegistry,
    fees: FeeEngine,
    ledger: TransactionLedger,
    consensus: ValidatorConsensus,
    pause: PauseController,

    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    settlement: Arc<dyn Settlement>,
    verifier: Arc<dyn AttestationVerifier>,

    /// Last assigned event sequence; held while emitting so sinks see
    /// records in sequence order
    event_sequence: Mutex<u64>,
    started_at: Timestamp,
    last_activity: AtomicU64,
}

impl BridgeCoordinator {
    /// Build a coordinator with no chains and no validators.
    ///
    /// Defaults: wall clock, events discarded, settlements recorded in
    /// memory, attestation identities trusted.
    pub fn new(settings: BridgeSettings) -> BridgeResult<Self> {
        let fees = FeeEngine::new(settings.fee)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let started_at = clock.now();

        Ok(Self {
            local_chain_id: settings.local_chain_id,
            admin: settings.admin,
            transaction_timeout_secs: settings.transaction_timeout_secs,
            registry: ChainRegistry::new(),
            fees,
            ledger: TransactionLedger::default(),
            consensus: ValidatorConsensus::new(),
            pause: PauseController::new(),
            clock,
            sink: Arc::new(NoopSink),
            settlement: Arc::new(RecordingSettlement::new()),
            verifier: Arc::new(TrustedSubmitter),
            event_sequence: Mutex::new(0),
            started_at,
            last_activity: AtomicU64::new(started_at),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.started_at = clock.now();
        self.last_activity = AtomicU64::new(self.started_at);
        self.clock = clock;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_settlement(mut self, settlement: Arc<dyn Settlement>) -> Self {
        self.settlement = settlement;
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn AttestationVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn local_chain_id(&self) -> ChainId {
        self.local_chain_id
    }

    pub fn admin(&self) -> &Address {
        &self.admin
    }

    pub fn transaction_timeout_secs(&self) -> u64 {
        self.transaction_timeout_secs
    }

    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }

    pub fn fees(&self) -> &FeeEngine {
        &self.fees
    }

    pub fn ledger(&self) -> &TransactionLedger {
        &self.ledger
    }

    pub fn consensus(&self) -> &ValidatorConsensus {
        &self.consensus
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    pub fn last_activity(&self) -> Timestamp {
        self.last_activity.load(Ordering::Relaxed)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn ensure_admin(&self, caller: &Address) -> BridgeResult<()> {
        if *caller != self.admin {
            warn!(caller = %caller, "Rejected unauthorized admin call");
            return Err(BridgeError::Unauthorized);
        }
        Ok(())
    }

    fn touch(&self, now: Timestamp) {
        self.last_activity.fetch_max(now, Ordering::Relaxed);
    }

    fn emit(&self, event: BridgeEvent) {
        let mut sequence = self
            .event_sequence
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *sequence += 1;
        let record = EventRecord {
            sequence: *sequence,
            emitted_at: self.clock.now(),
            event,
        };
        self.sink.emit(&record);
    }

    fn emit_validator_set(&self) {
        let set = self.consensus.snapshot();
        self.emit(BridgeEvent::ValidatorSetUpdated {
            active_validators: set.validators.iter().filter(|v| v.active).count(),
            total_active_weight: set.total_active_weight,
            threshold: set.threshold,
        });
    }

    // ========================================================================
    // User Flows
    // ========================================================================

    /// Lock `request.amount` from `sender` for transfer to `request.dest_chain`.
    pub fn initiate(&self, sender: &Address, request: InitiateRequest) -> BridgeResult<TxId> {
        self.pause.ensure_not_paused()?;
        let now = self.clock.now();

        self.registry.ensure_active(&request.dest_chain)?;
        let reservation =
            self.registry
                .check_and_reserve_volume(&request.dest_chain, request.amount, now)?;

        let quote = match self.fees.quote(request.amount) {
            Ok(quote) => quote,
            Err(e) => {
                self.registry.release_volume(reservation);
                return Err(e);
            }
        };

        let created = self.ledger.create(NewTransaction {
            source_chain: self.local_chain_id,
            dest_chain: request.dest_chain,
            sender: sender.clone(),
            receiver: request.receiver,
            token: request.token,
            nonce: request.nonce,
            quote,
            created_at: now,
            timeout_secs: self.transaction_timeout_secs,
        });
        let tx = match created {
            Ok(tx) => tx,
            Err(e) => {
                self.registry.release_volume(reservation);
                return Err(e);
            }
        };

        self.touch(now);
        info!(
            tx_id = %tx.id,
            dest_chain = %tx.dest_chain,
            amount = %tx.gross_amount,
            fee = %tx.fee,
            "Transaction initiated"
        );
        self.emit(BridgeEvent::TransactionInitiated {
            id: tx.id,
            source: tx.source_chain,
            dest: tx.dest_chain,
            sender: tx.sender,
            receiver: tx.receiver,
            token: tx.token,
            amount: tx.gross_amount,
            fee: tx.fee,
            timestamp: tx.created_at,
        });
        Ok(tx.id)
    }

    /// Record a validator attestation and release funds if it completes the
    /// threshold.
    ///
    /// Re-delivered attestations and attestations for completed transactions
    /// succeed without effect so that validators can retry freely. A retry
    /// still re-evaluates the transaction against the current validator
    /// configuration.
    pub fn attest(
        &self,
        tx_id: &TxId,
        payload: &AttestationPayload,
    ) -> BridgeResult<AttestationOutcome> {
        self.pause.ensure_not_paused()?;
        let now = self.clock.now();

        let tx = self.ledger.get(tx_id)?;
        let validator = self.verifier.verify(&tx, payload)?;
        self.consensus.ensure_active_validator(&validator)?;

        match self.ledger.apply_attestation(tx_id, &validator, now) {
            Ok(AttestationApplied::Recorded) => {}
            Ok(AttestationApplied::AlreadyCompleted) => {
                debug!(tx_id = %tx_id, validator = %validator, "Late attestation for completed transaction");
                return Ok(AttestationOutcome::AlreadyCompleted);
            }
            Err(BridgeError::DuplicateAttestation { .. }) => {
                debug!(tx_id = %tx_id, validator = %validator, "Duplicate attestation, re-evaluating");
                return Ok(match self.complete_if_approved(tx_id, now)? {
                    Some(_) => AttestationOutcome::Released { tx_id: *tx_id },
                    None => AttestationOutcome::Duplicate,
                });
            }
            Err(e) => return Err(e),
        }
        self.touch(now);

        let attesters = self.ledger.get(tx_id)?.attestations;
        let (attested_weight, threshold) = self.consensus.tally(&attesters);
        debug!(
            tx_id = %tx_id,
            validator = %validator,
            attested_weight,
            threshold,
            "Attestation recorded"
        );
        self.emit(BridgeEvent::TransactionAttested {
            id: *tx_id,
            validator,
            attested_weight,
            threshold,
        });

        match self.complete_if_approved(tx_id, now)? {
            Some(_) => Ok(AttestationOutcome::Released { tx_id: *tx_id }),
            None => {
                let status = self.ledger.get(tx_id)?.status;
                Ok(AttestationOutcome::Recorded {
                    attested_weight,
                    threshold,
                    status,
                })
            }
        }
    }

    /// Complete `tx_id` if its attesters meet the current threshold, then
    /// trigger the release. Returns the completed transaction only to the
    /// one caller that performed the transition.
    fn complete_if_approved(
        &self,
        tx_id: &TxId,
        now: Timestamp,
    ) -> BridgeResult<Option<Transaction>> {
        let completed = self
            .ledger
            .try_complete(tx_id, now, |tx| self.consensus.evaluate(&tx.attestations))?;

        if let Some(tx) = &completed {
            self.touch(now);
            self.settlement.release(tx);
            self.emit(BridgeEvent::TransactionCompleted {
                id: tx.id,
                receiver: tx.receiver.clone(),
                token: tx.token.clone(),
                net_amount: tx.net_amount,
            });
        }
        Ok(completed)
    }

    /// Re-evaluate every open transaction after a validator configuration
    /// change; returns the IDs released.
    ///
    /// Nothing is released while paused; unpausing re-evaluates instead.
    fn reevaluate_open(&self) -> Vec<TxId> {
        if self.pause.is_paused() {
            return Vec::new();
        }
        let now = self.clock.now();
        let mut released = Vec::new();

        for tx in self.ledger.active() {
            if tx.attestations.is_empty() {
                continue;
            }
            match self.complete_if_approved(&tx.id, now) {
                Ok(Some(_)) => released.push(tx.id),
                Ok(None) => {}
                Err(e) => debug!(tx_id = %tx.id, error = %e, "Skipped re-evaluation"),
            }
        }

        if !released.is_empty() {
            info!(count = released.len(), "Released transactions after validator change");
        }
        released
    }

    /// Refund a timed-out transaction to its sender. Anyone may trigger it.
    pub fn claim_refund(&self, tx_id: &TxId) -> BridgeResult<Transaction> {
        self.pause.ensure_not_paused()?;
        let now = self.clock.now();

        let tx = self.ledger.mark_refunded(tx_id, now)?;
        self.touch(now);
        self.settlement.refund(&tx);
        self.emit(BridgeEvent::TransactionRefunded { id: tx.id });
        Ok(tx)
    }

    /// Mark every timed-out open transaction `Refundable`.
    ///
    /// Moves no funds, so it runs while paused too. Returns the IDs marked.
    pub fn sweep_expired(&self) -> Vec<TxId> {
        let now = self.clock.now();
        let mut marked = Vec::new();

        for id in self.ledger.expired(now) {
            match self.ledger.mark_refundable(&id, now) {
                Ok(true) => {
                    self.emit(BridgeEvent::TransactionRefundable { id });
                    marked.push(id);
                }
                Ok(false) => {}
                // Completed or refunded since the scan
                Err(e) => debug!(tx_id = %id, error = %e, "Skipped expired transaction"),
            }
        }

        if !marked.is_empty() {
            info!(count = marked.len(), "Marked expired transactions refundable");
        }
        marked
    }

    // ========================================================================
    // Admin Operations
    // ========================================================================

    pub fn configure_chain(
        &self,
        caller: &Address,
        chain_id: ChainId,
        update: ChainUpdate,
    ) -> BridgeResult<ChainConfig> {
        self.ensure_admin(caller)?;
        let config = self
            .registry
            .configure_chain(chain_id, update, self.clock.now());
        info!(chain_id = %chain_id, active = config.active, "Chain configured");
        self.emit(BridgeEvent::ChainConfigured {
            chain_id,
            active: config.active,
        });
        Ok(config)
    }

    /// Replace fee rate and amount bounds; existing transactions keep their fee
    pub fn set_fee_config(&self, caller: &Address, config: FeeConfig) -> BridgeResult<()> {
        self.ensure_admin(caller)?;
        self.fees.set_config(config)?;
        info!(
            fee_bps = config.fee_bps,
            min_amount = %config.min_amount,
            max_amount = %config.max_amount,
            "Fee config updated"
        );
        self.emit(BridgeEvent::FeeConfigUpdated {
            fee_bps: config.fee_bps,
            min_amount: config.min_amount,
            max_amount: config.max_amount,
        });
        Ok(())
    }

    pub fn set_validators(
        &self,
        caller: &Address,
        validators: &[(Address, u32)],
        threshold: u64,
    ) -> BridgeResult<()> {
        self.ensure_admin(caller)?;
        self.consensus.set_validators(validators, threshold)?;
        self.emit_validator_set();
        self.reevaluate_open();
        Ok(())
    }

    pub fn add_validator(&self, caller: &Address, validator: Address, weight: u32) -> BridgeResult<()> {
        self.ensure_admin(caller)?;
        self.consensus.add_validator(validator, weight)?;
        self.emit_validator_set();
        self.reevaluate_open();
        Ok(())
    }

    pub fn remove_validator(&self, caller: &Address, validator: &Address) -> BridgeResult<()> {
        self.ensure_admin(caller)?;
        self.consensus.remove_validator(validator)?;
        self.emit_validator_set();
        Ok(())
    }

    pub fn set_threshold(&self, caller: &Address, threshold: u64) -> BridgeResult<()> {
        self.ensure_admin(caller)?;
        self.consensus.set_threshold(threshold)?;
        self.emit_validator_set();
        self.reevaluate_open();
        Ok(())
    }

    pub fn pause(&self, caller: &Address) -> BridgeResult<()> {
        self.ensure_admin(caller)?;
        if self.pause.pause() {
            warn!("Bridge paused");
            self.emit(BridgeEvent::Paused);
        }
        Ok(())
    }

    pub fn unpause(&self, caller: &Address) -> BridgeResult<()> {
        self.ensure_admin(caller)?;
        if self.pause.unpause() {
            info!("Bridge unpaused");
            self.emit(BridgeEvent::Unpaused);
            self.reevaluate_open();
        }
        Ok(())
    }
}
