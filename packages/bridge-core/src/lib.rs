//! Bridge Core: lock / attest / release protocol
//!
//! Funds are locked on the source chain and released on the destination
//! chain once validators holding enough weight attest to the lock:
//!
//! - **Chain Registry** - Per-chain configuration, activity flag, daily volume window
//! - **Fee Manager** - Fee computation and amount bounds
//! - **Replay Guard** - Unique transaction IDs and one attestation per validator
//! - **Ledger** - Transaction records and their state machine
//! - **Consensus** - Weighted validator set and threshold
//! - **Pause** - Emergency stop for user flows
//! - **Coordinator** - Facade sequencing the above, plus the read-only query surface
//!
//! ## Transaction States
//!
//! ```text
//! Initiated -> Attesting -> Completed
//!     \            \
//!      +------------+-> Refundable -> Refunded
//! ```
//!
//! `Completed` and `Refunded` are terminal. Each is entered at most once per
//! transaction, and funds move only on entering one of them.

pub mod chain_registry;
pub mod clock;
pub mod consensus;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod fee_manager;
pub mod hash;
pub mod ledger;
pub mod pause;
pub mod query;
pub mod replay_guard;
pub mod settlement;
pub mod shard;
pub mod types;

pub use chain_registry::{ChainConfig, ChainRegistry, ChainUpdate};
pub use clock::{Clock, ManualClock, SystemClock};
pub use consensus::{Validator, ValidatorConsensus, ValidatorSet};
pub use coordinator::{AttestationOutcome, BridgeCoordinator, BridgeSettings, InitiateRequest};
pub use error::{BridgeError, BridgeResult};
pub use events::{BridgeEvent, EventLog, EventRecord, EventSink, FanoutSink, NoopSink};
pub use fee_manager::{FeeConfig, FeeEngine, FeeQuote};
pub use hash::{compute_transaction_id, keccak256};
pub use ledger::{Transaction, TransactionLedger};
pub use query::{BridgeStats, ChainStatus, FeeInfo, OperationalStatus};
pub use settlement::{
    AttestationPayload, AttestationVerifier, RecordingSettlement, Settlement, TrustedSubmitter,
};
pub use types::{Address, Amount, ChainId, Timestamp, TransactionStatus, TxId};
