//! Bridge Node
//!
//! Hosts the bridge protocol core behind an HTTP API:
//!
//! - **Server** - Query, submission and admin endpoints, health probes, Prometheus metrics
//! - **Sweeper** - Marks timed-out transactions refundable
//! - **Monitor** - Logs the event stream and counts events by type
//! - **Settlement** - Logs and counts release and refund triggers
//! - **Genesis** - Initial chains and validator set from a JSON file

pub mod config;
pub mod genesis;
pub mod monitor;
pub mod node;
pub mod server;
pub mod settlement;
pub mod sweeper;

pub use config::Config;
pub use node::Node;
