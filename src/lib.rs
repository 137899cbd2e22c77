//! NVMe Device Manager
//!
//! A BMC-resident manager for NVMe drives reachable over MCTP. It discovers
//! NVMe-MI capable endpoints, maintains a live model of each drive's health,
//! identity, link, and sanitize state, publishes that model on the system
//! object bus, and executes sanitize operations issued from the bus.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          Reactor (single thread)                     │
//! │                                                                      │
//! │  ┌──────────────┐   creates    ┌───────────────────────────────┐    │
//! │  │  Discovery   │─────────────▶│  Drive State Machine (per EID) │    │
//! │  │ Orchestrator │              │  probe → identify → poll ↔ op  │    │
//! │  └──────┬───────┘              └──────┬───────────────┬────────┘    │
//! │         │ signals                     │ commands      │ verdicts    │
//! │  ┌──────┴───────┐              ┌──────┴───────┐  ┌────┴─────────┐   │
//! │  │  Object Bus  │              │   Command    │  │    Health    │   │
//! │  │  (contracts) │◀─────────────│   Surface    │  │   Evaluator  │   │
//! │  └──────────────┘  properties  └──────┬───────┘  └──────────────┘   │
//! └────────────────────────────────────────┼────────────────────────────┘
//!                                          │ FIFO tasks
//!                               ┌──────────┴──────────┐
//!                               │  MI Transport Worker │  (one thread,
//!                               │  (libnvme-mi calls)  │   all drives)
//!                               └─────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`discovery`]: endpoint/inventory correlation and the drive map
//! - [`drive`]: per-drive lifecycle, sanitize tracking, health evaluation
//! - [`commands`]: typed admin command surface with the error taxonomy
//! - [`transport`]: the shared MI worker thread and endpoint sessions
//! - [`protocol`]: NVMe-MI wire records and constants
//! - [`bus`]: object-bus contracts and the in-memory implementation
//! - [`config`]: the optional drive bay table
//! - [`error`]: error types and handling

pub mod bus;
pub mod commands;
pub mod config;
pub mod discovery;
pub mod drive;
pub mod error;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
pub use bus::local::LocalBus;
pub use bus::{DiscoverySignal, DriveControl, EndpointRecord, EventLog, InventoryRecord, SystemBus};
pub use commands::MiDevice;
pub use config::InventoryConfig;
pub use discovery::DriveManager;
pub use drive::state::{EraseMethod, FormFactor, Health, Operation, OperationStatus};
pub use drive::NvmeDrive;
pub use error::{Error, Result};
pub use transport::{MiRoot, MiWorker, TransportFactory};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
