// Core modules
pub mod types;
pub mod error;
pub mod config;
pub mod ledger;

// Support modules
pub mod gate;

// Re-export main types for convenience
pub use types::{Amount, EventId, EventKind, WriteEvent, NO_PRIOR_WRITE};
pub use error::LedgerError;
pub use config::LedgerConfig;
pub use gate::{ConsistencyGate, WaitStrategy, MIN_POLL_INTERVAL};
pub use ledger::{Ledger, Replay};
