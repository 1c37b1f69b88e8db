use ledger::LedgerError;
use protocol::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CtlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Client(#[from] ClientError),

    #[error("{0}")]
    Ledger(#[from] LedgerError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("no response from {addr} within {after:?}")]
    Timeout { addr: String, after: std::time::Duration },

    #[error("no address for branch {0}")]
    UnknownBranch(u32),
}
