use thiserror::Error;

/// Error type for server setup and the accept loop
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
