use thiserror::Error;

use crate::opcodes::*;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("timed out waiting for event: {0}")]
    AwaitTimeout(String),

    #[error("request rejected ({code}): {message}")]
    Rejected { code: u16, message: String },

    #[error("unexpected response code {0}")]
    UnexpectedResponse(u16),
}

impl ClientError {
    /// Map an error response frame onto the matching variant.
    pub fn from_response(code: u16, message: String) -> Self {
        match code {
            OP_ERR_INSUFFICIENT_FUNDS => ClientError::InsufficientFunds(message),
            OP_ERR_AWAIT_TIMEOUT => ClientError::AwaitTimeout(message),
            _ => ClientError::Rejected { code, message },
        }
    }
}
