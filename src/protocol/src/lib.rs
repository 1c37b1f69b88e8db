pub mod client;
pub mod error;
pub mod message;
pub mod opcodes;

// Re-export commonly used types
pub use client::BranchClient;
pub use error::ClientError;
pub use message::Message;
pub use opcodes::*;
