pub mod error;
pub mod metrics;
pub mod node;
pub mod server;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use error::ServerError;
pub use metrics::Metrics;
pub use node::ReplicaNode;
pub use server::Server;
