pub mod config;
pub mod description;
pub mod types;
pub mod registry;
pub mod replication;
pub mod remote;

// Re-exports for convenience
pub use config::ClusterConfig;
pub use description::{BranchSpec, ClusterDescription};
pub use types::*;
pub use registry::{PeerHandle, PeerRegistry};
pub use replication::{BestEffortBroadcast, BroadcastReport, Broadcaster};
pub use remote::RemotePeer;
