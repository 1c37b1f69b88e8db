use thiserror::Error;

/// Identity of a branch, unique across the cluster. Ids start at 1.
pub type ReplicaId = u32;

/// Failure to deliver a propagation to one peer. Logged, never retried.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("peer unreachable: {0}")]
    Unreachable(String),

    #[error("propagation rejected: {0}")]
    Rejected(String),

    #[error("propagation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("peer registry is sealed; peers must be registered before serving")]
    Sealed,

    #[error("branch {0} cannot register itself as a peer")]
    SelfRegistration(ReplicaId),

    #[error("peer {0} is already registered")]
    DuplicatePeer(ReplicaId),
}

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid cluster description: {0}")]
    InvalidDescription(String),

    #[error("malformed cluster description: {0}")]
    Json(#[from] serde_json::Error),
}
