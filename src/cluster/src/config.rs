use std::time::Duration;

use crate::types::ReplicaId;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_BASE_PORT: u16 = 8080;

/// Cluster configuration
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub host: String,
    /// Branch `id` listens on `base_port + id - 1`
    pub base_port: u16,
    /// Bound on a single propagation call to a peer
    pub propagation_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            host: DEFAULT_HOST.to_string(),
            base_port: DEFAULT_BASE_PORT,
            propagation_timeout: Duration::from_millis(3000),
            connect_timeout: Duration::from_millis(2000),
        }
    }
}

impl ClusterConfig {
    pub fn from_env() -> Self {
        let defaults = ClusterConfig::default();

        let host = std::env::var("BRANCH_HOST").unwrap_or(defaults.host);

        let base_port = std::env::var("BRANCH_BASE_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.base_port);

        let propagation_timeout = std::env::var("BRANCH_PROPAGATION_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.propagation_timeout);

        let connect_timeout = std::env::var("BRANCH_CONNECT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.connect_timeout);

        ClusterConfig {
            host,
            base_port,
            propagation_timeout,
            connect_timeout,
        }
    }

    /// Port for branch `id`, or None if it falls outside the u16 range.
    pub fn port_for(&self, id: ReplicaId) -> Option<u16> {
        let offset = id.checked_sub(1)?;
        u16::try_from(offset).ok()?.checked_add(self.base_port)
    }

    pub fn addr_for(&self, id: ReplicaId) -> Option<String> {
        self.port_for(id).map(|port| format!("{}:{}", self.host, port))
    }
}
