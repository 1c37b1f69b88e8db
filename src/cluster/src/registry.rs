use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ledger::WriteEvent;
use log::info;
use tokio::sync::RwLock;

use crate::types::{PeerError, RegistryError, ReplicaId};

/// Capability to replay writes on another branch.
#[async_trait]
pub trait PeerHandle: Send + Sync {
    /// Apply `event` on the peer. `Ok` means the peer acknowledged it.
    async fn propagate(&self, event: &WriteEvent) -> Result<(), PeerError>;
}

/// Peers of one branch.
///
/// Filled during bootstrap, then sealed before the branch serves traffic.
/// After sealing the set never changes.
pub struct PeerRegistry {
    owner: ReplicaId,
    peers: RwLock<BTreeMap<ReplicaId, Arc<dyn PeerHandle>>>,
    sealed: AtomicBool,
}

impl PeerRegistry {
    pub fn new(owner: ReplicaId) -> Self {
        PeerRegistry {
            owner,
            peers: RwLock::new(BTreeMap::new()),
            sealed: AtomicBool::new(false),
        }
    }

    pub async fn register(&self, id: ReplicaId, handle: Arc<dyn PeerHandle>) -> Result<(), RegistryError> {
        if id == self.owner {
            return Err(RegistryError::SelfRegistration(id));
        }

        let mut peers = self.peers.write().await;
        if self.sealed.load(Ordering::SeqCst) {
            return Err(RegistryError::Sealed);
        }
        if peers.contains_key(&id) {
            return Err(RegistryError::DuplicatePeer(id));
        }
        peers.insert(id, handle);
        info!("Branch {} registered peer {}", self.owner, id);
        Ok(())
    }

    /// Close registration. Idempotent.
    pub async fn seal(&self) {
        let peers = self.peers.write().await;
        if !self.sealed.swap(true, Ordering::SeqCst) {
            info!("Branch {} sealed peer registry with {} peers", self.owner, peers.len());
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    /// Handles to every registered peer, ordered by id.
    pub async fn snapshot(&self) -> Vec<(ReplicaId, Arc<dyn PeerHandle>)> {
        self.peers
            .read()
            .await
            .iter()
            .map(|(id, handle)| (*id, Arc::clone(handle)))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }
}
