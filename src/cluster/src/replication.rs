use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ledger::WriteEvent;
use log::{info, warn};
use tokio::task::JoinSet;

use crate::registry::PeerHandle;
use crate::types::{PeerError, ReplicaId};

/// Outcome of fanning one write out to the peers.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    pub delivered: Vec<ReplicaId>,
    pub failed: Vec<(ReplicaId, PeerError)>,
}

impl BroadcastReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Replication policy for accepted writes.
///
/// Called after the local mutation is committed and the ledger lock is
/// released. Implementations decide delivery guarantees; the node only
/// records the report.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(
        &self,
        event: WriteEvent,
        peers: Vec<(ReplicaId, Arc<dyn PeerHandle>)>,
    ) -> BroadcastReport;
}

/// Fire-and-forget fan-out: every peer is called concurrently, failures are
/// logged and dropped. There is no retry and no repair, so a peer that is
/// down during a write stays behind.
pub struct BestEffortBroadcast {
    origin: ReplicaId,
}

impl BestEffortBroadcast {
    pub fn new(origin: ReplicaId) -> Self {
        BestEffortBroadcast { origin }
    }
}

#[async_trait]
impl Broadcaster for BestEffortBroadcast {
    async fn broadcast(
        &self,
        event: WriteEvent,
        peers: Vec<(ReplicaId, Arc<dyn PeerHandle>)>,
    ) -> BroadcastReport {
        let mut tasks = JoinSet::new();
        let mut task_peers = HashMap::with_capacity(peers.len());
        for (peer_id, handle) in peers {
            let task = tasks.spawn(async move { handle.propagate(&event).await });
            task_peers.insert(task.id(), peer_id);
        }

        let mut report = BroadcastReport::default();
        while let Some(joined) = tasks.join_next_with_id().await {
            let (peer_id, outcome) = match joined {
                Ok((task, outcome)) => (task_peers.get(&task).copied(), outcome),
                Err(e) => (
                    task_peers.get(&e.id()).copied(),
                    Err(PeerError::Rejected(format!("propagation task failed: {}", e))),
                ),
            };
            // Every task id was recorded at spawn time.
            let Some(peer_id) = peer_id else { continue };

            match outcome {
                Ok(()) => report.delivered.push(peer_id),
                Err(e) => {
                    warn!(
                        "Branch {} failed to propagate {} {} to peer {}: {}",
                        self.origin, event.kind, event.id, peer_id, e
                    );
                    report.failed.push((peer_id, e));
                }
            }
        }

        report.delivered.sort_unstable();
        info!(
            "Branch {} propagated {} {} to {}/{} peers",
            self.origin,
            event.kind,
            event.id,
            report.delivered.len(),
            report.delivered.len() + report.failed.len()
        );
        report
    }
}
