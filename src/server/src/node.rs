use std::sync::Arc;

use cluster::{BestEffortBroadcast, Broadcaster, PeerHandle, PeerRegistry, RegistryError, ReplicaId};
use ledger::{Amount, EventId, Ledger, LedgerConfig, LedgerError, Replay, WriteEvent};
use log::{debug, info, warn};
use serde_json::json;

use crate::metrics::Metrics;

/// A branch: one ledger, its peers, and the replication policy between them.
///
/// Writes accepted here are applied under the ledger lock, then fanned out
/// to every peer once the lock is released. Event ids are assigned by the
/// caller and must be unique for the whole run; the node only detects reuse
/// of an id it has already applied.
pub struct ReplicaNode {
    id: ReplicaId,
    ledger: Ledger,
    peers: PeerRegistry,
    broadcaster: Arc<dyn Broadcaster>,
    metrics: Metrics,
}

impl ReplicaNode {
    pub fn new(id: ReplicaId, initial_balance: Amount, config: LedgerConfig) -> Self {
        Self::with_broadcaster(
            id,
            Ledger::with_config(initial_balance, config),
            Arc::new(BestEffortBroadcast::new(id)),
        )
    }

    pub fn with_broadcaster(id: ReplicaId, ledger: Ledger, broadcaster: Arc<dyn Broadcaster>) -> Self {
        ReplicaNode {
            id,
            ledger,
            peers: PeerRegistry::new(id),
            broadcaster,
            metrics: Metrics::new(),
        }
    }

    pub fn id(&self) -> ReplicaId {
        self.id
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Bootstrap only: fails once the registry has been sealed.
    pub async fn register_peer(&self, peer: ReplicaId, handle: Arc<dyn PeerHandle>) -> Result<(), RegistryError> {
        self.peers.register(peer, handle).await
    }

    /// Close peer registration. Called before the node accepts requests.
    pub async fn seal_peers(&self) {
        self.peers.seal().await;
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.len().await
    }

    pub async fn deposit(&self, amount: Amount, event: EventId) -> Result<Amount, LedgerError> {
        let balance = self.accept(WriteEvent::deposit(event, amount)?).await?;
        Metrics::incr(&self.metrics.total_deposits);
        Ok(balance)
    }

    pub async fn withdraw(&self, amount: Amount, event: EventId) -> Result<Amount, LedgerError> {
        match self.accept(WriteEvent::withdraw(event, amount)?).await {
            Ok(balance) => {
                Metrics::incr(&self.metrics.total_withdrawals);
                Ok(balance)
            }
            Err(e @ LedgerError::InsufficientFunds { .. }) => {
                Metrics::incr(&self.metrics.total_rejected_withdrawals);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Balance after `last_write` is applied here; `None` answers immediately.
    pub async fn query_balance(&self, last_write: Option<EventId>) -> Result<Amount, LedgerError> {
        Metrics::incr(&self.metrics.total_queries);
        let result = self.ledger.query_balance(last_write).await;
        if let Err(LedgerError::AwaitTimeout { event, waited }) = &result {
            Metrics::incr(&self.metrics.total_await_timeouts);
            info!("Branch {} gave up waiting for event {} after {:?}", self.id, event, waited);
        }
        result
    }

    pub async fn propagate_deposit(&self, amount: Amount, event: EventId) -> Result<(), LedgerError> {
        self.replay(WriteEvent::deposit(event, amount)?).await
    }

    pub async fn propagate_withdraw(&self, amount: Amount, event: EventId) -> Result<(), LedgerError> {
        self.replay(WriteEvent::withdraw(event, amount)?).await
    }

    pub async fn stats_json(&self) -> String {
        let stats = json!({
            "branch": self.id,
            "balance": self.ledger.balance().await,
            "applied_events": self.ledger.applied_count().await,
            "peers": self.peers.len().await,
            "peers_sealed": self.peers.is_sealed(),
            "metrics": self.metrics.snapshot(),
        });
        stats.to_string()
    }

    async fn accept(&self, event: WriteEvent) -> Result<Amount, LedgerError> {
        let balance = self.ledger.accept(event).await?;
        if !self.peers.is_sealed() {
            // Peers registered later never see this write.
            Metrics::incr(&self.metrics.total_unsealed_writes);
            warn!(
                "Branch {} accepted {} {} before its peer registry was sealed",
                self.id, event.kind, event.id
            );
        }
        info!("Branch {} applied {} {} of {} -> balance {}", self.id, event.kind, event.id, event.amount, balance);

        let report = self.broadcaster.broadcast(event, self.peers.snapshot().await).await;
        Metrics::add(&self.metrics.total_propagation_failures, report.failed.len());

        Ok(balance)
    }

    async fn replay(&self, event: WriteEvent) -> Result<(), LedgerError> {
        match self.ledger.replay(&event).await? {
            Replay::Applied(balance) => {
                Metrics::incr(&self.metrics.total_propagations_applied);
                info!("Branch {} replayed {} {} of {} -> balance {}", self.id, event.kind, event.id, event.amount, balance);
            }
            Replay::AlreadyApplied(_) => {
                Metrics::incr(&self.metrics.total_propagations_skipped);
                debug!("Branch {} already applied event {}", self.id, event.id);
            }
        }
        Ok(())
    }
}
