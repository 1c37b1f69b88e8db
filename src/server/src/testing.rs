use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cluster::{PeerError, PeerHandle};
use ledger::{Amount, EventKind, LedgerConfig, WriteEvent};

use crate::node::ReplicaNode;

pub(crate) fn amount(major: i64) -> Amount {
    Amount::from_major(major).unwrap()
}

/// In-process peer that calls straight into another node.
pub(crate) struct LocalPeer(pub Arc<ReplicaNode>);

#[async_trait]
impl PeerHandle for LocalPeer {
    async fn propagate(&self, event: &WriteEvent) -> Result<(), PeerError> {
        let result = match event.kind {
            EventKind::Deposit => self.0.propagate_deposit(event.amount, event.id).await,
            EventKind::Withdraw => self.0.propagate_withdraw(event.amount, event.id).await,
        };
        result.map_err(|e| PeerError::Rejected(e.to_string()))
    }
}

/// Peer that sits on every propagation for a while before delivering it.
pub(crate) struct DelayedPeer<P> {
    inner: P,
    delay: Duration,
}

impl<P> DelayedPeer<P> {
    pub(crate) fn new(inner: P, delay: Duration) -> Self {
        DelayedPeer { inner, delay }
    }
}

#[async_trait]
impl<P: PeerHandle> PeerHandle for DelayedPeer<P> {
    async fn propagate(&self, event: &WriteEvent) -> Result<(), PeerError> {
        tokio::time::sleep(self.delay).await;
        self.inner.propagate(event).await
    }
}

/// Fully connected in-process cluster, ids starting at 1, registries sealed.
pub(crate) async fn cluster(balances: &[i64]) -> Vec<Arc<ReplicaNode>> {
    let nodes: Vec<Arc<ReplicaNode>> = balances
        .iter()
        .enumerate()
        .map(|(i, b)| Arc::new(ReplicaNode::new(i as u32 + 1, amount(*b), LedgerConfig::default())))
        .collect();

    for node in &nodes {
        for peer in &nodes {
            if peer.id() != node.id() {
                node.register_peer(peer.id(), Arc::new(LocalPeer(peer.clone()))).await.unwrap();
            }
        }
        node.seal_peers().await;
    }
    nodes
}
