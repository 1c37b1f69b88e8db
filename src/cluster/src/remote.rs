use std::time::Duration;

use async_trait::async_trait;
use ledger::WriteEvent;
use log::info;
use protocol::{BranchClient, ClientError};
use tokio::sync::Mutex;

use crate::config::ClusterConfig;
use crate::registry::PeerHandle;
use crate::types::{PeerError, ReplicaId};

/// Peer reached over TCP.
///
/// Keeps one connection, opened on first use and dropped after any transport
/// failure so the next propagation reconnects. Calls to the same peer are
/// serialized on that connection.
pub struct RemotePeer {
    id: ReplicaId,
    addr: String,
    connect_timeout: Duration,
    call_timeout: Duration,
    connection: Mutex<Option<BranchClient>>,
}

impl RemotePeer {
    pub fn new(id: ReplicaId, addr: String, config: &ClusterConfig) -> Self {
        RemotePeer {
            id,
            addr,
            connect_timeout: config.connect_timeout,
            call_timeout: config.propagation_timeout,
            connection: Mutex::new(None),
        }
    }
}

#[async_trait]
impl PeerHandle for RemotePeer {
    async fn propagate(&self, event: &WriteEvent) -> Result<(), PeerError> {
        let mut connection = self.connection.lock().await;

        if connection.is_none() {
            let client = BranchClient::connect(&self.addr, self.connect_timeout)
                .await
                .map_err(|e| PeerError::Unreachable(format!("{}: {}", self.addr, e)))?;
            info!("Opened replication connection to peer {} at {}", self.id, self.addr);
            *connection = Some(client);
        }
        let Some(client) = connection.as_mut() else {
            return Err(PeerError::Unreachable(self.addr.clone()));
        };

        let result = tokio::time::timeout(self.call_timeout, client.propagate(event)).await;
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e @ ClientError::Rejected { .. })) => Err(PeerError::Rejected(e.to_string())),
            Ok(Err(e)) => {
                *connection = None;
                Err(PeerError::Unreachable(format!("{}: {}", self.addr, e)))
            }
            Err(_) => {
                *connection = None;
                Err(PeerError::Timeout(self.call_timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::{Amount, EventId};
    use protocol::{Message, OP_ERR_INVALID, OP_PROPAGATE_DEPOSIT};
    use tokio::net::TcpListener;

    fn test_config() -> ClusterConfig {
        ClusterConfig {
            propagation_timeout: Duration::from_millis(200),
            connect_timeout: Duration::from_millis(200),
            ..ClusterConfig::default()
        }
    }

    fn event() -> WriteEvent {
        WriteEvent::deposit(EventId(11), Amount::from_minor(500)).unwrap()
    }

    #[tokio::test]
    async fn test_unreachable_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let peer = RemotePeer::new(2, addr, &test_config());
        assert!(matches!(peer.propagate(&event()).await, Err(PeerError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_ack_and_rejection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        // First request is acknowledged, the second one rejected.
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = Message::receive_async(&mut stream).await.unwrap();
            assert_eq!(request.code, OP_PROPAGATE_DEPOSIT);
            assert_eq!(request.event_id, 11);
            Message::ack(EventId(11)).send_async(&mut stream).await.unwrap();

            let _ = Message::receive_async(&mut stream).await.unwrap();
            Message::error(OP_ERR_INVALID, "nope").send_async(&mut stream).await.unwrap();
        });

        let peer = RemotePeer::new(2, addr, &test_config());
        peer.propagate(&event()).await.unwrap();
        assert!(matches!(peer.propagate(&event()).await, Err(PeerError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(stream);
        });

        let peer = RemotePeer::new(2, addr, &test_config());
        assert!(matches!(peer.propagate(&event()).await, Err(PeerError::Timeout(_))));
    }
}
