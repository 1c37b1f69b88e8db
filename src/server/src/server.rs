use std::net::SocketAddr;
use std::sync::Arc;

use ledger::{Amount, EventId, LedgerError};
use log::info;
use protocol::opcodes::*;
use protocol::Message;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::error::ServerError;
use crate::node::ReplicaNode;

/// TCP front end of one branch.
pub struct Server {
    node: Arc<ReplicaNode>,
    listener: TcpListener,
}

impl Server {
    /// Bind without accepting yet, so peers can be wired to the final address
    /// before any request is served.
    pub async fn bind(addr: &str, node: Arc<ReplicaNode>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::InvalidAddress(format!("{}: {}", addr, e)))?;
        Ok(Server { node, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn node(&self) -> &Arc<ReplicaNode> {
        &self.node
    }

    /// Seal the peer registry, then serve until `shutdown` fires.
    pub async fn run(self, shutdown: broadcast::Sender<()>) -> Result<(), ServerError> {
        self.node.seal_peers().await;

        let addr = self.local_addr()?;
        info!("Branch {} is serving on {}", self.node.id(), addr);

        let mut shutdown_rx = shutdown.subscribe();
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let node = self.node.clone();
                            let mut client_shutdown_rx = shutdown.subscribe();
                            let _ = stream.set_nodelay(true);

                            info!("Branch {}: new connection from {}", node.id(), peer_addr);

                            tokio::spawn(async move {
                                node.metrics().connection_opened();
                                let result = handle_client(stream, &node, &mut client_shutdown_rx).await;
                                node.metrics().connection_closed();

                                if let Err(e) = result {
                                    info!("Branch {}: connection closed from {}: {}", node.id(), peer_addr, e);
                                } else {
                                    info!("Branch {}: connection closed from {}", node.id(), peer_addr);
                                }
                            });
                        }
                        Err(e) => {
                            info!("Branch {}: failed to accept connection: {}", self.node.id(), e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Branch {} stopped", self.node.id());
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_client<S>(
    mut stream: S,
    node: &ReplicaNode,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    loop {
        let message = tokio::select! {
            result = Message::receive_async(&mut stream) => {
                match result {
                    Ok(message) => message,
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
                    Err(e) => return Err(e),
                }
            }
            _ = shutdown_rx.recv() => {
                return Ok(());
            }
        };

        // A balance query may wait here; shutdown drops the wait.
        let response = tokio::select! {
            response = process_message(&message, node) => response,
            _ = shutdown_rx.recv() => {
                return Ok(());
            }
        };
        response.send_async(&mut stream).await?;
    }
}

async fn process_message(message: &Message, node: &ReplicaNode) -> Message {
    match message.code {
        OP_DEPOSIT => {
            let result = match EventId::from_wire(message.event_id) {
                Ok(event) => node.deposit(message.amount(), event).await,
                Err(e) => Err(e),
            };
            balance_response(result)
        }
        OP_WITHDRAW => {
            let result = match EventId::from_wire(message.event_id) {
                Ok(event) => node.withdraw(message.amount(), event).await,
                Err(e) => Err(e),
            };
            balance_response(result)
        }
        OP_QUERY_BALANCE => {
            let result = match EventId::from_query_wire(message.event_id) {
                Ok(last_write) => node.query_balance(last_write).await,
                Err(e) => Err(e),
            };
            balance_response(result)
        }
        OP_PROPAGATE_DEPOSIT | OP_PROPAGATE_WITHDRAW => {
            let event = match EventId::from_wire(message.event_id) {
                Ok(event) => event,
                Err(e) => return error_response(&e),
            };
            let result = if message.code == OP_PROPAGATE_DEPOSIT {
                node.propagate_deposit(message.amount(), event).await
            } else {
                node.propagate_withdraw(message.amount(), event).await
            };
            match result {
                Ok(()) => Message::ack(event),
                Err(e) => error_response(&e),
            }
        }
        OP_STATS => Message::ok_with_body(node.stats_json().await),
        _ => {
            info!("Branch {}: unknown operation {}", node.id(), message.code);
            Message::error(OP_ERR_UNKNOWN_OP, format!("unknown operation {}", message.code))
        }
    }
}

fn balance_response(result: Result<Amount, LedgerError>) -> Message {
    match result {
        Ok(balance) => Message::ok(balance),
        Err(e) => error_response(&e),
    }
}

fn error_response(error: &LedgerError) -> Message {
    let code = match error {
        LedgerError::InsufficientFunds { .. } => OP_ERR_INSUFFICIENT_FUNDS,
        LedgerError::DuplicateEvent(_) => OP_ERR_DUPLICATE_EVENT,
        LedgerError::AwaitTimeout { .. } => OP_ERR_AWAIT_TIMEOUT,
        LedgerError::InvalidAmount(_)
        | LedgerError::MalformedAmount(_)
        | LedgerError::InvalidEventId(_)
        | LedgerError::EventIdOutOfRange(_)
        | LedgerError::MalformedEventId(_)
        | LedgerError::Overflow => OP_ERR_INVALID,
    };
    info!("ERR {}", error);
    Message::error(code, error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster::{ClusterConfig, RemotePeer};
    use ledger::LedgerConfig;
    use protocol::{BranchClient, ClientError};
    use std::time::Duration;
    use tokio::net::TcpStream;

    use crate::testing::amount;

    struct TestCluster {
        addrs: Vec<String>,
        nodes: Vec<Arc<ReplicaNode>>,
        shutdown: broadcast::Sender<()>,
    }

    async fn start_cluster(balances: &[i64]) -> TestCluster {
        let config = ClusterConfig::default();
        let mut servers = Vec::new();
        for (i, balance) in balances.iter().enumerate() {
            let node = Arc::new(ReplicaNode::new(i as u32 + 1, amount(*balance), LedgerConfig::default()));
            servers.push(Server::bind("127.0.0.1:0", node).await.unwrap());
        }
        let addrs: Vec<String> = servers.iter().map(|s| s.local_addr().unwrap().to_string()).collect();

        for server in &servers {
            for (i, addr) in addrs.iter().enumerate() {
                let peer_id = i as u32 + 1;
                if peer_id != server.node().id() {
                    let peer = Arc::new(RemotePeer::new(peer_id, addr.clone(), &config));
                    server.node().register_peer(peer_id, peer).await.unwrap();
                }
            }
        }

        let (shutdown, _) = broadcast::channel(1);
        let nodes = servers.iter().map(|s| s.node().clone()).collect();
        for server in servers {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { server.run(shutdown).await });
        }

        TestCluster { addrs, nodes, shutdown }
    }

    async fn connect(addr: &str) -> BranchClient {
        BranchClient::connect(addr, Duration::from_secs(1)).await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_end_to_end_over_tcp() {
        let cluster = start_cluster(&[500, 500]).await;
        let mut a = connect(&cluster.addrs[0]).await;
        let mut b = connect(&cluster.addrs[1]).await;

        assert_eq!(a.deposit(amount(200), EventId(1)).await.unwrap(), amount(700));
        assert!(matches!(
            a.withdraw(amount(900), EventId(2)).await,
            Err(ClientError::InsufficientFunds(_))
        ));
        assert_eq!(a.withdraw(amount(300), EventId(3)).await.unwrap(), amount(400));

        assert_eq!(b.query_balance(Some(EventId(3))).await.unwrap(), amount(400));
        assert_eq!(b.query_balance(None).await.unwrap(), amount(400));

        // Replaying an already applied event is acknowledged without effect.
        let event = ledger::WriteEvent::deposit(EventId(1), amount(200)).unwrap();
        b.propagate(&event).await.unwrap();
        assert_eq!(b.query_balance(None).await.unwrap(), amount(400));

        let _ = cluster.shutdown.send(());
    }

    #[tokio::test]
    async fn test_request_validation() {
        let cluster = start_cluster(&[10]).await;
        let mut client = connect(&cluster.addrs[0]).await;

        assert!(matches!(
            client.deposit(Amount::ZERO, EventId(1)).await,
            Err(ClientError::Rejected { code: OP_ERR_INVALID, .. })
        ));

        let mut bad_id = Message::deposit(amount(1), EventId(0));
        bad_id.event_id = -4;
        assert!(matches!(
            client.call(&bad_id).await,
            Err(ClientError::Rejected { code: OP_ERR_INVALID, .. })
        ));

        client.deposit(amount(1), EventId(1)).await.unwrap();
        assert!(matches!(
            client.deposit(amount(1), EventId(1)).await,
            Err(ClientError::Rejected { code: OP_ERR_DUPLICATE_EVENT, .. })
        ));

        let unknown = Message::error(999, "");
        assert!(matches!(
            client.call(&unknown).await,
            Err(ClientError::Rejected { code: OP_ERR_UNKNOWN_OP, .. })
        ));

        // The connection survives rejected requests.
        assert_eq!(client.query_balance(None).await.unwrap(), amount(11));
        let stats: serde_json::Value = serde_json::from_str(&client.stats().await.unwrap()).unwrap();
        assert_eq!(stats["branch"], 1);

        let _ = cluster.shutdown.send(());
    }

    #[tokio::test]
    async fn test_pending_query_released_by_later_write() {
        let cluster = start_cluster(&[0, 0]).await;
        let addr_b = cluster.addrs[1].clone();

        let query = tokio::spawn(async move {
            let mut b = connect(&addr_b).await;
            b.query_balance(Some(EventId(42))).await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!query.is_finished());

        let mut a = connect(&cluster.addrs[0]).await;
        a.deposit(amount(42), EventId(42)).await.unwrap();

        let balance = tokio::time::timeout(Duration::from_secs(2), query).await.unwrap().unwrap().unwrap();
        assert_eq!(balance, amount(42));
        assert_eq!(cluster.nodes[1].ledger().balance().await, amount(42));

        let _ = cluster.shutdown.send(());
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting() {
        let cluster = start_cluster(&[1]).await;
        // Let the accept loop subscribe before signalling.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = cluster.shutdown.send(());
        tokio::time::sleep(Duration::from_millis(50)).await;

        let connected = TcpStream::connect(&cluster.addrs[0]).await;
        assert!(connected.is_err());
    }
}
