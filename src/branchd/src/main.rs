use std::sync::Arc;

use cluster::{ClusterConfig, ClusterDescription, RemotePeer};
use ledger::LedgerConfig;
use log::info;
use logger::logger;
use server::{ReplicaNode, Server};
use tokio::sync::broadcast;
use tokio::task::JoinSet;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    logger::setup_logging();

    let path = match std::env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("Usage: branchd <cluster.json>");
            eprintln!();
            eprintln!("Environment variables:");
            eprintln!("  BRANCH_HOST                    - Listen host (default: 127.0.0.1)");
            eprintln!("  BRANCH_BASE_PORT               - Port of branch 1 (default: 8080)");
            eprintln!("  BRANCH_PROPAGATION_TIMEOUT_MS  - Per-peer propagation bound (default: 3000)");
            eprintln!("  BRANCH_CONNECT_TIMEOUT_MS      - Peer connect bound (default: 2000)");
            eprintln!("  BRANCH_WAIT_STRATEGY           - notify | poll (default: notify)");
            eprintln!("  BRANCH_POLL_INTERVAL_MS        - Poll interval (default: 100)");
            eprintln!("  BRANCH_AWAIT_TIMEOUT_MS        - Query wait bound, 0 = none (default: 30000)");
            eprintln!("  BRANCH_LOG                     - Log filter (default: info)");
            std::process::exit(2);
        }
    };

    if let Err(e) = run(&path).await {
        eprintln!("branchd: {}", e);
        std::process::exit(1);
    }
}

async fn run(path: &str) -> Result<(), BoxError> {
    let description = ClusterDescription::from_file(path)?;
    let config = ClusterConfig::from_env();
    let ledger_config = LedgerConfig::from_env();
    info!("Wait strategy: {:?}, await timeout: {:?}", ledger_config.wait_strategy, ledger_config.await_timeout);

    // Bind every branch first so peer handles point at live listeners.
    let mut servers = Vec::with_capacity(description.branches.len());
    for branch in &description.branches {
        let addr = config
            .addr_for(branch.id)
            .ok_or_else(|| format!("branch {} has no valid port above {}", branch.id, config.base_port))?;
        let node = Arc::new(ReplicaNode::new(branch.id, branch.initial_balance, ledger_config.clone()));
        let server = Server::bind(&addr, node).await?;
        info!("Starting branch {} with initial balance {} on {}", branch.id, branch.initial_balance, addr);
        servers.push(server);
    }

    for server in &servers {
        let node = server.node();
        for peer_id in description.ids().filter(|id| *id != node.id()) {
            let addr = config
                .addr_for(peer_id)
                .ok_or_else(|| format!("branch {} has no valid port", peer_id))?;
            node.register_peer(peer_id, Arc::new(RemotePeer::new(peer_id, addr, &config))).await?;
        }
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut running = JoinSet::new();
    for server in servers {
        running.spawn(server.run(shutdown_tx.clone()));
    }
    info!("All {} branches are up", description.branches.len());

    wait_for_signal().await;
    info!("Received shutdown signal, stopping branches...");
    let _ = shutdown_tx.send(());

    while let Some(result) = running.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => info!("Branch server error: {}", e),
            Err(e) => info!("Branch server task failed: {}", e),
        }
    }
    info!("branchd stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            info!("Failed to listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        info!("Failed to listen for shutdown signal: {}", e);
    }
}
