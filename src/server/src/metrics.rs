use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Node metrics
#[derive(Clone)]
pub struct Metrics {
    pub active_connections: Arc<AtomicUsize>,
    pub total_connections: Arc<AtomicUsize>,
    pub total_deposits: Arc<AtomicUsize>,
    pub total_withdrawals: Arc<AtomicUsize>,
    pub total_rejected_withdrawals: Arc<AtomicUsize>,
    pub total_queries: Arc<AtomicUsize>,
    pub total_await_timeouts: Arc<AtomicUsize>,
    pub total_unsealed_writes: Arc<AtomicUsize>,
    pub total_propagations_applied: Arc<AtomicUsize>,
    pub total_propagations_skipped: Arc<AtomicUsize>,
    pub total_propagation_failures: Arc<AtomicUsize>,
    pub start_time: std::time::Instant,
}

/// Point-in-time copy of the counters, as reported by the stats operation.
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub active_connections: usize,
    pub total_connections: usize,
    pub total_deposits: usize,
    pub total_withdrawals: usize,
    pub total_rejected_withdrawals: usize,
    pub total_queries: usize,
    pub total_await_timeouts: usize,
    pub total_unsealed_writes: usize,
    pub total_propagations_applied: usize,
    pub total_propagations_skipped: usize,
    pub total_propagation_failures: usize,
    pub uptime_seconds: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            active_connections: Arc::new(AtomicUsize::new(0)),
            total_connections: Arc::new(AtomicUsize::new(0)),
            total_deposits: Arc::new(AtomicUsize::new(0)),
            total_withdrawals: Arc::new(AtomicUsize::new(0)),
            total_rejected_withdrawals: Arc::new(AtomicUsize::new(0)),
            total_queries: Arc::new(AtomicUsize::new(0)),
            total_await_timeouts: Arc::new(AtomicUsize::new(0)),
            total_unsealed_writes: Arc::new(AtomicUsize::new(0)),
            total_propagations_applied: Arc::new(AtomicUsize::new(0)),
            total_propagations_skipped: Arc::new(AtomicUsize::new(0)),
            total_propagation_failures: Arc::new(AtomicUsize::new(0)),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn incr(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn add(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::SeqCst);
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::SeqCst);
        self.total_connections.fetch_add(1, Ordering::SeqCst);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_connections: self.active_connections.load(Ordering::SeqCst),
            total_connections: self.total_connections.load(Ordering::SeqCst),
            total_deposits: self.total_deposits.load(Ordering::SeqCst),
            total_withdrawals: self.total_withdrawals.load(Ordering::SeqCst),
            total_rejected_withdrawals: self.total_rejected_withdrawals.load(Ordering::SeqCst),
            total_queries: self.total_queries.load(Ordering::SeqCst),
            total_await_timeouts: self.total_await_timeouts.load(Ordering::SeqCst),
            total_unsealed_writes: self.total_unsealed_writes.load(Ordering::SeqCst),
            total_propagations_applied: self.total_propagations_applied.load(Ordering::SeqCst),
            total_propagations_skipped: self.total_propagations_skipped.load(Ordering::SeqCst),
            total_propagation_failures: self.total_propagation_failures.load(Ordering::SeqCst),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
