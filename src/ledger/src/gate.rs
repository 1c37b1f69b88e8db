//! Read-your-writes gate for balance queries.
//!
//! A query naming an event id suspends here until that id shows up in the
//! local applied set. Waiters never hold the ledger lock while suspended.

use std::time::Duration;

use tokio::sync::{Mutex, Notify};

use crate::ledger::LedgerState;
use crate::types::EventId;

/// How a waiter learns that the applied set changed.
///
/// `Notify` wakes waiters as soon as a writer signals. `Poll` re-checks on a
/// fixed interval; it costs latency and CPU but keeps working even if a
/// writer forgets to signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    Notify,
    Poll(Duration),
}

/// Floor for `WaitStrategy::Poll`; a zero interval would spin.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

pub struct ConsistencyGate {
    changed: Notify,
    strategy: WaitStrategy,
}

impl ConsistencyGate {
    pub fn new(strategy: WaitStrategy) -> Self {
        let strategy = match strategy {
            WaitStrategy::Poll(interval) => WaitStrategy::Poll(interval.max(MIN_POLL_INTERVAL)),
            WaitStrategy::Notify => WaitStrategy::Notify,
        };
        ConsistencyGate {
            changed: Notify::new(),
            strategy,
        }
    }

    /// Wake every current waiter. Called after each change to the applied set.
    pub fn signal(&self) {
        self.changed.notify_waiters();
    }

    /// Resolve once `event` is in the applied set. Cancel by dropping.
    pub(crate) async fn wait_for(&self, state: &Mutex<LedgerState>, event: EventId) {
        match self.strategy {
            WaitStrategy::Notify => loop {
                // Register before checking so a signal between the check and
                // the await is not lost.
                let notified = self.changed.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if state.lock().await.contains(event) {
                    return;
                }
                notified.await;
            },
            WaitStrategy::Poll(interval) => loop {
                if state.lock().await.contains(event) {
                    return;
                }
                tokio::time::sleep(interval).await;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let gate = ConsistencyGate::new(WaitStrategy::Poll(Duration::ZERO));
        assert_eq!(gate.strategy, WaitStrategy::Poll(MIN_POLL_INTERVAL));

        let gate = ConsistencyGate::new(WaitStrategy::Poll(Duration::from_millis(50)));
        assert_eq!(gate.strategy, WaitStrategy::Poll(Duration::from_millis(50)));
    }
}
