use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::sync::Mutex;

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::gate::ConsistencyGate;
use crate::types::{Amount, EventId, EventKind, WriteEvent};

/// Balance plus the ids of every write applied to it.
pub(crate) struct LedgerState {
    balance: Amount,
    applied_events: HashSet<EventId>,
}

impl LedgerState {
    pub(crate) fn contains(&self, event: EventId) -> bool {
        self.applied_events.contains(&event)
    }

    /// Apply `event` unconditionally and record its id.
    fn apply(&mut self, event: &WriteEvent) -> Result<Amount, LedgerError> {
        let balance = match event.kind {
            EventKind::Deposit => self.balance.checked_add(event.amount),
            EventKind::Withdraw => self.balance.checked_sub(event.amount),
        }
        .ok_or(LedgerError::Overflow)?;

        self.balance = balance;
        self.applied_events.insert(event.id);
        Ok(balance)
    }
}

/// Outcome of replaying a propagated event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replay {
    Applied(Amount),
    AlreadyApplied(Amount),
}

/// Ledger for a single branch.
///
/// All mutations go through one exclusive lock held only for the
/// read-modify-write itself. Cloning is cheap and shares the same state.
#[derive(Clone)]
pub struct Ledger {
    state: Arc<Mutex<LedgerState>>,
    gate: Arc<ConsistencyGate>,
    await_timeout: Option<Duration>,
}

impl Ledger {
    pub fn new(initial_balance: Amount) -> Self {
        Self::with_config(initial_balance, LedgerConfig::default())
    }

    pub fn with_config(initial_balance: Amount, config: LedgerConfig) -> Self {
        Ledger {
            state: Arc::new(Mutex::new(LedgerState {
                balance: initial_balance,
                applied_events: HashSet::new(),
            })),
            gate: Arc::new(ConsistencyGate::new(config.wait_strategy)),
            await_timeout: config.await_timeout,
        }
    }

    /// Current balance, without waiting for anything.
    pub async fn balance(&self) -> Amount {
        self.state.lock().await.balance
    }

    pub async fn applied_count(&self) -> usize {
        self.state.lock().await.applied_events.len()
    }

    pub async fn is_applied(&self, event: EventId) -> bool {
        self.state.lock().await.contains(event)
    }

    /// Apply a write accepted by this branch.
    ///
    /// Rejects ids that were already applied here, and withdrawals larger
    /// than the balance. Returns the new balance.
    pub async fn accept(&self, event: WriteEvent) -> Result<Amount, LedgerError> {
        let balance = {
            let mut state = self.state.lock().await;
            if state.contains(event.id) {
                return Err(LedgerError::DuplicateEvent(event.id));
            }
            if event.kind == EventKind::Withdraw && state.balance < event.amount {
                return Err(LedgerError::InsufficientFunds {
                    balance: state.balance,
                    requested: event.amount,
                });
            }
            state.apply(&event)?
        };

        self.gate.signal();
        Ok(balance)
    }

    /// Apply a write that was accepted by a peer.
    ///
    /// Replays are idempotent on the event id. No balance floor applies: the
    /// originating branch already checked funds.
    pub async fn replay(&self, event: &WriteEvent) -> Result<Replay, LedgerError> {
        let outcome = {
            let mut state = self.state.lock().await;
            if state.contains(event.id) {
                debug!("Skipping already applied event {}", event.id);
                return Ok(Replay::AlreadyApplied(state.balance));
            }
            Replay::Applied(state.apply(event)?)
        };

        self.gate.signal();
        Ok(outcome)
    }

    /// Wait until `event` has been applied locally, bounded by the configured
    /// timeout.
    pub async fn await_event(&self, event: EventId) -> Result<(), LedgerError> {
        let wait = self.gate.wait_for(&self.state, event);
        match self.await_timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| LedgerError::AwaitTimeout { event, waited: limit }),
            None => {
                wait.await;
                Ok(())
            }
        }
    }

    /// Balance as seen after `after` has been applied. `None` returns at once.
    pub async fn query_balance(&self, after: Option<EventId>) -> Result<Amount, LedgerError> {
        if let Some(event) = after {
            self.await_event(event).await?;
        }
        Ok(self.balance().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::WaitStrategy;

    fn amount(major: i64) -> Amount {
        Amount::from_major(major).unwrap()
    }

    fn deposit(id: u64, major: i64) -> WriteEvent {
        WriteEvent::deposit(EventId(id), amount(major)).unwrap()
    }

    fn withdraw(id: u64, major: i64) -> WriteEvent {
        WriteEvent::withdraw(EventId(id), amount(major)).unwrap()
    }

    #[tokio::test]
    async fn test_balance_tracks_accepted_writes() {
        let sequences: Vec<Vec<WriteEvent>> = vec![
            vec![deposit(1, 10), deposit(2, 20), withdraw(3, 5)],
            vec![withdraw(1, 100), withdraw(2, 1), deposit(3, 7)],
            (1..50).map(|i| deposit(i, i as i64)).collect(),
        ];

        for events in sequences {
            let ledger = Ledger::new(amount(100));
            let mut expected = 100i64;
            for event in events {
                let signed = match event.kind {
                    EventKind::Deposit => event.amount.minor() / 100,
                    EventKind::Withdraw => -(event.amount.minor() / 100),
                };
                if ledger.accept(event).await.is_ok() {
                    expected += signed;
                }
            }
            assert_eq!(ledger.balance().await, amount(expected));
        }
    }

    #[tokio::test]
    async fn test_withdraw_insufficient_funds_leaves_state() {
        let ledger = Ledger::new(amount(700));

        let err = ledger.accept(withdraw(2, 900)).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(ledger.balance().await, amount(700));
        assert!(!ledger.is_applied(EventId(2)).await);

        assert_eq!(ledger.accept(withdraw(3, 700)).await.unwrap(), Amount::ZERO);
    }

    #[tokio::test]
    async fn test_accept_rejects_duplicate_id() {
        let ledger = Ledger::new(amount(0));
        ledger.accept(deposit(1, 10)).await.unwrap();

        let err = ledger.accept(deposit(1, 10)).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateEvent(EventId(1))));
        assert_eq!(ledger.balance().await, amount(10));
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let ledger = Ledger::new(amount(50));
        let event = deposit(4, 25);

        assert_eq!(ledger.replay(&event).await.unwrap(), Replay::Applied(amount(75)));
        assert_eq!(ledger.replay(&event).await.unwrap(), Replay::AlreadyApplied(amount(75)));
        assert_eq!(ledger.balance().await, amount(75));
        assert_eq!(ledger.applied_count().await, 1);
    }

    #[tokio::test]
    async fn test_replay_withdraw_has_no_floor() {
        let ledger = Ledger::new(amount(10));
        ledger.replay(&withdraw(1, 30)).await.unwrap();
        assert_eq!(ledger.balance().await, amount(-20));
    }

    #[tokio::test]
    async fn test_overflow_is_rejected() {
        let ledger = Ledger::new(Amount::from_minor(i64::MAX - 1));
        let event = WriteEvent::deposit(EventId(1), Amount::from_minor(5)).unwrap();
        assert!(matches!(ledger.accept(event).await, Err(LedgerError::Overflow)));
        assert!(!ledger.is_applied(EventId(1)).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deposits() {
        let ledger = Ledger::new(Amount::ZERO);
        let mut handles = Vec::new();
        for i in 0..200u64 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.accept(deposit(i, 3)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(ledger.balance().await, amount(600));
        assert_eq!(ledger.applied_count().await, 200);
    }

    #[tokio::test]
    async fn test_query_without_prior_write_returns_immediately() {
        let ledger = Ledger::with_config(amount(5), LedgerConfig::default().with_timeout(None));

        // A parked waiter on an event that never arrives must not hold anyone up.
        let waiter = ledger.clone();
        let pending = tokio::spawn(async move { waiter.query_balance(Some(EventId(42))).await });

        let balance = tokio::time::timeout(Duration::from_secs(1), ledger.query_balance(None))
            .await
            .expect("sentinel query blocked");
        assert_eq!(balance.unwrap(), amount(5));
        pending.abort();
    }

    async fn assert_query_waits_for(strategy: WaitStrategy) {
        let ledger = Ledger::with_config(
            amount(500),
            LedgerConfig::default().with_strategy(strategy),
        );

        let reader = ledger.clone();
        let query = tokio::spawn(async move { reader.query_balance(Some(EventId(7))).await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!query.is_finished());

        ledger.replay(&deposit(7, 100)).await.unwrap();

        let balance = tokio::time::timeout(Duration::from_secs(2), query)
            .await
            .expect("query never woke up")
            .unwrap()
            .unwrap();
        assert_eq!(balance, amount(600));
    }

    #[tokio::test]
    async fn test_query_waits_for_event_notify() {
        assert_query_waits_for(WaitStrategy::Notify).await;
    }

    #[tokio::test]
    async fn test_query_waits_for_event_poll() {
        assert_query_waits_for(WaitStrategy::Poll(Duration::from_millis(10))).await;
    }

    #[tokio::test]
    async fn test_query_times_out() {
        let ledger = Ledger::with_config(
            amount(1),
            LedgerConfig::default().with_timeout(Some(Duration::from_millis(50))),
        );

        let err = ledger.query_balance(Some(EventId(99))).await.unwrap_err();
        assert!(matches!(err, LedgerError::AwaitTimeout { event: EventId(99), .. }));
    }

    #[tokio::test]
    async fn test_query_after_applied_event_does_not_wait() {
        let ledger = Ledger::new(amount(1));
        ledger.accept(deposit(3, 2)).await.unwrap();
        assert_eq!(ledger.query_balance(Some(EventId(3))).await.unwrap(), amount(3));
    }
}
