use std::time::Duration;

use crate::gate::{WaitStrategy, MIN_POLL_INTERVAL};

const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_AWAIT_TIMEOUT_MS: u64 = 30_000;

/// Ledger configuration
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// How balance queries wait for an event to be applied
    pub wait_strategy: WaitStrategy,
    /// Upper bound on a single wait (None = wait forever)
    pub await_timeout: Option<Duration>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            wait_strategy: WaitStrategy::Notify,
            await_timeout: Some(Duration::from_millis(DEFAULT_AWAIT_TIMEOUT_MS)),
        }
    }
}

impl LedgerConfig {
    /// Read `BRANCH_WAIT_STRATEGY`, `BRANCH_POLL_INTERVAL_MS` and
    /// `BRANCH_AWAIT_TIMEOUT_MS` (0 disables the timeout).
    pub fn from_env() -> Self {
        let poll_interval = poll_interval(std::env::var("BRANCH_POLL_INTERVAL_MS").ok());

        let wait_strategy = match std::env::var("BRANCH_WAIT_STRATEGY") {
            Ok(v) if v.eq_ignore_ascii_case("poll") => WaitStrategy::Poll(poll_interval),
            _ => WaitStrategy::Notify,
        };

        let await_timeout_ms = std::env::var("BRANCH_AWAIT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_AWAIT_TIMEOUT_MS);
        let await_timeout = if await_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(await_timeout_ms))
        };

        LedgerConfig {
            wait_strategy,
            await_timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.await_timeout = timeout;
        self
    }

    pub fn with_strategy(mut self, strategy: WaitStrategy) -> Self {
        self.wait_strategy = strategy;
        self
    }
}

fn poll_interval(raw: Option<String>) -> Duration {
    raw.and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS))
        .max(MIN_POLL_INTERVAL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_interval_parsing() {
        assert_eq!(poll_interval(None), Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));
        assert_eq!(poll_interval(Some("25".to_string())), Duration::from_millis(25));
        assert_eq!(poll_interval(Some("soon".to_string())), Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));
        assert_eq!(poll_interval(Some("0".to_string())), MIN_POLL_INTERVAL);
    }
}
