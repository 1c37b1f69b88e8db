use std::time::Duration;

use thiserror::Error;

use crate::types::{Amount, EventId};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("amount must be positive, got {0}")]
    InvalidAmount(Amount),

    #[error("malformed amount: {0:?}")]
    MalformedAmount(String),

    #[error("invalid event id: {0}")]
    InvalidEventId(i64),

    #[error("event id {0} is larger than the wire format allows")]
    EventIdOutOfRange(u64),

    #[error("malformed event id: {0:?}")]
    MalformedEventId(String),

    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Amount, requested: Amount },

    #[error("event {0} has already been applied")]
    DuplicateEvent(EventId),

    #[error("timed out after {waited:?} waiting for event {event}")]
    AwaitTimeout { event: EventId, waited: Duration },

    #[error("balance overflow")]
    Overflow,
}
