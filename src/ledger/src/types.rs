use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::LedgerError;

/// Wire value of the "no prior write" marker on balance queries.
pub const NO_PRIOR_WRITE: i64 = -1;

const MINOR_PER_MAJOR: i64 = 100;

/// Monetary amount in minor units (hundredths).
///
/// Balances are replayed on every replica through repeated add/subtract, so
/// the value is kept as an integer and all arithmetic is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_minor(minor: i64) -> Self {
        Amount(minor)
    }

    /// Whole currency units, e.g. `Amount::from_major(5)` is `5.00`.
    pub fn from_major(major: i64) -> Result<Self, LedgerError> {
        major
            .checked_mul(MINOR_PER_MAJOR)
            .map(Amount)
            .ok_or(LedgerError::Overflow)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = MINOR_PER_MAJOR as u64;
        write!(f, "{}{}.{:02}", sign, abs / per, abs % per)
    }
}

impl FromStr for Amount {
    type Err = LedgerError;

    /// Parses decimal text with at most two fractional digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || LedgerError::MalformedAmount(s.to_string());
        let text = s.trim();
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let (whole, frac) = match digits.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (digits, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(malformed());
        }
        if frac.len() > 2 || !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(malformed());
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| malformed())?
        };
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| malformed())? * 10,
            _ => frac.parse().map_err(|_| malformed())?,
        };

        let minor = whole
            .checked_mul(MINOR_PER_MAJOR)
            .and_then(|m| m.checked_add(frac))
            .ok_or(LedgerError::Overflow)?;
        Ok(Amount(if negative { -minor } else { minor }))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Caller-assigned identifier of a write event.
///
/// Identifiers must be unique across the whole run; nodes cannot verify this
/// beyond rejecting an id they have already applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl EventId {
    /// Largest id the wire format can carry.
    pub const MAX: EventId = EventId(i64::MAX as u64);

    /// Checked constructor for ids coming from outside (scenarios, CLI).
    pub fn new(raw: u64) -> Result<Self, LedgerError> {
        if raw > Self::MAX.0 {
            return Err(LedgerError::EventIdOutOfRange(raw));
        }
        Ok(EventId(raw))
    }

    /// Decode the id carried by a Deposit/Withdraw/Propagate request.
    pub fn from_wire(raw: i64) -> Result<Self, LedgerError> {
        u64::try_from(raw)
            .map(EventId)
            .map_err(|_| LedgerError::InvalidEventId(raw))
    }

    /// Decode the id carried by a balance query, where `-1` means "no prior write".
    pub fn from_query_wire(raw: i64) -> Result<Option<Self>, LedgerError> {
        if raw == NO_PRIOR_WRITE {
            Ok(None)
        } else {
            Self::from_wire(raw).map(Some)
        }
    }

    /// Ids built through `new`, `from_wire` or a `WriteEvent` are at most
    /// `MAX`, so this never saturates for them.
    pub fn to_wire(self) -> i64 {
        debug_assert!(self <= Self::MAX, "event id {} exceeds wire range", self.0);
        i64::try_from(self.0).unwrap_or(i64::MAX)
    }

    pub fn query_to_wire(id: Option<EventId>) -> i64 {
        id.map(EventId::to_wire).unwrap_or(NO_PRIOR_WRITE)
    }
}

impl FromStr for EventId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: u64 = s
            .trim()
            .parse()
            .map_err(|_| LedgerError::MalformedEventId(s.to_string()))?;
        Self::new(raw)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Deposit,
    Withdraw,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Deposit => write!(f, "deposit"),
            EventKind::Withdraw => write!(f, "withdraw"),
        }
    }
}

/// A single mutation, created by the node that accepts it and replayed
/// verbatim on every peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteEvent {
    pub id: EventId,
    pub kind: EventKind,
    pub amount: Amount,
}

impl WriteEvent {
    pub fn new(id: EventId, kind: EventKind, amount: Amount) -> Result<Self, LedgerError> {
        if id > EventId::MAX {
            return Err(LedgerError::EventIdOutOfRange(id.0));
        }
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(amount));
        }
        Ok(WriteEvent { id, kind, amount })
    }

    pub fn deposit(id: EventId, amount: Amount) -> Result<Self, LedgerError> {
        Self::new(id, EventKind::Deposit, amount)
    }

    pub fn withdraw(id: EventId, amount: Amount) -> Result<Self, LedgerError> {
        Self::new(id, EventKind::Withdraw, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_parse() {
        assert_eq!("12".parse::<Amount>().unwrap(), Amount::from_minor(1200));
        assert_eq!("12.5".parse::<Amount>().unwrap(), Amount::from_minor(1250));
        assert_eq!("0.07".parse::<Amount>().unwrap(), Amount::from_minor(7));
        assert_eq!(".5".parse::<Amount>().unwrap(), Amount::from_minor(50));
        assert_eq!("-3.10".parse::<Amount>().unwrap(), Amount::from_minor(-310));

        assert!("".parse::<Amount>().is_err());
        assert!("1.234".parse::<Amount>().is_err());
        assert!("1e3".parse::<Amount>().is_err());
        assert!("ten".parse::<Amount>().is_err());
    }

    #[test]
    fn test_amount_display() {
        assert_eq!(Amount::from_minor(70000).to_string(), "700.00");
        assert_eq!(Amount::from_minor(5).to_string(), "0.05");
        assert_eq!(Amount::from_minor(-1250).to_string(), "-12.50");
    }

    #[test]
    fn test_amount_overflow() {
        assert!(matches!(Amount::from_major(i64::MAX), Err(LedgerError::Overflow)));
        assert!(Amount::from_minor(i64::MAX).checked_add(Amount::from_minor(1)).is_none());
    }

    #[test]
    fn test_query_sentinel() {
        assert_eq!(EventId::from_query_wire(-1).unwrap(), None);
        assert_eq!(EventId::from_query_wire(7).unwrap(), Some(EventId(7)));
        assert!(EventId::from_query_wire(-2).is_err());
        assert!(EventId::from_wire(-1).is_err());
        assert_eq!(EventId::query_to_wire(None), NO_PRIOR_WRITE);
    }

    #[test]
    fn test_write_event_requires_positive_amount() {
        assert!(WriteEvent::deposit(EventId(1), Amount::ZERO).is_err());
        assert!(WriteEvent::withdraw(EventId(1), Amount::from_minor(-5)).is_err());
        assert!(WriteEvent::deposit(EventId(1), Amount::from_minor(1)).is_ok());
    }

    #[test]
    fn test_event_id_fits_wire_range() {
        let top = i64::MAX as u64;
        assert_eq!(EventId::new(top).unwrap().to_wire(), i64::MAX);
        assert!(matches!(EventId::new(top + 1), Err(LedgerError::EventIdOutOfRange(_))));

        assert_eq!("42".parse::<EventId>().unwrap(), EventId(42));
        assert!("9223372036854775808".parse::<EventId>().is_err());
        assert!("18446744073709551616".parse::<EventId>().is_err());
        assert!("-1".parse::<EventId>().is_err());
        assert!("abc".parse::<EventId>().is_err());

        assert!(WriteEvent::deposit(EventId(top + 1), Amount::from_minor(1)).is_err());
        assert!(WriteEvent::withdraw(EventId::MAX, Amount::from_minor(1)).is_ok());
    }
}
