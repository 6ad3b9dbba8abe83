//! Log entries and cached items
//!
//! Entry ids follow the `<millis>-<seq>` stream id format and are only
//! ordered within a single queue.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::StoreError;

/// Stream entry identifier.
///
/// Ordered by `(millis, seq)`. A bare `<millis>` parses with `seq = 0`, so
/// `"0"` is the smallest id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntryId {
    /// Append time in milliseconds since the Unix epoch
    pub millis: u64,
    /// Sequence number within the same millisecond
    pub seq: u64,
}

impl EntryId {
    /// Lowest possible id, start of every queue.
    pub const SMALLEST: EntryId = EntryId { millis: 0, seq: 0 };

    pub const fn new(millis: u64, seq: u64) -> Self {
        Self { millis, seq }
    }

    /// Milliseconds between the append time encoded in the id and `now_ms`.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.millis)
    }
}

impl FromStr for EntryId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StoreError::decode(s, "invalid entry id");
        let (millis, seq) = match s.split_once('-') {
            Some((millis, seq)) => (
                millis.parse().map_err(|_| invalid())?,
                seq.parse().map_err(|_| invalid())?,
            ),
            None => (s.parse().map_err(|_| invalid())?, 0),
        };
        Ok(Self { millis, seq })
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.millis, self.seq)
    }
}

impl Serialize for EntryId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntryId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One unit of work in a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: EntryId,
    pub block_height: u64,
}

impl LogEntry {
    pub fn new(id: EntryId, block_height: u64) -> Self {
        Self { id, block_height }
    }
}

/// Opaque payload from the shared block cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedItem {
    pub block_height: u64,
    pub payload: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_and_bare_ids() {
        assert_eq!("1-0".parse::<EntryId>().unwrap(), EntryId::new(1, 0));
        assert_eq!(
            "1700000000000-7".parse::<EntryId>().unwrap(),
            EntryId::new(1_700_000_000_000, 7)
        );
        assert_eq!("0".parse::<EntryId>().unwrap(), EntryId::SMALLEST);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<EntryId>().is_err());
        assert!("1-".parse::<EntryId>().is_err());
        assert!("abc-1".parse::<EntryId>().is_err());
        assert!(matches!(
            "x".parse::<EntryId>(),
            Err(StoreError::Decode { .. })
        ));
    }

    #[test]
    fn test_ordering_is_numeric() {
        let a: EntryId = "9-0".parse().unwrap();
        let b: EntryId = "10-0".parse().unwrap();
        let c: EntryId = "10-1".parse().unwrap();
        assert!(a < b && b < c);
        assert!(EntryId::SMALLEST < a);
    }

    #[test]
    fn test_display() {
        assert_eq!(EntryId::new(5, 2).to_string(), "5-2");
        assert_eq!(EntryId::SMALLEST.to_string(), "0-0");
    }

    #[test]
    fn test_age_saturates() {
        let id = EntryId::new(1_000, 0);
        assert_eq!(id.age_ms(1_250), 250);
        assert_eq!(id.age_ms(500), 0);
    }

    #[test]
    fn test_entry_serde() {
        let entry = LogEntry::new(EntryId::new(1, 0), 100);
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"id":"1-0","block_height":100}"#);
        let parsed: LogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
    }
}
