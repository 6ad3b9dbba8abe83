//! QueueKey - Cheap-to-clone queue identifier
//!
//! Uses Arc<str> internally for O(1) clone operations. The key suffix
//! decides the queue's processing mode.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Suffix reserved for queues that replay history.
pub const HISTORICAL_SUFFIX: &str = ":historical:stream";

/// Queue identifier with cheap cloning.
///
/// A queue key is discovered once and then cloned into the registry, the
/// handler task and every metric label, so cloning only bumps a refcount.
///
/// # Examples
/// ```
/// use contracts::{ProcessingMode, QueueKey};
///
/// let key: QueueKey = "acct.near/myfn:historical:stream".into();
/// assert_eq!(key.mode(), ProcessingMode::Historical);
/// assert_eq!(key.storage_key(), "acct.near/myfn:historical:stream:storage");
/// ```
#[derive(Clone, Default)]
pub struct QueueKey(Arc<str>);

impl QueueKey {
    /// Create a new QueueKey from a string slice.
    #[inline]
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// Get the underlying string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Processing mode derived from the key suffix.
    #[inline]
    pub fn mode(&self) -> ProcessingMode {
        ProcessingMode::classify(self.as_str())
    }

    /// Key holding this queue's JSON configuration.
    pub fn storage_key(&self) -> String {
        format!("{}:storage", self.0)
    }
}

/// How a queue is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessingMode {
    /// Replays past blocks, starting from the earliest entry.
    Historical,
    /// Follows the chain head.
    RealTime,
}

impl ProcessingMode {
    /// Classify a queue key. Total and pure: anything without the
    /// historical suffix is real-time.
    pub fn classify(queue_key: &str) -> Self {
        if queue_key.ends_with(HISTORICAL_SUFFIX) {
            Self::Historical
        } else {
            Self::RealTime
        }
    }

    /// Metric label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Historical => "historical",
            Self::RealTime => "real-time",
        }
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Deref for QueueKey {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for QueueKey {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for QueueKey {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for QueueKey {
    #[inline]
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for QueueKey {
    #[inline]
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueueKey({:?})", self.0)
    }
}

impl PartialEq for QueueKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for QueueKey {}

impl PartialEq<str> for QueueKey {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for QueueKey {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

// Must hash like str so `Borrow<str>` lookups work.
impl Hash for QueueKey {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl Serialize for QueueKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for QueueKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_classify() {
        assert_eq!(
            ProcessingMode::classify("foo:historical:stream"),
            ProcessingMode::Historical
        );
        assert_eq!(
            ProcessingMode::classify("foo:real-time:stream"),
            ProcessingMode::RealTime
        );
        assert_eq!(ProcessingMode::classify("foo"), ProcessingMode::RealTime);
        assert_eq!(ProcessingMode::classify(""), ProcessingMode::RealTime);
    }

    #[test]
    fn test_suffix_must_be_at_end() {
        let key: QueueKey = "foo:historical:stream:storage".into();
        assert_eq!(key.mode(), ProcessingMode::RealTime);
    }

    #[test]
    fn test_mode_labels() {
        assert_eq!(ProcessingMode::Historical.to_string(), "historical");
        assert_eq!(ProcessingMode::RealTime.as_str(), "real-time");
    }

    #[test]
    fn test_clone_is_cheap() {
        let key1: QueueKey = "acct.near/fn:real-time:stream".into();
        let key2 = key1.clone();

        assert_eq!(key1.as_str().as_ptr(), key2.as_str().as_ptr());
    }

    #[test]
    fn test_hashmap_key() {
        let mut map: HashMap<QueueKey, i32> = HashMap::new();
        map.insert("q1".into(), 1);
        map.insert("q2".into(), 2);

        assert_eq!(map.get("q1"), Some(&1));
        assert_eq!(map.get("q2"), Some(&2));
    }

    #[test]
    fn test_serde() {
        let key: QueueKey = "q".into();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"q\"");

        let parsed: QueueKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key);
    }
}
