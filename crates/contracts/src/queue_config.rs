//! QueueConfig - static configuration of a queue's processing step

use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Indexer function configuration stored at `<queueKey>:storage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub account_id: String,
    pub function_name: String,
    pub code: String,
    pub schema: String,
}

impl QueueConfig {
    /// Decode the JSON stored under `key`.
    pub fn from_json(key: &str, raw: &str) -> Result<Self, StoreError> {
        serde_json::from_str(raw).map_err(|e| StoreError::decode(key, e.to_string()))
    }

    /// `account_id/function_name`, used in log lines.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.account_id, self.function_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let raw = r#"{"account_id":"acct.near","function_name":"myfn","code":"return;","schema":"CREATE TABLE t();"}"#;
        let config = QueueConfig::from_json("q:storage", raw).unwrap();
        assert_eq!(config.account_id, "acct.near");
        assert_eq!(config.full_name(), "acct.near/myfn");
    }

    #[test]
    fn test_from_json_reports_key() {
        let err = QueueConfig::from_json("q:storage", "{}").unwrap_err();
        match err {
            StoreError::Decode { key, .. } => assert_eq!(key, "q:storage"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
