//! Persisted state snapshot layout.
//!
//! Nested key/value JSON keyed by stream name, then partition-key tuple.
//! The layout must round-trip exactly: loading a snapshot and saving it
//! without any extraction reproduces identical JSON. Bookmark values are
//! therefore kept as their raw wire strings here; parsing happens in the
//! store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Persisted bookmark for one (stream, partition).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkState {
    /// Raw replication-key high-water mark (RFC 3339 when written by this
    /// engine; kept verbatim regardless).
    pub replication_key_value: String,
}

/// Full persisted state: `stream -> partition-key tuple -> bookmark`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub streams: BTreeMap<String, BTreeMap<String, BookmarkState>>,
}

impl StateSnapshot {
    /// Parse a snapshot from its JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Malformed`](crate::StateError::Malformed) if
    /// the document does not match the layout.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Serialize to the persisted JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Malformed`](crate::StateError::Malformed) on
    /// serialization failure.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Look up the raw bookmark value for a (stream, partition key).
    #[must_use]
    pub fn get(&self, stream: &str, partition: &str) -> Option<&str> {
        self.streams
            .get(stream)
            .and_then(|parts| parts.get(partition))
            .map(|b| b.replication_key_value.as_str())
    }

    /// Insert or replace a bookmark value.
    pub fn set(&mut self, stream: &str, partition: &str, value: String) {
        self.streams
            .entry(stream.to_string())
            .or_default()
            .insert(
                partition.to_string(),
                BookmarkState {
                    replication_key_value: value,
                },
            );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
  "streams": {
    "media": {
      "user_id=17841400000000000": {
        "replication_key_value": "2024-01-15T00:00:00Z"
      }
    },
    "user_insights_daily": {
      "user_id=17841400000000000": {
        "replication_key_value": "2024-02-01T00:00:00Z"
      },
      "user_id=17841400000000001": {
        "replication_key_value": "2024-02-02T00:00:00Z"
      }
    }
  }
}"#;

    #[test]
    fn load_then_save_reproduces_identical_state() {
        let snapshot = StateSnapshot::from_json(FIXTURE).unwrap();
        let saved = snapshot.to_json().unwrap();
        let reloaded = StateSnapshot::from_json(&saved).unwrap();
        assert_eq!(snapshot, reloaded);
        // Serialization itself is deterministic.
        assert_eq!(saved, reloaded.to_json().unwrap());
    }

    #[test]
    fn get_and_set() {
        let mut snapshot = StateSnapshot::default();
        assert_eq!(snapshot.get("media", "user_id=1"), None);
        snapshot.set("media", "user_id=1", "2024-01-01T00:00:00Z".into());
        assert_eq!(
            snapshot.get("media", "user_id=1"),
            Some("2024-01-01T00:00:00Z")
        );
    }

    #[test]
    fn empty_document_is_empty_snapshot() {
        let snapshot = StateSnapshot::from_json("{}").unwrap();
        assert!(snapshot.streams.is_empty());
    }

    #[test]
    fn malformed_document_errors() {
        assert!(StateSnapshot::from_json("{\"streams\": 3}").is_err());
    }

    #[test]
    fn unparseable_bookmark_value_is_kept_verbatim() {
        let raw = r#"{"streams":{"media":{"user_id=1":{"replication_key_value":"garbage"}}}}"#;
        let snapshot = StateSnapshot::from_json(raw).unwrap();
        assert_eq!(snapshot.get("media", "user_id=1"), Some("garbage"));
        let back = StateSnapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(snapshot, back);
    }
}
