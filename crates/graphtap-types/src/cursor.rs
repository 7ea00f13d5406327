//! Bookmark values for resumable incremental extraction.
//!
//! A bookmark is the high-water mark of a stream's replication key within
//! one partition. It only ever moves forward: `advance` is a max-merge,
//! never an overwrite.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Canonical row-level datetime format (`YYYY-MM-DD HH:mm:ss`, UTC).
pub const CANONICAL_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Persisted high-water mark for one (stream, partition).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Maximum replication-key value confirmed delivered downstream.
    pub replication_value: DateTime<Utc>,
}

impl Bookmark {
    /// Create a bookmark at the given position.
    #[must_use]
    pub fn new(replication_value: DateTime<Utc>) -> Self {
        Self { replication_value }
    }

    /// Max-merge a candidate value; the bookmark never regresses.
    pub fn advance(&mut self, candidate: DateTime<Utc>) {
        if candidate > self.replication_value {
            self.replication_value = candidate;
        }
    }

    /// Wire form written to persisted state (RFC 3339, second precision).
    #[must_use]
    pub fn to_wire(&self) -> String {
        self.replication_value
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// Parse the persisted wire form.
    ///
    /// Returns `None` for malformed state; callers degrade to the fallback
    /// window rather than failing (state anomaly policy).
    #[must_use]
    pub fn from_wire(raw: &str) -> Option<Self> {
        parse_replication_value(raw).map(Self::new)
    }
}

/// Parse a replication-key value as it appears on rows or in state.
///
/// Accepts the canonical `YYYY-MM-DD HH:mm:ss` row format, RFC 3339, and
/// the Graph API's `+0000`-suffixed ISO form. Returns `None` for anything
/// else.
#[must_use]
pub fn parse_replication_value(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, CANONICAL_DATETIME_FMT) {
        return Some(naive.and_utc());
    }
    None
}
