//! Bookmark store: staged advancement with explicit commit.
//!
//! `advance` is a max-merge into a staging area; `commit` promotes the
//! staged value only after the executor has handed the corresponding rows
//! to the sink. A crash between advance and commit re-extracts on restart
//! (at-least-once delivery).

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use graphtap_types::context::PartitionKey;
use graphtap_types::cursor::Bookmark;

use crate::snapshot::StateSnapshot;

/// Storage contract for per-(stream, partition) bookmarks.
pub trait StateStore {
    /// Read the committed bookmark, if any.
    ///
    /// Malformed persisted values read as absent (the caller degrades to
    /// its fallback window) and are logged as warnings.
    fn get(&self, stream: &str, partition: &PartitionKey) -> Option<Bookmark>;

    /// Stage a candidate bookmark value: `max(current, candidate)`, never a
    /// regression.
    fn advance(&mut self, stream: &str, partition: &PartitionKey, candidate: DateTime<Utc>);

    /// Promote the staged value for one (stream, partition) to committed.
    /// Called only after the sink has accepted the page's rows.
    fn commit(&mut self, stream: &str, partition: &PartitionKey);

    /// Serializable view of all committed bookmarks.
    fn snapshot(&self) -> StateSnapshot;
}

/// In-memory [`StateStore`].
///
/// Committed values are kept as raw wire strings so that a loaded snapshot
/// round-trips exactly even when an entry is unparseable.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    committed: BTreeMap<String, BTreeMap<String, String>>,
    staged: HashMap<(String, String), Bookmark>,
}

impl MemoryStateStore {
    /// Empty store (first run).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from a loaded snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: &StateSnapshot) -> Self {
        let mut committed: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for (stream, partitions) in &snapshot.streams {
            let entry = committed.entry(stream.clone()).or_default();
            for (partition, bookmark) in partitions {
                entry.insert(partition.clone(), bookmark.replication_key_value.clone());
            }
        }
        Self {
            committed,
            staged: HashMap::new(),
        }
    }

    fn committed_bookmark(&self, stream: &str, partition: &str) -> Option<Bookmark> {
        let raw = self.committed.get(stream)?.get(partition)?;
        match Bookmark::from_wire(raw) {
            Some(bm) => Some(bm),
            None => {
                tracing::warn!(
                    stream,
                    partition,
                    value = raw.as_str(),
                    "Unparseable stored bookmark, treating as absent"
                );
                None
            }
        }
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, stream: &str, partition: &PartitionKey) -> Option<Bookmark> {
        self.committed_bookmark(stream, partition.as_key().as_str())
    }

    fn advance(&mut self, stream: &str, partition: &PartitionKey, candidate: DateTime<Utc>) {
        let key = (stream.to_string(), partition.as_key());
        let floor = self
            .staged
            .get(&key)
            .copied()
            .or_else(|| self.committed_bookmark(stream, &key.1));
        let mut bookmark = floor.unwrap_or(Bookmark::new(candidate));
        bookmark.advance(candidate);
        self.staged.insert(key, bookmark);
    }

    fn commit(&mut self, stream: &str, partition: &PartitionKey) {
        let key = (stream.to_string(), partition.as_key());
        if let Some(bookmark) = self.staged.remove(&key) {
            tracing::debug!(
                stream,
                partition = key.1.as_str(),
                value = bookmark.to_wire().as_str(),
                "Bookmark committed"
            );
            self.committed
                .entry(key.0)
                .or_default()
                .insert(key.1, bookmark.to_wire());
        }
    }

    fn snapshot(&self) -> StateSnapshot {
        let mut snapshot = StateSnapshot::default();
        for (stream, partitions) in &self.committed {
            for (partition, value) in partitions {
                snapshot.set(stream, partition, value.clone());
            }
        }
        snapshot
    }
}
