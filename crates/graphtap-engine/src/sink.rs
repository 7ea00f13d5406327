//! Output sinks for rows and state checkpoints.
//!
//! The engine is sink-agnostic: rows and state snapshots go through
//! [`RecordSink`] in emission order. The shipping sink writes
//! tap-protocol JSON lines; [`MemorySink`] captures everything for tests.

use std::io::Write;

use anyhow::{Context, Result};
use serde_json::json;

use graphtap_state::StateSnapshot;
use graphtap_types::row::Row;

/// Ordered consumer of extraction output.
pub trait RecordSink {
    /// Emit one row for `stream`.
    ///
    /// # Errors
    ///
    /// Propagates any write failure; the engine aborts the run on sink
    /// errors since output order can no longer be guaranteed.
    fn write_row(&mut self, stream: &str, row: &Row) -> Result<()>;

    /// Emit a state checkpoint. Every row written before this call is
    /// covered by the snapshot.
    ///
    /// # Errors
    ///
    /// Propagates any write failure.
    fn write_state(&mut self, state: &StateSnapshot) -> Result<()>;
}

/// Line-delimited JSON sink: `RECORD` and `STATE` messages on one writer.
pub struct JsonlSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonlSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Flush and hand back the writer.
    ///
    /// # Errors
    ///
    /// Propagates the flush failure.
    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush().context("Failed to flush output")?;
        Ok(self.writer)
    }
}

impl<W: Write> RecordSink for JsonlSink<W> {
    fn write_row(&mut self, stream: &str, row: &Row) -> Result<()> {
        let message = json!({"type": "RECORD", "stream": stream, "record": row});
        serde_json::to_writer(&mut self.writer, &message)
            .context("Failed to serialize record message")?;
        self.writer.write_all(b"\n").context("Failed to write record message")?;
        Ok(())
    }

    fn write_state(&mut self, state: &StateSnapshot) -> Result<()> {
        let message = json!({"type": "STATE", "value": state});
        serde_json::to_writer(&mut self.writer, &message)
            .context("Failed to serialize state message")?;
        self.writer.write_all(b"\n").context("Failed to write state message")?;
        // State marks a durable checkpoint; make sure it reaches the target.
        self.writer.flush().context("Failed to flush state message")?;
        Ok(())
    }
}

/// In-memory sink capturing rows and checkpoints in emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub rows: Vec<(String, Row)>,
    pub states: Vec<StateSnapshot>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows captured for one stream, in order.
    #[must_use]
    pub fn rows_for(&self, stream: &str) -> Vec<&Row> {
        self.rows
            .iter()
            .filter(|(s, _)| s == stream)
            .map(|(_, r)| r)
            .collect()
    }
}

impl RecordSink for MemorySink {
    fn write_row(&mut self, stream: &str, row: &Row) -> Result<()> {
        self.rows.push((stream.to_string(), row.clone()));
        Ok(())
    }

    fn write_state(&mut self, state: &StateSnapshot) -> Result<()> {
        self.states.push(state.clone());
        Ok(())
    }
}
