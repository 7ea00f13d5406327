//! Time windows for metrics endpoints with bounded lookback and span.

use chrono::{DateTime, Utc};

/// Static window limits declared on a stream definition.
///
/// Bounds are resolved against wall-clock time at run start: the minimum
/// historical bound is `now - max_history_days`, and no window reaches
/// past `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    /// Deepest supported lookback, in days.
    pub max_history_days: u32,
    /// Widest single-request span, in days.
    pub max_window_days: u32,
}

/// A half-open `[since, until)` request interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl Window {
    /// Whether the window covers no time at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.since >= self.until
    }
}
