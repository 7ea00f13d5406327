//! State store error types.

/// Errors produced by [`StateStore`](crate::StateStore) operations and
/// snapshot (de)serialization.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// The snapshot document is not valid JSON for the state layout.
    #[error("malformed state snapshot: {0}")]
    Malformed(#[from] serde_json::Error),

    /// File-system I/O failure while loading or saving a snapshot.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StateError>;
