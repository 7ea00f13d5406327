//! Core extraction engine for graphtap.
//!
//! Walks the stream dependency graph, drives pagination and time-window
//! planning against the upstream API, normalizes responses into flat rows,
//! and advances bookmarks only after rows reach the sink.

pub mod auth;
pub mod backoff;
pub mod catalog;
pub mod config;
pub mod executor;
pub mod normalize;
pub mod paginator;
pub mod sink;
pub mod transport;
pub mod window;

// Re-export public API for convenience
pub use config::TapConfig;
pub use executor::{CancellationToken, Executor, RunReport};
pub use sink::{JsonlSink, MemorySink, RecordSink};
pub use transport::{HttpTransport, Response, Transport};
