//! Bookmark/state persistence model for the graphtap engine.
//!
//! Provides the [`StateStore`] trait, an in-memory [`MemoryStateStore`]
//! implementation, and the persisted [`StateSnapshot`] JSON layout. The
//! engine itself never touches files; snapshots are handed to the sink and
//! loaded/saved at the edges.

pub mod error;
pub mod snapshot;
pub mod store;

pub use error::StateError;
pub use snapshot::StateSnapshot;
pub use store::{MemoryStateStore, StateStore};
