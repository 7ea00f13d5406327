//! Shared graphtap data model types.
//!
//! Pure data + serde: stream definitions, extraction contexts, bookmarks,
//! time windows, rows, and the structured extraction error model. This crate
//! is the dependency boundary between the engine and the state store.

pub mod context;
pub mod cursor;
pub mod error;
pub mod row;
pub mod stream;
pub mod window;
