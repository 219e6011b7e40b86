//! rusty-album/crates/ra-core/src/lib.rs
//!
//! The central domain logic and interface definitions for Rusty-Album:
//! models, the port traits the plugins implement, the schema boundary to
//! the schemaless document store, and the collection curator itself.

pub mod curator;
pub mod error;
pub mod models;
pub mod records;
pub mod traits;

// Re-exporting for easier access in other crates
pub use curator::{Curator, PendingDelete, Snapshot, UploadFile};
pub use error::*;
pub use models::*;
pub use traits::*;
