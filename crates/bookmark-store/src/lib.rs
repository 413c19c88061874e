//! Bookmark Store
//!
//! Holds the current session's bookmarked opportunity ids in memory and keeps
//! them in step with the backend. Toggles apply locally first and roll back
//! per identifier when the backend rejects them.

pub mod error;
mod state;
pub mod store;

pub use error::{BookmarkError, BookmarkResult};
pub use state::SyncState;
pub use store::BookmarkStore;
