//! Spotify Manager Library
//!
//! A local catalog of the artists, albums and tracks in a Spotify library,
//! kept in SQLite and reconciled against the remote collection.

pub mod catalog_store;
pub mod config;
pub mod library;
pub mod reconcile;
pub mod remote;
pub mod snapshot;
pub mod sqlite_persistence;
pub mod transfer;

// Re-export commonly used types for convenience
pub use catalog_store::{CatalogStore, EntityKind, SqliteCatalogStore};
pub use library::LibraryManager;
pub use reconcile::{PassReport, Reconciler, SyncAllReport, SyncError};
pub use remote::{SpotifyApi, SpotifyClient};
pub use snapshot::{ReaderSettings, SnapshotReader};
