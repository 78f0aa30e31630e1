//! Remote snapshot reader.
//!
//! Presents the user's followed artists, saved albums and saved tracks as lazy
//! sequences of catalog-shaped records, hiding pagination, page retries and
//! the genre backfill for owning artists.

pub mod normalize;
mod reader;

pub use reader::{ReaderSettings, SnapshotReader, SnapshotStream};

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::catalog_store::{Album, Artist, EntityKind, Track};
use crate::remote::RemoteError;

/// A single record that could not be turned into a catalog entity, or could
/// not be written. Never aborts a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub kind: EntityKind,
    /// Known unless the remote record had no id at all.
    pub id: Option<String>,
    pub reason: String,
}

impl ItemFailure {
    pub fn new(kind: EntityKind, id: Option<String>, reason: impl Into<String>) -> Self {
        ItemFailure {
            kind,
            id,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{} {}: {}", self.kind, id, self.reason),
            None => write!(f, "{} without id: {}", self.kind, self.reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotError {
    /// Only this record is lost; the stream continues.
    #[error("Skipped {0}")]
    Item(ItemFailure),

    /// The collection cannot be read any further; the stream ends.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// A saved album with the full record of its owning artist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumRecord {
    pub album: Album,
    pub artist: Artist,
}

/// A saved track with the full record of its owning artist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRecord {
    pub track: Track,
    pub artist: Artist,
}
