//! CatalogStore trait definition.
//!
//! The reconciler, the library manager and the bulk transfer code only talk to
//! the catalog through this trait, so tests can swap in a store that fails on
//! demand.

use std::collections::HashSet;
use std::path::Path;

use super::error::Result;
use super::models::*;

/// Trait for catalog storage backends.
pub trait CatalogStore: Send + Sync {
    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert or update an artist, replacing its genre list.
    fn upsert_artist(&self, artist: &Artist) -> Result<()>;

    /// Insert or update an album. The owning artist must already exist.
    fn upsert_album(&self, album: &Album) -> Result<()>;

    /// Insert or update a track. The owning artist must already exist.
    fn upsert_track(&self, track: &Track) -> Result<()>;

    /// Insert the artist only when no row with its id exists yet.
    ///
    /// Returns `true` if a row was written. An existing artist is left as is,
    /// genres included.
    fn insert_artist_if_absent(&self, artist: &Artist) -> Result<bool>;

    /// Delete one entity by id. Returns `false` when nothing matched.
    ///
    /// Deleting an artist that still owns albums or tracks fails with
    /// [`CatalogError::Conflict`](super::CatalogError::Conflict).
    fn delete(&self, kind: EntityKind, id: &str) -> Result<bool>;

    /// Remove artists that own nothing and genres no artist references.
    fn cleanup_orphans(&self) -> Result<CleanupReport>;

    // =========================================================================
    // Integrity queries
    // =========================================================================

    /// Whether any album or track references this artist.
    fn has_children(&self, artist_id: &str) -> Result<bool>;

    /// Whether any track references this album.
    fn album_has_tracks(&self, album_id: &str) -> Result<bool>;

    // =========================================================================
    // Reads
    // =========================================================================

    fn get_artist(&self, id: &str) -> Result<Option<Artist>>;
    fn get_album(&self, id: &str) -> Result<Option<Album>>;
    fn get_track(&self, id: &str) -> Result<Option<Track>>;

    /// All stored ids of one entity class.
    fn ids(&self, kind: EntityKind) -> Result<HashSet<String>>;

    fn artist_ids(&self) -> Result<HashSet<String>> {
        self.ids(EntityKind::Artist)
    }

    fn album_ids(&self) -> Result<HashSet<String>> {
        self.ids(EntityKind::Album)
    }

    fn track_ids(&self) -> Result<HashSet<String>> {
        self.ids(EntityKind::Track)
    }

    /// Albums and tracks ordered by artist name, then release year.
    fn list_all(&self, filter: ItemFilter) -> Result<Vec<LibraryItem>>;

    /// Artists ordered by name.
    fn list_artists(&self) -> Result<Vec<Artist>>;

    /// Albums ordered by artist name, then album name.
    fn list_albums(&self) -> Result<Vec<AlbumView>>;

    /// Tracks ordered by track name.
    fn list_tracks(&self) -> Result<Vec<TrackView>>;

    fn list_genres(&self) -> Result<Vec<Genre>>;

    fn counts(&self) -> Result<CatalogCounts>;

    // =========================================================================
    // Batches
    // =========================================================================

    /// Start a batch. Writes issued until [`commit_batch`](Self::commit_batch)
    /// or [`rollback_batch`](Self::rollback_batch) become visible together.
    fn begin_batch(&self) -> Result<()>;
    fn commit_batch(&self) -> Result<()>;
    fn rollback_batch(&self) -> Result<()>;

    // =========================================================================
    // Raw table access (bulk transfer, backups)
    // =========================================================================

    /// Every row of a table, column values rendered as text, `None` for NULL.
    /// Columns follow the table descriptor order.
    fn export_table(&self, table: &str) -> Result<Vec<Vec<Option<String>>>>;

    /// Upsert one raw row into a table, keyed by the table's natural key.
    fn import_row(&self, table: &str, values: &[Option<String>]) -> Result<()>;

    /// Write a consistent copy of the whole database to `dest`.
    fn backup_to(&self, dest: &Path) -> Result<()>;
}
