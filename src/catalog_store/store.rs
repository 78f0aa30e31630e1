//! SQLite-backed catalog store.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::types::{Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use super::error::{CatalogError, Result};
use super::models::*;
use super::schema::{
    ALBUMS_TABLE, ARTISTS_TABLE, ARTIST_GENRES_TABLE, CATALOG_VERSIONED_SCHEMAS, GENRES_TABLE,
    TRACKS_TABLE,
};
use super::trait_def::CatalogStore;
use crate::sqlite_persistence::{ensure_schema, SqlType, Table};

/// SQLite-backed catalog store.
///
/// A single connection is shared behind a mutex: batches are plain
/// `BEGIN`/`COMMIT` on that connection, so every write issued between
/// [`CatalogStore::begin_batch`] and [`CatalogStore::commit_batch`] lands in the
/// same transaction.
#[derive(Clone)]
pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalogStore {
    /// Open (or create) the catalog database at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = Self::from_connection(conn)?;
        let counts = store.counts()?;
        info!(
            "Opened catalog {}: {} artists, {} albums, {} tracks, {} genres",
            db_path.display(),
            counts.artists,
            counts.albums,
            counts.tracks,
            counts.genres
        );
        Ok(store)
    }

    /// Fresh in-memory catalog, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        ensure_schema(&mut conn, CATALOG_VERSIONED_SCHEMAS)
            .map_err(|e| CatalogError::Schema(e.to_string()))?;
        Ok(SqliteCatalogStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CatalogError::lock_poisoned())
    }

    fn table(name: &str) -> Result<&'static Table> {
        CATALOG_VERSIONED_SCHEMAS
            .last()
            .and_then(|schema| schema.table(name))
            .ok_or_else(|| CatalogError::InvalidData(format!("Unknown table {}", name)))
    }

    /// Columns an imported row is matched on.
    fn natural_key(table: &Table) -> &'static str {
        if table.name == ARTIST_GENRES_TABLE.name {
            "artist_id, genre_id"
        } else {
            "id"
        }
    }

    // =========================================================================
    // Row helpers
    // =========================================================================

    fn artist_genres(conn: &Connection, artist_id: &str) -> Result<Vec<String>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT g.name FROM {} ag JOIN {} g ON g.id = ag.genre_id
             WHERE ag.artist_id = ?1 ORDER BY ag.position",
            ARTIST_GENRES_TABLE.name, GENRES_TABLE.name
        ))?;
        let genres = stmt
            .query_map(params![artist_id], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(genres)
    }

    /// Parse an Artist from (id, name, uri, url, image_url).
    fn parse_artist_row(row: &rusqlite::Row) -> rusqlite::Result<Artist> {
        Ok(Artist {
            id: row.get(0)?,
            name: row.get(1)?,
            genres: Vec::new(),
            uri: row.get(2)?,
            url: row.get(3)?,
            image_url: row.get(4)?,
        })
    }

    /// Parse an Album from (id, artist_id, name, release_year, uri, url).
    fn parse_album_row(row: &rusqlite::Row) -> rusqlite::Result<Album> {
        Ok(Album {
            id: row.get(0)?,
            artist_id: row.get(1)?,
            name: row.get(2)?,
            release_year: row.get(3)?,
            uri: row.get(4)?,
            url: row.get(5)?,
        })
    }

    /// Parse a Track from (id, artist_id, album_id, name, release_year, uri, url).
    fn parse_track_row(row: &rusqlite::Row) -> rusqlite::Result<Track> {
        Ok(Track {
            id: row.get(0)?,
            artist_id: row.get(1)?,
            album_id: row.get(2)?,
            name: row.get(3)?,
            release_year: row.get(4)?,
            uri: row.get(5)?,
            url: row.get(6)?,
        })
    }

    fn check_id(kind: EntityKind, id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(CatalogError::InvalidData(format!("{} id is empty", kind)));
        }
        Ok(())
    }

    /// Writes the artist row and rebuilds its genre links. Must run inside a
    /// savepoint or transaction.
    fn write_artist(conn: &Connection, artist: &Artist) -> Result<()> {
        Self::check_id(EntityKind::Artist, &artist.id)?;
        let image_url = artist
            .image_url
            .as_deref()
            .filter(|url| !url.is_empty());

        conn.prepare_cached(&format!(
            "INSERT INTO {} (id, name, uri, url, image_url) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                uri = excluded.uri,
                url = excluded.url,
                image_url = excluded.image_url",
            ARTISTS_TABLE.name
        ))?
        .execute(params![
            artist.id,
            artist.name,
            artist.uri,
            artist.url,
            image_url
        ])?;

        conn.prepare_cached(&format!(
            "DELETE FROM {} WHERE artist_id = ?1",
            ARTIST_GENRES_TABLE.name
        ))?
        .execute(params![artist.id])?;

        for (position, genre) in artist.genres.iter().enumerate() {
            let genre = genre.trim();
            if genre.is_empty() {
                continue;
            }
            conn.prepare_cached(&format!(
                "INSERT INTO {} (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
                GENRES_TABLE.name
            ))?
            .execute(params![genre])?;
            let genre_id: i64 = conn
                .prepare_cached(&format!("SELECT id FROM {} WHERE name = ?1", GENRES_TABLE.name))?
                .query_row(params![genre], |r| r.get(0))?;
            conn.prepare_cached(&format!(
                "INSERT INTO {} (artist_id, genre_id, position) VALUES (?1, ?2, ?3)
                 ON CONFLICT(artist_id, genre_id) DO NOTHING",
                ARTIST_GENRES_TABLE.name
            ))?
            .execute(params![artist.id, genre_id, position as i64])?;
        }
        Ok(())
    }

    fn exists(conn: &Connection, kind: EntityKind, id: &str) -> Result<bool> {
        let found = conn
            .prepare_cached(&format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)",
                kind.table_name()
            ))?
            .query_row(params![id], |r| r.get(0))?;
        Ok(found)
    }

    fn count(conn: &Connection, table: &str) -> Result<usize> {
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| {
            r.get(0)
        })?;
        Ok(count as usize)
    }

    fn value_to_text(value: ValueRef<'_>) -> Option<String> {
        match value {
            ValueRef::Null => None,
            ValueRef::Integer(i) => Some(i.to_string()),
            ValueRef::Real(f) => Some(f.to_string()),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                Some(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

impl CatalogStore for SqliteCatalogStore {
    // =========================================================================
    // Writes
    // =========================================================================

    fn upsert_artist(&self, artist: &Artist) -> Result<()> {
        let mut conn = self.lock()?;
        let sp = conn.savepoint()?;
        Self::write_artist(&sp, artist)?;
        sp.commit()?;
        Ok(())
    }

    fn upsert_album(&self, album: &Album) -> Result<()> {
        Self::check_id(EntityKind::Album, &album.id)?;
        let conn = self.lock()?;
        conn.prepare_cached(&format!(
            "INSERT INTO {} (id, artist_id, name, release_year, uri, url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                artist_id = excluded.artist_id,
                name = excluded.name,
                release_year = excluded.release_year,
                uri = excluded.uri,
                url = excluded.url",
            ALBUMS_TABLE.name
        ))?
        .execute(params![
            album.id,
            album.artist_id,
            album.name,
            album.release_year,
            album.uri,
            album.url
        ])?;
        Ok(())
    }

    fn upsert_track(&self, track: &Track) -> Result<()> {
        Self::check_id(EntityKind::Track, &track.id)?;
        let conn = self.lock()?;
        conn.prepare_cached(&format!(
            "INSERT INTO {} (id, artist_id, album_id, name, release_year, uri, url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                artist_id = excluded.artist_id,
                album_id = excluded.album_id,
                name = excluded.name,
                release_year = excluded.release_year,
                uri = excluded.uri,
                url = excluded.url",
            TRACKS_TABLE.name
        ))?
        .execute(params![
            track.id,
            track.artist_id,
            track.album_id,
            track.name,
            track.release_year,
            track.uri,
            track.url
        ])?;
        Ok(())
    }

    fn insert_artist_if_absent(&self, artist: &Artist) -> Result<bool> {
        let mut conn = self.lock()?;
        let sp = conn.savepoint()?;
        if Self::exists(&sp, EntityKind::Artist, &artist.id)? {
            return Ok(false);
        }
        Self::write_artist(&sp, artist)?;
        sp.commit()?;
        Ok(true)
    }

    fn delete(&self, kind: EntityKind, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .prepare_cached(&format!("DELETE FROM {} WHERE id = ?1", kind.table_name()))?
            .execute(params![id])?;
        debug!("Deleted {} {} ({} rows)", kind, id, deleted);
        Ok(deleted > 0)
    }

    fn cleanup_orphans(&self) -> Result<CleanupReport> {
        let mut conn = self.lock()?;
        let sp = conn.savepoint()?;
        let artists_removed = sp.execute(
            &format!(
                "DELETE FROM {artists} WHERE
                    NOT EXISTS (SELECT 1 FROM {albums} WHERE artist_id = {artists}.id)
                    AND NOT EXISTS (SELECT 1 FROM {tracks} WHERE artist_id = {artists}.id)",
                artists = ARTISTS_TABLE.name,
                albums = ALBUMS_TABLE.name,
                tracks = TRACKS_TABLE.name
            ),
            [],
        )?;
        let genres_removed = sp.execute(
            &format!(
                "DELETE FROM {genres} WHERE
                    NOT EXISTS (SELECT 1 FROM {links} WHERE genre_id = {genres}.id)",
                genres = GENRES_TABLE.name,
                links = ARTIST_GENRES_TABLE.name
            ),
            [],
        )?;
        sp.commit()?;

        let report = CleanupReport {
            artists_removed,
            genres_removed,
        };
        info!(
            "Orphan cleanup removed {} artists and {} genres",
            report.artists_removed, report.genres_removed
        );
        Ok(report)
    }

    // =========================================================================
    // Integrity queries
    // =========================================================================

    fn has_children(&self, artist_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let found = conn
            .prepare_cached(&format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE artist_id = ?1)
                     OR EXISTS(SELECT 1 FROM {} WHERE artist_id = ?1)",
                ALBUMS_TABLE.name, TRACKS_TABLE.name
            ))?
            .query_row(params![artist_id], |r| r.get(0))?;
        Ok(found)
    }

    fn album_has_tracks(&self, album_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let found = conn
            .prepare_cached(&format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE album_id = ?1)",
                TRACKS_TABLE.name
            ))?
            .query_row(params![album_id], |r| r.get(0))?;
        Ok(found)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    fn get_artist(&self, id: &str) -> Result<Option<Artist>> {
        let conn = self.lock()?;
        let artist = conn
            .prepare_cached(&format!(
                "SELECT id, name, uri, url, image_url FROM {} WHERE id = ?1",
                ARTISTS_TABLE.name
            ))?
            .query_row(params![id], Self::parse_artist_row)
            .optional()?;
        match artist {
            Some(mut artist) => {
                artist.genres = Self::artist_genres(&conn, id)?;
                Ok(Some(artist))
            }
            None => Ok(None),
        }
    }

    fn get_album(&self, id: &str) -> Result<Option<Album>> {
        let conn = self.lock()?;
        let album = conn
            .prepare_cached(&format!(
                "SELECT id, artist_id, name, release_year, uri, url FROM {} WHERE id = ?1",
                ALBUMS_TABLE.name
            ))?
            .query_row(params![id], Self::parse_album_row)
            .optional()?;
        Ok(album)
    }

    fn get_track(&self, id: &str) -> Result<Option<Track>> {
        let conn = self.lock()?;
        let track = conn
            .prepare_cached(&format!(
                "SELECT id, artist_id, album_id, name, release_year, uri, url FROM {} WHERE id = ?1",
                TRACKS_TABLE.name
            ))?
            .query_row(params![id], Self::parse_track_row)
            .optional()?;
        Ok(track)
    }

    fn ids(&self, kind: EntityKind) -> Result<HashSet<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!("SELECT id FROM {}", kind.table_name()))?;
        let ids = stmt
            .query_map([], |r| r.get(0))?
            .collect::<rusqlite::Result<HashSet<String>>>()?;
        Ok(ids)
    }

    fn list_all(&self, filter: ItemFilter) -> Result<Vec<LibraryItem>> {
        let albums = format!(
            "SELECT 'album', al.id, al.name, ar.name, al.release_year, al.uri, al.url, ar.id
             FROM {} al JOIN {} ar ON ar.id = al.artist_id",
            ALBUMS_TABLE.name, ARTISTS_TABLE.name
        );
        let tracks = format!(
            "SELECT 'track', t.id, t.name, ar.name, t.release_year, t.uri, t.url, ar.id
             FROM {} t JOIN {} ar ON ar.id = t.artist_id",
            TRACKS_TABLE.name, ARTISTS_TABLE.name
        );
        let source = match filter {
            ItemFilter::All => format!("{} UNION ALL {}", albums, tracks),
            ItemFilter::Albums => albums,
            ItemFilter::Tracks => tracks,
        };
        let sql = format!("{} ORDER BY 4, 5, 3", source);

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                let kind: String = row.get(0)?;
                Ok((
                    kind,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i32>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut genre_cache: HashMap<String, Vec<String>> = HashMap::new();
        let mut items = Vec::with_capacity(rows.len());
        for (kind, id, name, artist_name, release_year, uri, url, artist_id) in rows {
            let genres = match genre_cache.get(&artist_id) {
                Some(genres) => genres.clone(),
                None => {
                    let genres = Self::artist_genres(&conn, &artist_id)?;
                    genre_cache.insert(artist_id, genres.clone());
                    genres
                }
            };
            let kind = if kind == "album" {
                EntityKind::Album
            } else {
                EntityKind::Track
            };
            items.push(LibraryItem {
                kind,
                id,
                name,
                artist_name,
                release_year,
                uri,
                url,
                genres,
            });
        }
        Ok(items)
    }

    fn list_artists(&self) -> Result<Vec<Artist>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT id, name, uri, url, image_url FROM {} ORDER BY name, id",
            ARTISTS_TABLE.name
        ))?;
        let mut artists = stmt
            .query_map([], Self::parse_artist_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for artist in artists.iter_mut() {
            artist.genres = Self::artist_genres(&conn, &artist.id)?;
        }
        Ok(artists)
    }

    fn list_albums(&self) -> Result<Vec<AlbumView>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT al.id, al.artist_id, al.name, al.release_year, al.uri, al.url, ar.name
             FROM {} al JOIN {} ar ON ar.id = al.artist_id
             ORDER BY ar.name, al.name",
            ALBUMS_TABLE.name, ARTISTS_TABLE.name
        ))?;
        let albums = stmt
            .query_map([], |row| {
                Ok(AlbumView {
                    album: Self::parse_album_row(row)?,
                    artist_name: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(albums)
    }

    fn list_tracks(&self) -> Result<Vec<TrackView>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT t.id, t.artist_id, t.album_id, t.name, t.release_year, t.uri, t.url, ar.name
             FROM {} t JOIN {} ar ON ar.id = t.artist_id
             ORDER BY t.name",
            TRACKS_TABLE.name, ARTISTS_TABLE.name
        ))?;
        let tracks = stmt
            .query_map([], |row| {
                Ok(TrackView {
                    track: Self::parse_track_row(row)?,
                    artist_name: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    fn list_genres(&self) -> Result<Vec<Genre>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare_cached(&format!("SELECT id, name FROM {} ORDER BY name", GENRES_TABLE.name))?;
        let genres = stmt
            .query_map([], |row| {
                Ok(Genre {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(genres)
    }

    fn counts(&self) -> Result<CatalogCounts> {
        let conn = self.lock()?;
        Ok(CatalogCounts {
            artists: Self::count(&conn, ARTISTS_TABLE.name)?,
            albums: Self::count(&conn, ALBUMS_TABLE.name)?,
            tracks: Self::count(&conn, TRACKS_TABLE.name)?,
            genres: Self::count(&conn, GENRES_TABLE.name)?,
        })
    }

    // =========================================================================
    // Batches
    // =========================================================================

    fn begin_batch(&self) -> Result<()> {
        self.lock()?.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit_batch(&self) -> Result<()> {
        self.lock()?.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback_batch(&self) -> Result<()> {
        self.lock()?.execute_batch("ROLLBACK")?;
        Ok(())
    }

    // =========================================================================
    // Raw table access
    // =========================================================================

    fn export_table(&self, table: &str) -> Result<Vec<Vec<Option<String>>>> {
        let table = Self::table(table)?;
        let columns = table.column_names();
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} ORDER BY rowid",
            columns.join(", "),
            table.name
        ))?;
        let rows = stmt
            .query_map([], |row| {
                (0..columns.len())
                    .map(|i| row.get_ref(i).map(Self::value_to_text))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn import_row(&self, table: &str, values: &[Option<String>]) -> Result<()> {
        let table = Self::table(table)?;
        if values.len() != table.columns.len() {
            return Err(CatalogError::InvalidData(format!(
                "{} row has {} values, expected {}",
                table.name,
                values.len(),
                table.columns.len()
            )));
        }

        let mut bound = Vec::with_capacity(values.len());
        for (column, value) in table.columns.iter().zip(values) {
            let value = match value {
                None => Value::Null,
                Some(text) if column.sql_type == &SqlType::Integer => {
                    let parsed = text.trim().parse::<i64>().map_err(|_| {
                        CatalogError::InvalidData(format!(
                            "{}.{} expects an integer, got '{}'",
                            table.name, column.name, text
                        ))
                    })?;
                    Value::Integer(parsed)
                }
                Some(text) => Value::Text(text.clone()),
            };
            bound.push(value);
        }

        let key = Self::natural_key(table);
        let key_columns: Vec<&str> = key.split(", ").collect();
        let columns = table.column_names();
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let updates = columns
            .iter()
            .filter(|c| !key_columns.contains(c))
            .map(|c| format!("{} = excluded.{}", c, c))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) DO UPDATE SET {}",
            table.name,
            columns.join(", "),
            placeholders,
            key,
            updates
        );
        let conn = self.lock()?;
        conn.prepare_cached(&sql)?.execute(params_from_iter(bound))?;
        Ok(())
    }

    fn backup_to(&self, dest: &Path) -> Result<()> {
        if dest.exists() {
            return Err(CatalogError::InvalidData(format!(
                "Backup destination {} already exists",
                dest.display()
            )));
        }
        let dest_str = dest.to_string_lossy().to_string();
        let conn = self.lock()?;
        conn.execute("VACUUM INTO ?1", params![dest_str])?;
        info!("Catalog backed up to {}", dest.display());
        Ok(())
    }
}
