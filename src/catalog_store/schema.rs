//! SQLite schema of the catalog database.
//!
//! Primary keys are the opaque remote catalog IDs. Genres are normalized into
//! their own table with a positional junction so an artist keeps the order of
//! its genre list.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
};

const ARTIST_FK: ForeignKey = ForeignKey {
    foreign_table: "artists",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::NoAction,
};

const ARTIST_FK_CASCADE: ForeignKey = ForeignKey {
    foreign_table: "artists",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const GENRE_FK_CASCADE: ForeignKey = ForeignKey {
    foreign_table: "genres",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

pub const ARTISTS_TABLE: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("uri", &SqlType::Text, non_null = true),
        sqlite_column!("url", &SqlType::Text, non_null = true),
        sqlite_column!("image_url", &SqlType::Text),
    ],
    indices: &[("idx_artists_name", "name")],
    unique_constraints: &[],
};

pub const ALBUMS_TABLE: Table = Table {
    name: "albums",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true, non_null = true),
        sqlite_column!(
            "artist_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ARTIST_FK)
        ),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("release_year", &SqlType::Integer, non_null = true),
        sqlite_column!("uri", &SqlType::Text, non_null = true),
        sqlite_column!("url", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_albums_artist", "artist_id")],
    unique_constraints: &[],
};

/// `album_id` is deliberately not a foreign key: a saved track may belong to an
/// album that is not itself in the library.
pub const TRACKS_TABLE: Table = Table {
    name: "tracks",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true, non_null = true),
        sqlite_column!(
            "artist_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ARTIST_FK)
        ),
        sqlite_column!("album_id", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("release_year", &SqlType::Integer, non_null = true),
        sqlite_column!("uri", &SqlType::Text, non_null = true),
        sqlite_column!("url", &SqlType::Text, non_null = true),
    ],
    indices: &[
        ("idx_tracks_artist", "artist_id"),
        ("idx_tracks_album", "album_id"),
    ],
    unique_constraints: &[],
};

pub const GENRES_TABLE: Table = Table {
    name: "genres",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true, is_unique = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

pub const ARTIST_GENRES_TABLE: Table = Table {
    name: "artist_genres",
    columns: &[
        sqlite_column!(
            "artist_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ARTIST_FK_CASCADE)
        ),
        sqlite_column!(
            "genre_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&GENRE_FK_CASCADE)
        ),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_artist_genres_artist", "artist_id"),
        ("idx_artist_genres_genre", "genre_id"),
    ],
    unique_constraints: &[&["artist_id", "genre_id"]],
};

pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        ARTISTS_TABLE,
        ALBUMS_TABLE,
        TRACKS_TABLE,
        GENRES_TABLE,
        ARTIST_GENRES_TABLE,
    ],
    migration: None,
}];

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", true).unwrap();
        CATALOG_VERSIONED_SCHEMAS[0].create(&conn).unwrap();
        conn
    }

    #[test]
    fn schema_creates_and_validates() {
        let conn = fresh();
        CATALOG_VERSIONED_SCHEMAS[0].validate(&conn).unwrap();
    }

    #[test]
    fn album_requires_existing_artist() {
        let conn = fresh();
        let result = conn.execute(
            "INSERT INTO albums (id, artist_id, name, release_year, uri, url) VALUES ('al1', 'missing', 'X', 2000, '', '')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn track_may_reference_unknown_album() {
        let conn = fresh();
        conn.execute(
            "INSERT INTO artists (id, name, uri, url) VALUES ('ar1', 'Artist', '', '')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO tracks (id, artist_id, album_id, name, release_year, uri, url) VALUES ('t1', 'ar1', 'not-saved', 'T', 2001, '', '')",
            [],
        )
        .unwrap();
    }

    #[test]
    fn deleting_artist_cascades_genre_links_only() {
        let conn = fresh();
        conn.execute(
            "INSERT INTO artists (id, name, uri, url) VALUES ('ar1', 'Artist', '', '')",
            [],
        )
        .unwrap();
        conn.execute("INSERT INTO genres (id, name) VALUES (1, 'jazz')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO artist_genres (artist_id, genre_id, position) VALUES ('ar1', 1, 0)",
            [],
        )
        .unwrap();

        conn.execute("DELETE FROM artists WHERE id = 'ar1'", []).unwrap();

        let links: i64 = conn
            .query_row("SELECT COUNT(*) FROM artist_genres", [], |r| r.get(0))
            .unwrap();
        let genres: i64 = conn
            .query_row("SELECT COUNT(*) FROM genres", [], |r| r.get(0))
            .unwrap();
        assert_eq!(links, 0);
        assert_eq!(genres, 1);
    }
}
