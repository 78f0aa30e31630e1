//! Catalog entities and the denormalized rows used for presentation.
//!
//! Entities mirror the stored tables one to one; the `*View` types add the
//! artist display name at read time and are never written back.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three entity classes tracked by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Artist,
    Album,
    Track,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Artist => "artist",
            EntityKind::Album => "album",
            EntityKind::Track => "track",
        }
    }

    pub(crate) fn table_name(&self) -> &'static str {
        match self {
            EntityKind::Artist => "artists",
            EntityKind::Album => "albums",
            EntityKind::Track => "tracks",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "artist" | "artists" => Ok(EntityKind::Artist),
            "album" | "albums" => Ok(EntityKind::Album),
            "track" | "tracks" => Ok(EntityKind::Track),
            other => Err(format!("unknown entity kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    /// Ordered as reported by the remote catalog.
    pub genres: Vec<String>,
    pub uri: String,
    pub url: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub artist_id: String,
    pub name: String,
    pub release_year: i32,
    pub uri: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub artist_id: String,
    pub album_id: String,
    pub name: String,
    pub release_year: i32,
    pub uri: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlbumView {
    #[serde(flatten)]
    pub album: Album,
    pub artist_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackView {
    #[serde(flatten)]
    pub track: Track,
    pub artist_name: String,
}

/// Kind filter for the combined album + track listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemFilter {
    #[default]
    All,
    Albums,
    Tracks,
}

/// One row of the combined album + track listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryItem {
    pub kind: EntityKind,
    pub id: String,
    pub name: String,
    pub artist_name: String,
    pub release_year: i32,
    pub uri: String,
    pub url: String,
    pub genres: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CatalogCounts {
    pub artists: usize,
    pub albums: usize,
    pub tracks: usize,
    pub genres: usize,
}

/// Outcome of an orphan sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CleanupReport {
    pub artists_removed: usize,
    pub genres_removed: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.artists_removed + self.genres_removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_parses_singular_and_plural() {
        assert_eq!("album".parse::<EntityKind>(), Ok(EntityKind::Album));
        assert_eq!("Tracks".parse::<EntityKind>(), Ok(EntityKind::Track));
        assert_eq!("ARTIST".parse::<EntityKind>(), Ok(EntityKind::Artist));
        assert!("playlist".parse::<EntityKind>().is_err());
    }

    #[test]
    fn album_view_serializes_flat() {
        let view = AlbumView {
            album: Album {
                id: "al1".to_string(),
                artist_id: "ar1".to_string(),
                name: "Kind of Blue".to_string(),
                release_year: 1959,
                uri: "spotify:album:al1".to_string(),
                url: "https://open.spotify.com/album/al1".to_string(),
            },
            artist_name: "Miles Davis".to_string(),
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["name"], "Kind of Blue");
        assert_eq!(json["artist_name"], "Miles Davis");
        assert_eq!(json["release_year"], 1959);
    }
}
