#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use spotify_manager::catalog_store::{Album, Artist, CatalogStore, SqliteCatalogStore, Track};
use spotify_manager::library::LibraryManager;
use spotify_manager::reconcile::Reconciler;
use spotify_manager::remote::{
    ExternalUrls, SimplifiedArtist, SpotifyAlbum, SpotifyArtist, SpotifyImage, SpotifyTrack,
};
use spotify_manager::snapshot::{ReaderSettings, SnapshotReader};

use super::FakeSpotify;

// =============================================================================
// Remote records
// =============================================================================

fn urls(kind: &str, id: &str) -> ExternalUrls {
    ExternalUrls {
        spotify: Some(format!("https://open.spotify.com/{}/{}", kind, id)),
    }
}

fn owner(id: &str) -> SimplifiedArtist {
    SimplifiedArtist {
        id: Some(id.to_string()),
        name: format!("Artist {}", id),
        uri: format!("spotify:artist:{}", id),
        external_urls: urls("artist", id),
    }
}

pub fn artist(id: &str, name: &str, genres: &[&str]) -> SpotifyArtist {
    SpotifyArtist {
        id: Some(id.to_string()),
        name: name.to_string(),
        genres: genres.iter().map(|g| g.to_string()).collect(),
        uri: format!("spotify:artist:{}", id),
        external_urls: urls("artist", id),
        images: vec![
            SpotifyImage {
                url: format!("https://i.scdn.co/image/{}-640", id),
                width: Some(640),
                height: Some(640),
            },
            SpotifyImage {
                url: format!("https://i.scdn.co/image/{}-320", id),
                width: Some(320),
                height: Some(320),
            },
        ],
    }
}

pub fn album(id: &str, owner_id: &str, release_date: &str) -> SpotifyAlbum {
    SpotifyAlbum {
        id: Some(id.to_string()),
        name: format!("Album {}", id),
        artists: vec![owner(owner_id)],
        release_date: Some(release_date.to_string()),
        uri: format!("spotify:album:{}", id),
        external_urls: urls("album", id),
        images: vec![],
    }
}

pub fn track(id: &str, owner_id: &str, album_id: &str, release_date: &str) -> SpotifyTrack {
    SpotifyTrack {
        id: Some(id.to_string()),
        name: format!("Track {}", id),
        artists: vec![owner(owner_id)],
        album: Some(album(album_id, owner_id, release_date)),
        uri: format!("spotify:track:{}", id),
        external_urls: urls("track", id),
    }
}

// =============================================================================
// Local rows
// =============================================================================

pub fn local_artist(id: &str, name: &str) -> Artist {
    Artist {
        id: id.to_string(),
        name: name.to_string(),
        genres: vec![],
        uri: format!("spotify:artist:{}", id),
        url: format!("https://open.spotify.com/artist/{}", id),
        image_url: None,
    }
}

pub fn local_album(id: &str, artist_id: &str) -> Album {
    Album {
        id: id.to_string(),
        artist_id: artist_id.to_string(),
        name: format!("Local album {}", id),
        release_year: 2000,
        uri: format!("spotify:album:{}", id),
        url: format!("https://open.spotify.com/album/{}", id),
    }
}

pub fn local_track(id: &str, artist_id: &str, album_id: &str) -> Track {
    Track {
        id: id.to_string(),
        artist_id: artist_id.to_string(),
        album_id: album_id.to_string(),
        name: format!("Local track {}", id),
        release_year: 2000,
        uri: format!("spotify:track:{}", id),
        url: format!("https://open.spotify.com/track/{}", id),
    }
}

// =============================================================================
// Wiring
// =============================================================================

/// A file-backed catalog in a temporary directory plus the fake service.
pub struct TestLibrary {
    pub dir: TempDir,
    pub store: SqliteCatalogStore,
    pub spotify: Arc<FakeSpotify>,
}

impl TestLibrary {
    pub fn new(spotify: FakeSpotify) -> Self {
        let dir = TempDir::new().unwrap();
        let store = SqliteCatalogStore::new(dir.path().join("library.db")).unwrap();
        TestLibrary {
            dir,
            store,
            spotify: Arc::new(spotify),
        }
    }

    pub fn store(&self) -> Arc<dyn CatalogStore> {
        Arc::new(self.store.clone())
    }

    pub fn reader_settings(page_size: u32) -> ReaderSettings {
        ReaderSettings {
            page_size,
            max_page_retries: 1,
            retry_backoff: Duration::ZERO,
            backfill_parallelism: 2,
        }
    }

    pub fn reconciler(&self) -> Reconciler {
        self.reconciler_with_page_size(50)
    }

    pub fn reconciler_with_page_size(&self, page_size: u32) -> Reconciler {
        Reconciler::new(
            self.store(),
            SnapshotReader::new(self.spotify.clone(), Self::reader_settings(page_size)),
        )
    }

    pub fn manager(&self) -> LibraryManager {
        LibraryManager::new(self.store())
            .with_lookup(self.spotify.clone())
            .with_user(self.spotify.clone())
    }
}
