//! Reconciliation of the local catalog with the remote library.
//!
//! One pass per entity class:
//! 1. snapshot the local ids;
//! 2. drain the remote stream, upserting each record as it arrives;
//! 3. delete local rows missing remotely, unless something still references
//!    them (artists owning albums or tracks, albums holding tracks). Tracks
//!    are never deleted by a pass.
//!
//! A pass runs inside a single store batch. Per-record failures are collected
//! in the report; a collection-level failure rolls the whole pass back.

mod report;

pub use report::{PassReport, SyncAllReport, SyncError};

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::catalog_store::{self, CatalogStore, EntityKind};
use crate::snapshot::{ItemFailure, SnapshotError, SnapshotReader};

pub struct Reconciler {
    store: Arc<dyn CatalogStore>,
    reader: SnapshotReader,
}

impl Reconciler {
    pub fn new(store: Arc<dyn CatalogStore>, reader: SnapshotReader) -> Self {
        Reconciler { store, reader }
    }

    pub fn sync(&self, kind: EntityKind) -> Result<PassReport, SyncError> {
        match kind {
            EntityKind::Artist => self.sync_artists(),
            EntityKind::Album => self.sync_albums(),
            EntityKind::Track => self.sync_tracks(),
        }
    }

    /// Followed artists.
    pub fn sync_artists(&self) -> Result<PassReport, SyncError> {
        self.run_pass(
            EntityKind::Artist,
            self.reader.stream_followed_artists(),
            |artist| &artist.id,
            |store, artist| store.upsert_artist(artist),
        )
    }

    /// Saved albums. The owning artist is inserted when missing but an
    /// existing artist row is left untouched.
    pub fn sync_albums(&self) -> Result<PassReport, SyncError> {
        self.run_pass(
            EntityKind::Album,
            self.reader.stream_saved_albums(),
            |record| &record.album.id,
            |store, record| {
                store.insert_artist_if_absent(&record.artist)?;
                store.upsert_album(&record.album)
            },
        )
    }

    /// Saved tracks.
    pub fn sync_tracks(&self) -> Result<PassReport, SyncError> {
        self.run_pass(
            EntityKind::Track,
            self.reader.stream_saved_tracks(),
            |record| &record.track.id,
            |store, record| {
                store.insert_artist_if_absent(&record.artist)?;
                store.upsert_track(&record.track)
            },
        )
    }

    /// Artists, then albums, then tracks. Stops at the first failing pass;
    /// earlier passes stay applied.
    pub fn sync_all(&self) -> SyncAllReport {
        let mut report = SyncAllReport::default();
        for kind in [EntityKind::Artist, EntityKind::Album, EntityKind::Track] {
            match self.sync(kind) {
                Ok(pass) => report.record(pass),
                Err(e) => {
                    report.failure = Some((kind, e));
                    break;
                }
            }
        }
        report
    }

    fn run_pass<T, S, I, A>(
        &self,
        kind: EntityKind,
        stream: S,
        id_of: I,
        apply: A,
    ) -> Result<PassReport, SyncError>
    where
        S: Iterator<Item = Result<T, SnapshotError>>,
        I: Fn(&T) -> &String,
        A: Fn(&dyn CatalogStore, &T) -> catalog_store::Result<()>,
    {
        info!("Reconciling {}s", kind);
        let local_before = self.store.ids(kind)?;

        self.store.begin_batch()?;
        let outcome = self.apply_pass(kind, stream, &local_before, id_of, apply);
        match outcome {
            Ok(report) => {
                self.store.commit_batch()?;
                info!(
                    "{} pass done: {} remote, {} added, {} removed, {} retained, {} failed",
                    kind,
                    report.remote_total,
                    report.added,
                    report.removed,
                    report.retained,
                    report.failures.len()
                );
                Ok(report)
            }
            Err(e) => {
                error!("{} pass aborted, rolling back: {}", kind, e);
                if let Err(rollback) = self.store.rollback_batch() {
                    warn!("Rollback of {} pass failed: {}", kind, rollback);
                }
                Err(e)
            }
        }
    }

    fn apply_pass<T, S, I, A>(
        &self,
        kind: EntityKind,
        stream: S,
        local_before: &HashSet<String>,
        id_of: I,
        apply: A,
    ) -> Result<PassReport, SyncError>
    where
        S: Iterator<Item = Result<T, SnapshotError>>,
        I: Fn(&T) -> &String,
        A: Fn(&dyn CatalogStore, &T) -> catalog_store::Result<()>,
    {
        let mut report = PassReport::new(kind);
        let mut remote_ids: HashSet<String> = HashSet::new();
        let mut added: HashSet<String> = HashSet::new();

        for item in stream {
            match item {
                Ok(record) => {
                    let id = id_of(&record).clone();
                    remote_ids.insert(id.clone());
                    match apply(self.store.as_ref(), &record) {
                        Ok(()) => {
                            if !local_before.contains(&id) {
                                added.insert(id);
                            }
                        }
                        Err(e) if e.is_fatal() => return Err(SyncError::Storage(e)),
                        Err(e) => {
                            warn!("Could not store {} {}: {}", kind, id, e);
                            report
                                .failures
                                .push(ItemFailure::new(kind, Some(id), e.to_string()));
                        }
                    }
                }
                Err(SnapshotError::Item(failure)) => {
                    warn!("Skipping remote record: {}", failure);
                    if let Some(id) = &failure.id {
                        remote_ids.insert(id.clone());
                    }
                    report.failures.push(failure);
                }
                Err(SnapshotError::Remote(e)) => return Err(e.into()),
            }
        }
        report.remote_total = remote_ids.len();
        report.added = added.len();

        let mut candidates: Vec<&String> = local_before.difference(&remote_ids).collect();
        candidates.sort();
        for id in candidates {
            match self.is_anchored(kind, id) {
                Ok(true) => {
                    debug!("Keeping {} {}: still referenced locally", kind, id);
                    report.retained += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) if e.is_fatal() => return Err(SyncError::Storage(e)),
                Err(e) => {
                    report
                        .failures
                        .push(ItemFailure::new(kind, Some(id.clone()), e.to_string()));
                    continue;
                }
            }

            match self.store.delete(kind, id) {
                Ok(true) => {
                    debug!("Removed {} {}", kind, id);
                    report.removed += 1;
                }
                Ok(false) => {}
                Err(e) if e.is_fatal() => return Err(SyncError::Storage(e)),
                Err(e) => {
                    warn!("Could not remove {} {}: {}", kind, id, e);
                    report
                        .failures
                        .push(ItemFailure::new(kind, Some(id.clone()), e.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Whether a removal candidate has to stay.
    fn is_anchored(&self, kind: EntityKind, id: &str) -> catalog_store::Result<bool> {
        match kind {
            EntityKind::Artist => self.store.has_children(id),
            EntityKind::Album => self.store.album_has_tracks(id),
            EntityKind::Track => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_store::{Album, Artist, SqliteCatalogStore};
    use crate::remote::{
        Page, RemoteError, SimplifiedArtist, SpotifyAlbum, SpotifyApi, SpotifyArtist, SpotifyTrack,
    };
    use crate::snapshot::ReaderSettings;
    use std::time::Duration;

    /// Single-page library.
    #[derive(Default)]
    struct Library {
        followed: Vec<SpotifyArtist>,
        albums: Vec<SpotifyAlbum>,
        tracks: Vec<SpotifyTrack>,
        fail_albums: Option<RemoteError>,
    }

    impl SpotifyApi for Library {
        fn get_artist(&self, id: &str) -> Result<SpotifyArtist, RemoteError> {
            Ok(SpotifyArtist {
                id: Some(id.to_string()),
                name: format!("Artist {}", id),
                genres: vec!["rock".to_string()],
                ..Default::default()
            })
        }
        fn get_album(&self, id: &str) -> Result<SpotifyAlbum, RemoteError> {
            Err(RemoteError::NotFound(id.to_string()))
        }
        fn get_track(&self, id: &str) -> Result<SpotifyTrack, RemoteError> {
            Err(RemoteError::NotFound(id.to_string()))
        }
        fn list_followed_artists(&self, _: u32, _: Option<&str>) -> Result<Page<SpotifyArtist>, RemoteError> {
            Ok(Page::last(self.followed.clone()))
        }
        fn list_saved_albums(&self, _: u32, _: Option<&str>) -> Result<Page<SpotifyAlbum>, RemoteError> {
            match &self.fail_albums {
                Some(e) => Err(e.clone()),
                None => Ok(Page::last(self.albums.clone())),
            }
        }
        fn list_saved_tracks(&self, _: u32, _: Option<&str>) -> Result<Page<SpotifyTrack>, RemoteError> {
            Ok(Page::last(self.tracks.clone()))
        }
        fn follow_artist(&self, _: &str) -> Result<(), RemoteError> {
            Ok(())
        }
        fn unfollow_artist(&self, _: &str) -> Result<(), RemoteError> {
            Ok(())
        }
        fn save_album(&self, _: &str) -> Result<(), RemoteError> {
            Ok(())
        }
        fn unsave_album(&self, _: &str) -> Result<(), RemoteError> {
            Ok(())
        }
        fn save_track(&self, _: &str) -> Result<(), RemoteError> {
            Ok(())
        }
        fn unsave_track(&self, _: &str) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    fn remote_artist(id: &str) -> SpotifyArtist {
        SpotifyArtist {
            id: Some(id.to_string()),
            name: format!("Artist {}", id),
            ..Default::default()
        }
    }

    fn remote_album(id: &str, artist_id: &str) -> SpotifyAlbum {
        SpotifyAlbum {
            id: Some(id.to_string()),
            name: format!("Album {}", id),
            artists: vec![SimplifiedArtist {
                id: Some(artist_id.to_string()),
                ..Default::default()
            }],
            release_date: Some("2001-01-01".to_string()),
            ..Default::default()
        }
    }

    fn local_artist(id: &str) -> Artist {
        Artist {
            id: id.to_string(),
            name: format!("Local {}", id),
            genres: vec![],
            uri: String::new(),
            url: String::new(),
            image_url: None,
        }
    }

    fn local_album(id: &str, artist_id: &str) -> Album {
        Album {
            id: id.to_string(),
            artist_id: artist_id.to_string(),
            name: id.to_string(),
            release_year: 2000,
            uri: String::new(),
            url: String::new(),
        }
    }

    fn reconciler(store: &SqliteCatalogStore, library: Library) -> Reconciler {
        let settings = ReaderSettings {
            retry_backoff: Duration::ZERO,
            ..ReaderSettings::default()
        };
        Reconciler::new(
            Arc::new(store.clone()),
            SnapshotReader::new(Arc::new(library), settings),
        )
    }

    #[test]
    fn artist_with_children_survives_unfollow() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        store.upsert_artist(&local_artist("x")).unwrap();
        store.upsert_artist(&local_artist("y")).unwrap();
        store.upsert_album(&local_album("al1", "x")).unwrap();

        let report = reconciler(&store, Library::default()).sync_artists().unwrap();

        assert_eq!(report.counts(), (0, 1));
        assert_eq!(report.retained, 1);
        assert!(store.get_artist("x").unwrap().is_some());
        assert!(store.get_artist("y").unwrap().is_none());
    }

    #[test]
    fn album_pass_adds_and_removes() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        store.upsert_artist(&local_artist("ar")).unwrap();
        store.upsert_album(&local_album("a1", "ar")).unwrap();
        store.upsert_album(&local_album("a3", "ar")).unwrap();

        let library = Library {
            albums: vec![remote_album("a1", "ar"), remote_album("a2", "ar")],
            ..Default::default()
        };
        let report = reconciler(&store, library).sync_albums().unwrap();

        assert_eq!(report.counts(), (1, 1));
        assert_eq!(
            store.album_ids().unwrap(),
            HashSet::from(["a1".to_string(), "a2".to_string()])
        );
        // Existing owner is not overwritten by the album pass.
        assert_eq!(store.get_artist("ar").unwrap().unwrap().name, "Local ar");
    }

    #[test]
    fn tracks_are_never_removed() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        store.upsert_artist(&local_artist("ar")).unwrap();
        store
            .upsert_track(&crate::catalog_store::Track {
                id: "t1".to_string(),
                artist_id: "ar".to_string(),
                album_id: "al".to_string(),
                name: "Song".to_string(),
                release_year: 2000,
                uri: String::new(),
                url: String::new(),
            })
            .unwrap();

        let report = reconciler(&store, Library::default()).sync_tracks().unwrap();
        assert_eq!(report.counts(), (0, 0));
        assert_eq!(report.retained, 1);
        assert!(store.get_track("t1").unwrap().is_some());
    }

    #[test]
    fn failed_collection_rolls_back_and_stops_sync_all() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        store.upsert_artist(&local_artist("old")).unwrap();

        let library = Library {
            followed: vec![remote_artist("new")],
            fail_albums: Some(RemoteError::Unauthenticated("expired".to_string())),
            ..Default::default()
        };
        let report = reconciler(&store, library).sync_all();

        assert!(!report.is_complete());
        assert_eq!(report.artists.as_ref().unwrap().counts(), (1, 1));
        assert!(report.albums.is_none());
        assert!(report.tracks.is_none());
        assert!(matches!(
            report.failure,
            Some((EntityKind::Album, SyncError::Unauthenticated(_)))
        ));
        assert_eq!(
            store.artist_ids().unwrap(),
            HashSet::from(["new".to_string()])
        );
    }
}
