//! Manual single-item operations: add by link, delete by id, orphan cleanup.
//!
//! Lookups go through an application session, so adding works without a
//! signed-in user. When a user session is available the change is mirrored to
//! the user's remote library on a best-effort basis.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog_store::{CatalogError, CatalogStore, CleanupReport, EntityKind};
use crate::remote::{RemoteError, SpotifyApi};
use crate::snapshot::normalize::{album_from_remote, artist_from_remote, track_from_remote};
use crate::snapshot::ItemFailure;

lazy_static! {
    static ref WEB_URL: Regex = Regex::new(
        r"^https?://open\.spotify\.com/(?:intl-[A-Za-z-]+/)?(artist|album|track)/([A-Za-z0-9]+)/?(?:[?#].*)?$"
    )
    .unwrap();
    static ref URI: Regex = Regex::new(r"^spotify:(artist|album|track):([A-Za-z0-9]+)$").unwrap();
}

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Not a Spotify artist, album or track link: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Unusable Spotify record: {0}")]
    Normalize(ItemFailure),
}

impl From<ItemFailure> for LibraryError {
    fn from(failure: ItemFailure) -> Self {
        LibraryError::Normalize(failure)
    }
}

/// What a manual add stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddedItem {
    pub kind: EntityKind,
    pub id: String,
    pub name: String,
    /// Id of the owning artist, equal to `id` for artists.
    pub artist_id: String,
    /// Whether the item was also saved to (or followed in) the remote library.
    pub mirrored: bool,
}

/// Extracts kind and id from an `open.spotify.com` link or a `spotify:` URI.
pub fn parse_spotify_url(url: &str) -> Result<(EntityKind, String), LibraryError> {
    let url = url.trim();
    let captures = WEB_URL
        .captures(url)
        .or_else(|| URI.captures(url))
        .ok_or_else(|| LibraryError::InvalidUrl(url.to_string()))?;

    let kind = captures[1]
        .parse::<EntityKind>()
        .map_err(|_| LibraryError::InvalidUrl(url.to_string()))?;
    Ok((kind, captures[2].to_string()))
}

pub struct LibraryManager {
    store: Arc<dyn CatalogStore>,
    lookup: Option<Arc<dyn SpotifyApi>>,
    user: Option<Arc<dyn SpotifyApi>>,
}

impl LibraryManager {
    /// A manager that only touches the local catalog.
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        LibraryManager {
            store,
            lookup: None,
            user: None,
        }
    }

    /// Client used to fetch item metadata when adding.
    pub fn with_lookup(mut self, api: Arc<dyn SpotifyApi>) -> Self {
        self.lookup = Some(api);
        self
    }

    /// Client acting as the signed-in user; changes are mirrored through it.
    pub fn with_user(mut self, api: Arc<dyn SpotifyApi>) -> Self {
        self.user = Some(api);
        self
    }

    /// Fetches the linked item and stores it together with its owning artist.
    pub fn add_from_url(&self, url: &str) -> Result<AddedItem, LibraryError> {
        let (kind, id) = parse_spotify_url(url)?;
        let Some(lookup) = self.lookup.as_deref() else {
            return Err(LibraryError::Remote(RemoteError::Config(
                "no Spotify client configured for lookups".to_string(),
            )));
        };
        debug!("Adding {} {} from {}", kind, id, url);

        let mut added = match kind {
            EntityKind::Artist => {
                let artist = artist_from_remote(&lookup.get_artist(&id)?)?;
                self.write(|store| store.upsert_artist(&artist))?;
                AddedItem {
                    kind,
                    id: artist.id.clone(),
                    name: artist.name.clone(),
                    artist_id: artist.id,
                    mirrored: false,
                }
            }
            EntityKind::Album => {
                let (album, owner_id) = album_from_remote(&lookup.get_album(&id)?)?;
                let artist = artist_from_remote(&lookup.get_artist(&owner_id)?)?;
                self.write(|store| {
                    store.upsert_artist(&artist)?;
                    store.upsert_album(&album)
                })?;
                AddedItem {
                    kind,
                    id: album.id,
                    name: album.name,
                    artist_id: owner_id,
                    mirrored: false,
                }
            }
            EntityKind::Track => {
                let (track, owner_id) = track_from_remote(&lookup.get_track(&id)?)?;
                let artist = artist_from_remote(&lookup.get_artist(&owner_id)?)?;
                self.write(|store| {
                    store.upsert_artist(&artist)?;
                    store.upsert_track(&track)
                })?;
                AddedItem {
                    kind,
                    id: track.id,
                    name: track.name,
                    artist_id: owner_id,
                    mirrored: false,
                }
            }
        };

        added.mirrored = self.mirror(kind, &added.id, |api, id| match kind {
            EntityKind::Artist => api.follow_artist(id),
            EntityKind::Album => api.save_album(id),
            EntityKind::Track => api.save_track(id),
        });
        info!("Added {} '{}' ({})", kind, added.name, added.id);
        Ok(added)
    }

    /// Deletes one item locally, then from the remote library.
    ///
    /// Returns `false` when the item was not in the catalog; the remote
    /// library is left alone in that case.
    pub fn delete(&self, kind: EntityKind, id: &str) -> Result<bool, LibraryError> {
        if !self.store.delete(kind, id)? {
            return Ok(false);
        }
        info!("Deleted {} {}", kind, id);

        self.mirror(kind, id, |api, id| match kind {
            EntityKind::Artist => api.unfollow_artist(id),
            EntityKind::Album => api.unsave_album(id),
            EntityKind::Track => api.unsave_track(id),
        });
        Ok(true)
    }

    pub fn cleanup(&self) -> Result<CleanupReport, LibraryError> {
        let report = self.store.cleanup_orphans()?;
        info!(
            "Cleanup removed {} artists and {} genres",
            report.artists_removed, report.genres_removed
        );
        Ok(report)
    }

    /// Runs the writes of one add as a single batch.
    fn write<F>(&self, writes: F) -> Result<(), CatalogError>
    where
        F: FnOnce(&dyn CatalogStore) -> Result<(), CatalogError>,
    {
        self.store.begin_batch()?;
        match writes(self.store.as_ref()) {
            Ok(()) => self.store.commit_batch(),
            Err(e) => {
                if let Err(rollback) = self.store.rollback_batch() {
                    warn!("Rollback failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    fn mirror<F>(&self, kind: EntityKind, id: &str, call: F) -> bool
    where
        F: FnOnce(&dyn SpotifyApi, &str) -> Result<(), RemoteError>,
    {
        let Some(user) = &self.user else {
            debug!("No user session, {} {} changed locally only", kind, id);
            return false;
        };
        match call(user.as_ref(), id) {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not update {} {} in the Spotify library: {}", kind, id, e);
                false
            }
        }
    }
}
