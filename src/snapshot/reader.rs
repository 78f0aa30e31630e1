use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::{HashMap, VecDeque};
use std::iter::FusedIterator;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::normalize;
use super::{AlbumRecord, ItemFailure, SnapshotError, TrackRecord};
use crate::catalog_store::{Artist, EntityKind};
use crate::remote::{Page, RemoteError, SpotifyApi};

#[derive(Debug, Clone)]
pub struct ReaderSettings {
    /// Items requested per page, 1..=50.
    pub page_size: u32,
    /// How many times a transiently failing page is fetched again.
    pub max_page_retries: u32,
    pub retry_backoff: Duration,
    /// Concurrent artist lookups during genre backfill.
    pub backfill_parallelism: usize,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        ReaderSettings {
            page_size: 50,
            max_page_retries: 1,
            retry_backoff: Duration::from_millis(500),
            backfill_parallelism: 4,
        }
    }
}

/// Owning artists already looked up during one stream, or why the lookup failed.
type ArtistCache = HashMap<String, Result<Artist, String>>;

type PageLoader<T> = fn(
    &SnapshotReader,
    Option<&str>,
    &mut ArtistCache,
) -> Result<Page<Result<T, ItemFailure>>, RemoteError>;

pub struct SnapshotReader {
    api: Arc<dyn SpotifyApi>,
    settings: ReaderSettings,
    pool: Option<ThreadPool>,
}

impl SnapshotReader {
    pub fn new(api: Arc<dyn SpotifyApi>, settings: ReaderSettings) -> Self {
        let pool = match ThreadPoolBuilder::new()
            .num_threads(settings.backfill_parallelism.max(1))
            .thread_name(|i| format!("genre-backfill-{}", i))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!("Could not build backfill pool, using the global one: {}", e);
                None
            }
        };
        SnapshotReader {
            api,
            settings,
            pool,
        }
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    pub fn stream_followed_artists(&self) -> SnapshotStream<'_, Artist> {
        SnapshotStream::new(self, EntityKind::Artist, Self::load_followed_artists)
    }

    pub fn stream_saved_albums(&self) -> SnapshotStream<'_, AlbumRecord> {
        SnapshotStream::new(self, EntityKind::Album, Self::load_saved_albums)
    }

    pub fn stream_saved_tracks(&self) -> SnapshotStream<'_, TrackRecord> {
        SnapshotStream::new(self, EntityKind::Track, Self::load_saved_tracks)
    }

    // =========================================================================
    // Page loaders
    // =========================================================================

    /// Followed artists listed without genres get them from a full lookup.
    /// A failed lookup keeps the listed record as it is.
    fn load_followed_artists(
        &self,
        page_token: Option<&str>,
        cache: &mut ArtistCache,
    ) -> Result<Page<Result<Artist, ItemFailure>>, RemoteError> {
        let page = self
            .api
            .list_followed_artists(self.settings.page_size, page_token)?;
        self.backfill(
            page.items
                .iter()
                .filter(|a| a.genres.is_empty())
                .filter_map(|a| a.id.as_deref().map(str::trim))
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            cache,
        )?;

        let items = page
            .items
            .iter()
            .map(|raw| {
                let mut artist = normalize::artist_from_remote(raw)?;
                if artist.genres.is_empty() {
                    match cache.get(&artist.id) {
                        Some(Ok(full)) => artist.genres = full.genres.clone(),
                        Some(Err(reason)) => {
                            debug!("Keeping {} without genres: {}", artist.id, reason)
                        }
                        None => {}
                    }
                }
                Ok(artist)
            })
            .collect();
        Ok(Page {
            items,
            next: page.next,
        })
    }

    fn load_saved_albums(
        &self,
        page_token: Option<&str>,
        cache: &mut ArtistCache,
    ) -> Result<Page<Result<AlbumRecord, ItemFailure>>, RemoteError> {
        let page = self
            .api
            .list_saved_albums(self.settings.page_size, page_token)?;
        self.backfill(
            page.items.iter().filter_map(|a| normalize::owner_id(&a.artists)),
            cache,
        )?;

        let items = page
            .items
            .iter()
            .map(|raw| {
                let (album, owner_id) = normalize::album_from_remote(raw)?;
                let artist = resolve_owner(cache, EntityKind::Album, &album.id, &owner_id)?;
                Ok(AlbumRecord { album, artist })
            })
            .collect();
        Ok(Page {
            items,
            next: page.next,
        })
    }

    fn load_saved_tracks(
        &self,
        page_token: Option<&str>,
        cache: &mut ArtistCache,
    ) -> Result<Page<Result<TrackRecord, ItemFailure>>, RemoteError> {
        let page = self
            .api
            .list_saved_tracks(self.settings.page_size, page_token)?;
        self.backfill(
            page.items.iter().filter_map(|t| normalize::owner_id(&t.artists)),
            cache,
        )?;

        let items = page
            .items
            .iter()
            .map(|raw| {
                let (track, owner_id) = normalize::track_from_remote(raw)?;
                let artist = resolve_owner(cache, EntityKind::Track, &track.id, &owner_id)?;
                Ok(TrackRecord { track, artist })
            })
            .collect();
        Ok(Page {
            items,
            next: page.next,
        })
    }

    /// Looks up every owning artist not yet in `cache`, in parallel.
    ///
    /// A failed lookup is cached as a failure and only affects the records
    /// owned by that artist. A rejected session ends the stream.
    fn backfill(
        &self,
        owner_ids: impl Iterator<Item = String>,
        cache: &mut ArtistCache,
    ) -> Result<(), RemoteError> {
        let mut missing: Vec<String> = owner_ids.filter(|id| !cache.contains_key(id)).collect();
        missing.sort();
        missing.dedup();
        if missing.is_empty() {
            return Ok(());
        }
        debug!("Backfilling genres for {} artists", missing.len());

        let fetch = || {
            missing
                .par_iter()
                .map(|id| (id.clone(), self.api.get_artist(id)))
                .collect::<Vec<_>>()
        };
        let fetched = match &self.pool {
            Some(pool) => pool.install(fetch),
            None => fetch(),
        };

        let mut rejected = None;
        for (id, result) in fetched {
            let entry = match result {
                Ok(raw) => normalize::artist_from_remote(&raw).map_err(|f| f.reason),
                Err(RemoteError::Unauthenticated(reason)) => {
                    rejected = Some(RemoteError::Unauthenticated(reason));
                    continue;
                }
                Err(e) => {
                    warn!("Artist lookup for {} failed: {}", id, e);
                    Err(e.to_string())
                }
            };
            cache.insert(id, entry);
        }

        match rejected {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn resolve_owner(
    cache: &ArtistCache,
    kind: EntityKind,
    item_id: &str,
    owner_id: &str,
) -> Result<Artist, ItemFailure> {
    match cache.get(owner_id) {
        Some(Ok(artist)) => Ok(artist.clone()),
        Some(Err(reason)) => Err(ItemFailure::new(
            kind,
            Some(item_id.to_string()),
            format!("artist {} unavailable: {}", owner_id, reason),
        )),
        None => Err(ItemFailure::new(
            kind,
            Some(item_id.to_string()),
            format!("artist {} was not resolved", owner_id),
        )),
    }
}

/// Lazy, forward-only sequence over one remote collection.
///
/// Per-record problems come out as [`SnapshotError::Item`] and the sequence
/// goes on. A collection-level failure comes out once as
/// [`SnapshotError::Remote`], after which the sequence is over.
pub struct SnapshotStream<'a, T> {
    reader: &'a SnapshotReader,
    kind: EntityKind,
    load: PageLoader<T>,
    cache: ArtistCache,
    buffered: VecDeque<Result<T, ItemFailure>>,
    next_token: Option<String>,
    pages: usize,
    finished: bool,
}

impl<'a, T> SnapshotStream<'a, T> {
    fn new(reader: &'a SnapshotReader, kind: EntityKind, load: PageLoader<T>) -> Self {
        SnapshotStream {
            reader,
            kind,
            load,
            cache: ArtistCache::new(),
            buffered: VecDeque::new(),
            next_token: None,
            pages: 0,
            finished: false,
        }
    }

    /// Pages fetched so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    fn fetch_next_page(&mut self) -> Result<(), RemoteError> {
        let settings = &self.reader.settings;
        let mut attempt = 0;
        loop {
            match (self.load)(self.reader, self.next_token.as_deref(), &mut self.cache) {
                Ok(page) => {
                    self.pages += 1;
                    debug!(
                        "Fetched {} page {} with {} items",
                        self.kind,
                        self.pages,
                        page.items.len()
                    );
                    if page.next.is_some() && page.next == self.next_token {
                        warn!("{} listing returned the same page token twice, stopping", self.kind);
                        self.next_token = None;
                    } else {
                        self.next_token = page.next;
                    }
                    self.buffered.extend(page.items);
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < settings.max_page_retries => {
                    attempt += 1;
                    warn!(
                        "Fetching {} page {} failed ({}), retry {}/{}",
                        self.kind,
                        self.pages + 1,
                        e,
                        attempt,
                        settings.max_page_retries
                    );
                    if !settings.retry_backoff.is_zero() {
                        std::thread::sleep(settings.retry_backoff);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<T> Iterator for SnapshotStream<'_, T> {
    type Item = Result<T, SnapshotError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffered.pop_front() {
                return Some(item.map_err(SnapshotError::Item));
            }
            if self.finished {
                return None;
            }
            if self.pages > 0 && self.next_token.is_none() {
                self.finished = true;
                return None;
            }
            if let Err(e) = self.fetch_next_page() {
                self.finished = true;
                return Some(Err(SnapshotError::Remote(e)));
            }
        }
    }
}

impl<T> FusedIterator for SnapshotStream<'_, T> {}
