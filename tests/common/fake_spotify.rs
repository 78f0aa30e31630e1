//! In-memory stand-in for the Spotify Web API.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use spotify_manager::remote::{
    Page, RemoteError, SpotifyAlbum, SpotifyApi, SpotifyArtist, SpotifyTrack,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    FollowedArtists,
    SavedAlbums,
    SavedTracks,
}

#[derive(Default)]
struct State {
    artists: HashMap<String, SpotifyArtist>,
    albums: HashMap<String, SpotifyAlbum>,
    tracks: HashMap<String, SpotifyTrack>,
    followed: Vec<SpotifyArtist>,
    saved_albums: Vec<SpotifyAlbum>,
    saved_tracks: Vec<SpotifyTrack>,
    scripted: HashMap<Collection, VecDeque<Option<RemoteError>>>,
    failing_lookups: HashMap<String, RemoteError>,
    list_requests: HashMap<Collection, usize>,
    artist_lookups: Vec<String>,
    mutations: Vec<String>,
}

/// Serves the user's collections in pages keyed by offset. Failures can be
/// scripted per collection request and per artist lookup.
#[derive(Default)]
pub struct FakeSpotify {
    state: Mutex<State>,
}

impl FakeSpotify {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes an artist available to lookups.
    pub fn add_artist(&self, artist: SpotifyArtist) {
        let mut state = self.state.lock().unwrap();
        let id = artist.id.clone().unwrap_or_default();
        state.artists.insert(id, artist);
    }

    pub fn add_album(&self, album: SpotifyAlbum) {
        let mut state = self.state.lock().unwrap();
        let id = album.id.clone().unwrap_or_default();
        state.albums.insert(id, album);
    }

    pub fn add_track(&self, track: SpotifyTrack) {
        let mut state = self.state.lock().unwrap();
        let id = track.id.clone().unwrap_or_default();
        state.tracks.insert(id, track);
    }

    /// Followed artists are also made available to lookups.
    pub fn set_followed(&self, artists: Vec<SpotifyArtist>) {
        for artist in &artists {
            self.add_artist(artist.clone());
        }
        self.state.lock().unwrap().followed = artists;
    }

    pub fn set_saved_albums(&self, albums: Vec<SpotifyAlbum>) {
        for album in &albums {
            self.add_album(album.clone());
        }
        self.state.lock().unwrap().saved_albums = albums;
    }

    pub fn set_saved_tracks(&self, tracks: Vec<SpotifyTrack>) {
        for track in &tracks {
            self.add_track(track.clone());
        }
        self.state.lock().unwrap().saved_tracks = tracks;
    }

    /// Outcomes for the next list requests on a collection, in order. `None`
    /// serves the page normally; once the script runs out every request
    /// succeeds.
    pub fn script(&self, collection: Collection, outcomes: Vec<Option<RemoteError>>) {
        self.state
            .lock()
            .unwrap()
            .scripted
            .insert(collection, outcomes.into());
    }

    pub fn fail_lookup(&self, artist_id: &str, error: RemoteError) {
        self.state
            .lock()
            .unwrap()
            .failing_lookups
            .insert(artist_id.to_string(), error);
    }

    pub fn list_requests(&self, collection: Collection) -> usize {
        self.state
            .lock()
            .unwrap()
            .list_requests
            .get(&collection)
            .copied()
            .unwrap_or(0)
    }

    pub fn artist_lookups(&self) -> Vec<String> {
        self.state.lock().unwrap().artist_lookups.clone()
    }

    pub fn mutations(&self) -> Vec<String> {
        self.state.lock().unwrap().mutations.clone()
    }

    fn list<T: Clone>(
        &self,
        collection: Collection,
        items: impl FnOnce(&State) -> &Vec<T>,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<Page<T>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        *state.list_requests.entry(collection).or_insert(0) += 1;
        if let Some(Some(error)) = state
            .scripted
            .get_mut(&collection)
            .and_then(|script| script.pop_front())
        {
            return Err(error);
        }

        let offset = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| RemoteError::NotFound(format!("bad page token {}", token)))?,
            None => 0,
        };
        let all = items(&*state);
        let end = (offset + page_size as usize).min(all.len());
        let page = all.get(offset..end).unwrap_or_default().to_vec();
        let next = (end < all.len()).then(|| end.to_string());
        Ok(Page { items: page, next })
    }

    fn mutate(&self, call: &str, id: &str) -> Result<(), RemoteError> {
        self.state
            .lock()
            .unwrap()
            .mutations
            .push(format!("{} {}", call, id));
        Ok(())
    }
}

impl SpotifyApi for FakeSpotify {
    fn get_artist(&self, id: &str) -> Result<SpotifyArtist, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.artist_lookups.push(id.to_string());
        if let Some(error) = state.failing_lookups.get(id) {
            return Err(error.clone());
        }
        state
            .artists
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("artist {}", id)))
    }

    fn get_album(&self, id: &str) -> Result<SpotifyAlbum, RemoteError> {
        let state = self.state.lock().unwrap();
        state
            .albums
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("album {}", id)))
    }

    fn get_track(&self, id: &str) -> Result<SpotifyTrack, RemoteError> {
        let state = self.state.lock().unwrap();
        state
            .tracks
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("track {}", id)))
    }

    fn list_followed_artists(
        &self,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<Page<SpotifyArtist>, RemoteError> {
        self.list(Collection::FollowedArtists, |s| &s.followed, page_size, page_token)
    }

    fn list_saved_albums(
        &self,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<Page<SpotifyAlbum>, RemoteError> {
        self.list(Collection::SavedAlbums, |s| &s.saved_albums, page_size, page_token)
    }

    fn list_saved_tracks(
        &self,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<Page<SpotifyTrack>, RemoteError> {
        self.list(Collection::SavedTracks, |s| &s.saved_tracks, page_size, page_token)
    }

    fn follow_artist(&self, id: &str) -> Result<(), RemoteError> {
        self.mutate("follow", id)
    }

    fn unfollow_artist(&self, id: &str) -> Result<(), RemoteError> {
        self.mutate("unfollow", id)
    }

    fn save_album(&self, id: &str) -> Result<(), RemoteError> {
        self.mutate("save_album", id)
    }

    fn unsave_album(&self, id: &str) -> Result<(), RemoteError> {
        self.mutate("unsave_album", id)
    }

    fn save_track(&self, id: &str) -> Result<(), RemoteError> {
        self.mutate("save_track", id)
    }

    fn unsave_track(&self, id: &str) -> Result<(), RemoteError> {
        self.mutate("unsave_track", id)
    }
}
