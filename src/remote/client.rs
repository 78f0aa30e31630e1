//! Blocking HTTP client for the Spotify Web API.
//!
//! Requests are authorized with a bearer token taken from a [`TokenSource`]
//! right before sending, so an expired user token is refreshed transparently.
//! An optional minimum interval between requests keeps large syncs under the
//! service's rate limit.

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

use super::models::{
    FollowedArtistsResponse, Paging, SavedAlbum, SavedTrack, SpotifyAlbum, SpotifyArtist,
    SpotifyTrack,
};
use super::session::TokenSource;
use super::{Page, RemoteError, SpotifyApi};

pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub request_timeout: Duration,
    /// Zero disables client side rate limiting.
    pub min_request_interval: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        ClientSettings {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            min_request_interval: Duration::ZERO,
        }
    }
}

pub struct SpotifyClient {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
    min_interval: Duration,
    last_request: Mutex<Instant>,
}

impl SpotifyClient {
    pub fn new(settings: &ClientSettings, tokens: Arc<dyn TokenSource>) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(concat!("spotify-manager/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            tokens,
            min_interval: settings.min_request_interval,
            last_request: Mutex::new(
                Instant::now()
                    .checked_sub(settings.min_request_interval)
                    .unwrap_or_else(Instant::now),
            ),
        })
    }

    fn rate_limit(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let Ok(mut last) = self.last_request.lock() else {
            return;
        };
        let elapsed = last.elapsed();
        if elapsed < self.min_interval {
            std::thread::sleep(self.min_interval - elapsed);
        }
        *last = Instant::now();
    }

    fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, RemoteError> {
        self.rate_limit();
        let token = self.tokens.access_token()?;
        let response = request
            .bearer_auth(token)
            .send()
            .map_err(|e| transport_error(e, what))?;
        classify_status(response.status(), what)?;
        Ok(response)
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T, RemoteError> {
        debug!("GET {}", url);
        let response = self.send(self.http.get(url), what)?;
        response.json::<T>().map_err(|e| {
            if e.is_decode() {
                RemoteError::Parse(format!("{}: {}", what, e))
            } else {
                transport_error(e, what)
            }
        })
    }

    /// First page URL unless the caller is continuing from a `next` token.
    fn page_url(&self, path: &str, page_size: u32, page_token: Option<&str>) -> String {
        match page_token {
            Some(next) => next.to_string(),
            None => {
                let separator = if path.contains('?') { '&' } else { '?' };
                format!("{}{}{}limit={}", self.base_url, path, separator, page_size)
            }
        }
    }

    fn mutate(&self, put: bool, path: &str, id: &str, what: &str) -> Result<(), RemoteError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {} ({})", if put { "PUT" } else { "DELETE" }, url, id);
        let request = if put {
            self.http.put(&url)
        } else {
            self.http.delete(&url)
        };
        self.send(request.json(&json!({ "ids": [id] })), what)?;
        Ok(())
    }
}

fn transport_error(err: reqwest::Error, what: &str) -> RemoteError {
    if err.is_builder() {
        RemoteError::Config(format!("{}: {}", what, err))
    } else {
        RemoteError::Transient(format!("{}: {}", what, err))
    }
}

/// Maps an HTTP status onto the remote error taxonomy.
pub(crate) fn classify_status(status: StatusCode, what: &str) -> Result<(), RemoteError> {
    if status.is_success() {
        return Ok(());
    }
    let message = format!("{} failed with status {}", what, status);
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthenticated(message),
        StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => RemoteError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            RemoteError::Transient(message)
        }
        s if s.is_server_error() => RemoteError::Transient(message),
        _ => RemoteError::Parse(message),
    })
}

impl SpotifyApi for SpotifyClient {
    fn get_artist(&self, id: &str) -> Result<SpotifyArtist, RemoteError> {
        let url = format!("{}/artists/{}", self.base_url, urlencoding::encode(id));
        self.get_json(&url, &format!("artist {}", id))
    }

    fn get_album(&self, id: &str) -> Result<SpotifyAlbum, RemoteError> {
        let url = format!("{}/albums/{}", self.base_url, urlencoding::encode(id));
        self.get_json(&url, &format!("album {}", id))
    }

    fn get_track(&self, id: &str) -> Result<SpotifyTrack, RemoteError> {
        let url = format!("{}/tracks/{}", self.base_url, urlencoding::encode(id));
        self.get_json(&url, &format!("track {}", id))
    }

    fn list_followed_artists(
        &self,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<Page<SpotifyArtist>, RemoteError> {
        let url = self.page_url("/me/following?type=artist", page_size, page_token);
        let response: FollowedArtistsResponse = self.get_json(&url, "followed artists page")?;
        Ok(Page {
            items: response.artists.items,
            next: response.artists.next,
        })
    }

    fn list_saved_albums(
        &self,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<Page<SpotifyAlbum>, RemoteError> {
        let url = self.page_url("/me/albums", page_size, page_token);
        let page: Paging<SavedAlbum> = self.get_json(&url, "saved albums page")?;
        Ok(Page {
            items: page.items.into_iter().map(|saved| saved.album).collect(),
            next: page.next,
        })
    }

    fn list_saved_tracks(
        &self,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<Page<SpotifyTrack>, RemoteError> {
        let url = self.page_url("/me/tracks", page_size, page_token);
        let page: Paging<SavedTrack> = self.get_json(&url, "saved tracks page")?;
        Ok(Page {
            items: page.items.into_iter().map(|saved| saved.track).collect(),
            next: page.next,
        })
    }

    fn follow_artist(&self, id: &str) -> Result<(), RemoteError> {
        self.mutate(true, "/me/following?type=artist", id, "follow artist")
    }

    fn unfollow_artist(&self, id: &str) -> Result<(), RemoteError> {
        self.mutate(false, "/me/following?type=artist", id, "unfollow artist")
    }

    fn save_album(&self, id: &str) -> Result<(), RemoteError> {
        self.mutate(true, "/me/albums", id, "save album")
    }

    fn unsave_album(&self, id: &str) -> Result<(), RemoteError> {
        self.mutate(false, "/me/albums", id, "unsave album")
    }

    fn save_track(&self, id: &str) -> Result<(), RemoteError> {
        self.mutate(true, "/me/tracks", id, "save track")
    }

    fn unsave_track(&self, id: &str) -> Result<(), RemoteError> {
        self.mutate(false, "/me/tracks", id, "unsave track")
    }
}
