//! Access to the remote streaming catalog (Spotify Web API).
//!
//! [`SpotifyApi`] is the capability surface the rest of the crate depends on:
//! item lookup, paginated listings of the user's library and the single-item
//! mutations used by manual add/delete. [`SpotifyClient`] implements it over
//! HTTP; tests implement it in memory.

mod client;
mod models;
mod session;

pub use client::{ClientSettings, SpotifyClient, DEFAULT_API_BASE_URL};
pub use models::*;
pub use session::{
    AppSession, SessionSettings, SpotifyToken, TokenSource, TokenStore, UserSession,
    DEFAULT_ACCOUNTS_BASE_URL,
};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// No session, an expired session that could not be refreshed, or a
    /// request the service rejected with 401/403.
    #[error("Not authenticated with Spotify: {0}")]
    Unauthenticated(String),

    /// Rate limiting, server errors, timeouts and connection failures.
    #[error("Transient Spotify failure: {0}")]
    Transient(String),

    #[error("Not found on Spotify: {0}")]
    NotFound(String),

    #[error("Unexpected Spotify response: {0}")]
    Parse(String),

    #[error("Spotify client misconfigured: {0}")]
    Config(String),
}

impl RemoteError {
    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }
}

/// One page of a paginated collection.
///
/// `next` is an opaque continuation token; `None` means the listing is
/// exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Page { items, next: None }
    }
}

pub trait SpotifyApi: Send + Sync {
    // =========================================================================
    // Lookup
    // =========================================================================

    fn get_artist(&self, id: &str) -> Result<SpotifyArtist, RemoteError>;
    fn get_album(&self, id: &str) -> Result<SpotifyAlbum, RemoteError>;
    fn get_track(&self, id: &str) -> Result<SpotifyTrack, RemoteError>;

    // =========================================================================
    // Paginated collections of the current user
    // =========================================================================

    /// `page_token` is `None` for the first page, then the `next` of the
    /// previous page.
    fn list_followed_artists(
        &self,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<Page<SpotifyArtist>, RemoteError>;

    fn list_saved_albums(
        &self,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<Page<SpotifyAlbum>, RemoteError>;

    fn list_saved_tracks(
        &self,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<Page<SpotifyTrack>, RemoteError>;

    // =========================================================================
    // Mutations of the current user's library
    // =========================================================================

    fn follow_artist(&self, id: &str) -> Result<(), RemoteError>;
    fn unfollow_artist(&self, id: &str) -> Result<(), RemoteError>;
    fn save_album(&self, id: &str) -> Result<(), RemoteError>;
    fn unsave_album(&self, id: &str) -> Result<(), RemoteError>;
    fn save_track(&self, id: &str) -> Result<(), RemoteError>;
    fn unsave_track(&self, id: &str) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(RemoteError::Transient("503".into()).is_retryable());
        assert!(!RemoteError::Unauthenticated("401".into()).is_retryable());
        assert!(!RemoteError::NotFound("x".into()).is_retryable());
        assert!(!RemoteError::Parse("x".into()).is_retryable());
        assert!(!RemoteError::Config("x".into()).is_retryable());
    }
}
