//! Wire models for the Spotify Web API.
//!
//! Only the fields the library actually stores are declared; everything else
//! in the responses is ignored. Most fields default when missing so a sparse
//! record reaches normalization, where it is rejected with a proper reason,
//! instead of failing the whole page at decode time.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SpotifyImage {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExternalUrls {
    pub spotify: Option<String>,
}

/// Artist as embedded in album and track objects (no genres, no images).
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SimplifiedArtist {
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SpotifyArtist {
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub external_urls: ExternalUrls,
    #[serde(default)]
    pub images: Vec<SpotifyImage>,
}

impl From<&SpotifyArtist> for SimplifiedArtist {
    fn from(artist: &SpotifyArtist) -> Self {
        SimplifiedArtist {
            id: artist.id.clone(),
            name: artist.name.clone(),
            uri: artist.uri.clone(),
            external_urls: artist.external_urls.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SpotifyAlbum {
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Vec<SimplifiedArtist>,
    /// `YYYY`, `YYYY-MM` or `YYYY-MM-DD` depending on the release date precision.
    pub release_date: Option<String>,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub external_urls: ExternalUrls,
    #[serde(default)]
    pub images: Vec<SpotifyImage>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SpotifyTrack {
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Vec<SimplifiedArtist>,
    pub album: Option<SpotifyAlbum>,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

// =============================================================================
// Collections
// =============================================================================

#[derive(Clone, Debug, Deserialize)]
pub struct Paging<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    pub next: Option<String>,
    pub total: Option<u32>,
}

/// `/me/following?type=artist` wraps its cursor page in an `artists` field.
#[derive(Clone, Debug, Deserialize)]
pub struct FollowedArtistsResponse {
    pub artists: Paging<SpotifyArtist>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SavedAlbum {
    pub added_at: Option<String>,
    pub album: SpotifyAlbum,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SavedTrack {
    pub added_at: Option<String>,
    pub track: SpotifyTrack,
}

// =============================================================================
// Accounts service
// =============================================================================

#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    pub expires_in: i64,
    /// Only present when the accounts service rotates the refresh token.
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}
