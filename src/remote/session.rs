//! Spotify sessions.
//!
//! Two kinds of credentials are used:
//! - a user session ([`UserSession`]) built from a stored refresh token, needed
//!   for anything under `/me` (syncing, saving, following);
//! - an application session ([`AppSession`]) from the client-credentials grant,
//!   enough for plain catalog lookups.
//!
//! Both are [`TokenSource`]s handed to the HTTP client, there is no global
//! client or global token.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

use super::client::classify_status;
use super::models::TokenResponse;
use super::RemoteError;

pub const DEFAULT_ACCOUNTS_BASE_URL: &str = "https://accounts.spotify.com";

/// Tokens are considered expired this many seconds before they actually are.
const EXPIRY_BUFFER_SECS: i64 = 60;

/// Provides a bearer token for the next request.
pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> Result<String, RemoteError>;
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpotifyToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl SpotifyToken {
    /// A token that only carries a refresh token; the first use refreshes it.
    pub fn from_refresh_token(refresh_token: String) -> Self {
        SpotifyToken {
            access_token: String::new(),
            refresh_token,
            expires_at: DateTime::<Utc>::default(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.access_token.is_empty()
            || Utc::now() >= self.expires_at - ChronoDuration::seconds(EXPIRY_BUFFER_SECS)
    }
}

impl fmt::Debug for SpotifyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotifyToken")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// JSON file holding the user token between runs.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        TokenStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<SpotifyToken>, RemoteError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path).map_err(|e| {
            RemoteError::Config(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        let token = serde_json::from_str(&content).map_err(|e| {
            RemoteError::Config(format!("Corrupt token file {}: {}", self.path.display(), e))
        })?;
        Ok(Some(token))
    }

    pub fn save(&self, token: &SpotifyToken) -> Result<(), RemoteError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    RemoteError::Config(format!("Failed to create {}: {}", parent.display(), e))
                })?;
            }
        }
        let content = serde_json::to_string_pretty(token)
            .map_err(|e| RemoteError::Config(format!("Failed to encode token: {}", e)))?;
        fs::write(&self.path, content).map_err(|e| {
            RemoteError::Config(format!("Failed to write {}: {}", self.path.display(), e))
        })
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub accounts_base_url: String,
    pub token_path: PathBuf,
    pub request_timeout: Duration,
}

impl SessionSettings {
    fn credentials(&self) -> Option<(&str, &str)> {
        match (self.client_id.as_deref(), self.client_secret.as_deref()) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Some((id, secret)),
            _ => None,
        }
    }

    fn http_client(&self) -> Result<Client, RemoteError> {
        Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| RemoteError::Config(format!("Failed to build HTTP client: {}", e)))
    }
}

/// POSTs a form to the accounts token endpoint with basic client auth.
fn request_token(
    http: &Client,
    settings: &SessionSettings,
    form: &[(&str, &str)],
) -> Result<TokenResponse, RemoteError> {
    let Some((client_id, client_secret)) = settings.credentials() else {
        return Err(RemoteError::Config(
            "SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET are required".to_string(),
        ));
    };
    let basic = BASE64.encode(format!("{}:{}", client_id, client_secret));

    let url = format!(
        "{}/api/token",
        settings.accounts_base_url.trim_end_matches('/')
    );
    let response = http
        .post(&url)
        .header(AUTHORIZATION, format!("Basic {}", basic))
        .form(form)
        .send()
        .map_err(|e| RemoteError::Transient(format!("token request: {}", e)))?;
    classify_status(response.status(), "token request")?;
    response
        .json::<TokenResponse>()
        .map_err(|e| RemoteError::Parse(format!("token response: {}", e)))
}

/// Session of the signed-in user.
pub struct UserSession {
    settings: SessionSettings,
    store: TokenStore,
    http: Client,
    token: Mutex<SpotifyToken>,
}

impl UserSession {
    /// Loads the stored token. `Ok(None)` means nobody is signed in.
    pub fn open(settings: SessionSettings) -> Result<Option<Self>, RemoteError> {
        let store = TokenStore::new(&settings.token_path);
        let Some(token) = store.load()? else {
            return Ok(None);
        };
        let http = settings.http_client()?;
        Ok(Some(UserSession {
            settings,
            store,
            http,
            token: Mutex::new(token),
        }))
    }

    fn refresh(&self, current: &SpotifyToken) -> Result<SpotifyToken, RemoteError> {
        let response = request_token(
            &self.http,
            &self.settings,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", current.refresh_token.as_str()),
            ],
        )
        .map_err(|e| match e {
            RemoteError::Transient(_) => e,
            other => RemoteError::Unauthenticated(format!("Token refresh failed: {}", other)),
        })?;

        Ok(SpotifyToken {
            access_token: response.access_token,
            refresh_token: response
                .refresh_token
                .unwrap_or_else(|| current.refresh_token.clone()),
            expires_at: Utc::now() + ChronoDuration::seconds(response.expires_in),
        })
    }
}

impl TokenSource for UserSession {
    fn access_token(&self) -> Result<String, RemoteError> {
        let mut token = self
            .token
            .lock()
            .map_err(|_| RemoteError::Unauthenticated("session lock poisoned".to_string()))?;
        if token.is_expired() {
            info!("Refreshing Spotify user token");
            let refreshed = self.refresh(&token)?;
            if let Err(e) = self.store.save(&refreshed) {
                warn!("Refreshed token could not be persisted: {}", e);
            }
            *token = refreshed;
        }
        Ok(token.access_token.clone())
    }
}

/// Application-level session from the client-credentials grant.
pub struct AppSession {
    settings: SessionSettings,
    http: Client,
    token: Mutex<Option<(String, DateTime<Utc>)>>,
}

impl AppSession {
    pub fn new(settings: SessionSettings) -> Result<Self, RemoteError> {
        if settings.credentials().is_none() {
            return Err(RemoteError::Config(
                "SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET are required".to_string(),
            ));
        }
        let http = settings.http_client()?;
        Ok(AppSession {
            settings,
            http,
            token: Mutex::new(None),
        })
    }
}

impl TokenSource for AppSession {
    fn access_token(&self) -> Result<String, RemoteError> {
        let mut cached = self
            .token
            .lock()
            .map_err(|_| RemoteError::Unauthenticated("session lock poisoned".to_string()))?;
        if let Some((token, expires_at)) = cached.as_ref() {
            if Utc::now() < *expires_at - ChronoDuration::seconds(EXPIRY_BUFFER_SECS) {
                return Ok(token.clone());
            }
        }
        let response = request_token(
            &self.http,
            &self.settings,
            &[("grant_type", "client_credentials")],
        )?;
        let expires_at = Utc::now() + ChronoDuration::seconds(response.expires_in);
        *cached = Some((response.access_token.clone(), expires_at));
        Ok(response.access_token)
    }
}
