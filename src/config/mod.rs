mod file_config;

pub use file_config::{FileConfig, RemoteConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::remote::{
    ClientSettings, SessionSettings, DEFAULT_ACCOUNTS_BASE_URL, DEFAULT_API_BASE_URL,
};
use crate::snapshot::ReaderSettings;

pub const DEFAULT_DB_FILE: &str = "spotify_manager.db";
pub const DEFAULT_TOKEN_FILE: &str = "spotify_token.json";

/// The Spotify API never returns more than 50 items per page.
pub const MAX_PAGE_SIZE: u32 = 50;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub token_path: Option<PathBuf>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_base_url: Option<String>,
    pub accounts_base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub token_path: PathBuf,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_base_url: String,
    pub accounts_base_url: String,
    pub remote: RemoteSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    pub page_size: u32,
    pub request_timeout: Duration,
    pub max_page_retries: u32,
    pub retry_backoff: Duration,
    pub min_request_interval: Duration,
    pub backfill_parallelism: usize,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            request_timeout: Duration::from_secs(30),
            max_page_retries: 1,
            retry_backoff: Duration::from_millis(500),
            min_request_interval: Duration::ZERO,
            backfill_parallelism: 4,
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE));

        // A bare file name lives in the current directory.
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }
        if db_path.is_dir() {
            bail!("db_path is a directory: {:?}", db_path);
        }

        let token_path = file
            .token_path
            .map(PathBuf::from)
            .or_else(|| cli.token_path.clone())
            .unwrap_or_else(|| db_path.with_file_name(DEFAULT_TOKEN_FILE));

        let client_id = file.client_id.or_else(|| cli.client_id.clone());
        let client_secret = file.client_secret.or_else(|| cli.client_secret.clone());

        let api_base_url = file
            .api_base_url
            .or_else(|| cli.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let accounts_base_url = file
            .accounts_base_url
            .or_else(|| cli.accounts_base_url.clone())
            .unwrap_or_else(|| DEFAULT_ACCOUNTS_BASE_URL.to_string());

        // Remote settings - merge file config with defaults
        let defaults = RemoteSettings::default();
        let remote_file = file.remote.unwrap_or_default();
        let remote = RemoteSettings {
            page_size: remote_file.page_size.unwrap_or(defaults.page_size),
            request_timeout: remote_file
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_page_retries: remote_file
                .max_page_retries
                .unwrap_or(defaults.max_page_retries),
            retry_backoff: remote_file
                .retry_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff),
            min_request_interval: remote_file
                .min_request_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.min_request_interval),
            backfill_parallelism: remote_file
                .backfill_parallelism
                .unwrap_or(defaults.backfill_parallelism),
        };

        if remote.page_size == 0 || remote.page_size > MAX_PAGE_SIZE {
            bail!(
                "remote.page_size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE,
                remote.page_size
            );
        }
        if remote.request_timeout.is_zero() {
            bail!("remote.request_timeout_secs must be greater than zero");
        }
        if remote.backfill_parallelism == 0 {
            bail!("remote.backfill_parallelism must be greater than zero");
        }

        Ok(Self {
            db_path,
            token_path,
            client_id,
            client_secret,
            api_base_url,
            accounts_base_url,
            remote,
        })
    }

    pub fn has_client_credentials(&self) -> bool {
        matches!(
            (&self.client_id, &self.client_secret),
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty()
        )
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            accounts_base_url: self.accounts_base_url.clone(),
            token_path: self.token_path.clone(),
            request_timeout: self.remote.request_timeout,
        }
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            api_base_url: self.api_base_url.clone(),
            request_timeout: self.remote.request_timeout,
            min_request_interval: self.remote.min_request_interval,
        }
    }

    pub fn reader_settings(&self) -> ReaderSettings {
        ReaderSettings {
            page_size: self.remote.page_size,
            max_page_retries: self.remote.max_page_retries,
            retry_backoff: self.remote.retry_backoff,
            backfill_parallelism: self.remote.backfill_parallelism,
        }
    }
}
