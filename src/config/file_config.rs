use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub token_path: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_base_url: Option<String>,
    pub accounts_base_url: Option<String>,

    pub remote: Option<RemoteConfig>,
}

/// `[remote]` table: paging, timeouts and retries of the Spotify client.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RemoteConfig {
    pub page_size: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    pub max_page_retries: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub min_request_interval_ms: Option<u64>,
    pub backfill_parallelism: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
