use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Background sync interval in minutes; 0 leaves syncing to `POST /sync`
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    /// Feed mirrors in priority order
    #[serde(default = "default_mirrors")]
    pub mirrors: Vec<String>,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Channels fetched concurrently during a sync
    #[serde(default = "default_sync_concurrency")]
    pub sync_concurrency: usize,
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_refresh_interval() -> u64 {
    0
}

fn default_mirrors() -> Vec<String> {
    vec!["https://rsshub.app".to_string()]
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_sync_concurrency() -> usize {
    8
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.mirrors.is_empty() {
            anyhow::bail!("at least one feed mirror must be configured");
        }
        Ok(config)
    }

    /// How often the binary should sync on its own, if at all.
    pub fn background_sync_interval(&self) -> Option<Duration> {
        match self.refresh_interval {
            0 => None,
            minutes => Some(Duration::from_secs(minutes.saturating_mul(60))),
        }
    }
}
