//! TOML configuration.
//!
//! Every section has defaults, so an empty file (or no file at all, see
//! [`Config::minimal`]) is a valid client configuration. Server commands
//! additionally need `[db]` and `[auth]`.
//!
//! ```toml
//! [db]
//! path = "./data/stash.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:3000"
//!
//! [auth]
//! secret = "change-me-to-something-long"
//!
//! [sync]
//! initial_limit = 20
//! debounce_ms = 300
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use stash_core::fuzzy::{FuzzyOptions, DEFAULT_THRESHOLD};
use stash_core::pagination::RevealConfig;

/// Minimum accepted length of `[auth].secret`, in bytes.
pub const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/stash.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Fetch page titles for URL bookmarks. When off the URL is the title.
    #[serde(default = "default_true")]
    pub fetch_titles: bool,
    #[serde(default = "default_title_timeout_secs")]
    pub title_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            fetch_titles: true,
            title_timeout_secs: default_title_timeout_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}
fn default_true() -> bool {
    true
}
fn default_title_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// HMAC key for bearer tokens. Required by `serve`.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            token_ttl_hours: default_token_ttl_hours(),
        }
    }
}

fn default_token_ttl_hours() -> i64 {
    24 * 7
}

impl AuthConfig {
    /// The signing secret, or an error explaining how to set one.
    pub fn require_secret(&self) -> Result<&str> {
        match self.secret.as_deref() {
            Some(s) => Ok(s),
            None => anyhow::bail!("auth.secret must be set to run the server"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub session_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            session_path: None,
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

impl ClientConfig {
    /// Where the login session is stored: the configured path, else
    /// `<config dir>/stash/session.json`.
    pub fn session_file(&self) -> PathBuf {
        if let Some(path) = &self.session_path {
            return path.clone();
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stash")
            .join("session.json")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_initial_limit")]
    pub initial_limit: usize,
    #[serde(default = "default_background_delay_ms")]
    pub background_delay_ms: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_reveal_step")]
    pub reveal_step: usize,
    #[serde(default = "default_reveal_cooldown_ms")]
    pub reveal_cooldown_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            initial_limit: default_initial_limit(),
            background_delay_ms: default_background_delay_ms(),
            page_size: default_page_size(),
            reveal_step: default_reveal_step(),
            reveal_cooldown_ms: default_reveal_cooldown_ms(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_initial_limit() -> usize {
    20
}
fn default_background_delay_ms() -> u64 {
    100
}
fn default_page_size() -> usize {
    20
}
fn default_reveal_step() -> usize {
    10
}
fn default_reveal_cooldown_ms() -> u64 {
    150
}
fn default_debounce_ms() -> u64 {
    300
}

impl SyncConfig {
    pub fn background_delay(&self) -> Duration {
        Duration::from_millis(self.background_delay_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn reveal(&self) -> RevealConfig {
        RevealConfig {
            page_size: self.page_size,
            step: self.reveal_step,
            cooldown: Duration::from_millis(self.reveal_cooldown_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

impl SearchConfig {
    pub fn fuzzy_options(&self) -> FuzzyOptions {
        FuzzyOptions {
            threshold: self.threshold,
            ..FuzzyOptions::default()
        }
    }
}

impl Config {
    /// All defaults. Used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(secret) = &self.auth.secret {
            if secret.len() < MIN_SECRET_LEN {
                anyhow::bail!("auth.secret must be at least {} bytes", MIN_SECRET_LEN);
            }
        }
        if self.auth.token_ttl_hours < 1 {
            anyhow::bail!("auth.token_ttl_hours must be >= 1");
        }
        if self.server.title_timeout_secs == 0 {
            anyhow::bail!("server.title_timeout_secs must be > 0");
        }
        if self.sync.initial_limit == 0 {
            anyhow::bail!("sync.initial_limit must be > 0");
        }
        if self.sync.page_size == 0 {
            anyhow::bail!("sync.page_size must be > 0");
        }
        if self.sync.reveal_step == 0 {
            anyhow::bail!("sync.reveal_step must be > 0");
        }
        if !(self.search.threshold > 0.0 && self.search.threshold <= 1.0) {
            anyhow::bail!("search.threshold must be in (0.0, 1.0]");
        }
        url::Url::parse(&self.client.base_url)
            .with_context(|| format!("client.base_url is not a URL: {}", self.client.base_url))?;
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Like [`load_config`], but a missing file yields [`Config::minimal`].
/// Client commands use this so they work without any setup.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}
