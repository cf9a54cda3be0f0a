//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables
//! into a type-safe struct.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Shortest random token suffix accepted at startup.
///
/// 14 characters from a 62 symbol alphabet carry ~83 bits of entropy.
pub const MIN_TOKEN_RANDOM_LENGTH: usize = 14;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (optional): PostgreSQL connection string, tokens are kept in memory when unset
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `PRIVATE_FILES_ROOT` / `PUBLIC_FILES_ROOT`: storage roots files are served from
/// - `PRIVATE_FILES_PREFIX` / `PUBLIC_FILES_PREFIX`: URL prefixes that select a root
/// - `BASE_URL`: host used when building `/getfilesrc/<token>` URLs
/// - `TOKEN_TTL_SECS`, `TOKEN_RANDOM_LENGTH`, `REISSUE_EXPIRED_TOKENS`: issuance tuning
/// - `CACHE_MAX_AGE_SECS`: `Cache-Control` max-age on served files
/// - `STORE_TIMEOUT_MS`, `FS_TIMEOUT_MS`: per-call timeouts
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_private_root")]
    pub private_files_root: PathBuf,

    #[serde(default = "default_public_root")]
    pub public_files_root: PathBuf,

    #[serde(default = "default_private_prefix")]
    pub private_files_prefix: String,

    #[serde(default = "default_public_prefix")]
    pub public_files_prefix: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_ttl_secs")]
    pub token_ttl_secs: u64,

    #[serde(default = "default_token_length")]
    pub token_random_length: usize,

    /// When true, issuance only reuses tokens that have not expired yet.
    #[serde(default)]
    pub reissue_expired_tokens: bool,

    #[serde(default = "default_cache_max_age")]
    pub cache_max_age_secs: u64,

    #[serde(default = "default_timeout_ms")]
    pub store_timeout_ms: u64,

    #[serde(default = "default_timeout_ms")]
    pub fs_timeout_ms: u64,
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("TOKEN_RANDOM_LENGTH must be at least {MIN_TOKEN_RANDOM_LENGTH}, got {0}")]
    TokenTooShort(usize),

    #[error("BASE_URL is not a valid URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),

    #[error("BASE_URL cannot be served over https: {0}")]
    UnsupportedBaseUrl(String),
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_private_root() -> PathBuf {
    PathBuf::from("./files/private")
}

fn default_public_root() -> PathBuf {
    PathBuf::from("./files/public")
}

fn default_private_prefix() -> String {
    "/system/files".to_string()
}

fn default_public_prefix() -> String {
    "sites/default/files/".to_string()
}

fn default_base_url() -> String {
    "https://localhost:3000".to_string()
}

/// One hour.
fn default_ttl_secs() -> u64 {
    3600
}

fn default_token_length() -> usize {
    15
}

fn default_cache_max_age() -> u64 {
    3600
}

fn default_timeout_ms() -> u64 {
    5000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            server_port: default_port(),
            private_files_root: default_private_root(),
            public_files_root: default_public_root(),
            private_files_prefix: default_private_prefix(),
            public_files_prefix: default_public_prefix(),
            base_url: default_base_url(),
            token_ttl_secs: default_ttl_secs(),
            token_random_length: default_token_length(),
            reissue_expired_tokens: false,
            cache_max_age_secs: default_cache_max_age(),
            store_timeout_ms: default_timeout_ms(),
            fs_timeout_ms: default_timeout_ms(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Environment variable values cannot be parsed into expected types
    /// - The resulting configuration fails [`Config::validate`]
    pub fn from_env() -> Result<Self, ConfigError> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: token_ttl_secs -> TOKEN_TTL_SECS
        let config = envy::from_env::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would weaken tokens or break URL generation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_random_length < MIN_TOKEN_RANDOM_LENGTH {
            return Err(ConfigError::TokenTooShort(self.token_random_length));
        }
        url::Url::parse(&self.base_url)?;
        Ok(())
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        i64::try_from(self.token_ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn fs_timeout(&self) -> Duration {
        Duration::from_millis(self.fs_timeout_ms)
    }
}
