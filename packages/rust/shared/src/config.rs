//! Application configuration for grantsync.
//!
//! User config lives at `~/.grantsync/grantsync.toml`.
//! CLI flags override config file values, which override defaults.
//!
//! Defaults mirror the upstream deployment: the DOGE savings listing API,
//! the USASpending award API, and a ceiling of 10 award lookups per 3 s.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GrantSyncError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "grantsync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".grantsync";

// ---------------------------------------------------------------------------
// Config structs (matching grantsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Primary listing API settings.
    #[serde(default)]
    pub listing: ListingApiConfig,

    /// Secondary award-lookup API settings.
    #[serde(default)]
    pub award: AwardApiConfig,

    /// Outbound request-rate ceiling for award lookups.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory holding the historical/snapshot CSVs and the error log.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Listing endpoint to sync (also names the result key and the CSVs).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            endpoint: default_endpoint(),
        }
    }
}

fn default_data_dir() -> String {
    "data".into()
}
fn default_endpoint() -> String {
    "grants".into()
}

/// `[listing]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingApiConfig {
    /// Root URL of the paginated listing API.
    #[serde(default = "default_listing_root")]
    pub root_url: String,

    /// Sort field sent with every page request.
    #[serde(default = "default_sort_by")]
    pub sort_by: String,

    /// Sort order sent with every page request.
    #[serde(default = "default_sort_order")]
    pub sort_order: String,

    /// Page size.
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_listing_timeout")]
    pub timeout_secs: u64,
}

impl Default for ListingApiConfig {
    fn default() -> Self {
        Self {
            root_url: default_listing_root(),
            sort_by: default_sort_by(),
            sort_order: default_sort_order(),
            per_page: default_per_page(),
            timeout_secs: default_listing_timeout(),
        }
    }
}

fn default_listing_root() -> String {
    "https://api.doge.gov/savings".into()
}
fn default_sort_by() -> String {
    "date".into()
}
fn default_sort_order() -> String {
    "desc".into()
}
fn default_per_page() -> u32 {
    500
}
fn default_listing_timeout() -> u64 {
    30
}

/// `[award]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwardApiConfig {
    /// Root URL of the keyed award-lookup API.
    #[serde(default = "default_award_root")]
    pub root_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_award_timeout")]
    pub timeout_secs: u64,

    /// Maximum concurrent award lookups (the rate limiter still applies).
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

impl Default for AwardApiConfig {
    fn default() -> Self {
        Self {
            root_url: default_award_root(),
            timeout_secs: default_award_timeout(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_award_root() -> String {
    "https://api.usaspending.gov/api/v2/awards".into()
}
fn default_award_timeout() -> u64 {
    20
}
fn default_concurrency() -> u32 {
    4
}

/// `[rate_limit]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum calls per rolling window.
    #[serde(default = "default_max_calls")]
    pub max_calls: u32,

    /// Window length in seconds.
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: default_max_calls(),
            period_secs: default_period_secs(),
        }
    }
}

fn default_max_calls() -> u32 {
    10
}
fn default_period_secs() -> u64 {
    3
}

// ---------------------------------------------------------------------------
// Sync config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime sync configuration — merged from config file + CLI flags and
/// passed into each component at construction. Scoped to one run; there is
/// no process-wide state.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Data directory for CSVs, error log, and the run lockfile.
    pub data_dir: PathBuf,
    /// Listing endpoint name (result key and CSV base name).
    pub endpoint: String,
    /// Listing API settings.
    pub listing: ListingApiConfig,
    /// Award API settings.
    pub award: AwardApiConfig,
    /// Award-lookup rate ceiling.
    pub rate_limit: RateLimitConfig,
}

impl From<&AppConfig> for SyncConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            data_dir: PathBuf::from(&config.defaults.data_dir),
            endpoint: config.defaults.endpoint.clone(),
            listing: config.listing.clone(),
            award: config.award.clone(),
            rate_limit: config.rate_limit.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.grantsync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| GrantSyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.grantsync/grantsync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| GrantSyncError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| GrantSyncError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| GrantSyncError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| GrantSyncError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| GrantSyncError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
