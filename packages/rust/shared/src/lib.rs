//! Shared types, error model, and configuration for grantsync.
//!
//! This crate is the foundation depended on by all other grantsync crates.
//! It provides:
//! - [`GrantSyncError`] — the unified error type
//! - Domain types ([`StubRecord`], [`HistoricalRecord`], [`RunId`])
//! - Configuration ([`AppConfig`], [`SyncConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, AwardApiConfig, DefaultsConfig, ListingApiConfig, RateLimitConfig, SyncConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{GrantSyncError, Result};
pub use types::{
    AWARD_PREFIX, HistoricalRecord, HistoricalTable, RunId, SCRAPE_TS_COLUMN, STUB_COLUMNS,
    StubRecord, SyncCounts, run_timestamp,
};
