//! # Service Configuration
//!
//! Process-level configuration read from the environment (and `.env` via dotenvy).
//! Business settings live in the settings document, not here.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.1.0: Per-job interval overrides
//! - 1.0.0: Initial release

use anyhow::{anyhow, Result};
use std::env;

pub const DEFAULT_DATABASE_PATH: &str = "purchase_enhancements.db";
pub const DEFAULT_SITE_URL: &str = "http://localhost:8000";
const ONE_DAY_SECS: u64 = 86_400;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub log_level: String,
    /// Base URL used for links in outgoing mail
    pub site_url: String,
    pub socket_path: String,
    /// Optional YAML document used to seed settings on first start
    pub settings_seed_path: Option<String>,
    pub escalation_interval_secs: u64,
    pub digest_interval_secs: u64,
    pub cleanup_interval_secs: u64,
    pub heartbeat_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let config = Config {
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            site_url: env::var("SITE_URL").unwrap_or_else(|_| DEFAULT_SITE_URL.to_string()),
            socket_path: crate::ipc::get_socket_path(),
            settings_seed_path: env::var("SETTINGS_SEED_PATH").ok().filter(|p| !p.is_empty()),
            escalation_interval_secs: parse_secs("ESCALATION_INTERVAL_SECS", ONE_DAY_SECS)?,
            digest_interval_secs: parse_secs("DIGEST_INTERVAL_SECS", ONE_DAY_SECS)?,
            cleanup_interval_secs: parse_secs("CLEANUP_INTERVAL_SECS", ONE_DAY_SECS)?,
            heartbeat_interval_secs: parse_secs("HEARTBEAT_INTERVAL_SECS", 30)?,
        };
        Ok(config)
    }

    /// Site URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.site_url.trim_end_matches('/')
    }
}

fn parse_secs(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(raw) => parse_interval(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_interval(key: &str, raw: &str) -> Result<u64> {
    let secs: u64 = raw
        .trim()
        .parse()
        .map_err(|e| anyhow!("Invalid value for {}: '{}' ({})", key, raw, e))?;
    if secs == 0 {
        return Err(anyhow!("{} must be greater than zero", key));
    }
    Ok(secs)
}
