// Copyright (c) 2025 TRUSTEDGE LABS LLC
// MPL-2.0: https://mozilla.org/MPL/2.0/
// Project: trustedge — Privacy and trust at the edge.

//! Runtime configuration for the authentication stack, loaded from
//! environment variables with sensible local-development defaults.

use std::env;
use std::path::PathBuf;

use crate::vault::DEFAULT_CACHE_DAYS;

const DEFAULT_IDENTITY_URL: &str = "http://localhost:8000";
const DEFAULT_APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Runtime configuration for the hybrid authenticator and its collaborators.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the remote identity service.
    pub identity_url: String,
    /// Sent to the identity service on login for audit/compatibility checks.
    pub app_version: String,
    /// Directory offline credential blobs are cached under.
    pub credential_cache_dir: PathBuf,
    /// Days a cached credential remains usable before expiry.
    pub cache_days: u32,
    /// Fixed distribution secret used to derive the package distribution key.
    /// Supplied at process init (env var or explicit override); never
    /// hard-coded into the authenticator itself.
    pub distribution_secret: String,
}

impl Config {
    /// Loads configuration from the environment:
    ///
    /// - `AIPK_IDENTITY_URL` (default `http://localhost:8000`)
    /// - `AIPK_APP_VERSION` (default the crate version)
    /// - `AIPK_CREDENTIAL_CACHE_DIR` (default `<data dir>/aipk/credentials`)
    /// - `AIPK_CACHE_DAYS` (default 7; falls back to the default on a parse
    ///   failure rather than erroring, since a malformed cache-days value
    ///   shouldn't block startup)
    /// - `AIPK_DISTRIBUTION_SECRET` (required; see DESIGN.md's Open Question
    ///   decision on why this isn't embedded as a constant)
    pub fn from_env() -> Result<Self, ConfigError> {
        let identity_url =
            env::var("AIPK_IDENTITY_URL").unwrap_or_else(|_| DEFAULT_IDENTITY_URL.to_string());
        let app_version =
            env::var("AIPK_APP_VERSION").unwrap_or_else(|_| DEFAULT_APP_VERSION.to_string());
        let credential_cache_dir = env::var("AIPK_CREDENTIAL_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_cache_dir());
        let cache_days = env::var("AIPK_CACHE_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_CACHE_DAYS);
        let distribution_secret = env::var("AIPK_DISTRIBUTION_SECRET")
            .map_err(|_| ConfigError::MissingDistributionSecret)?;

        Ok(Config {
            identity_url,
            app_version,
            credential_cache_dir,
            cache_days,
            distribution_secret,
        })
    }
}

fn default_cache_dir() -> PathBuf {
    let base = env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            env::var("HOME")
                .map(|home| PathBuf::from(home).join(".local/share"))
                .unwrap_or_else(|_| PathBuf::from("."))
        });
    base.join("aipk").join("credentials")
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("AIPK_DISTRIBUTION_SECRET is not set; the distribution key cannot be derived without it")]
    MissingDistributionSecret,
}
