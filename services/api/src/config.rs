//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub allowed_origin: String,
    pub openai_api_key: Option<String>,
    pub creator_model: String,
    pub evidence_api_url: String,
    pub evidence_api_key: Option<String>,
    /// Shared secret the external scheduler presents to trigger a
    /// monitoring pass.
    pub scheduler_token: String,
    /// Upper bound for every store and evidence round-trip.
    pub backend_timeout: Duration,
    /// Max terms processed per monitoring pass.
    pub monitoring_batch_size: i64,
    /// A term is due for a pass once its last check is older than this.
    pub monitoring_interval: Duration,
    /// Max age of the cached minimum source threshold.
    pub source_cache_ttl: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let allowed_origin = std::env::var("ALLOWED_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        // --- Load External Provider Settings ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let creator_model =
            std::env::var("CREATOR_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let evidence_api_url = std::env::var("EVIDENCE_API_URL")
            .map_err(|_| ConfigError::MissingVar("EVIDENCE_API_URL".to_string()))?;
        let evidence_api_key = std::env::var("EVIDENCE_API_KEY").ok();

        let scheduler_token = std::env::var("SCHEDULER_TOKEN")
            .map_err(|_| ConfigError::MissingVar("SCHEDULER_TOKEN".to_string()))?;

        // --- Load Tuning Knobs ---
        let backend_timeout = Duration::from_millis(parse_var("BACKEND_TIMEOUT_MS", 5_000)?);
        let monitoring_batch_size = parse_var("MONITORING_BATCH_SIZE", 25)? as i64;
        let monitoring_interval =
            Duration::from_secs(parse_var("MONITORING_INTERVAL_HOURS", 6)? * 3600);
        let source_cache_ttl = Duration::from_secs(parse_var("SOURCE_CACHE_TTL_SECS", 300)?);

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            allowed_origin,
            openai_api_key,
            creator_model,
            evidence_api_url,
            evidence_api_key,
            scheduler_token,
            backend_timeout,
            monitoring_batch_size,
            monitoring_interval,
            source_cache_ttl,
        })
    }
}

/// Parses an optional numeric variable, falling back to a default.
fn parse_var(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}
