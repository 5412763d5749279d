//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use serde::Deserialize;
use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Error, Debug)]
#[allow(dead_code)]
pub enum ConfigError {
    #[error("Failed to load environment variables: {0}")]
    EnvLoad(#[from] dotenvy::Error),

    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0), // Bind to 0.0.0.0 for Railway/Docker
            port: 3000,
        }
    }
}

/// Governance tuning knobs
///
/// These bound the background-job behavior of the consistency engine and
/// drift detector. The 5% mismatch tolerance is deliberately NOT here:
/// it is a fixed constant so check semantics stay auditable.
#[derive(Debug, Clone, Deserialize)]
pub struct GovernanceConfig {
    /// How long a cached consistency report stays fresh (seconds)
    pub report_staleness_secs: u64,
    /// Per-source-fetch timeout within a consistency run (milliseconds)
    pub fetch_timeout_ms: u64,
    /// Compare-and-set retry budget for governance state writes
    pub cas_max_retries: u32,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            report_staleness_secs: 30,
            fetch_timeout_ms: 5_000,
            cas_max_retries: 4,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub governance: GovernanceConfig,
    pub cors: CorsConfig,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        let server = ServerConfig {
            host: std::env::var("HOST")
                .ok()
                .and_then(|h| h.parse().ok())
                .unwrap_or_else(|| ServerConfig::default().host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or_else(|| ServerConfig::default().port),
        };

        let governance = GovernanceConfig {
            report_staleness_secs: std::env::var("REPORT_STALENESS_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(|| GovernanceConfig::default().report_staleness_secs),
            fetch_timeout_ms: std::env::var("SOURCE_FETCH_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(|| GovernanceConfig::default().fetch_timeout_ms),
            cas_max_retries: std::env::var("GOVERNANCE_CAS_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(|| GovernanceConfig::default().cas_max_retries),
        };

        let cors = CorsConfig {
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|| CorsConfig::default().allowed_origins),
        };

        Ok(Self {
            server,
            governance,
            cors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, Ipv4Addr::new(0, 0, 0, 0));
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_default_governance_config() {
        let config = GovernanceConfig::default();
        assert_eq!(config.report_staleness_secs, 30);
        assert_eq!(config.fetch_timeout_ms, 5_000);
        assert_eq!(config.cas_max_retries, 4);
    }
}
