//! Configuration management.
//!
//! Values come from an optional file plus `TASKGATE__*` environment
//! variables, e.g. `TASKGATE__DATABASE__URL` or `TASKGATE__AUDIT__ENABLED`.

use serde::Deserialize;

use crate::pagination::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::telemetry::{LoggingConfig, MetricsConfig};

const ENV_PREFIX: &str = "TASKGATE";

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Audit trail configuration
    #[serde(default)]
    pub audit: AuditConfig,

    /// Page size defaults for list endpoints
    #[serde(default)]
    pub pagination: PaginationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Deployment environment (development, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Record audit entries at all
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,

    /// Path prefixes never audited
    #[serde(default = "default_skip_prefixes")]
    pub skip_prefixes: Vec<String>,

    /// Largest request body buffered for enforcement and auditing
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            skip_prefixes: default_skip_prefixes(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_limit")]
    pub default_limit: u64,

    #[serde(default = "default_max_limit")]
    pub max_limit: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 5 }
fn default_acquire_timeout_secs() -> u64 { 5 }
fn default_audit_enabled() -> bool { true }
fn default_skip_prefixes() -> Vec<String> { vec!["/auth".to_string(), "/audit-logs".to_string()] }
fn default_max_body_bytes() -> usize { 1024 * 1024 }
fn default_limit() -> u64 { DEFAULT_PAGE_SIZE }
fn default_max_limit() -> u64 { MAX_PAGE_SIZE }
fn default_environment() -> String { "development".to_string() }

/// `TASKGATE__SECTION__KEY` variables; lists are comma separated.
fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("audit.skip_prefixes")
        .try_parsing(true)
}

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(environment())
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with the environment layered on top.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(environment())
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pagination.max_limit == 0 || self.pagination.default_limit == 0 {
            anyhow::bail!("pagination limits must be positive");
        }
        if self.pagination.default_limit > self.pagination.max_limit {
            anyhow::bail!(
                "pagination.default_limit ({}) exceeds pagination.max_limit ({})",
                self.pagination.default_limit,
                self.pagination.max_limit
            );
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
