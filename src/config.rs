use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::services::ProcurementSettings;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Where aggregates are kept.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Process-local maps; everything is lost on restart.
    Memory,
    /// sea-orm over `database_url`.
    Database,
}

/// Procurement tunables
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ProcurementConfig {
    #[validate(length(min = 1, max = 10))]
    #[serde(default = "default_order_prefix")]
    pub order_number_prefix: String,

    #[validate(length(min = 1, max = 10))]
    #[serde(default = "default_receipt_prefix")]
    pub receipt_number_prefix: String,

    #[validate(range(min = 1, max = 50))]
    #[serde(default = "default_number_attempts")]
    pub number_generation_attempts: u32,

    #[validate(range(max = 20))]
    #[serde(default = "default_payment_retries")]
    pub payment_write_retries: u32,
}

impl Default for ProcurementConfig {
    fn default() -> Self {
        Self {
            order_number_prefix: default_order_prefix(),
            receipt_number_prefix: default_receipt_prefix(),
            number_generation_attempts: default_number_attempts(),
            payment_write_retries: default_payment_retries(),
        }
    }
}

impl From<&ProcurementConfig> for ProcurementSettings {
    fn from(cfg: &ProcurementConfig) -> Self {
        Self {
            order_number_prefix: cfg.order_number_prefix.clone(),
            receipt_number_prefix: cfg.receipt_number_prefix.clone(),
            number_generation_attempts: cfg.number_generation_attempts,
            payment_write_retries: cfg.payment_write_retries,
        }
    }
}

/// Remote inventory service. Without a `base_url` stock is tracked in process.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct InventoryConfig {
    #[serde(default)]
    pub base_url: Option<String>,

    /// Per-request timeout in milliseconds
    #[validate(range(min = 50, max = 60000))]
    #[serde(default = "default_inventory_timeout_ms")]
    pub timeout_ms: u64,

    /// Consecutive failures before the circuit opens
    #[validate(range(min = 1))]
    #[serde(default = "default_circuit_breaker_failures")]
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before a trial call
    #[validate(range(min = 1))]
    #[serde(default = "default_circuit_breaker_timeout")]
    pub reset_timeout_secs: u64,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: default_inventory_timeout_ms(),
            failure_threshold: default_circuit_breaker_failures(),
            reset_timeout_secs: default_circuit_breaker_timeout(),
        }
    }
}

impl InventoryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            timeout: Duration::from_secs(self.reset_timeout_secs),
            ..Default::default()
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[validate(custom = "validate_log_level")]
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_storage")]
    pub storage: StorageMode,

    /// Database connection URL, used when `storage = "database"`
    pub database_url: String,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    #[validate(range(min = 1, max = 1000))]
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// Check `X-Actor-Roles` against the role table. When off every actor may
    /// perform every operation.
    #[serde(default)]
    pub enforce_roles: bool,

    #[validate(custom = "validate_event_channel_capacity")]
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    #[validate]
    #[serde(default)]
    pub procurement: ProcurementConfig,

    #[validate]
    #[serde(default)]
    pub inventory: InventoryConfig,
}

impl AppConfig {
    pub fn new(host: String, port: u16, environment: String, database_url: String) -> Self {
        Self {
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            storage: default_storage(),
            database_url,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            enforce_roles: false,
            event_channel_capacity: default_event_channel_capacity(),
            procurement: ProcurementConfig::default(),
            inventory: InventoryConfig::default(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn procurement_settings(&self) -> ProcurementSettings {
        ProcurementSettings::from(&self.procurement)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_storage() -> StorageMode {
    StorageMode::Memory
}

fn default_db_max_connections() -> u32 {
    16
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_order_prefix() -> String {
    "PO".to_string()
}

fn default_receipt_prefix() -> String {
    "RC".to_string()
}

fn default_number_attempts() -> u32 {
    5
}

fn default_payment_retries() -> u32 {
    3
}

fn default_inventory_timeout_ms() -> u64 {
    5000
}

fn default_circuit_breaker_failures() -> u32 {
    5 // Number of failures before circuit opens
}

fn default_circuit_breaker_timeout() -> u64 {
    30
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("pos_procurement={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("storage", "memory")?
        .set_default("database_url", "sqlite://procurement.db?mode=rwc")?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "127.0.0.1".to_string(),
            8080,
            "test".to_string(),
            "sqlite::memory:".to_string(),
        )
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = base_config();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.storage, StorageMode::Memory);
        assert_eq!(cfg.procurement_settings(), ProcurementSettings::default());
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut cfg = base_config();
        cfg.log_level = "chatty".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_number_attempts() {
        let mut cfg = base_config();
        cfg.procurement.number_generation_attempts = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn inventory_settings_feed_the_breaker() {
        let mut cfg = base_config();
        cfg.inventory.failure_threshold = 2;
        cfg.inventory.reset_timeout_secs = 9;
        let breaker = cfg.inventory.circuit_breaker();
        assert_eq!(breaker.failure_threshold, 2);
        assert_eq!(breaker.timeout, Duration::from_secs(9));
        assert_eq!(cfg.inventory.timeout(), Duration::from_millis(5000));
    }
}
