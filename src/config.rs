use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "USD";
const DEFAULT_PAYMENT_GATEWAY_URL: &str = "https://api.stripe.com";
const DEFAULT_PAYMENT_DESCRIPTION: &str = "Charge from Pet Power Pro";
const DEFAULT_FRONTEND_BASE_URL: &str = "http://localhost:3000";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Per-request timeout applied by the HTTP layer
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1))]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// ISO 4217 code of the single store currency
    #[serde(default = "default_currency")]
    #[validate(custom = "validate_currency")]
    pub currency: String,

    /// Base URL of the Stripe-compatible charges API
    #[serde(default = "default_payment_gateway_url")]
    #[validate(url)]
    pub payment_gateway_url: String,

    /// Secret API key for the payment gateway
    #[serde(default)]
    pub payment_secret_key: Option<String>,

    /// Upper bound on a single charge call; elapsing makes the outcome ambiguous
    #[serde(default = "default_payment_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub payment_timeout_secs: u64,

    /// Statement descriptor sent with every charge
    #[serde(default = "default_payment_description")]
    #[validate(length(min = 1, max = 255))]
    pub payment_description: String,

    /// Capacity of the domain event channel
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Number of orders returned by the "recent orders" lookup by default
    #[serde(default = "default_recent_orders")]
    #[validate(range(min = 1, max = 50))]
    pub recent_orders_default: u64,

    /// Page size of the paged order history
    #[serde(default = "default_orders_page_size")]
    #[validate(range(min = 1, max = 100))]
    pub orders_page_size: u64,

    /// Storefront base URL used to build order links in confirmations
    #[serde(default = "default_frontend_base_url")]
    #[validate(url)]
    pub frontend_base_url: String,
}

impl AppConfig {
    /// Builds a configuration with defaults for everything but the database and environment.
    pub fn new(database_url: String, environment: String) -> Self {
        Self {
            database_url,
            host: "127.0.0.1".to_string(),
            port: default_port(),
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            request_timeout_secs: default_request_timeout_secs(),
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            currency: default_currency(),
            payment_gateway_url: default_payment_gateway_url(),
            payment_secret_key: None,
            payment_timeout_secs: default_payment_timeout_secs(),
            payment_description: default_payment_description(),
            event_channel_capacity: default_event_channel_capacity(),
            recent_orders_default: default_recent_orders(),
            orders_page_size: default_orders_page_size(),
            frontend_base_url: default_frontend_base_url(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn payment_timeout(&self) -> Duration {
        Duration::from_secs(self.payment_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.is_production() {
            let has_key = self
                .payment_secret_key
                .as_deref()
                .map(|k| !k.trim().is_empty())
                .unwrap_or(false);
            if !has_key {
                let mut err = ValidationError::new("payment_secret_key_required");
                err.message =
                    Some("Set APP__PAYMENT_SECRET_KEY outside development environments".into());
                errors.add("payment_secret_key", err);
            }

            if !self.payment_gateway_url.starts_with("https://") {
                let mut err = ValidationError::new("payment_gateway_url_https");
                err.message = Some("The payment gateway must be reached over https".into());
                errors.add("payment_gateway_url", err);
            }
        }

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_min_connections");
            err.message = Some("db_min_connections must not exceed db_max_connections".into());
            errors.add("db_min_connections", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
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

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_payment_gateway_url() -> String {
    DEFAULT_PAYMENT_GATEWAY_URL.to_string()
}

fn default_payment_timeout_secs() -> u64 {
    15
}

fn default_payment_description() -> String {
    DEFAULT_PAYMENT_DESCRIPTION.to_string()
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_recent_orders() -> u64 {
    3
}

fn default_orders_page_size() -> u64 {
    5
}

fn default_frontend_base_url() -> String {
    DEFAULT_FRONTEND_BASE_URL.to_string()
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

fn validate_currency(code: &str) -> Result<(), ValidationError> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("currency");
        err.message = Some("Must be a three-letter upper-case ISO 4217 code".into());
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

    let default_directive = format!("powerpet_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
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

    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

/// Same as [`load_config`] but reads files from `config_dir`.
pub fn load_config_from(config_dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    let config = Config::builder()
        .set_default("database_url", "sqlite://powerpet.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&config_dir.join("default").to_string_lossy()).required(false))
        .add_source(File::with_name(&config_dir.join(run_env).to_string_lossy()).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_dir(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    #[test]
    fn defaults_apply_without_files() {
        let dir = config_dir(&[]);
        let cfg = load_config_from(dir.path(), "test").unwrap();
        assert_eq!(cfg.currency, "USD");
        assert_eq!(cfg.recent_orders_default, 3);
        assert_eq!(cfg.orders_page_size, 5);
        assert_eq!(cfg.payment_description, "Charge from Pet Power Pro");
        assert_eq!(cfg.environment, "test");
    }

    #[test]
    fn environment_file_overrides_default_file() {
        let dir = config_dir(&[
            ("default.toml", "payment_timeout_secs = 20\nport = 9000\n"),
            ("staging.toml", "port = 9100\n"),
        ]);
        let cfg = load_config_from(dir.path(), "staging").unwrap();
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.payment_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn payment_timeout_out_of_range_is_rejected() {
        let dir = config_dir(&[("default.toml", "payment_timeout_secs = 0\n")]);
        let result = load_config_from(dir.path(), "test");
        match result {
            Err(AppConfigError::Validation(errors)) => {
                assert!(errors.field_errors().contains_key("payment_timeout_secs"))
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn production_requires_payment_secret() {
        let mut cfg = AppConfig::new("sqlite::memory:".into(), "production".into());
        assert!(cfg.validate_additional_constraints().is_err());
        cfg.payment_secret_key = Some("sk_live_123".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn lowercase_currency_is_invalid() {
        let mut cfg = AppConfig::new("sqlite::memory:".into(), "development".into());
        cfg.currency = "usd".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn cors_origins_are_split_and_trimmed() {
        let mut cfg = AppConfig::new("sqlite::memory:".into(), "development".into());
        cfg.cors_allowed_origins = Some("https://a.test, https://b.test,".into());
        assert_eq!(cfg.cors_origins(), vec!["https://a.test", "https://b.test"]);
    }
}
