use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 100;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_RATE_LIMIT_NAMESPACE: &str = "storefront:rl";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Redis connection URL (rate limiter backend when enabled)
    pub redis_url: String,

    /// JWT secret key (minimum 64 characters)
    #[validate(length(min = 64), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// JWT expiration time in seconds
    pub jwt_expiration: usize,

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

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Rate limiting: requests per window
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests_per_window: u32,
    /// Rate limiting: window size (seconds)
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_seconds: u64,
    /// Rate limiting: include X-RateLimit-* headers on responses
    #[serde(default = "default_true_bool")]
    pub rate_limit_enable_headers: bool,
    /// Enable Redis-backed rate limiter
    #[serde(default)]
    pub rate_limit_use_redis: bool,
    /// Namespace for rate limiter keys when Redis is enabled
    #[serde(default = "default_rate_limit_namespace")]
    pub rate_limit_namespace: String,

    /// Razorpay API key id (public half of the basic-auth pair)
    #[serde(default)]
    pub razorpay_key_id: Option<String>,

    /// Razorpay API key secret; also the HMAC key for checkout signatures
    #[serde(default)]
    pub razorpay_key_secret: Option<String>,

    /// Razorpay webhook signing secret
    #[serde(default)]
    pub razorpay_webhook_secret: Option<String>,

    /// Base URL for the Razorpay REST API
    #[serde(default = "default_razorpay_base_url")]
    pub razorpay_base_url: String,

    /// Default currency code for orders
    #[serde(default = "default_currency")]
    pub default_currency: String,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl AppConfig {
    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
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

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
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

fn default_rate_limit_requests() -> u32 {
    DEFAULT_RATE_LIMIT_REQUESTS
}
fn default_rate_limit_window_secs() -> u64 {
    DEFAULT_RATE_LIMIT_WINDOW_SECS
}
fn default_rate_limit_namespace() -> String {
    DEFAULT_RATE_LIMIT_NAMESPACE.to_string()
}
fn default_true_bool() -> bool {
    true
}

fn default_razorpay_base_url() -> String {
    "https://api.razorpay.com/v1".to_string()
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_event_channel_capacity() -> usize {
    1024
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

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    if trimmed.len() < 64 {
        let mut err = ValidationError::new("jwt_secret");
        err.message =
            Some("JWT secret must be at least 64 characters for adequate security".into());
        return Err(err);
    }

    // Reject trivially weak secrets
    if let Some(first) = trimmed.chars().next() {
        if trimmed.chars().all(|c| c == first) {
            let mut err = ValidationError::new("jwt_secret");
            err.message = Some("JWT secret cannot be a repeated character sequence".into());
            return Err(err);
        }
    }

    let lower = trimmed.to_ascii_lowercase();
    let weak_fragments = ["changeme", "password", "default", "12345", "abcdef"];
    if weak_fragments.iter().any(|pattern| lower.contains(pattern)) {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some(
            "JWT secret appears to be weak; use a cryptographically strong random string".into(),
        );
        return Err(err);
    }

    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
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

    // NOTE: jwt_secret has no default - it MUST be provided via environment
    // variable or config file.
    let builder = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("redis_url", "redis://localhost:6379")?
        .set_default("jwt_expiration", 3600)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET environment variable with a secure random string (minimum 64 characters).");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

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

    #[test]
    fn short_jwt_secret_is_rejected() {
        assert!(validate_jwt_secret("short").is_err());
    }

    #[test]
    fn repeated_character_secret_is_rejected() {
        let secret = "a".repeat(80);
        assert!(validate_jwt_secret(&secret).is_err());
    }

    #[test]
    fn strong_secret_passes() {
        let secret = "kX9mQ2vL7pR4tW8yB3nE6hJ1uS5aD0gF_kX9mQ2vL7pR4tW8yB3nE6hJ1uS5aD0gF";
        assert!(validate_jwt_secret(secret).is_ok());
    }

    #[test]
    fn log_level_validation() {
        assert!(validate_log_level("info").is_ok());
        assert!(validate_log_level("INFO").is_ok());
        assert!(validate_log_level("verbose").is_err());
    }
}
