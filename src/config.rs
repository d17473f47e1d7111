use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_LLM_MODEL: &str = "gemini-pro-latest";
const DEFAULT_LLM_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Legacy variable still honoured when `APP__LLM__API_KEY` is not set
const LEGACY_API_KEY_VAR: &str = "GOOGLE_AI_API_KEY";

/// Hosted language model settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// API key; when absent the assistant answers with the rule-based responder only
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model identifier, e.g. "gemini-pro-latest"
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Models tried in order when the API reports `model` as unknown
    #[serde(default = "default_llm_fallback_models")]
    pub fallback_models: Vec<String>,

    /// Base URL of the generative language API
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Upper bound on generated tokens
    #[serde(default = "default_max_output_tokens")]
    #[validate(range(min = 1, max = 8192))]
    pub max_output_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// HTTP timeout for a single generation call
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_llm_model(),
            fallback_models: default_llm_fallback_models(),
            base_url: default_llm_base_url(),
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    /// Configured key, ignoring blank values
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// Tunables of the assistant's canned reports and fallback rules
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AssistantConfig {
    /// Prior exchanges embedded as conversation context
    #[serde(default = "default_history_limit")]
    pub history_limit: u64,

    /// Exchanges returned by the history endpoint
    #[serde(default = "default_history_page_size")]
    pub history_page_size: u64,

    /// Affordability threshold used by the budget rule (guaraníes)
    #[serde(default = "default_budget_threshold")]
    pub budget_threshold: i64,

    /// Stock level at or below which an available product counts as low stock
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: i32,

    /// Default size of the top-products report
    #[serde(default = "default_top_products_limit")]
    #[validate(range(min = 1))]
    pub top_products_limit: u64,

    /// Window of the sales charts
    #[serde(default = "default_chart_window_days")]
    #[validate(range(min = 1, max = 365))]
    pub chart_window_days: u32,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            history_page_size: default_history_page_size(),
            budget_threshold: default_budget_threshold(),
            low_stock_threshold: default_low_stock_threshold(),
            top_products_limit: default_top_products_limit(),
            chart_window_days: default_chart_window_days(),
        }
    }
}

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

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// Trust `x-user-id` set by an authenticating reverse proxy
    #[serde(default)]
    pub trust_forwarded_user: bool,

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

    /// Language model settings
    #[serde(default)]
    #[validate]
    pub llm: LlmConfig,

    /// Assistant behaviour
    #[serde(default)]
    #[validate]
    pub assistant: AssistantConfig,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            trust_forwarded_user: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            llm: LlmConfig::default(),
            assistant: AssistantConfig::default(),
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        let temperature = self.llm.temperature;
        if !temperature.is_finite() || !(0.0..=2.0).contains(&temperature) {
            let mut err = ValidationError::new("temperature");
            err.message = Some("llm.temperature must be between 0.0 and 2.0".into());
            errors.add("llm", err);
        }

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_pool_bounds");
            err.message = Some("db_min_connections cannot exceed db_max_connections".into());
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

fn default_llm_model() -> String {
    DEFAULT_LLM_MODEL.to_string()
}

fn default_llm_fallback_models() -> Vec<String> {
    vec!["gemini-pro".to_string()]
}

fn default_llm_base_url() -> String {
    DEFAULT_LLM_BASE_URL.to_string()
}

fn default_max_output_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_llm_timeout_secs() -> u64 {
    30
}

fn default_history_limit() -> u64 {
    10
}

fn default_history_page_size() -> u64 {
    20
}

fn default_budget_threshold() -> i64 {
    200_000
}

fn default_low_stock_threshold() -> i32 {
    10
}

fn default_top_products_limit() -> u64 {
    10
}

fn default_chart_window_days() -> u32 {
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


/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_assistant={},tower_http=debug", level);
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

    let config = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let mut app_config: AppConfig = config.try_deserialize()?;

    if app_config.llm.api_key().is_none() {
        app_config.llm.api_key = env::var(LEGACY_API_KEY_VAR)
            .ok()
            .filter(|key| !key.trim().is_empty());
    }
    app_config.validate().map_err(AppConfigError::Validation)?;
    app_config
        .validate_additional_constraints()
        .map_err(AppConfigError::Validation)?;
    Ok(app_config)
}

/// Reports how the configuration was assembled. Call after [`init_tracing`],
/// since `load_config` runs before any subscriber exists.
pub fn log_startup(cfg: &AppConfig) {
    info!(environment = %cfg.environment, "Configuration loaded");
    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }
    if cfg.llm.api_key().is_none() {
        warn!("No language model API key configured; chat runs in fallback-only mode");
    }
}
