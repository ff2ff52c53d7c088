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
const DEFAULT_STORE_NAME: &str = "Storefront";
const DEFAULT_ATTRIBUTE_KEYWORD: &str = "roblox";
const DEFAULT_PRIMARY_CURRENCY: &str = "GBP";
const DEFAULT_SECONDARY_CURRENCY: &str = "USD";
const DEFAULT_EXCHANGE_RATE: f64 = 1.27;
const DEFAULT_OUTBOUND_TIMEOUT_SECS: u64 = 10;

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
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Display name used in page titles and channel messages
    #[serde(default = "default_store_name")]
    pub store_name: String,

    /// Secret key for deriving order access tokens
    #[validate(length(min = 16))]
    pub receipt_secret: String,

    /// Keyword searched (case-insensitively) in buyer-supplied attribute labels
    #[serde(default = "default_attribute_keyword")]
    #[validate(length(min = 1))]
    pub attribute_keyword: String,

    /// Currency assumed when the payload carries none
    #[serde(default = "default_primary_currency")]
    pub primary_currency: String,

    /// Currency of the estimated secondary total
    #[serde(default = "default_secondary_currency")]
    pub secondary_currency: String,

    /// Approximate primary -> secondary rate used when the payload has no rate.
    /// This is a fixed estimate, not a live conversion.
    #[serde(default = "default_exchange_rate")]
    #[validate(custom = "validate_exchange_rate")]
    pub exchange_rate: f64,

    /// Discord bot token used for channel posts and role grants
    #[serde(default)]
    pub discord_bot_token: Option<String>,

    /// Channel receiving new-order summaries
    #[serde(default)]
    pub order_channel_id: Option<String>,

    /// Channel receiving staff notices (falls back to the order channel)
    #[serde(default)]
    pub staff_channel_id: Option<String>,

    /// Guild in which buyers are granted a role
    #[serde(default)]
    pub discord_guild_id: Option<String>,

    /// Role granted to buyers with a linked platform account
    #[serde(default)]
    pub buyer_role_id: Option<String>,

    /// Invite link shown on the receipt page
    #[serde(default)]
    pub community_invite_url: Option<String>,

    /// External support-ticket API endpoint
    #[serde(default)]
    pub ticket_api_url: Option<String>,

    /// Credential for the support-ticket API
    #[serde(default)]
    pub ticket_api_key: Option<String>,

    /// Shared credential required to join a chat as staff
    #[serde(default)]
    pub staff_chat_key: Option<String>,

    /// Timeout for outbound REST calls (seconds)
    #[serde(default = "default_outbound_timeout_secs")]
    pub outbound_timeout_secs: u64,
}

impl AppConfig {
    /// Builds a configuration with defaults for every optional key.
    pub fn new(receipt_secret: impl Into<String>) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            environment: DEFAULT_ENV.to_string(),
            log_level: default_log_level(),
            log_json: false,
            store_name: default_store_name(),
            receipt_secret: receipt_secret.into(),
            attribute_keyword: default_attribute_keyword(),
            primary_currency: default_primary_currency(),
            secondary_currency: default_secondary_currency(),
            exchange_rate: DEFAULT_EXCHANGE_RATE,
            discord_bot_token: None,
            order_channel_id: None,
            staff_channel_id: None,
            discord_guild_id: None,
            buyer_role_id: None,
            community_invite_url: None,
            ticket_api_url: None,
            ticket_api_key: None,
            staff_chat_key: None,
            outbound_timeout_secs: DEFAULT_OUTBOUND_TIMEOUT_SECS,
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Channel for staff notices, falling back to the order channel.
    pub fn staff_channel(&self) -> Option<&str> {
        self.staff_channel_id
            .as_deref()
            .or(self.order_channel_id.as_deref())
    }

    pub fn outbound_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.outbound_timeout_secs)
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_store_name() -> String {
    DEFAULT_STORE_NAME.to_string()
}

fn default_attribute_keyword() -> String {
    DEFAULT_ATTRIBUTE_KEYWORD.to_string()
}

fn default_primary_currency() -> String {
    DEFAULT_PRIMARY_CURRENCY.to_string()
}

fn default_secondary_currency() -> String {
    DEFAULT_SECONDARY_CURRENCY.to_string()
}

fn default_exchange_rate() -> f64 {
    DEFAULT_EXCHANGE_RATE
}

fn default_outbound_timeout_secs() -> u64 {
    DEFAULT_OUTBOUND_TIMEOUT_SECS
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

fn validate_exchange_rate(rate: f64) -> Result<(), ValidationError> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        let mut err = ValidationError::new("exchange_rate");
        err.message = Some("Exchange rate must be a positive number".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("order_receipts={},tower_http=debug", level);
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

    // receipt_secret has no default: links must not be derivable from a public value.
    let config = Config::builder()
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("receipt_secret").is_err() {
        error!("Receipt secret is not configured. Set APP__RECEIPT_SECRET to a random string (minimum 16 characters).");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "receipt_secret is required but not configured. Set APP__RECEIPT_SECRET.".into(),
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
