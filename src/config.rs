//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AppError;

/// Main configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub instance: InstanceConfig,
    pub http: HttpConfig,
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub actor: ActorConfig,
    pub logging: LoggingConfig,
}

/// Local instance identity
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
    /// Public site URL (e.g., "https://social.example.com")
    pub base_url: String,
    /// User-Agent sent with every federation request
    pub user_agent: String,
}

impl InstanceConfig {
    /// Key ID published for a local actor
    ///
    /// # Returns
    /// URL like "https://social.example.com/users/<id>#main-key"
    pub fn key_id_for(&self, actor_id: &str) -> String {
        format!(
            "{}/users/{}#main-key",
            self.base_url.trim_end_matches('/'),
            actor_id
        )
    }
}

/// Outbound HTTP settings
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Deadline for a whole request/response exchange
    pub timeout_seconds: u64,
    /// Largest response body accepted from a peer
    pub max_response_bytes: usize,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Delivery settings
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Parallel deliveries for one fan-out
    pub max_concurrency: usize,
    /// Surface non-2xx inbox responses as errors instead of only logging them
    pub strict_status: bool,
}

/// Local actor used by the command line tool
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ActorConfig {
    /// Actor identifier (path segment under /users/)
    pub id: Option<String>,
    /// PEM file holding the actor's RSA private key
    pub private_key_path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Default `EnvFilter` directive for this crate's events
    pub fn filter_directive(&self) -> String {
        format!("fedsign={}", self.level.to_ascii_lowercase())
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (FEDSIGN__*)
    pub fn load() -> Result<Self, AppError> {
        Self::load_with_file(None)
    }

    /// Same as [`AppConfig::load`], with an extra explicit file layered
    /// between the config/ directory files and the environment.
    pub fn load_with_file(path: Option<&Path>) -> Result<Self, AppError> {
        use config::{Config, Environment, File};

        let mut builder = Config::builder()
            .set_default("instance.user_agent", default_user_agent())?
            .set_default("http.timeout_seconds", 10)?
            .set_default("http.max_response_bytes", 10 * 1024 * 1024)?
            .set_default("delivery.max_concurrency", 10)?
            .set_default("delivery.strict_status", false)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("FEDSIGN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: Self = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), AppError> {
        let base = url::Url::parse(&self.instance.base_url)
            .map_err(|e| AppError::Config(format!("instance.base_url is invalid: {}", e)))?;

        if !matches!(base.scheme(), "http" | "https") || base.host_str().is_none() {
            return Err(AppError::Config(
                "instance.base_url must be an http(s) URL with a host".to_string(),
            ));
        }

        if self.instance.user_agent.trim().is_empty() {
            return Err(AppError::Config(
                "instance.user_agent must not be empty".to_string(),
            ));
        }

        if self.http.timeout_seconds == 0 {
            return Err(AppError::Config(
                "http.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if !matches!(
            self.logging.level.to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(AppError::Config(format!(
                "logging.level must be one of trace, debug, info, warn, error (got {})",
                self.logging.level
            )));
        }

        if !matches!(
            self.logging.format.to_ascii_lowercase().as_str(),
            "pretty" | "json"
        ) {
            return Err(AppError::Config(format!(
                "logging.format must be \"pretty\" or \"json\" (got {})",
                self.logging.format
            )));
        }

        if self.delivery.max_concurrency == 0 {
            return Err(AppError::Config(
                "delivery.max_concurrency must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn default_user_agent() -> String {
    format!("fedsign/{}", env!("CARGO_PKG_VERSION"))
}
