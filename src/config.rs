use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// HS256 secret shared with the token-minting service
    pub auth_jwt_secret: Option<String>,

    /// Read-only connection string for the canonical score ledger
    pub score_db_url: Option<String>,

    /// Base URL of the session service (round/phase metadata)
    pub session_service_url: Option<String>,

    /// Countdown tick cadence in milliseconds
    #[serde(default = "default_timer_tick_ms")]
    pub timer_tick_ms: u64,

    /// Presence/score heartbeat cadence in milliseconds
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// TTL of the cooldown lock acquired after every accepted buzz
    #[serde(default = "default_buzz_cooldown_ms")]
    pub buzz_cooldown_ms: u64,

    /// Minimum approved/connected protected displays before a presenter
    /// may start publishing
    #[serde(default = "default_protected_display_min")]
    pub protected_display_min: usize,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        // Load from environment variables using envy
        match envy::from_env::<Config>() {
            Ok(config) => {
                info!("Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            cors_origins: None,
            log_level: default_log_level(),
            service_name: default_service_name(),
            auth_jwt_secret: None,
            score_db_url: None,
            session_service_url: None,
            timer_tick_ms: default_timer_tick_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            buzz_cooldown_ms: default_buzz_cooldown_ms(),
            protected_display_min: default_protected_display_min(),
        }
    }
}

/// Install the loaded configuration as the process-wide instance.
pub fn init_config(config: Config) {
    let _ = CONFIG.set(config);
}

/// Get the process-wide configuration
pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(Config::default)
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "quiz-hub".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_timer_tick_ms() -> u64 {
    100
}

fn default_heartbeat_interval_ms() -> u64 {
    5000
}

fn default_buzz_cooldown_ms() -> u64 {
    1000
}

fn default_protected_display_min() -> usize {
    2
}
