use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub gemini_api_key: String,
    pub live_model: String,
    pub voice_name: String,
    pub board_base_url: String,
    pub system_prompt_path: Option<PathBuf>,
    /// Upstream handshakes routinely take tens of seconds on cold starts,
    /// so this is far longer than a typical connect timeout.
    pub upstream_open_timeout: Duration,
    pub session_ttl: Duration,
    pub sweep_interval: Duration,
    pub context_summary_limit: usize,
    pub log_level: Level,
}

fn parse_secs(var: &str, default: u64) -> Result<Duration, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidValue(var.to_string(), e.to_string())),
        Err(_) => Ok(Duration::from_secs(default)),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;

        let live_model = std::env::var("LIVE_MODEL")
            .unwrap_or_else(|_| "models/gemini-2.5-flash-native-audio-preview-12-2025".to_string());
        let voice_name = std::env::var("VOICE_NAME").unwrap_or_else(|_| "Charon".to_string());

        let board_base_url = std::env::var("BOARD_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8001".to_string());

        let system_prompt_path = std::env::var("SYSTEM_PROMPT_PATH").ok().map(PathBuf::from);

        let upstream_open_timeout = parse_secs("UPSTREAM_OPEN_TIMEOUT_SECS", 120)?;
        let session_ttl = parse_secs("SESSION_TTL_SECS", 300)?;
        let sweep_interval = parse_secs("SWEEP_INTERVAL_SECS", 60)?;

        let context_summary_limit = match std::env::var("CONTEXT_SUMMARY_LIMIT") {
            Ok(raw) => raw.parse::<usize>().map_err(|e| {
                ConfigError::InvalidValue("CONTEXT_SUMMARY_LIMIT".to_string(), e.to_string())
            })?,
            Err(_) => 1000,
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            gemini_api_key,
            live_model,
            voice_name,
            board_base_url,
            system_prompt_path,
            upstream_open_timeout,
            session_ttl,
            sweep_interval,
            context_summary_limit,
            log_level,
        })
    }

    /// A fixed configuration for tests, independent of the environment.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            gemini_api_key: "test-key".to_string(),
            live_model: "models/test".to_string(),
            voice_name: "Charon".to_string(),
            board_base_url: "http://localhost:0".to_string(),
            system_prompt_path: None,
            upstream_open_timeout: Duration::from_millis(100),
            session_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            context_summary_limit: 1000,
            log_level: Level::INFO,
        }
    }
}
