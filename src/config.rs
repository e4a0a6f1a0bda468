use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Default Gemini model used for grounded answers.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
/// Default Gemini API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Docchat server.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key sent to the Gemini endpoints.
    pub gemini_api_key: String,
    /// Model identifier used for `generateContent`.
    pub gemini_model: String,
    /// Base URL of the Gemini API (overridable for tests and proxies).
    pub gemini_base_url: String,
    /// Directory where uploaded files are written.
    pub upload_dir: PathBuf,
    /// Directory holding the JSON record store; in-memory storage is used when absent.
    pub data_dir: Option<PathBuf>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Additional provider attempts after the first when the provider is overloaded.
    pub provider_max_retries: u32,
    /// Delay before the first retry; doubled after each further overload.
    pub provider_retry_delay: Duration,
    /// Per-request timeout applied by the HTTP client.
    pub provider_timeout: Duration,
    /// Number of earlier question/answer turns replayed into each prompt.
    pub prompt_history_turns: usize,
    /// Largest accepted upload body, in bytes.
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Ok(Self {
            gemini_api_key: optional("GEMINI_API_KEY")
                .ok_or_else(|| ConfigError::MissingVariable("GEMINI_API_KEY".into()))?,
            gemini_model: optional("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            gemini_base_url: optional("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            upload_dir: optional("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            data_dir: optional("DATA_DIR").map(PathBuf::from),
            server_port: parse_optional("SERVER_PORT", optional("SERVER_PORT"))?,
            provider_max_retries: parse_optional(
                "PROVIDER_MAX_RETRIES",
                optional("PROVIDER_MAX_RETRIES"),
            )?
            .unwrap_or(DEFAULT_MAX_RETRIES),
            provider_retry_delay: Duration::from_millis(
                parse_optional(
                    "PROVIDER_RETRY_DELAY_MS",
                    optional("PROVIDER_RETRY_DELAY_MS"),
                )?
                .unwrap_or(DEFAULT_RETRY_DELAY_MS),
            ),
            provider_timeout: Duration::from_secs(
                parse_optional("PROVIDER_TIMEOUT_SECS", optional("PROVIDER_TIMEOUT_SECS"))?
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            prompt_history_turns: parse_optional(
                "PROMPT_HISTORY_TURNS",
                optional("PROMPT_HISTORY_TURNS"),
            )?
            .unwrap_or(0),
            max_upload_bytes: parse_optional("MAX_UPLOAD_BYTES", optional("MAX_UPLOAD_BYTES"))?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        })
    }
}

fn parse_optional<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>, ConfigError> {
    value
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        model = %config.gemini_model,
        base_url = %config.gemini_base_url,
        upload_dir = %config.upload_dir.display(),
        data_dir = ?config.data_dir,
        server_port = ?config.server_port,
        max_retries = config.provider_max_retries,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
