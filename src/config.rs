use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Labsight";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upload ceiling enforced before any extraction or network call.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// MIME types accepted at the upload boundary.
pub const SUPPORTED_MIME_TYPES: &[&str] = &["application/pdf", "image/jpeg", "image/png"];

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_VISION_MODEL: &str = "gemini-pro-vision";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

pub const ENV_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_API_BASE: &str = "LABSIGHT_API_BASE";
pub const ENV_TEXT_MODEL: &str = "LABSIGHT_TEXT_MODEL";
pub const ENV_VISION_MODEL: &str = "LABSIGHT_VISION_MODEL";
pub const ENV_REQUEST_TIMEOUT: &str = "LABSIGHT_REQUEST_TIMEOUT_SECS";

/// Get the application data directory
/// ~/Labsight/ on all platforms, current directory when no home is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Path of the local key-value database holding reports and preferences.
pub fn database_path() -> PathBuf {
    app_data_dir().join("labsight.db")
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "labsight=info,warn"
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("API key not configured: set {0}")]
    MissingApiKey(&'static str),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Connection settings for the hosted model API.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiSettings {
    pub api_key: String,
    pub base_url: String,
    pub text_model: String,
    pub vision_model: String,
    pub request_timeout: Duration,
}

impl ApiSettings {
    /// Read settings from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup (environment, test map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_empty(ENV_API_KEY).ok_or(ConfigError::MissingApiKey(ENV_API_KEY))?;

        let request_timeout = match non_empty(ENV_REQUEST_TIMEOUT) {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: ENV_REQUEST_TIMEOUT,
                    value: raw.clone(),
                })?;
                if secs == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_REQUEST_TIMEOUT,
                        value: raw,
                    });
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        };

        Ok(Self {
            api_key: api_key.trim().to_string(),
            base_url: non_empty(ENV_API_BASE)
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            text_model: non_empty(ENV_TEXT_MODEL).unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            vision_model: non_empty(ENV_VISION_MODEL)
                .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
            request_timeout,
        })
    }
}
