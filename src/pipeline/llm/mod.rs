pub mod gemini;
pub mod gemini_types;

pub use gemini::*;

use base64::Engine as _;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Could not reach the model API at {0}")]
    Connection(String),

    #[error("Model API request timed out after {0}s")]
    Timeout(u64),

    #[error("Model API returned error (status {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Model returned no text")]
    EmptyResponse,

    #[error("Invalid image payload: {0}")]
    InvalidImage(String),
}

impl LlmError {
    /// Transport failures that a later attempt may not hit.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }
}

/// Base64 image sent alongside a prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub mime_type: String,
    /// Base64 payload, no `data:` prefix.
    pub data: String,
}

impl InlineImage {
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    /// Split `data:<mime>;base64,<payload>`.
    pub fn from_data_uri(uri: &str) -> Result<Self, LlmError> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| LlmError::InvalidImage("missing data: prefix".into()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| LlmError::InvalidImage("missing payload separator".into()))?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| LlmError::InvalidImage("payload is not base64".into()))?;
        if mime_type.is_empty() || payload.is_empty() {
            return Err(LlmError::InvalidImage("empty MIME type or payload".into()));
        }
        Ok(Self {
            mime_type: mime_type.to_string(),
            data: payload.to_string(),
        })
    }
}

/// Hosted text/vision model.
pub trait LlmClient {
    /// Generate text from a prompt.
    fn generate(&self, model: &str, prompt: &str) -> Result<String, LlmError>;

    /// Generate text from a prompt plus one image.
    fn generate_with_image(
        &self,
        model: &str,
        prompt: &str,
        image: &InlineImage,
    ) -> Result<String, LlmError>;
}
