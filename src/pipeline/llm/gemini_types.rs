//! Wire types for the Gemini `generateContent` endpoint.

use serde::{Deserialize, Serialize};

use super::InlineImage;

pub const TEMPERATURE: f32 = 0.1;
pub const TOP_K: u32 = 32;
pub const TOP_P: f32 = 0.95;
pub const MAX_OUTPUT_TOKENS: u32 = 8192;

const SAFETY_THRESHOLD: &str = "BLOCK_MEDIUM_AND_ABOVE";
const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Request body for `POST /v1beta/models/{model}:generateContent`
#[derive(Debug, Serialize)]
pub struct GeminiRequest<'a> {
    pub contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    pub generation_config: GeminiGenerationConfig,
    #[serde(rename = "safetySettings")]
    pub safety_settings: Vec<GeminiSafetySetting>,
}

#[derive(Debug, Serialize)]
pub struct GeminiContent<'a> {
    pub parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum GeminiPart<'a> {
    Text { text: &'a str },
    InlineData { inline_data: GeminiInlineData<'a> },
}

#[derive(Debug, Serialize)]
pub struct GeminiInlineData<'a> {
    pub mime_type: &'a str,
    pub data: &'a str,
}

#[derive(Debug, Serialize)]
pub struct GeminiGenerationConfig {
    pub temperature: f32,
    #[serde(rename = "topK")]
    pub top_k: u32,
    #[serde(rename = "topP")]
    pub top_p: f32,
    #[serde(rename = "maxOutputTokens")]
    pub max_output_tokens: u32,
}

impl Default for GeminiGenerationConfig {
    fn default() -> Self {
        Self {
            temperature: TEMPERATURE,
            top_k: TOP_K,
            top_p: TOP_P,
            max_output_tokens: MAX_OUTPUT_TOKENS,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GeminiSafetySetting {
    pub category: &'static str,
    pub threshold: &'static str,
}

fn default_safety_settings() -> Vec<GeminiSafetySetting> {
    SAFETY_CATEGORIES
        .iter()
        .map(|&category| GeminiSafetySetting {
            category,
            threshold: SAFETY_THRESHOLD,
        })
        .collect()
}

impl<'a> GeminiRequest<'a> {
    fn with_parts(parts: Vec<GeminiPart<'a>>) -> Self {
        Self {
            contents: vec![GeminiContent { parts }],
            generation_config: GeminiGenerationConfig::default(),
            safety_settings: default_safety_settings(),
        }
    }

    pub fn text(prompt: &'a str) -> Self {
        Self::with_parts(vec![GeminiPart::Text { text: prompt }])
    }

    pub fn with_image(prompt: &'a str, image: &'a InlineImage) -> Self {
        Self::with_parts(vec![
            GeminiPart::Text { text: prompt },
            GeminiPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: &image.mime_type,
                    data: &image.data,
                },
            },
        ])
    }
}

#[derive(Debug, Deserialize)]
pub struct GeminiResponse {
    pub candidates: Option<Vec<GeminiCandidate>>,
    pub error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiCandidate {
    pub content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiResponseContent {
    #[serde(default)]
    pub parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiResponsePart {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiError {
    pub message: String,
}

/// Error envelope returned with non-2xx statuses.
#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: GeminiError,
}

impl GeminiResponse {
    /// `candidates[0].content.parts[0].text`
    pub fn first_text(&self) -> Option<&str> {
        self.candidates
            .as_ref()?
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .as_deref()
    }
}

/// Human-readable message from an error body: upstream `error.message`,
/// else the raw body trimmed to a sane length.
pub fn upstream_error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<GeminiErrorBody>(body) {
        return parsed.error.message;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no error details".to_string();
    }
    trimmed.chars().take(300).collect()
}
