use std::sync::Mutex;

use super::gemini_types::{upstream_error_message, GeminiRequest, GeminiResponse};
use super::{InlineImage, LlmClient, LlmError};
use crate::config::ApiSettings;

/// Blocking client for the Gemini `generateContent` API.
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl GeminiClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, LlmError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| LlmError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            client,
            timeout_secs: settings.request_timeout.as_secs(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    fn send(&self, model: &str, body: &GeminiRequest<'_>) -> Result<String, LlmError> {
        let start = std::time::Instant::now();

        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    LlmError::Connection(self.base_url.clone())
                } else {
                    LlmError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let message = upstream_error_message(&body);
            tracing::warn!(model, status = status.as_u16(), "Model API request failed");
            return Err(LlmError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GeminiResponse = response
            .json()
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;

        if let Some(error) = parsed.error.as_ref() {
            return Err(LlmError::Upstream {
                status: status.as_u16(),
                message: error.message.clone(),
            });
        }

        let text = parsed
            .first_text()
            .filter(|t| !t.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)?
            .to_string();

        tracing::info!(
            model,
            elapsed_ms = %start.elapsed().as_millis(),
            response_len = text.len(),
            "Model API call complete"
        );

        Ok(text)
    }
}

impl LlmClient for GeminiClient {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        self.send(model, &GeminiRequest::text(prompt))
    }

    fn generate_with_image(
        &self,
        model: &str,
        prompt: &str,
        image: &InlineImage,
    ) -> Result<String, LlmError> {
        self.send(model, &GeminiRequest::with_image(prompt, image))
    }
}

// ── Mock for testing ──────────────────────────────────────

type VisionReply = Box<dyn Fn(&InlineImage) -> Result<String, LlmError> + Send + Sync>;

/// One recorded call to [`MockLlmClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub model: String,
    pub prompt: String,
    pub image: Option<InlineImage>,
}

/// Mock LLM client: fixed text reply, configurable vision reply, records calls.
pub struct MockLlmClient {
    text_reply: Result<String, LlmError>,
    vision_reply: VisionReply,
    calls: Mutex<Vec<MockCall>>,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            text_reply: Ok(response.to_string()),
            vision_reply: Box::new(|_| Ok("Extracted text".to_string())),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails with `error`.
    pub fn failing(error: LlmError) -> Self {
        let vision_error = error.clone();
        Self {
            text_reply: Err(error),
            vision_reply: Box::new(move |_| Err(vision_error.clone())),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_vision<F>(mut self, reply: F) -> Self
    where
        F: Fn(&InlineImage) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        self.vision_reply = Box::new(reply);
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls().len()
    }

    fn record(&self, model: &str, prompt: &str, image: Option<&InlineImage>) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(MockCall {
                model: model.to_string(),
                prompt: prompt.to_string(),
                image: image.cloned(),
            });
        }
    }
}

impl LlmClient for MockLlmClient {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        self.record(model, prompt, None);
        self.text_reply.clone()
    }

    fn generate_with_image(
        &self,
        model: &str,
        prompt: &str,
        image: &InlineImage,
    ) -> Result<String, LlmError> {
        self.record(model, prompt, Some(image));
        (self.vision_reply)(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settings(base_url: &str) -> ApiSettings {
        ApiSettings {
            api_key: "test-key".into(),
            base_url: base_url.into(),
            text_model: "gemini-2.0-flash".into(),
            vision_model: "gemini-pro-vision".into(),
            request_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn endpoint_includes_model() {
        let client = GeminiClient::new(&settings("https://example.test/")).unwrap();
        assert_eq!(
            client.endpoint("gemini-2.0-flash"),
            "https://example.test/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn unreachable_host_is_connection_error() {
        // Port 9 (discard) on localhost is closed on test machines.
        let client = GeminiClient::new(&settings("http://127.0.0.1:9")).unwrap();
        let err = client.generate("m", "hi").unwrap_err();
        assert!(
            matches!(err, LlmError::Connection(_) | LlmError::Timeout(_)),
            "got {err:?}"
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn mock_records_calls() {
        let mock = MockLlmClient::new("{}");
        mock.generate("text-model", "prompt").unwrap();
        let image = InlineImage::from_bytes("image/png", b"x");
        assert_eq!(
            mock.generate_with_image("vision-model", "read", &image).unwrap(),
            "Extracted text"
        );
        let calls = mock.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].model, "text-model");
        assert_eq!(calls[1].image.as_ref(), Some(&image));
    }

    #[test]
    fn failing_mock_fails_both_paths() {
        let mock = MockLlmClient::failing(LlmError::Timeout(5));
        assert_eq!(mock.generate("m", "p"), Err(LlmError::Timeout(5)));
        let image = InlineImage::from_bytes("image/png", b"x");
        assert_eq!(
            mock.generate_with_image("m", "p", &image),
            Err(LlmError::Timeout(5))
        );
    }
}
