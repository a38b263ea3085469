//! Gemini API HTTP client

use crate::error::{GeminiError, Result};
use crate::types::{ApiErrorBody, GenerateContentRequest, GenerateContentResponse, Schema};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Model used when none is configured
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Client for the Gemini `generateContent` endpoint
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    /// Create a client for the public API with the default model (60 second timeout)
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client against a custom API root (e.g. a regional proxy)
    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Use a different model
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask the model for a JSON document matching `schema`
    ///
    /// Returns the trimmed text of the first candidate. The text is not parsed
    /// here; callers own the shape of the answer.
    pub async fn generate_json(&self, prompt: &str, schema: &Schema) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = GenerateContentRequest::structured(prompt, schema);

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ApiErrorBody>().await {
                Ok(body) => body.error.message,
                Err(_) => status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string(),
            };
            warn!(status = status.as_u16(), model = %self.model, error = %message, "Gemini returned error");
            return Err(GeminiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let data: GenerateContentResponse = response.json().await?;

        if let Some(reason) = data.block_reason() {
            warn!(model = %self.model, reason, "Gemini blocked prompt");
            return Err(GeminiError::Blocked(reason.to_string()));
        }

        let text = data.text();
        let text = text.trim();
        if text.is_empty() {
            return Err(GeminiError::EmptyResponse);
        }

        debug!(model = %self.model, bytes = text.len(), "Received structured response");
        Ok(text.to_string())
    }
}
