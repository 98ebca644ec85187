//! Google Gemini API client implementation
//!
//! Implements the LlmClient trait for the `generateContent` REST endpoint.
//! Every HTTP or transport failure is mapped onto an [`LlmError`] kind so the
//! retry layer can decide what to do with it.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{GenerationOptions, LlmClient, LlmError};
use crate::config::ResolvedLlmConfig;

/// Gemini API client
pub struct GeminiClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    timeout: Duration,
}

impl GeminiClient {
    /// Create a new client from resolved configuration
    pub fn from_config(config: &ResolvedLlmConfig) -> Result<Self, LlmError> {
        debug!(provider = %config.provider, model = %config.model, "from_config: called");
        if config.api_key.is_empty() {
            return Err(LlmError::Fatal("API key is empty".to_string()));
        }

        let timeout = Duration::from_millis(config.timeout_ms);
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Fatal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            timeout,
        })
    }

    /// Endpoint for a single non-streaming generation
    fn api_url(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    /// Build the request body for the Gemini API
    fn build_request_body(&self, prompt: &str, options: &GenerationOptions) -> serde_json::Value {
        debug!(%self.model, prompt_len = prompt.len(), "build_request_body: called");
        serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }],
            }],
            "generationConfig": options,
        })
    }

    /// Map a transport-level failure to an error kind
    fn classify_transport(&self, err: reqwest::Error) -> LlmError {
        debug!(error = %err, "classify_transport: called");
        if err.is_timeout() {
            debug!("classify_transport: timeout");
            LlmError::Timeout(format!("no response within {:?}", self.timeout))
        } else if err.is_connect() {
            debug!("classify_transport: connect failure");
            LlmError::ServiceUnavailable(err.to_string())
        } else if err.is_builder() {
            debug!("classify_transport: request could not be built");
            LlmError::Fatal(err.to_string())
        } else {
            debug!("classify_transport: other transport error");
            LlmError::ServiceUnavailable(err.to_string())
        }
    }
}

/// Extract the generated text from a raw response body
fn parse_response(body: &str) -> Result<String, LlmError> {
    debug!(body_len = body.len(), "parse_response: called");
    let response: GeminiResponse =
        serde_json::from_str(body).map_err(|e| LlmError::InvalidResponse(format!("undecodable body: {}", e)))?;

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        debug!(%reason, "parse_response: prompt blocked");
        return Err(LlmError::InvalidResponse(format!("prompt blocked: {}", reason)));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("response has no candidates".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        debug!(finish_reason = ?candidate.finish_reason, "parse_response: empty text");
        return Err(LlmError::InvalidResponse(format!(
            "empty response (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(text)
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn invoke(&self, prompt: &str, options: &GenerationOptions) -> Result<String, LlmError> {
        debug!(%self.model, max_output_tokens = options.max_output_tokens, "invoke: called");
        let body = self.build_request_body(prompt, options);

        let response = self
            .http
            .post(self.api_url())
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify_transport(e))?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| self.classify_transport(e))?;

        if !(200..300).contains(&status) {
            debug!(%status, "invoke: API error");
            return Err(LlmError::from_status(status, text));
        }

        debug!("invoke: success");
        parse_response(&text)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// Gemini API response types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}
