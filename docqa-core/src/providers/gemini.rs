//! Google Gemini API client for answer generation.
//!
//! Implements the `LlmClient` port against the `generateContent` endpoint.
//! Auth is via the `?key=` query parameter. Only plain text completion is
//! needed here; context construction and citation handling live in the
//! `synthesis` module.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::ServiceError;
use crate::ports::LlmClient;
use crate::providers::resolve_api_key;

/// The default Google Gemini API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini completion client.
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_output_tokens: usize,
    temperature: f32,
    timeout_secs: u64,
}

impl GeminiClient {
    /// Create a new client from configuration.
    ///
    /// Reads the API key from the environment variable named in
    /// `config.api_key_env`; fails with `AuthFailed` if it is not set.
    pub fn new(config: &LlmConfig) -> Result<Self, ServiceError> {
        let api_key = resolve_api_key(&config.api_key_env, "Gemini")?;
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ServiceError::Connection {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model: config.model.clone(),
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
        })
    }

    fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> ServiceError {
        match status.as_u16() {
            401 | 403 => ServiceError::AuthFailed {
                provider: "Gemini".to_string(),
            },
            429 => ServiceError::RateLimited {
                retry_after_secs: 30,
            },
            _ => ServiceError::ApiRequest {
                message: format!("HTTP {status} from Gemini API: {body_text}"),
            },
        }
    }

    /// Extract the generated text from a `generateContent` response.
    fn parse_response(body: &Value) -> Result<String, ServiceError> {
        let parts = body["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| ServiceError::ResponseParse {
                message: "No candidates in Gemini response".to_string(),
            })?;
        let text: String = parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join("");
        if text.is_empty() {
            return Err(ServiceError::ResponseParse {
                message: "Empty completion in Gemini response".to_string(),
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }],
            }],
            "generationConfig": {
                "maxOutputTokens": self.max_output_tokens,
                "temperature": self.temperature,
            },
        });

        debug!(model = self.model.as_str(), "Sending Gemini completion request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::Timeout {
                        timeout_secs: self.timeout_secs,
                    }
                } else if e.is_connect() {
                    ServiceError::Connection {
                        message: format!("Connection to Gemini API failed: {e}"),
                    }
                } else {
                    ServiceError::ApiRequest {
                        message: format!("Request to Gemini API failed: {e}"),
                    }
                }
            })?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| ServiceError::ResponseParse {
                message: format!("Failed to read response body: {e}"),
            })?;
        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text));
        }

        let json: Value =
            serde_json::from_str(&body_text).map_err(|e| ServiceError::ResponseParse {
                message: format!("Invalid JSON in response: {e}"),
            })?;
        Self::parse_response(&json)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_joins_parts() {
        let body = serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "The answer " },
                        { "text": "is 42. [S1]" }
                    ]
                }
            }]
        });
        let text = GeminiClient::parse_response(&body).unwrap();
        assert_eq!(text, "The answer is 42. [S1]");
    }

    #[test]
    fn test_parse_response_missing_candidates() {
        let body = serde_json::json!({ "candidates": [] });
        assert!(GeminiClient::parse_response(&body).is_err());
    }
}
