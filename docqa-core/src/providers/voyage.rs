//! Voyage AI provider implementation (embeddings and reranking).
//!
//! Implements the `Embedder` and `Reranker` ports over the Voyage REST
//! API. Both clients share the same auth scheme (Bearer token) and error
//! mapping; the embedder additionally batches oversized inputs to stay
//! within the provider's per-request limit.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::{EmbeddingConfig, RerankConfig};
use crate::error::ServiceError;
use crate::ports::{EmbedInput, Embedder, Reranker};
use crate::providers::resolve_api_key;
use crate::types::{RerankedCandidate, ScoredChunk};

/// The default Voyage AI API base URL.
const DEFAULT_BASE_URL: &str = "https://api.voyageai.com/v1";

fn build_client(timeout_secs: u64) -> Result<Client, ServiceError> {
    Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()
        .map_err(|e| ServiceError::Connection {
            message: format!("Failed to build HTTP client: {e}"),
        })
}

fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> ServiceError {
    match status.as_u16() {
        401 | 403 => ServiceError::AuthFailed {
            provider: "Voyage".to_string(),
        },
        429 => ServiceError::RateLimited {
            retry_after_secs: 30,
        },
        _ => ServiceError::ApiRequest {
            message: format!("HTTP {status} from Voyage API: {body_text}"),
        },
    }
}

fn map_request_error(e: reqwest::Error, timeout_secs: u64) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Timeout { timeout_secs }
    } else if e.is_connect() {
        ServiceError::Connection {
            message: format!("Connection to Voyage API failed: {e}"),
        }
    } else {
        ServiceError::ApiRequest {
            message: format!("Request to Voyage API failed: {e}"),
        }
    }
}

/// Voyage AI embedding client.
pub struct VoyageEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
    batch_size: usize,
    timeout_secs: u64,
}

impl VoyageEmbedder {
    /// Create a new embedder from configuration.
    ///
    /// Reads the API key from the environment variable named in
    /// `config.api_key_env`; fails with `AuthFailed` if it is not set.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ServiceError> {
        let api_key = resolve_api_key(&config.api_key_env, "Voyage")?;
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model: config.model.clone(),
            dimensions: config.dimensions,
            batch_size: config.batch_size.max(1),
            timeout_secs: config.timeout_secs,
        })
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        input: EmbedInput,
    ) -> Result<Vec<Vec<f32>>, ServiceError> {
        let input_type = match input {
            EmbedInput::Document => "document",
            EmbedInput::Query => "query",
        };
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
            "input_type": input_type,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_request_error(e, self.timeout_secs))?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| ServiceError::ResponseParse {
                message: format!("Failed to read response body: {e}"),
            })?;
        if !status.is_success() {
            return Err(map_http_error(status, &body_text));
        }

        let json: Value =
            serde_json::from_str(&body_text).map_err(|e| ServiceError::ResponseParse {
                message: format!("Invalid JSON in response: {e}"),
            })?;
        Self::parse_embeddings(&json, texts.len(), self.dimensions)
    }

    /// Extract embeddings from an `/embeddings` response.
    ///
    /// The API tags each vector with its input index; reassemble in input
    /// order rather than trusting response order. A non-numeric component
    /// or a wrong-dimension vector is a parse error, never a short vector.
    fn parse_embeddings(
        json: &Value,
        expected_count: usize,
        dimensions: usize,
    ) -> Result<Vec<Vec<f32>>, ServiceError> {
        let data = json["data"]
            .as_array()
            .ok_or_else(|| ServiceError::ResponseParse {
                message: "Missing 'data' array in embeddings response".to_string(),
            })?;
        if data.len() != expected_count {
            return Err(ServiceError::ResponseParse {
                message: format!("Expected {expected_count} embeddings, got {}", data.len()),
            });
        }

        let mut vectors: Vec<Vec<f32>> = vec![Vec::new(); expected_count];
        for entry in data {
            let index =
                entry["index"]
                    .as_u64()
                    .ok_or_else(|| ServiceError::ResponseParse {
                        message: "Embedding entry missing 'index'".to_string(),
                    })? as usize;
            let components = entry["embedding"]
                .as_array()
                .ok_or_else(|| ServiceError::ResponseParse {
                    message: "Embedding entry missing 'embedding'".to_string(),
                })?;
            let mut vector = Vec::with_capacity(components.len());
            for component in components {
                let value = component
                    .as_f64()
                    .ok_or_else(|| ServiceError::ResponseParse {
                        message: format!("Non-numeric embedding component at index {index}"),
                    })?;
                vector.push(value as f32);
            }
            if vector.len() != dimensions {
                return Err(ServiceError::ResponseParse {
                    message: format!(
                        "Expected {dimensions}-dimensional embedding, got {} at index {index}",
                        vector.len()
                    ),
                });
            }
            if index >= vectors.len() {
                return Err(ServiceError::ResponseParse {
                    message: format!("Embedding index {index} out of range"),
                });
            }
            vectors[index] = vector;
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for VoyageEmbedder {
    async fn embed(
        &self,
        texts: &[String],
        input: EmbedInput,
    ) -> Result<Vec<Vec<f32>>, ServiceError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let vectors = self.embed_batch(batch, input).await?;
            all.extend(vectors);
        }
        debug!(
            count = all.len(),
            model = self.model.as_str(),
            "Generated embeddings"
        );
        Ok(all)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "voyage"
    }
}

/// Voyage AI reranking client.
pub struct VoyageReranker {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl VoyageReranker {
    pub fn new(config: &RerankConfig) -> Result<Self, ServiceError> {
        let api_key = resolve_api_key(&config.api_key_env, "Voyage")?;
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl Reranker for VoyageReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[ScoredChunk],
        top_k: usize,
    ) -> Result<Vec<RerankedCandidate>, ServiceError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let top_k = top_k.min(candidates.len());

        let documents: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
        let body = serde_json::json!({
            "model": self.model,
            "query": query,
            "documents": documents,
            "top_k": top_k,
        });

        let response = self
            .client
            .post(format!("{}/rerank", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_request_error(e, self.timeout_secs))?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| ServiceError::ResponseParse {
                message: format!("Failed to read response body: {e}"),
            })?;
        if !status.is_success() {
            return Err(map_http_error(status, &body_text));
        }

        let json: Value =
            serde_json::from_str(&body_text).map_err(|e| ServiceError::ResponseParse {
                message: format!("Invalid JSON in response: {e}"),
            })?;

        let data = json["data"]
            .as_array()
            .ok_or_else(|| ServiceError::ResponseParse {
                message: "Missing 'data' array in rerank response".to_string(),
            })?;

        // The API returns (input index, relevance score) pairs already
        // sorted by descending score; map indices back to chunk ids.
        let mut reranked = Vec::with_capacity(data.len().min(top_k));
        for entry in data.iter().take(top_k) {
            let index =
                entry["index"]
                    .as_u64()
                    .ok_or_else(|| ServiceError::ResponseParse {
                        message: "Rerank entry missing 'index'".to_string(),
                    })? as usize;
            let score = entry["relevance_score"].as_f64().ok_or_else(|| {
                ServiceError::ResponseParse {
                    message: "Rerank entry missing 'relevance_score'".to_string(),
                }
            })? as f32;
            let candidate =
                candidates
                    .get(index)
                    .ok_or_else(|| ServiceError::ResponseParse {
                        message: format!("Rerank index {index} out of range"),
                    })?;
            reranked.push(RerankedCandidate {
                chunk_id: candidate.chunk_id,
                score,
            });
        }
        debug!(
            input = candidates.len(),
            output = reranked.len(),
            model = self.model.as_str(),
            "Reranked candidates"
        );
        Ok(reranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_embeddings_reassembles_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.5, 0.5] },
                { "index": 0, "embedding": [1.0, 0.0] },
            ]
        });
        let vectors = VoyageEmbedder::parse_embeddings(&json, 2, 2).unwrap();
        assert_eq!(vectors[0], vec![1.0, 0.0]);
        assert_eq!(vectors[1], vec![0.5, 0.5]);
    }

    #[test]
    fn test_parse_embeddings_rejects_non_numeric_component() {
        let json = serde_json::json!({
            "data": [
                { "index": 0, "embedding": [1.0, "oops"] },
            ]
        });
        let err = VoyageEmbedder::parse_embeddings(&json, 1, 2).unwrap_err();
        assert!(matches!(err, ServiceError::ResponseParse { .. }));
    }

    #[test]
    fn test_parse_embeddings_rejects_wrong_dimension() {
        let json = serde_json::json!({
            "data": [
                { "index": 0, "embedding": [1.0, 0.0, 0.0] },
            ]
        });
        let err = VoyageEmbedder::parse_embeddings(&json, 1, 2).unwrap_err();
        assert!(matches!(err, ServiceError::ResponseParse { .. }));
    }

    #[test]
    fn test_parse_embeddings_rejects_count_mismatch() {
        let json = serde_json::json!({
            "data": [
                { "index": 0, "embedding": [1.0, 0.0] },
            ]
        });
        let err = VoyageEmbedder::parse_embeddings(&json, 2, 2).unwrap_err();
        assert!(matches!(err, ServiceError::ResponseParse { .. }));
    }
}
