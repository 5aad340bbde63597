//! Qdrant vector store adapter (REST API).
//!
//! Implements the `VectorIndex` port over Qdrant's HTTP API: collection
//! bootstrap with cosine distance, point upsert keyed by chunk id,
//! payload-filtered search, and filter-based cascade delete. Delete uses a
//! single filtered call so it is atomic from the caller's perspective.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::IndexConfig;
use crate::error::ServiceError;
use crate::ports::{IndexPoint, VectorIndex};
use crate::types::ScoredChunk;

/// Points per upsert request.
const UPSERT_BATCH_SIZE: usize = 100;

/// Qdrant vector store client.
pub struct QdrantIndex {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    dimensions: usize,
    timeout_secs: u64,
}

impl QdrantIndex {
    /// Create a new adapter from configuration.
    ///
    /// The API key env var is optional: a local unauthenticated Qdrant is
    /// a supported deployment.
    pub fn new(
        config: &IndexConfig,
        collection: &str,
        dimensions: usize,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ServiceError::Connection {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: std::env::var(&config.api_key_env).ok(),
            collection: collection.to_string(),
            dimensions,
            timeout_secs: config.timeout_secs,
        })
    }

    fn map_request_error(&self, e: reqwest::Error) -> ServiceError {
        if e.is_timeout() {
            ServiceError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else if e.is_connect() {
            ServiceError::Connection {
                message: format!("Connection to Qdrant failed: {e}"),
            }
        } else {
            ServiceError::ApiRequest {
                message: format!("Request to Qdrant failed: {e}"),
            }
        }
    }

    fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> ServiceError {
        match status.as_u16() {
            401 | 403 => ServiceError::AuthFailed {
                provider: "Qdrant".to_string(),
            },
            429 => ServiceError::RateLimited {
                retry_after_secs: 10,
            },
            _ => ServiceError::ApiRequest {
                message: format!("HTTP {status} from Qdrant: {body_text}"),
            },
        }
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(ref key) = self.api_key {
            builder = builder.header("api-key", key);
        }
        builder
    }

    async fn send_json(
        &self,
        method: reqwest::Method,
        url: String,
        body: Option<Value>,
    ) -> Result<Value, ServiceError> {
        let mut builder = self.request(method, url);
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

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
        serde_json::from_str(&body_text).map_err(|e| ServiceError::ResponseParse {
            message: format!("Invalid JSON in response: {e}"),
        })
    }

    fn document_filter(document_id: Uuid) -> Value {
        serde_json::json!({
            "must": [{
                "key": "document_id",
                "match": { "value": document_id.to_string() }
            }]
        })
    }

    /// Count the points stored for a document (exact).
    async fn count_document(&self, document_id: Uuid) -> Result<usize, ServiceError> {
        let json = self
            .send_json(
                reqwest::Method::POST,
                format!("{}/collections/{}/points/count", self.base_url, self.collection),
                Some(serde_json::json!({
                    "filter": Self::document_filter(document_id),
                    "exact": true,
                })),
            )
            .await?;
        Ok(json["result"]["count"].as_u64().unwrap_or(0) as usize)
    }

    fn parse_scored_chunk(point: &Value) -> Option<ScoredChunk> {
        let payload = &point["payload"];
        Some(ScoredChunk {
            chunk_id: point["id"].as_str().and_then(|s| Uuid::parse_str(s).ok())?,
            document_id: payload["document_id"]
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())?,
            chunk_index: payload["chunk_index"].as_u64().unwrap_or(0) as usize,
            filename: payload["filename"].as_str().unwrap_or("unknown").to_string(),
            text: payload["text"].as_str().unwrap_or("").to_string(),
            score: point["score"].as_f64().unwrap_or(0.0) as f32,
        })
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(&self) -> Result<(), ServiceError> {
        let collections = self
            .send_json(
                reqwest::Method::GET,
                format!("{}/collections", self.base_url),
                None,
            )
            .await?;
        let exists = collections["result"]["collections"]
            .as_array()
            .map(|list| {
                list.iter()
                    .any(|c| c["name"].as_str() == Some(self.collection.as_str()))
            })
            .unwrap_or(false);
        if exists {
            debug!(collection = self.collection.as_str(), "Collection exists");
            return Ok(());
        }

        self.send_json(
            reqwest::Method::PUT,
            format!("{}/collections/{}", self.base_url, self.collection),
            Some(serde_json::json!({
                "vectors": {
                    "size": self.dimensions,
                    "distance": "Cosine",
                }
            })),
        )
        .await?;
        info!(
            collection = self.collection.as_str(),
            dimensions = self.dimensions,
            "Created collection"
        );
        Ok(())
    }

    async fn upsert(&self, points: &[IndexPoint]) -> Result<(), ServiceError> {
        for batch in points.chunks(UPSERT_BATCH_SIZE) {
            let body_points: Vec<Value> = batch
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "id": p.chunk.id.to_string(),
                        "vector": p.vector,
                        "payload": {
                            "document_id": p.chunk.document_id.to_string(),
                            "chunk_index": p.chunk.index,
                            "text": p.chunk.text,
                            "token_count": p.chunk.token_count,
                            "filename": p.filename,
                        }
                    })
                })
                .collect();
            self.send_json(
                reqwest::Method::PUT,
                format!(
                    "{}/collections/{}/points?wait=true",
                    self.base_url, self.collection
                ),
                Some(serde_json::json!({ "points": body_points })),
            )
            .await?;
        }
        debug!(count = points.len(), "Upserted points");
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, ServiceError> {
        let json = self
            .send_json(
                reqwest::Method::POST,
                format!(
                    "{}/collections/{}/points/search",
                    self.base_url, self.collection
                ),
                Some(serde_json::json!({
                    "vector": vector,
                    "limit": top_k,
                    "with_payload": true,
                })),
            )
            .await?;

        let results = json["result"]
            .as_array()
            .ok_or_else(|| ServiceError::ResponseParse {
                message: "Missing 'result' array in search response".to_string(),
            })?;
        Ok(results.iter().filter_map(Self::parse_scored_chunk).collect())
    }

    async fn delete_by_document(&self, document_id: Uuid) -> Result<usize, ServiceError> {
        let count = self.count_document(document_id).await?;
        if count == 0 {
            return Ok(0);
        }
        self.send_json(
            reqwest::Method::POST,
            format!(
                "{}/collections/{}/points/delete?wait=true",
                self.base_url, self.collection
            ),
            Some(serde_json::json!({
                "filter": Self::document_filter(document_id),
            })),
        )
        .await?;
        info!(
            document_id = %document_id,
            chunks = count,
            "Deleted document vectors"
        );
        Ok(count)
    }
}
