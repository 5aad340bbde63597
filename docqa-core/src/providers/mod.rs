//! External-service provider implementations.
//!
//! Concrete adapters behind the capability ports in [`crate::ports`]:
//! - Voyage AI embeddings and reranking
//! - Qdrant vector store (REST API)
//! - Google Gemini answer generation
//! - Deterministic local substitutes for tests and offline use
//!
//! Also provides `with_retry()`, the uniform bounded-backoff wrapper the
//! pipelines apply to every external call.

pub mod gemini;
pub mod local;
pub mod qdrant;
pub mod voyage;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::DocqaConfig;
use crate::error::{ConfigError, ServiceError};
use crate::ports::{Embedder, LlmClient, Reranker, VectorIndex};

pub use crate::config::RetryConfig;
pub use gemini::GeminiClient;
pub use local::{HashEmbedder, MemoryIndex};
pub use qdrant::QdrantIndex;
pub use voyage::{VoyageEmbedder, VoyageReranker};

/// Execute an async operation with exponential backoff retry on transient
/// errors.
///
/// Retries on `ServiceError::RateLimited` (respecting `retry_after_secs`),
/// `ServiceError::Connection`, and `ServiceError::Timeout`. Permanent
/// errors (auth, parse, bad request) return immediately.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, ServiceError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut last_err = None;
    for attempt in 0..=config.max_retries {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !e.is_transient() || attempt == config.max_retries {
                    return Err(e);
                }

                let backoff_ms = compute_backoff(config, attempt, &e);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| ServiceError::Connection {
        message: "All retry attempts exhausted".to_string(),
    }))
}

/// Compute backoff delay, respecting rate limit retry-after hints.
fn compute_backoff(config: &RetryConfig, attempt: u32, err: &ServiceError) -> u64 {
    if let ServiceError::RateLimited { retry_after_secs } = err {
        let server_ms = retry_after_secs * 1000;
        let computed = compute_exponential_backoff(config, attempt);
        return server_ms.max(computed);
    }
    compute_exponential_backoff(config, attempt)
}

/// Pure exponential backoff with optional jitter.
fn compute_exponential_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_backoff_ms as f64) as u64;
    if config.jitter {
        // Up to 25% jitter
        let jitter = (capped as f64 * 0.25 * rand_simple()) as u64;
        capped + jitter
    } else {
        capped
    }
}

/// Simple deterministic pseudo-random for jitter (avoids pulling in the
/// rand crate).
fn rand_simple() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// Resolve an API key from the environment variable named in the config.
pub fn resolve_api_key(api_key_env: &str, provider: &str) -> Result<String, ServiceError> {
    std::env::var(api_key_env).map_err(|_| ServiceError::AuthFailed {
        provider: format!("{provider} (env var '{api_key_env}' not set)"),
    })
}

/// Create an embedder based on the configuration.
///
/// Routes `"local"` to the deterministic in-process embedder; everything
/// else to the Voyage API client.
pub fn create_embedder(config: &DocqaConfig) -> Result<Arc<dyn Embedder>, ConfigError> {
    match config.embedding.provider.as_str() {
        "local" => Ok(Arc::new(HashEmbedder::new(config.embedding.dimensions))),
        _ => Ok(Arc::new(VoyageEmbedder::new(&config.embedding).map_err(
            |e| ConfigError::Invalid {
                message: e.to_string(),
            },
        )?)),
    }
}

/// Create a vector index adapter based on the configuration.
pub fn create_index(config: &DocqaConfig) -> Result<Arc<dyn VectorIndex>, ConfigError> {
    match config.index.provider.as_str() {
        "memory" => Ok(Arc::new(MemoryIndex::new())),
        _ => Ok(Arc::new(
            QdrantIndex::new(&config.index, &config.retrieval.collection_name, config.embedding.dimensions)
                .map_err(|e| ConfigError::Invalid {
                    message: e.to_string(),
                })?,
        )),
    }
}

/// Create a reranker based on the configuration.
pub fn create_reranker(config: &DocqaConfig) -> Result<Arc<dyn Reranker>, ConfigError> {
    Ok(Arc::new(VoyageReranker::new(&config.rerank).map_err(
        |e| ConfigError::Invalid {
            message: e.to_string(),
        },
    )?))
}

/// Create the synthesis LLM client based on the configuration.
pub fn create_llm(config: &DocqaConfig) -> Result<Arc<dyn LlmClient>, ConfigError> {
    Ok(Arc::new(GeminiClient::new(&config.llm).map_err(|e| {
        ConfigError::Invalid {
            message: e.to_string(),
        }
    })?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_backoff_exponential() {
        let config = RetryConfig {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 60000,
            backoff_multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(compute_exponential_backoff(&config, 0), 1000);
        assert_eq!(compute_exponential_backoff(&config, 1), 2000);
        assert_eq!(compute_exponential_backoff(&config, 2), 4000);
    }

    #[test]
    fn test_compute_backoff_respects_cap() {
        let config = RetryConfig {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 3000,
            backoff_multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(compute_exponential_backoff(&config, 2), 3000);
    }

    #[test]
    fn test_compute_backoff_rate_limit_uses_server_value() {
        let config = RetryConfig {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 60000,
            backoff_multiplier: 2.0,
            jitter: false,
        };
        let err = ServiceError::RateLimited {
            retry_after_secs: 30,
        };
        assert_eq!(compute_backoff(&config, 0, &err), 30000);
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_first_try() {
        let config = RetryConfig::default();
        let result = with_retry(&config, || async { Ok::<_, ServiceError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_retry_permanent_error_no_retry() {
        let config = RetryConfig {
            max_retries: 3,
            ..Default::default()
        };
        let call_count = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let cc = call_count.clone();
        let result = with_retry(&config, || {
            let cc = cc.clone();
            async move {
                cc.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Err::<i32, _>(ServiceError::AuthFailed {
                    provider: "test".into(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(call_count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_transient_error_retries() {
        let config = RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            backoff_multiplier: 1.0,
            jitter: false,
        };
        let call_count = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let cc = call_count.clone();
        let result = with_retry(&config, || {
            let cc = cc.clone();
            async move {
                let n = cc.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if n < 2 {
                    Err(ServiceError::Connection {
                        message: "reset".into(),
                    })
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(call_count.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[test]
    fn test_resolve_api_key_missing() {
        std::env::remove_var("DOCQA_NONEXISTENT_KEY");
        let err = resolve_api_key("DOCQA_NONEXISTENT_KEY", "voyage").unwrap_err();
        match err {
            ServiceError::AuthFailed { provider } => {
                assert!(provider.contains("DOCQA_NONEXISTENT_KEY"));
            }
            other => panic!("Expected AuthFailed, got {other:?}"),
        }
    }
}
