//! Deterministic in-process providers for tests and offline use.
//!
//! `HashEmbedder` produces hashed term-frequency vectors (L2-normalized),
//! so similar texts get similar vectors without any model or network.
//! `MemoryIndex` is a complete in-memory `VectorIndex` with cosine search
//! and per-document cascade delete. Together they make every pipeline
//! property testable without live services.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::ports::{EmbedInput, Embedder, IndexPoint, VectorIndex};
use crate::types::ScoredChunk;

/// Hashed term-frequency embedder.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        if words.is_empty() {
            return vector;
        }

        let mut tf: HashMap<&str, usize> = HashMap::new();
        for word in &words {
            *tf.entry(word).or_insert(0) += 1;
        }
        for (term, count) in &tf {
            let idx = simple_hash(term) % self.dimensions;
            vector[idx] += *count as f32;
        }

        // L2 normalize
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

/// djb2-style string hash.
fn simple_hash(s: &str) -> usize {
    let mut hash: usize = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as usize);
    }
    hash
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(
        &self,
        texts: &[String],
        _input: EmbedInput,
    ) -> Result<Vec<Vec<f32>>, ServiceError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "local"
    }
}

struct StoredPoint {
    chunk_id: Uuid,
    document_id: Uuid,
    chunk_index: usize,
    filename: String,
    text: String,
    vector: Vec<f32>,
}

/// In-memory vector index with cosine similarity search.
///
/// Points keep their insertion position across overwrites, so equal
/// scores resolve in insertion order (stable ties).
#[derive(Default)]
pub struct MemoryIndex {
    points: Mutex<Vec<StoredPoint>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points currently stored.
    pub fn len(&self) -> usize {
        self.points.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn ensure_collection(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn upsert(&self, points: &[IndexPoint]) -> Result<(), ServiceError> {
        let mut stored = self.points.lock().map_err(|_| ServiceError::Connection {
            message: "Index lock poisoned".to_string(),
        })?;
        for point in points {
            let new_point = StoredPoint {
                chunk_id: point.chunk.id,
                document_id: point.chunk.document_id,
                chunk_index: point.chunk.index,
                filename: point.filename.clone(),
                text: point.chunk.text.clone(),
                vector: point.vector.clone(),
            };
            match stored.iter_mut().find(|p| p.chunk_id == point.chunk.id) {
                Some(existing) => *existing = new_point,
                None => stored.push(new_point),
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, ServiceError> {
        let stored = self.points.lock().map_err(|_| ServiceError::Connection {
            message: "Index lock poisoned".to_string(),
        })?;
        let mut scored: Vec<ScoredChunk> = stored
            .iter()
            .map(|p| ScoredChunk {
                chunk_id: p.chunk_id,
                document_id: p.document_id,
                chunk_index: p.chunk_index,
                filename: p.filename.clone(),
                text: p.text.clone(),
                score: cosine(vector, &p.vector),
            })
            .collect();
        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete_by_document(&self, document_id: Uuid) -> Result<usize, ServiceError> {
        let mut stored = self.points.lock().map_err(|_| ServiceError::Connection {
            message: "Index lock poisoned".to_string(),
        })?;
        let before = stored.len();
        stored.retain(|p| p.document_id != document_id);
        let removed = before - stored.len();
        debug!(document_id = %document_id, removed = removed, "Deleted document vectors");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;

    fn point(document_id: Uuid, index: usize, text: &str, vector: Vec<f32>) -> IndexPoint {
        IndexPoint {
            chunk: Chunk {
                id: Uuid::new_v4(),
                document_id,
                index,
                text: text.to_string(),
                token_count: 1,
                token_start: 0,
                token_end: 1,
                overlap_with_previous: 0,
            },
            vector,
            filename: "test.txt".to_string(),
        }
    }

    #[tokio::test]
    async fn test_search_orders_by_cosine_descending() {
        let index = MemoryIndex::new();
        let doc = Uuid::new_v4();
        index
            .upsert(&[
                point(doc, 0, "a", vec![1.0, 0.0]),
                point(doc, 1, "b", vec![0.0, 1.0]),
                point(doc, 2, "c", vec![0.7, 0.7]),
            ])
            .await
            .unwrap();

        let results = index.search(&[1.0, 0.0], 3).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].chunk_index, 0);
        assert_eq!(results[1].chunk_index, 2);
        assert!(results[0].score >= results[1].score);
        assert!(results[1].score >= results[2].score);
    }

    #[tokio::test]
    async fn test_ties_resolve_in_insertion_order() {
        let index = MemoryIndex::new();
        let doc = Uuid::new_v4();
        index
            .upsert(&[
                point(doc, 0, "first", vec![1.0, 0.0]),
                point(doc, 1, "second", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();
        let results = index.search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(results[0].chunk_index, 0);
        assert_eq!(results[1].chunk_index, 1);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let index = MemoryIndex::new();
        let doc = Uuid::new_v4();
        let p = point(doc, 0, "original", vec![1.0, 0.0]);
        index.upsert(std::slice::from_ref(&p)).await.unwrap();

        let mut replacement = p.clone();
        replacement.chunk.text = "replaced".to_string();
        index.upsert(&[replacement]).await.unwrap();

        assert_eq!(index.len(), 1);
        let results = index.search(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(results[0].text, "replaced");
    }

    #[tokio::test]
    async fn test_delete_by_document_removes_only_that_document() {
        let index = MemoryIndex::new();
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();
        index
            .upsert(&[
                point(doc_a, 0, "a0", vec![1.0, 0.0]),
                point(doc_a, 1, "a1", vec![0.5, 0.5]),
                point(doc_b, 0, "b0", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let removed = index.delete_by_document(doc_a).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(index.len(), 1);

        let results = index.search(&[1.0, 0.0], 10).await.unwrap();
        assert!(results.iter().all(|r| r.document_id == doc_b));
    }

    #[tokio::test]
    async fn test_delete_unknown_document_is_noop() {
        let index = MemoryIndex::new();
        let removed = index.delete_by_document(Uuid::new_v4()).await.unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_hash_embedder_is_deterministic_and_normalized() {
        let embedder = HashEmbedder::new(64);
        let texts = vec!["the quick brown fox".to_string()];
        let a = embedder.embed(&texts, EmbedInput::Document).await.unwrap();
        let b = embedder.embed(&texts, EmbedInput::Query).await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hash_embedder_output_length_matches_input() {
        let embedder = HashEmbedder::new(32);
        let texts: Vec<String> = (0..5).map(|i| format!("text number {i}")).collect();
        let vectors = embedder.embed(&texts, EmbedInput::Document).await.unwrap();
        assert_eq!(vectors.len(), 5);
        assert!(vectors.iter().all(|v| v.len() == 32));
    }
}
