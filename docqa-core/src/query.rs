//! Question-answering pipeline.
//!
//! Two-stage retrieval followed by grounded synthesis: embed the question,
//! fetch `search_top_k` candidates by similarity, rerank them down to
//! `rerank_top_k`, and synthesize an answer with citations. Rerank failure
//! degrades to similarity order rather than failing the query; an empty
//! candidate set returns the explicit no-evidence answer without invoking
//! the LLM at all.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::{DocqaConfig, RetryConfig};
use crate::error::{DocqaError, Result};
use crate::ports::{EmbedInput, Embedder, LlmClient, Reranker, VectorIndex};
use crate::providers::with_retry;
use crate::synthesis::Synthesizer;
use crate::types::{Answer, RerankedCandidate, ScoredChunk};

/// Query pipeline over the retrieval ports and the synthesizer.
pub struct QueryPipeline {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    reranker: Arc<dyn Reranker>,
    synthesizer: Synthesizer,
    search_top_k: usize,
    rerank_top_k: usize,
    retry: RetryConfig,
}

impl QueryPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        reranker: Arc<dyn Reranker>,
        llm: Arc<dyn LlmClient>,
        config: &DocqaConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            reranker,
            synthesizer: Synthesizer::new(llm, &config.retrieval, config.retry.clone()),
            search_top_k: config.retrieval.search_top_k,
            rerank_top_k: config.retrieval.rerank_top_k,
            retry: config.retry.clone(),
        }
    }

    /// Answer a question from the indexed documents.
    #[instrument(skip(self, question))]
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let candidates = self.retrieve(question).await?;
        if candidates.is_empty() {
            info!("No candidates retrieved, returning no-evidence answer");
            return Ok(Answer::no_evidence());
        }

        let context = self.rerank_or_degrade(question, candidates).await;
        let answer = self
            .synthesizer
            .synthesize(question, &context)
            .await
            .map_err(DocqaError::Synthesis)?;
        Ok(answer)
    }

    /// First-stage retrieval: embed the question and run similarity search.
    async fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>> {
        let texts = vec![question.to_string()];
        let vectors = with_retry(&self.retry, || {
            self.embedder.embed(&texts, EmbedInput::Query)
        })
        .await
        .map_err(DocqaError::Embedding)?;
        let query_vector = vectors
            .into_iter()
            .next()
            .ok_or(DocqaError::Embedding(
                crate::error::ServiceError::ResponseParse {
                    message: "Embedder returned no vector for the query".to_string(),
                },
            ))?;

        let candidates = with_retry(&self.retry, || {
            self.index.search(&query_vector, self.search_top_k)
        })
        .await
        .map_err(DocqaError::VectorStore)?;
        info!(candidates = candidates.len(), "Similarity search complete");
        Ok(candidates)
    }

    /// Second-stage reranking. On rerank failure the query degrades to the
    /// top `rerank_top_k` candidates in similarity order instead of
    /// failing.
    async fn rerank_or_degrade(
        &self,
        question: &str,
        candidates: Vec<ScoredChunk>,
    ) -> Vec<ScoredChunk> {
        let reranked = with_retry(&self.retry, || {
            self.reranker
                .rerank(question, &candidates, self.rerank_top_k)
        })
        .await;

        match reranked {
            Ok(ranking) => apply_ranking(candidates, &ranking),
            Err(e) => {
                warn!(error = %e, "Rerank failed, degrading to similarity order");
                let mut context = candidates;
                context.truncate(self.rerank_top_k);
                context
            }
        }
    }
}

/// Reorder `candidates` by the reranker's scores, dropping everything the
/// reranker did not return. Ranked ids with no matching candidate are
/// ignored.
fn apply_ranking(
    candidates: Vec<ScoredChunk>,
    ranking: &[RerankedCandidate],
) -> Vec<ScoredChunk> {
    let mut by_id: std::collections::HashMap<_, _> =
        candidates.into_iter().map(|c| (c.chunk_id, c)).collect();
    ranking
        .iter()
        .filter_map(|r| {
            by_id.remove(&r.chunk_id).map(|mut chunk| {
                chunk.score = r.score;
                chunk
            })
        })
        .collect()
}
