//! Citation-grounded answer synthesis.
//!
//! Builds a bounded context window from the final post-rerank candidates,
//! tags each chunk with a stable `[Sn]` reference token, invokes the LLM,
//! and maps the citation markers in the generated text back to chunk ids.
//! Markers that do not correspond to a context chunk are dropped and
//! logged, never propagated: every returned citation references a chunk
//! that was actually given to the model.

use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{RetrievalConfig, RetryConfig};
use crate::error::ServiceError;
use crate::ports::LlmClient;
use crate::providers::with_retry;
use crate::types::{Answer, Citation, ScoredChunk};

/// Approximate characters per token, used for context budgeting.
const AVG_CHARS_PER_TOKEN: f64 = 4.0;

/// Length of the excerpt stored in each citation.
const EXCERPT_CHARS: usize = 200;

/// Answer synthesizer over an LLM completion client.
pub struct Synthesizer {
    llm: Arc<dyn LlmClient>,
    max_context_tokens: usize,
    retry: RetryConfig,
    marker: Regex,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LlmClient>, config: &RetrievalConfig, retry: RetryConfig) -> Self {
        Self {
            llm,
            max_context_tokens: config.context_max_tokens,
            retry,
            // Infallible pattern; compiled once.
            marker: Regex::new(r"\[S(\d+)\]").expect("valid citation marker pattern"),
        }
    }

    /// Generate an answer for `question` grounded in `context_chunks`
    /// (already in final post-rerank order).
    pub async fn synthesize(
        &self,
        question: &str,
        context_chunks: &[ScoredChunk],
    ) -> Result<Answer, ServiceError> {
        let (prompt, included) = self.build_prompt(question, context_chunks);
        debug!(
            chunks = included.len(),
            model = self.llm.model_name(),
            "Synthesizing answer"
        );

        let text = with_retry(&self.retry, || self.llm.generate(&prompt)).await?;
        let citations = self.resolve_citations(&text, &included);
        info!(
            citations = citations.len(),
            chars = text.len(),
            "Generated answer"
        );
        Ok(Answer {
            text,
            citations,
            no_evidence: false,
        })
    }

    /// Build the prompt, returning the chunks that fit the token budget.
    ///
    /// Chunks are taken in order until the budget is exhausted, so the
    /// highest-ranked evidence is always included.
    fn build_prompt<'a>(
        &self,
        question: &str,
        context_chunks: &'a [ScoredChunk],
    ) -> (String, Vec<&'a ScoredChunk>) {
        let max_chars = (self.max_context_tokens as f64 * AVG_CHARS_PER_TOKEN) as usize;
        let mut sections = String::new();
        let mut included = Vec::new();

        for chunk in context_chunks {
            if !sections.is_empty() && sections.len() + chunk.text.len() > max_chars {
                warn!(
                    included = included.len(),
                    total = context_chunks.len(),
                    "Context budget exhausted, truncating"
                );
                break;
            }
            if !included.is_empty() {
                sections.push_str("\n---\n");
            }
            sections.push_str(&format!(
                "[S{}] ({}, chunk {})\n{}\n",
                included.len() + 1,
                chunk.filename,
                chunk.chunk_index + 1,
                chunk.text
            ));
            included.push(chunk);
        }

        let prompt = format!(
            "You are a careful assistant that answers questions using only the \
             provided sources.\n\
             Use ONLY the information in the sources below. If the sources do not \
             contain enough information to answer, say so.\n\
             Cite the sources you use with their reference tokens, e.g. [S1] or [S3].\n\n\
             SOURCES:\n{sections}\n\
             QUESTION: {question}\n\n\
             ANSWER:"
        );
        (prompt, included)
    }

    /// Map `[Sn]` markers in the generated text back to citations, in
    /// order of first appearance. Markers outside the context set are
    /// dropped with a warning.
    fn resolve_citations(&self, text: &str, included: &[&ScoredChunk]) -> Vec<Citation> {
        let mut seen = Vec::new();
        let mut citations = Vec::new();

        for capture in self.marker.captures_iter(text) {
            let Ok(n) = capture[1].parse::<usize>() else {
                continue;
            };
            if n == 0 || n > included.len() {
                warn!(marker = n, context_size = included.len(), "Dropping citation marker outside context");
                continue;
            }
            if seen.contains(&n) {
                continue;
            }
            seen.push(n);

            let chunk = included[n - 1];
            citations.push(Citation {
                chunk_id: chunk.chunk_id,
                document_id: chunk.document_id,
                filename: chunk.filename.clone(),
                chunk_index: chunk.chunk_index,
                text_span: excerpt(&chunk.text),
            });
        }
        citations
    }
}

/// A presentation excerpt, truncated on a char boundary.
fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let truncated: String = text.chars().take(EXCERPT_CHARS).collect();
    format!("{truncated}…")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct ScriptedLlm {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn chunk(index: usize, text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            chunk_index: index,
            filename: "doc.txt".to_string(),
            text: text.to_string(),
            score: 0.5,
        }
    }

    fn synthesizer(llm: Arc<dyn LlmClient>) -> Synthesizer {
        Synthesizer::new(llm, &RetrievalConfig::default(), RetryConfig::default())
    }

    #[tokio::test]
    async fn test_citations_map_to_context_chunks() {
        let llm = Arc::new(ScriptedLlm::new("Alpha is true [S1] and beta holds [S2]."));
        let synth = synthesizer(llm);
        let chunks = vec![chunk(0, "alpha facts"), chunk(1, "beta facts")];

        let answer = synth.synthesize("what holds?", &chunks).await.unwrap();
        assert_eq!(answer.citations.len(), 2);
        assert_eq!(answer.citations[0].chunk_id, chunks[0].chunk_id);
        assert_eq!(answer.citations[1].chunk_id, chunks[1].chunk_id);
        assert!(!answer.no_evidence);
    }

    #[tokio::test]
    async fn test_out_of_range_markers_are_dropped() {
        let llm = Arc::new(ScriptedLlm::new("Claim [S1], bogus [S7], zero [S0]."));
        let synth = synthesizer(llm);
        let chunks = vec![chunk(0, "only source")];

        let answer = synth.synthesize("q", &chunks).await.unwrap();
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].chunk_id, chunks[0].chunk_id);
    }

    #[tokio::test]
    async fn test_repeated_markers_cited_once() {
        let llm = Arc::new(ScriptedLlm::new("[S1] and again [S1] and [S1]."));
        let synth = synthesizer(llm);
        let chunks = vec![chunk(0, "source")];

        let answer = synth.synthesize("q", &chunks).await.unwrap();
        assert_eq!(answer.citations.len(), 1);
    }

    #[tokio::test]
    async fn test_prompt_tags_chunks_in_order() {
        let llm = Arc::new(ScriptedLlm::new("ok"));
        let prompts = llm.clone();
        let synth = synthesizer(llm);
        let chunks = vec![chunk(3, "first ranked"), chunk(0, "second ranked")];

        synth.synthesize("q", &chunks).await.unwrap();
        let recorded = prompts.prompts.lock().unwrap();
        let prompt = &recorded[0];
        let s1 = prompt.find("[S1] (doc.txt, chunk 4)").unwrap();
        let s2 = prompt.find("[S2] (doc.txt, chunk 1)").unwrap();
        assert!(s1 < s2);
        assert!(prompt.contains("QUESTION: q"));
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let long = "é".repeat(500);
        let cut = excerpt(&long);
        assert!(cut.chars().count() <= EXCERPT_CHARS + 1);
    }
}
