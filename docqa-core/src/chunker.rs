//! Token-based document chunking.
//!
//! Splits extracted document text into overlapping token-bounded windows
//! using the `cl100k_base` BPE vocabulary (via `tiktoken-rs`), so chunk
//! boundaries are deterministic for a given input. Chunking is a pure
//! function of the input text and the configured window parameters; no
//! sentence-boundary adjustment is applied.

use regex::Regex;
use tiktoken_rs::CoreBPE;
use uuid::Uuid;

use crate::config::RetrievalConfig;
use crate::error::{ChunkError, ConfigError};
use crate::types::Chunk;

/// Sliding-window token chunker.
///
/// Windows are `chunk_size` tokens long and advance by
/// `chunk_size - overlap` tokens, so consecutive chunks share exactly
/// `overlap` tokens. The final chunk may be shorter but is never empty;
/// a trailing window that would contribute no new tokens is not emitted.
pub struct TokenChunker {
    bpe: CoreBPE,
    chunk_size: usize,
    overlap: usize,
    blank_runs: Regex,
    space_runs: Regex,
}

impl TokenChunker {
    /// Create a chunker with the given window parameters.
    ///
    /// Fails with `ConfigError::Invalid` unless `chunk_size > overlap`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ConfigError> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(ConfigError::Invalid {
                message: format!(
                    "chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})"
                ),
            });
        }
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| ConfigError::Invalid {
            message: format!("failed to load cl100k_base tokenizer: {e}"),
        })?;
        // Infallible patterns; compiled once.
        let blank_runs = Regex::new(r"\n{3,}").expect("valid blank-line pattern");
        let space_runs = Regex::new(r" {2,}").expect("valid space-run pattern");
        Ok(Self {
            bpe,
            chunk_size,
            overlap,
            blank_runs,
            space_runs,
        })
    }

    /// Create a chunker from validated retrieval configuration.
    pub fn from_config(config: &RetrievalConfig) -> Result<Self, ConfigError> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Number of tokens the chunker sees in `text` (after normalization).
    pub fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(&self.clean_text(text)).len()
    }

    /// Normalize extracted text before tokenization: collapse runs of
    /// blank lines and spaces, strip control characters.
    pub fn clean_text(&self, text: &str) -> String {
        let stripped: String = text
            .chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect();
        let collapsed = self.blank_runs.replace_all(&stripped, "\n\n");
        let collapsed = self.space_runs.replace_all(&collapsed, " ");
        collapsed.trim().to_string()
    }

    /// Split `text` into overlapping chunks attributed to `document_id`.
    ///
    /// Returns an empty vector for input with no tokens; the caller decides
    /// whether that is an error (ingestion treats it as an empty document).
    pub fn chunk(&self, document_id: Uuid, text: &str) -> Result<Vec<Chunk>, ChunkError> {
        let cleaned = self.clean_text(text);
        let tokens = self.bpe.encode_ordinary(&cleaned);
        let total = tokens.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let stride = self.chunk_size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;
        let mut prev_end: usize = 0;
        let mut index = 0;

        loop {
            let end = (start + self.chunk_size).min(total);
            let window = tokens[start..end].to_vec();
            let chunk_text =
                self.bpe
                    .decode(window)
                    .map_err(|e| ChunkError::Tokenizer {
                        message: format!("failed to decode tokens [{start}, {end}): {e}"),
                    })?;

            chunks.push(Chunk {
                id: Uuid::new_v4(),
                document_id,
                index,
                text: chunk_text,
                token_count: end - start,
                token_start: start,
                token_end: end,
                overlap_with_previous: prev_end.saturating_sub(start),
            });

            if end == total {
                break;
            }
            prev_end = end;
            start += stride;
            index += 1;
        }

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// "foo" followed by repetitions of " foo" encodes to exactly one
    /// token per word under cl100k_base.
    fn words(count: usize) -> String {
        let mut text = String::from("foo");
        for _ in 1..count {
            text.push_str(" foo");
        }
        text
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        assert!(TokenChunker::new(100, 100).is_err());
        assert!(TokenChunker::new(100, 150).is_err());
        assert!(TokenChunker::new(0, 0).is_err());
        assert!(TokenChunker::new(100, 0).is_ok());
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        let chunker = TokenChunker::new(100, 10).unwrap();
        let chunks = chunker.chunk(Uuid::new_v4(), "   \n\n  ").unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = TokenChunker::new(1000, 100).unwrap();
        let chunks = chunker.chunk(Uuid::new_v4(), "a single short sentence").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].overlap_with_previous, 0);
        assert_eq!(chunks[0].token_start, 0);
    }

    #[test]
    fn test_2500_token_document_boundaries() {
        let chunker = TokenChunker::new(1000, 100).unwrap();
        let text = words(2500);
        assert_eq!(chunker.count_tokens(&text), 2500);

        let chunks = chunker.chunk(Uuid::new_v4(), &text).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!((chunks[0].token_start, chunks[0].token_end), (0, 1000));
        assert_eq!((chunks[1].token_start, chunks[1].token_end), (900, 1900));
        assert_eq!((chunks[2].token_start, chunks[2].token_end), (1800, 2500));
        assert_eq!(chunks[1].overlap_with_previous, 100);
        assert_eq!(chunks[2].overlap_with_previous, 100);
        assert_eq!(chunks[2].token_count, 700);
    }

    #[test]
    fn test_exact_window_fit_emits_no_trailing_chunk() {
        let chunker = TokenChunker::new(1000, 100).unwrap();
        let text = words(1000);
        let chunks = chunker.chunk(Uuid::new_v4(), &text).unwrap();
        // The window after [0, 1000) would start at 900 and add no new
        // tokens; it must be dropped.
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].token_end, 1000);
    }

    #[test]
    fn test_coverage_reconstructs_token_sequence() {
        let chunker = TokenChunker::new(50, 10).unwrap();
        let text = words(137);
        let chunks = chunker.chunk(Uuid::new_v4(), &text).unwrap();

        // Non-overlap regions tile the token sequence exactly once.
        let mut covered = 0;
        for chunk in &chunks {
            assert_eq!(chunk.token_start + chunk.overlap_with_previous, covered);
            covered = chunk.token_end;
        }
        assert_eq!(covered, 137);
    }

    #[test]
    fn test_ordinals_and_ids_are_distinct() {
        let chunker = TokenChunker::new(20, 5).unwrap();
        let doc = Uuid::new_v4();
        let chunks = chunker.chunk(doc, &words(100)).unwrap();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.document_id, doc);
        }
        let mut ids: Vec<_> = chunks.iter().map(|c| c.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), chunks.len());
    }

    #[test]
    fn test_clean_text_normalizes() {
        let chunker = TokenChunker::new(100, 10).unwrap();
        let cleaned = chunker.clean_text("a  b\n\n\n\nc\u{0000}d  ");
        assert_eq!(cleaned, "a b\n\ncd");
    }
}
