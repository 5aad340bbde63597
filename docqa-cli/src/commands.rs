//! Command handlers for the docqa CLI.

use anyhow::Context;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use docqa_core::config::DocqaConfig;
use docqa_core::providers::{self, with_retry};
use docqa_core::types::Answer;
use docqa_core::{DocumentRegistry, IngestPipeline, QueryPipeline, TokenChunker};

/// One CLI invocation's worth of pipelines over a shared registry.
struct Session {
    registry: Arc<DocumentRegistry>,
    ingest: IngestPipeline,
    query: QueryPipeline,
}

impl Session {
    fn new(config: &DocqaConfig) -> anyhow::Result<Self> {
        let embedder = providers::create_embedder(config)?;
        let index = providers::create_index(config)?;
        let reranker = providers::create_reranker(config)?;
        let llm = providers::create_llm(config)?;
        let registry = Arc::new(DocumentRegistry::new());

        let ingest = IngestPipeline::new(registry.clone(), embedder.clone(), index.clone(), config)?;
        let query = QueryPipeline::new(embedder, index, reranker, llm, config);
        Ok(Self {
            registry,
            ingest,
            query,
        })
    }

    async fn ingest_files(&self, files: &[PathBuf]) -> anyhow::Result<()> {
        for path in files {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());

            let doc = self.ingest.ingest(&filename, &text).await?;
            println!(
                "Ingested {} ({} chunks, id {})",
                doc.filename,
                doc.chunk_ids.len(),
                doc.id
            );
        }
        Ok(())
    }
}

/// Ingest `files`, answer `question` once, and print the answer.
pub async fn ask(config: &DocqaConfig, files: &[PathBuf], question: &str) -> anyhow::Result<()> {
    let session = Session::new(config)?;
    session.ingest_files(files).await?;

    let answer = session.query.answer(question).await?;
    print_answer(&answer);
    Ok(())
}

/// Ingest `files`, then answer questions from stdin until EOF or `:quit`.
pub async fn chat(config: &DocqaConfig, files: &[PathBuf]) -> anyhow::Result<()> {
    let session = Session::new(config)?;
    session.ingest_files(files).await?;

    println!("Ask a question, or :list, :delete <id>, :quit");
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once(' ').map_or((line, ""), |(a, b)| (a, b)) {
            (":quit" | ":q", _) => break,
            (":list", _) => {
                for doc in session.registry.list().await {
                    println!(
                        "{}  {}  {:?}  {} chunks",
                        doc.id, doc.filename, doc.status, doc.chunk_count
                    );
                }
            }
            (":delete", rest) => match rest.trim().parse::<Uuid>() {
                Ok(id) => match session.ingest.delete(id).await {
                    Ok(removed) => println!("Deleted {id} ({removed} vectors removed)"),
                    Err(e) => eprintln!("Delete failed: {e}"),
                },
                Err(_) => eprintln!("Usage: :delete <document-id>"),
            },
            _ => match session.query.answer(line).await {
                Ok(answer) => print_answer(&answer),
                Err(e) => eprintln!("Query failed: {e}"),
            },
        }
    }
    Ok(())
}

/// Print chunk boundaries for a file without touching any service.
pub fn chunks(config: &DocqaConfig, file: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let chunker = TokenChunker::from_config(&config.retrieval)?;

    let chunks = chunker.chunk(Uuid::new_v4(), &text)?;
    if chunks.is_empty() {
        println!("{}: no extractable text", file.display());
        return Ok(());
    }
    println!(
        "{}: {} tokens, {} chunks",
        file.display(),
        chunker.count_tokens(&text),
        chunks.len()
    );
    for chunk in &chunks {
        println!(
            "  #{:<3} tokens [{}, {})  overlap {}",
            chunk.index, chunk.token_start, chunk.token_end, chunk.overlap_with_previous
        );
    }
    Ok(())
}

/// Remove a document's vectors from the configured vector store.
///
/// Works directly against the store: the in-memory registry does not
/// outlive a CLI invocation, but the vectors do.
pub async fn delete(config: &DocqaConfig, document_id: Uuid) -> anyhow::Result<()> {
    let index = providers::create_index(config)?;
    let removed = with_retry(&config.retry, || index.delete_by_document(document_id))
        .await
        .map_err(|e| anyhow::anyhow!("Delete failed: {e}"))?;
    info!(document_id = %document_id, removed = removed, "Deleted document vectors");
    println!("Deleted {document_id} ({removed} vectors removed)");
    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("\n{}\n", answer.text);
    if answer.citations.is_empty() {
        return;
    }
    println!("Sources:");
    for (i, citation) in answer.citations.iter().enumerate() {
        println!(
            "  [{}] {} (chunk {}): {}",
            i + 1,
            citation.filename,
            citation.chunk_index + 1,
            citation.text_span
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Runs the standalone delete path against the in-process index
    // provider; exercises the vector-store call end to end offline.
    #[tokio::test]
    async fn test_delete_unknown_document_removes_nothing() {
        let mut config = DocqaConfig::default();
        config.index.provider = "memory".to_string();
        delete(&config, Uuid::new_v4()).await.unwrap();
    }
}
