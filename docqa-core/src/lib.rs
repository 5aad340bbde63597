//! # docqa-core
//!
//! Core engine for document question answering over a private corpus:
//! token-window chunking, embedding, two-stage retrieval (similarity
//! search then reranking), and citation-grounded answer synthesis.
//!
//! The pipelines depend only on the capability ports in [`ports`];
//! concrete adapters for Voyage AI, Qdrant, and Gemini live in
//! [`providers`], alongside deterministic in-process substitutes for
//! tests and offline use.
//!
//! ## Structure
//!
//! - [`config`]: layered configuration (defaults, TOML file, environment)
//! - [`chunker`]: sliding-window token chunking over `cl100k_base`
//! - [`registry`]: document lifecycle records (`Pending`/`Ready`/`Failed`)
//! - [`ingest`]: chunk, embed, index, with rollback on failure
//! - [`query`]: retrieve, rerank, synthesize
//! - [`synthesis`]: context assembly and citation resolution

pub mod chunker;
pub mod config;
pub mod error;
pub mod ingest;
pub mod ports;
pub mod providers;
pub mod query;
pub mod registry;
pub mod synthesis;
pub mod types;

pub use chunker::TokenChunker;
pub use config::{load_config, DocqaConfig};
pub use error::{DocqaError, Result};
pub use ingest::IngestPipeline;
pub use query::QueryPipeline;
pub use registry::DocumentRegistry;
pub use types::{Answer, Chunk, Citation, Document, DocumentStatus, DocumentSummary};
