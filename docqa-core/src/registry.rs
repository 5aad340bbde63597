//! In-memory document registry.
//!
//! Owns the `Document` records created on upload and mutated only by the
//! ingestion pipeline and delete operations. Consistency across concurrent
//! per-document ingestion runs is a read-write lock over the map; there is
//! no other cross-document shared state.

use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{DocqaError, Result};
use crate::types::{Document, DocumentStatus, DocumentSummary};

/// Registry of uploaded documents.
#[derive(Default)]
pub struct DocumentRegistry {
    documents: RwLock<HashMap<Uuid, Document>>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a `Pending` record for a newly uploaded document.
    pub async fn register(&self, id: Uuid, filename: &str) -> Document {
        let doc = Document::new(id, filename);
        self.documents.write().await.insert(id, doc.clone());
        doc
    }

    /// Mark a document `Ready` with its indexed chunk ids.
    pub async fn mark_ready(&self, id: Uuid, chunk_ids: Vec<Uuid>) -> Result<()> {
        let mut docs = self.documents.write().await;
        let doc = docs
            .get_mut(&id)
            .ok_or(DocqaError::DocumentNotFound { document_id: id })?;
        doc.status = DocumentStatus::Ready;
        doc.chunk_ids = chunk_ids;
        doc.failure = None;
        Ok(())
    }

    /// Mark a document `Failed` with a reason.
    pub async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<()> {
        let mut docs = self.documents.write().await;
        let doc = docs
            .get_mut(&id)
            .ok_or(DocqaError::DocumentNotFound { document_id: id })?;
        doc.status = DocumentStatus::Failed;
        doc.failure = Some(reason.to_string());
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Document> {
        self.documents
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(DocqaError::DocumentNotFound { document_id: id })
    }

    /// Listing summaries, ordered by ingestion time.
    pub async fn list(&self) -> Vec<DocumentSummary> {
        let docs = self.documents.read().await;
        let mut all: Vec<&Document> = docs.values().collect();
        all.sort_by_key(|d| d.ingested_at);
        all.iter().map(|d| d.summary()).collect()
    }

    /// Remove a document record, returning it. The caller is responsible
    /// for cascading the vector-store delete.
    pub async fn remove(&self, id: Uuid) -> Result<Document> {
        self.documents
            .write()
            .await
            .remove(&id)
            .ok_or(DocqaError::DocumentNotFound { document_id: id })
    }
}
