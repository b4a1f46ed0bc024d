//! Core data models for the document QA engine.
//!
//! These types represent the documents, chunks, and search results that flow
//! through the ingestion and retrieval pipeline. [`Document`] and
//! [`DocumentChunk`] are written into the cache snapshot and carry serde
//! derives; the remaining types are ephemeral projections built per request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A bounded span of a document's extracted text, the unit of embedding
/// and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: String,
    pub content: String,
    /// 1-based page the text came from. A chunk never spans two pages.
    pub page_number: u32,
    /// 0-based position within the document, monotonic across pages.
    pub chunk_index: usize,
    /// SHA-256 hex digest of `content`, for change detection.
    pub hash: String,
    /// Present once the chunk has been embedded; length matches the
    /// embedding backend's dimensionality.
    pub embedding: Option<Vec<f32>>,
}

/// A processed document and its chunks.
///
/// Immutable once built: chunks are created during processing and only go
/// away when the whole document is removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    /// Filename with a trailing `.pdf` stripped.
    pub title: String,
    /// Number of pages that yielded extractable text.
    pub total_pages: u32,
    /// Owned chunks in `chunk_index` order.
    pub chunks: Vec<DocumentChunk>,
    pub processed_at: DateTime<Utc>,
}

impl Document {
    /// Metadata projection without chunk bodies, for listings.
    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id.clone(),
            filename: self.filename.clone(),
            title: self.title.clone(),
            total_pages: self.total_pages,
            chunk_count: self.chunks.len(),
            processed_at: self.processed_at,
        }
    }
}

/// Source attribution attached to a search hit, snapshotted at query time.
#[derive(Debug, Clone, Serialize)]
pub struct SourceMeta {
    pub filename: String,
    pub title: String,
    pub page_number: u32,
    pub total_pages: u32,
}

/// A ranked search hit. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub chunk: DocumentChunk,
    pub similarity: f32,
    pub source: SourceMeta,
}

/// Per-document metadata returned by listings and lookups.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub filename: String,
    pub title: String,
    pub total_pages: u32,
    pub chunk_count: usize,
    pub processed_at: DateTime<Utc>,
}

/// Engine health snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Active embedding backend: the model name, or `"fallback"`.
    pub embedding_backend: String,
    pub trained_model_available: bool,
    pub cached_documents: usize,
    pub total_chunks: usize,
    pub cache_dir: PathBuf,
}
