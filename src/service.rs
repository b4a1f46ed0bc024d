//! RAG service orchestration.
//!
//! [`RagService`] composes the embedding service, document processor, and
//! vector cache behind the operations callers use: upload, search, get,
//! list, remove, clear, health. The cache sits behind one `RwLock`: reads
//! share it, mutations (each followed by a snapshot write) hold it
//! exclusively. PDF extraction and embedding inference run on blocking
//! threads so an async caller is never pinned by CPU-bound work.

use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cache::VectorCache;
use crate::config::Config;
use crate::embedding::EmbeddingService;
use crate::ingest;
use crate::models::{DocumentSummary, HealthReport, SearchResult, SourceMeta};

pub struct RagService {
    config: Config,
    embedder: Arc<EmbeddingService>,
    cache: Arc<RwLock<VectorCache>>,
}

impl RagService {
    /// Build the service: select the embedding backend and load any
    /// existing cache snapshot from the configured directory.
    pub fn new(config: Config) -> Self {
        let embedder = Arc::new(EmbeddingService::new(&config.embedding));
        let cache = Arc::new(RwLock::new(VectorCache::new(config.cache.dir.clone())));

        Self {
            config,
            embedder,
            cache,
        }
    }

    /// Process a PDF and cache the result, returning the new document id.
    ///
    /// Extraction failures propagate and nothing is cached for that upload.
    pub async fn upload_document(&self, filename: &str, bytes: Vec<u8>) -> Result<String> {
        let embedder = self.embedder.clone();
        let chunking = self.config.chunking.clone();
        let owned_filename = filename.to_string();

        let document = tokio::task::spawn_blocking(move || {
            ingest::process_document(&owned_filename, &bytes, &chunking, &embedder)
        })
        .await
        .context("document processing task failed")??;

        let document_id = document.id.clone();
        let chunk_count = document.chunks.len();

        self.cache.write().unwrap().add(document);

        info!(
            "Document {} processed successfully with {} chunks",
            filename, chunk_count
        );
        Ok(document_id)
    }

    /// Rank cached chunks against a query.
    ///
    /// `top_k` and `min_similarity` default from configuration when not
    /// given; with `document_id` set, only that document is searched. Never
    /// fails: an empty result means nothing scored above the threshold.
    pub async fn search_documents(
        &self,
        query: &str,
        document_id: Option<&str>,
        top_k: Option<usize>,
        min_similarity: Option<f32>,
    ) -> Vec<SearchResult> {
        let top_k = top_k.unwrap_or(self.config.retrieval.top_k);
        let min_similarity = min_similarity.unwrap_or(self.config.retrieval.min_similarity);

        let embedder = self.embedder.clone();
        let owned_query = query.to_string();
        let query_vector =
            match tokio::task::spawn_blocking(move || embedder.encode_one(&owned_query)).await {
                Ok(vector) => vector,
                Err(e) => {
                    warn!("Query embedding task failed: {}", e);
                    return Vec::new();
                }
            };

        let cache = self.cache.read().unwrap();
        let ranked = cache.search_similar(&query_vector, top_k, document_id);

        let mut results = Vec::new();
        for (chunk_id, similarity) in ranked {
            if similarity < min_similarity {
                continue;
            }
            if let Some((chunk, document)) = cache.find_chunk(&chunk_id) {
                results.push(SearchResult {
                    chunk: chunk.clone(),
                    similarity,
                    source: SourceMeta {
                        filename: document.filename.clone(),
                        title: document.title.clone(),
                        page_number: chunk.page_number,
                        total_pages: document.total_pages,
                    },
                });
            }
        }

        results
    }

    /// Summary of one document, or `None` when the id is not cached.
    pub fn get_document_info(&self, document_id: &str) -> Option<DocumentSummary> {
        self.cache
            .read()
            .unwrap()
            .get(document_id)
            .map(|d| d.summary())
    }

    /// Summaries of every cached document, oldest first.
    pub fn list_documents(&self) -> Vec<DocumentSummary> {
        let cache = self.cache.read().unwrap();
        let mut summaries: Vec<DocumentSummary> = cache.documents().map(|d| d.summary()).collect();
        summaries.sort_by(|a, b| {
            a.processed_at
                .cmp(&b.processed_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        summaries
    }

    /// Remove a document and its vectors. Returns whether anything was
    /// removed; an unknown id is a no-op.
    pub fn remove_document(&self, document_id: &str) -> bool {
        let removed = self.cache.write().unwrap().remove(document_id);
        if removed {
            info!("Removed document {}", document_id);
        }
        removed
    }

    /// Drop all cached documents and delete the snapshot file.
    pub fn clear_cache(&self) {
        self.cache.write().unwrap().clear();
        info!("Cache cleared");
    }

    pub fn health_check(&self) -> HealthReport {
        let cache = self.cache.read().unwrap();

        HealthReport {
            embedding_backend: self.embedder.model_name().to_string(),
            trained_model_available: self.embedder.is_trained(),
            cached_documents: cache.document_count(),
            total_chunks: cache.chunk_count(),
            cache_dir: cache.cache_dir().to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use chrono::{DateTime, Duration, Utc};
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> RagService {
        let mut config = Config::default();
        config.cache.dir = dir.path().to_path_buf();
        config.embedding.provider = "fallback".to_string();
        RagService::new(config)
    }

    fn doc_at(id: &str, processed_at: DateTime<Utc>) -> Document {
        Document {
            id: id.to_string(),
            filename: format!("{}.pdf", id),
            title: id.to_string(),
            total_pages: 1,
            chunks: Vec::new(),
            processed_at,
        }
    }

    #[tokio::test]
    async fn test_upload_rejects_invalid_pdf() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let err = service
            .upload_document("junk.pdf", b"not a pdf".to_vec())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("junk.pdf"));
        assert!(service.list_documents().is_empty());
    }

    #[tokio::test]
    async fn test_search_on_empty_cache_is_empty() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let results = service.search_documents("anything", None, None, None).await;
        assert!(results.is_empty());
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        assert!(!service.remove_document("missing"));
    }

    #[test]
    fn test_get_unknown_document_is_none() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        assert!(service.get_document_info("missing").is_none());
    }

    #[test]
    fn test_list_documents_sorted_by_processed_at_then_id() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let earlier = Utc::now();
        let later = earlier + Duration::seconds(5);
        {
            // Insertion order deliberately disagrees with the expected
            // output order, so map iteration order cannot pass this test.
            let mut cache = service.cache.write().unwrap();
            cache.add(doc_at("doc-c", later));
            cache.add(doc_at("doc-b", earlier));
            cache.add(doc_at("doc-a", later));
        }

        let ids: Vec<String> = service
            .list_documents()
            .into_iter()
            .map(|d| d.id)
            .collect();
        // Oldest first; equal timestamps fall back to id order.
        assert_eq!(ids, vec!["doc-b", "doc-a", "doc-c"]);
    }

    #[test]
    fn test_health_reports_fallback_backend() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let health = service.health_check();
        assert_eq!(health.embedding_backend, "fallback");
        assert!(!health.trained_model_available);
        assert_eq!(health.cached_documents, 0);
        assert_eq!(health.total_chunks, 0);
        assert_eq!(health.cache_dir, dir.path());
    }
}
