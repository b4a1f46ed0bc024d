//! Persisted in-memory vector cache.
//!
//! Holds every processed [`Document`] plus a parallel list of chunk vectors,
//! and answers brute-force cosine-similarity queries over them. The whole
//! cache is written to a single snapshot file after every mutation and read
//! back on construction. Writes go to a temp file first and are renamed into
//! place, so a crash mid-write leaves the previous snapshot intact.
//!
//! Persistence is best-effort by contract: a snapshot that fails to load
//! starts the cache empty, and a failed save keeps the in-memory state.
//! Both are logged, neither is surfaced to the caller.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::embedding::cosine_similarity;
use crate::models::{Document, DocumentChunk};

const SNAPSHOT_FILE: &str = "rag_cache.bin";
/// First bytes of a snapshot file: magic then format version.
const SNAPSHOT_MAGIC: &[u8; 4] = b"RAGC";
const SNAPSHOT_VERSION: u8 = 1;

#[derive(Serialize, Deserialize)]
struct VectorEntry {
    chunk_id: String,
    document_id: String,
    vector: Vec<f32>,
}

/// Borrowed view serialized on save. Field order must match [`Snapshot`];
/// bincode encodes positionally.
#[derive(Serialize)]
struct SnapshotRef<'a> {
    documents: &'a HashMap<String, Document>,
    vectors: &'a Vec<VectorEntry>,
}

#[derive(Deserialize)]
struct Snapshot {
    documents: HashMap<String, Document>,
    vectors: Vec<VectorEntry>,
}

/// Document and vector index, loaded from and saved to one snapshot file.
///
/// Not internally synchronized; callers that share a cache across threads
/// wrap it in a lock.
pub struct VectorCache {
    dir: PathBuf,
    documents: HashMap<String, Document>,
    /// Insertion-ordered so equal-similarity search results tie-break by
    /// the order chunks were cached.
    vectors: Vec<VectorEntry>,
}

impl VectorCache {
    /// Open the cache rooted at `dir`, loading a snapshot when one exists.
    pub fn new(dir: PathBuf) -> Self {
        let mut cache = Self {
            dir,
            documents: HashMap::new(),
            vectors: Vec::new(),
        };
        cache.load();
        cache
    }

    fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    fn load(&mut self) {
        let path = self.snapshot_path();
        if !path.exists() {
            return;
        }

        match read_snapshot(&path) {
            Ok(snapshot) => {
                self.documents = snapshot.documents;
                self.vectors = snapshot.vectors;
                info!("Loaded {} documents from cache", self.documents.len());
            }
            Err(e) => {
                warn!("Failed to load cache, starting empty: {}", e);
            }
        }
    }

    fn save(&self) {
        if let Err(e) = self.try_save() {
            error!("Failed to save cache: {}", e);
        }
    }

    fn try_save(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let payload = bincode::serialize(&SnapshotRef {
            documents: &self.documents,
            vectors: &self.vectors,
        })?;

        let mut bytes = Vec::with_capacity(payload.len() + 5);
        bytes.extend_from_slice(SNAPSHOT_MAGIC);
        bytes.push(SNAPSHOT_VERSION);
        bytes.extend_from_slice(&payload);

        // Atomic write: temp file, then rename over the old snapshot.
        let path = self.snapshot_path();
        let tmp = path.with_extension("bin.tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &path)?;

        debug!("Cache saved ({} bytes)", bytes.len());
        Ok(())
    }

    /// Insert or overwrite a document and index every embedded chunk,
    /// then persist. Each call rewrites the whole snapshot.
    pub fn add(&mut self, document: Document) {
        self.vectors.retain(|v| v.document_id != document.id);

        for chunk in &document.chunks {
            if let Some(embedding) = &chunk.embedding {
                self.vectors.push(VectorEntry {
                    chunk_id: chunk.id.clone(),
                    document_id: document.id.clone(),
                    vector: embedding.clone(),
                });
            }
        }

        self.documents.insert(document.id.clone(), document);
        self.save();
    }

    pub fn get(&self, document_id: &str) -> Option<&Document> {
        self.documents.get(document_id)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Total chunks across all cached documents.
    pub fn chunk_count(&self) -> usize {
        self.documents.values().map(|d| d.chunks.len()).sum()
    }

    pub fn cache_dir(&self) -> &Path {
        &self.dir
    }

    /// Remove a document and all its chunk vectors, then persist.
    ///
    /// Returns whether a document was actually removed; an absent id is a
    /// no-op and does not rewrite the snapshot.
    pub fn remove(&mut self, document_id: &str) -> bool {
        if self.documents.remove(document_id).is_none() {
            return false;
        }

        self.vectors.retain(|v| v.document_id != document_id);
        self.save();
        true
    }

    /// Drop everything and delete the snapshot file.
    pub fn clear(&mut self) {
        self.documents.clear();
        self.vectors.clear();

        let path = self.snapshot_path();
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                error!("Failed to remove cache snapshot: {}", e);
            }
        }
    }

    /// Rank indexed chunks by cosine similarity to `query`.
    ///
    /// Returns at most `top_k` `(chunk_id, similarity)` pairs in descending
    /// similarity; ties keep insertion order. With `document_id` set, only
    /// that document's chunks are considered.
    pub fn search_similar(
        &self,
        query: &[f32],
        top_k: usize,
        document_id: Option<&str>,
    ) -> Vec<(String, f32)> {
        let mut results: Vec<(String, f32)> = self
            .vectors
            .iter()
            .filter(|entry| document_id.map_or(true, |id| entry.document_id == id))
            .map(|entry| {
                (
                    entry.chunk_id.clone(),
                    cosine_similarity(query, &entry.vector),
                )
            })
            .collect();

        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        results
    }

    /// Resolve a chunk id to the chunk and its owning document.
    ///
    /// Linear scan over cached documents; fine at the document counts this
    /// cache is built for.
    pub fn find_chunk(&self, chunk_id: &str) -> Option<(&DocumentChunk, &Document)> {
        for document in self.documents.values() {
            if let Some(chunk) = document.chunks.iter().find(|c| c.id == chunk_id) {
                return Some((chunk, document));
            }
        }
        None
    }
}

fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let bytes = fs::read(path)?;

    if bytes.len() < 5 || &bytes[..4] != SNAPSHOT_MAGIC {
        bail!("not a cache snapshot: {}", path.display());
    }
    if bytes[4] != SNAPSHOT_VERSION {
        bail!("unsupported snapshot version: {}", bytes[4]);
    }

    Ok(bincode::deserialize(&bytes[5..])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn test_doc(id: &str, vectors: Vec<Option<Vec<f32>>>) -> Document {
        let chunks = vectors
            .into_iter()
            .enumerate()
            .map(|(i, embedding)| DocumentChunk {
                id: format!("{}-c{}", id, i),
                document_id: id.to_string(),
                content: format!("chunk {} of {}", i, id),
                page_number: 1,
                chunk_index: i,
                hash: String::new(),
                embedding,
            })
            .collect();

        Document {
            id: id.to_string(),
            filename: format!("{}.pdf", id),
            title: id.to_string(),
            total_pages: 1,
            chunks,
            processed_at: Utc::now(),
        }
    }

    #[test]
    fn test_add_and_get() {
        let dir = TempDir::new().unwrap();
        let mut cache = VectorCache::new(dir.path().to_path_buf());

        cache.add(test_doc("doc-a", vec![Some(vec![1.0, 0.0])]));

        let doc = cache.get("doc-a").unwrap();
        assert_eq!(doc.filename, "doc-a.pdf");
        assert_eq!(cache.document_count(), 1);
        assert_eq!(cache.chunk_count(), 1);
        assert!(cache.get("doc-b").is_none());
    }

    #[test]
    fn test_add_overwrite_replaces_vectors() {
        let dir = TempDir::new().unwrap();
        let mut cache = VectorCache::new(dir.path().to_path_buf());

        cache.add(test_doc(
            "doc-a",
            vec![Some(vec![1.0, 0.0]), Some(vec![0.9, 0.1])],
        ));

        // Re-adding the same id must replace the document and drop every
        // vector entry from the earlier version, not accumulate them.
        let mut replacement = test_doc("doc-a", vec![Some(vec![0.0, 1.0])]);
        replacement.chunks[0].id = "doc-a-new".to_string();
        cache.add(replacement);

        assert_eq!(cache.document_count(), 1);
        assert_eq!(cache.chunk_count(), 1);

        let results = cache.search_similar(&[1.0, 0.0], 10, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "doc-a-new");
    }

    #[test]
    fn test_search_orders_and_truncates() {
        let dir = TempDir::new().unwrap();
        let mut cache = VectorCache::new(dir.path().to_path_buf());

        cache.add(test_doc(
            "doc-a",
            vec![
                Some(vec![0.0, 1.0]),
                Some(vec![1.0, 0.0]),
                Some(vec![0.5, 0.5]),
            ],
        ));

        let results = cache.search_similar(&[1.0, 0.0], 2, None);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "doc-a-c1");
        assert!((results[0].1 - 1.0).abs() < 1e-6);
        assert_eq!(results[1].0, "doc-a-c2");
        assert!(results[0].1 >= results[1].1);
    }

    #[test]
    fn test_search_ties_keep_insertion_order() {
        let dir = TempDir::new().unwrap();
        let mut cache = VectorCache::new(dir.path().to_path_buf());

        cache.add(test_doc(
            "doc-a",
            vec![Some(vec![1.0, 0.0]), Some(vec![1.0, 0.0])],
        ));

        let results = cache.search_similar(&[1.0, 0.0], 10, None);
        assert_eq!(results[0].0, "doc-a-c0");
        assert_eq!(results[1].0, "doc-a-c1");
    }

    #[test]
    fn test_search_scoped_to_document() {
        let dir = TempDir::new().unwrap();
        let mut cache = VectorCache::new(dir.path().to_path_buf());

        cache.add(test_doc("doc-a", vec![Some(vec![1.0, 0.0])]));
        cache.add(test_doc("doc-b", vec![Some(vec![1.0, 0.0])]));

        let results = cache.search_similar(&[1.0, 0.0], 10, Some("doc-b"));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "doc-b-c0");
    }

    #[test]
    fn test_unembedded_chunks_are_not_searchable() {
        let dir = TempDir::new().unwrap();
        let mut cache = VectorCache::new(dir.path().to_path_buf());

        cache.add(test_doc("doc-a", vec![None, Some(vec![1.0, 0.0])]));

        let results = cache.search_similar(&[1.0, 0.0], 10, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "doc-a-c1");
        assert_eq!(cache.chunk_count(), 2);
    }

    #[test]
    fn test_remove_cascades_to_vectors() {
        let dir = TempDir::new().unwrap();
        let mut cache = VectorCache::new(dir.path().to_path_buf());

        cache.add(test_doc(
            "doc-a",
            vec![Some(vec![1.0, 0.0]), Some(vec![0.0, 1.0])],
        ));

        assert!(cache.remove("doc-a"));
        assert!(cache.get("doc-a").is_none());
        assert!(cache.search_similar(&[1.0, 0.0], 10, None).is_empty());
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut cache = VectorCache::new(dir.path().to_path_buf());

        assert!(!cache.remove("never-added"));
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = TempDir::new().unwrap();

        {
            let mut cache = VectorCache::new(dir.path().to_path_buf());
            cache.add(test_doc("doc-a", vec![Some(vec![1.0, 0.0])]));
        }

        let cache = VectorCache::new(dir.path().to_path_buf());
        assert_eq!(cache.document_count(), 1);
        assert_eq!(cache.get("doc-a").unwrap().title, "doc-a");

        let results = cache.search_similar(&[1.0, 0.0], 10, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "doc-a-c0");
    }

    #[test]
    fn test_corrupt_snapshot_starts_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(SNAPSHOT_FILE), b"definitely not a snapshot").unwrap();

        let cache = VectorCache::new(dir.path().to_path_buf());
        assert_eq!(cache.document_count(), 0);
    }

    #[test]
    fn test_clear_removes_snapshot() {
        let dir = TempDir::new().unwrap();
        let mut cache = VectorCache::new(dir.path().to_path_buf());

        cache.add(test_doc("doc-a", vec![Some(vec![1.0, 0.0])]));
        assert!(dir.path().join(SNAPSHOT_FILE).exists());

        cache.clear();
        assert_eq!(cache.document_count(), 0);
        assert!(!dir.path().join(SNAPSHOT_FILE).exists());

        let reopened = VectorCache::new(dir.path().to_path_buf());
        assert_eq!(reopened.document_count(), 0);
    }

    #[test]
    fn test_find_chunk_resolves_owner() {
        let dir = TempDir::new().unwrap();
        let mut cache = VectorCache::new(dir.path().to_path_buf());

        cache.add(test_doc("doc-a", vec![Some(vec![1.0, 0.0])]));

        let (chunk, document) = cache.find_chunk("doc-a-c0").unwrap();
        assert_eq!(chunk.document_id, "doc-a");
        assert_eq!(document.id, "doc-a");
        assert!(cache.find_chunk("missing").is_none());
    }
}
