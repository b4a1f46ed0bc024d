//! Document processing pipeline.
//!
//! Turns a filename plus raw PDF bytes into a fully assembled [`Document`]:
//! extract per-page text, chunk each page, embed every chunk in one batch,
//! and stamp the result. Processing is synchronous and CPU-bound; async
//! callers run it on a blocking thread.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::chunk::chunk_pages;
use crate::config::ChunkingConfig;
use crate::embedding::EmbeddingService;
use crate::extract::pdf_pages;
use crate::models::Document;

/// Derive a display title from a filename by stripping one trailing `.pdf`
/// (any case). Other extensions are left alone.
pub fn derive_title(filename: &str) -> String {
    if filename.to_ascii_lowercase().ends_with(".pdf") {
        filename[..filename.len() - 4].to_string()
    } else {
        filename.to_string()
    }
}

/// Process a PDF into a [`Document`] with embedded chunks.
///
/// Fails when the PDF is unreadable or no page yields text. Embedding-layer
/// degradation never fails processing; every chunk always comes back with a
/// vector from whichever backend is active.
pub fn process_document(
    filename: &str,
    bytes: &[u8],
    chunking: &ChunkingConfig,
    embedder: &EmbeddingService,
) -> Result<Document> {
    info!("Extracting text from {}", filename);
    let pages = pdf_pages(bytes).with_context(|| format!("Failed to process {}", filename))?;
    let total_pages = pages.len() as u32;

    let document_id = Uuid::new_v4().to_string();

    info!("Chunking text from {} pages", pages.len());
    let mut chunks = chunk_pages(&document_id, &pages, chunking);
    if chunks.is_empty() {
        bail!("no chunks produced from {}", filename);
    }

    info!("Generating embeddings for {} chunks", chunks.len());
    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let embeddings = embedder.encode(&texts);
    for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
        chunk.embedding = Some(embedding);
    }

    Ok(Document {
        id: document_id,
        filename: filename.to_string(),
        title: derive_title(filename),
        total_pages,
        chunks,
        processed_at: Utc::now(),
    })
}
