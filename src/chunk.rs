//! Page-scoped overlapping text chunker.
//!
//! Splits each page's text into windows of `chunk_size` characters with
//! `overlap` characters re-read between consecutive windows. A window is cut
//! back to the last `.` or newline when that boundary falls past the window
//! midpoint, so chunks tend to end on a sentence instead of mid-word. Chunks
//! never span two pages.
//!
//! Each chunk receives a fresh UUID plus a SHA-256 hash of its content for
//! staleness detection.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::extract::PageText;
use crate::models::DocumentChunk;

/// Split one page's text into overlapping windows.
///
/// Text at or under `chunk_size` characters comes back as a single window.
/// Longer text is cut into windows of `chunk_size` characters; each window
/// except the last is shortened to end just after the last `.` or newline
/// when that boundary lies past the window midpoint. Windows are trimmed of
/// surrounding whitespace, and windows left empty by trimming are dropped.
pub fn split_page(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();

    if n == 0 {
        return Vec::new();
    }
    if n <= chunk_size {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        return vec![trimmed.to_string()];
    }

    let mut windows = Vec::new();
    let mut start = 0usize;

    while start < n {
        // Logical window end; may overshoot the text. The overlap step works
        // from this value, so it is clamped only when slicing.
        let mut end = start + chunk_size;

        if end < n {
            let boundary = chars[start..end]
                .iter()
                .rposition(|&c| c == '.' || c == '\n');
            if let Some(b) = boundary {
                if b > chunk_size / 2 {
                    end = start + b + 1;
                }
            }
        }

        let window: String = chars[start..end.min(n)].iter().collect();
        let trimmed = window.trim();
        if !trimmed.is_empty() {
            windows.push(trimmed.to_string());
        }

        // A boundary cut combined with an overlap near chunk_size could step
        // start backward; never re-enter a window already emitted.
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    windows
}

/// Chunk every page of a document.
///
/// `chunk_index` increases across the whole document, continuing through
/// page boundaries rather than resetting per page.
pub fn chunk_pages(
    document_id: &str,
    pages: &[PageText],
    config: &ChunkingConfig,
) -> Vec<DocumentChunk> {
    let mut chunks = Vec::new();

    for page in pages {
        for window in split_page(&page.text, config.chunk_size, config.overlap) {
            let index = chunks.len();
            chunks.push(make_chunk(document_id, index, page.page_number, window));
        }
    }

    chunks
}

fn make_chunk(
    document_id: &str,
    index: usize,
    page_number: u32,
    content: String,
) -> DocumentChunk {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    DocumentChunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        content,
        page_number,
        chunk_index: index,
        hash,
        embedding: None,
    }
}
