//! PDF text extraction.
//!
//! Wraps [`pdf_extract`] to pull text out of an in-memory PDF one page at a
//! time. Pages whose text is blank after trimming are dropped, but surviving
//! pages keep their 1-based positions in the source document so citations
//! stay accurate.

use std::fmt;

/// Text recovered from a single PDF page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    /// Extracted text, trimmed of surrounding whitespace.
    pub text: String,
    /// 1-based position of the page in the source document.
    pub page_number: u32,
}

#[derive(Debug)]
pub enum ExtractError {
    /// The bytes could not be parsed as a PDF, or text extraction failed.
    Pdf(String),
    /// The PDF parsed, but no page produced any text (e.g. scanned images).
    NoText,
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::NoText => write!(f, "no extractable text in any page"),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extracts per-page text from PDF bytes.
///
/// Returns one [`PageText`] per page that contains non-blank text; a blank
/// page 2 leaves pages 1 and 3 numbered as such. A document where every
/// page is blank yields [`ExtractError::NoText`].
pub fn pdf_pages(bytes: &[u8]) -> Result<Vec<PageText>, ExtractError> {
    let raw_pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let pages: Vec<PageText> = raw_pages
        .into_iter()
        .enumerate()
        .filter_map(|(i, text)| {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return None;
            }
            Some(PageText {
                text: trimmed.to_string(),
                page_number: (i + 1) as u32,
            })
        })
        .collect();

    if pages.is_empty() {
        return Err(ExtractError::NoText);
    }

    Ok(pages)
}
