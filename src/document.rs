// src/document.rs

use crate::error::{Error, Result};
use lopdf::Document;
use tracing::{info, warn};

/// Text of a source document, one entry per page in reading order.
#[derive(Debug, Clone, Default)]
pub struct DocumentText {
    pub pages: Vec<String>,
}

impl DocumentText {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            pages: vec![text.into()],
        }
    }

    /// All pages concatenated in page order, newline separated.
    pub fn full_text(&self) -> String {
        self.pages.join("\n")
    }

    fn meaningful_chars(&self) -> usize {
        self.pages
            .iter()
            .map(|p| p.chars().filter(|c| !c.is_whitespace()).count())
            .sum()
    }
}

/// Minimum number of non-whitespace characters we expect from a
/// "real" text PDF. Below this threshold the per-page pass is discarded.
const MIN_TEXT_CHARS: usize = 30;

/// Main entry point: takes raw PDF bytes and returns the per-page text.
pub fn extract_text_from_pdf(pdf_bytes: &[u8]) -> Result<DocumentText> {
    // --- Phase 1: structural check with lopdf ---
    let doc = Document::load_mem(pdf_bytes)
        .map_err(|e| Error::Pdf(format!("Failed to parse PDF: {e}")))?;

    if looks_like_scanned(&doc) {
        info!("PDF structural check: likely scanned / image-only");
        return Err(Error::ScannedDocument);
    }

    // --- Phase 2: page by page, in page order ---
    let pages = doc.get_pages();
    let mut text = DocumentText::default();
    for (idx, page_num) in pages.keys().enumerate() {
        if (idx + 1) % 50 == 0 {
            info!(page = idx + 1, total = pages.len(), "Reading pages");
        }
        match doc.extract_text(&[*page_num]) {
            Ok(page_text) => text.pages.push(page_text),
            Err(e) => {
                warn!(page = page_num, error = %e, "Page text extraction failed");
                text.pages.push(String::new());
            }
        }
    }

    if text.meaningful_chars() >= MIN_TEXT_CHARS {
        info!(
            pages = text.pages.len(),
            chars = text.meaningful_chars(),
            "Text extracted successfully"
        );
        return Ok(text);
    }

    // --- Phase 3: whole-document fallback ---
    warn!(
        chars = text.meaningful_chars(),
        "Per-page text too short, retrying with pdf-extract"
    );
    match pdf_extract::extract_text_from_mem(pdf_bytes) {
        Ok(full) => {
            let text = DocumentText::from_text(full);
            if text.meaningful_chars() < MIN_TEXT_CHARS {
                Err(Error::ScannedDocument)
            } else {
                Ok(text)
            }
        }
        Err(e) => Err(Error::Pdf(format!("pdf-extract failed: {e}"))),
    }
}

/// Share of image-only pages above which the document counts as scanned.
const SCANNED_RATIO: f64 = 0.8;

/// A page with XObject images in its `Resources` but no fonts is a scan.
fn looks_like_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false;
    }

    let mut image_only_pages = 0;

    for object_id in pages.values() {
        let Ok(page_obj) = doc.get_object(*object_id) else {
            continue;
        };
        let Ok(page_dict) = page_obj.as_dict() else {
            continue;
        };

        let resources = page_dict
            .get(b"Resources")
            .ok()
            .and_then(|r| doc.dereference(r).ok())
            .and_then(|(_, resolved)| resolved.as_dict().ok());

        let has_entries = |key: &[u8]| {
            resources
                .and_then(|res| res.get(key).ok())
                .and_then(|o| doc.dereference(o).ok())
                .and_then(|(_, resolved)| resolved.as_dict().ok())
                .is_some_and(|d| !d.is_empty())
        };

        if has_entries(b"XObject") && !has_entries(b"Font") {
            image_only_pages += 1;
        }
    }

    let total = pages.len();
    let ratio = image_only_pages as f64 / total as f64;
    info!(
        total_pages = total,
        image_only = image_only_pages,
        ratio = format!("{ratio:.2}"),
        "Scanned-page analysis"
    );

    ratio >= SCANNED_RATIO
}
