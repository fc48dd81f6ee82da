use std::path::Path;

use mupdf::{Document, Page, TextPageFlags};

use tocgen_core::{BackendError, PdfBackend};

/// MuPDF-based implementation of [`PdfBackend`].
///
/// This crate isolates the mupdf dependency (AGPL-3.0) so that DOCX-only
/// builds do not transitively depend on it.
#[derive(Debug, Default)]
pub struct MupdfBackend;

impl MupdfBackend {
    pub fn new() -> Self {
        Self
    }
}

/// Block/line iteration, one line of output per text line.
fn page_text(page: &Page) -> Result<String, mupdf::Error> {
    let text_page = page.to_text_page(TextPageFlags::empty())?;
    let mut text = String::new();
    for block in text_page.blocks() {
        for line in block.lines() {
            text.extend(line.chars().map(|c| c.char().unwrap_or('\u{FFFD}')));
            text.push('\n');
        }
    }
    Ok(text)
}

impl PdfBackend for MupdfBackend {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, BackendError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| BackendError::OpenError("invalid path encoding".into()))?;

        let document =
            Document::open(path_str).map_err(|e| BackendError::OpenError(e.to_string()))?;
        if document
            .needs_password()
            .map_err(|e| BackendError::OpenError(e.to_string()))?
        {
            return Err(BackendError::OpenError(
                "document is encrypted and needs a password".into(),
            ));
        }

        let mut pages = Vec::new();
        let mut failed = 0;
        for (index, page_result) in document
            .pages()
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?
            .enumerate()
        {
            let text = match page_result.and_then(|page| page_text(&page)) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        page = index + 1,
                        error = %e,
                        "page text unreadable, keeping it empty"
                    );
                    failed += 1;
                    String::new()
                }
            };
            pages.push(text);
        }

        check_pages(pages.len(), failed)?;
        tracing::debug!(path = %path.display(), pages = pages.len(), failed, "extracted PDF pages");
        Ok(pages)
    }
}

/// A document with no pages, or whose every page failed, is unreadable as a
/// whole. Pages that merely carry no text are fine here.
fn check_pages(total: usize, failed: usize) -> Result<(), BackendError> {
    if total == 0 {
        return Err(BackendError::ExtractionError("document has no pages".into()));
    }
    if failed == total {
        return Err(BackendError::ExtractionError(format!(
            "none of the {total} pages could be read"
        )));
    }
    Ok(())
}
