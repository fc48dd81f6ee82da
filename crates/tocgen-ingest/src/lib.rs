//! Document ingestion: turn an uploaded PDF or DOCX into a [`Document`].

use std::io::{Cursor, Read, Seek};
use std::path::Path;

use thiserror::Error;
use tocgen_core::Document;

pub mod docx;

pub use tocgen_core::BackendError;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("PDF extraction error: {0}")]
    Pdf(#[from] BackendError),
    #[error("DOCX extraction error: {0}")]
    Docx(String),
    #[error("unsupported file type: {0} (expected .pdf or .docx)")]
    Unsupported(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(not(feature = "pdf"))]
    #[error("PDF support not compiled in (enable the `pdf` feature of tocgen-ingest)")]
    NoPdfSupport,
}

/// The kind of an input document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
}

/// Detect document kind from magic bytes, falling back to the extension.
///
/// PDFs start with `%PDF-`; DOCX files are ZIP containers (`PK`).
pub fn detect_kind(filename: &str, head: &[u8]) -> Result<DocumentKind, IngestError> {
    if head.starts_with(b"%PDF-") {
        return Ok(DocumentKind::Pdf);
    }
    let lower = filename.to_lowercase();
    if head.starts_with(b"PK") && !lower.ends_with(".pdf") {
        return Ok(DocumentKind::Docx);
    }
    if head.is_empty() {
        if lower.ends_with(".pdf") {
            return Ok(DocumentKind::Pdf);
        }
        if lower.ends_with(".docx") {
            return Ok(DocumentKind::Docx);
        }
    }
    Err(IngestError::Unsupported(filename.to_string()))
}

/// Load a document from disk.
pub fn load_document(path: &Path) -> Result<Document, IngestError> {
    let name = display_name(path);
    let mut head = [0u8; 8];
    let read = std::fs::File::open(path)?.read(&mut head)?;

    match detect_kind(&name, &head[..read])? {
        DocumentKind::Pdf => load_pdf(path, name),
        DocumentKind::Docx => {
            let file = std::fs::File::open(path)?;
            load_docx(file, name)
        }
    }
}

/// Load a document from an in-memory upload. PDFs are spooled to a
/// temporary file because the backend reads from disk.
pub fn load_bytes(filename: &str, data: &[u8]) -> Result<Document, IngestError> {
    match detect_kind(filename, data)? {
        DocumentKind::Pdf => {
            let mut tmp = tempfile::Builder::new()
                .prefix("tocgen-")
                .suffix(".pdf")
                .tempfile()?;
            std::io::Write::write_all(&mut tmp, data)?;
            load_pdf(tmp.path(), filename.to_string())
        }
        DocumentKind::Docx => load_docx(Cursor::new(data), filename.to_string()),
    }
}

fn load_docx<R: Read + Seek>(reader: R, name: String) -> Result<Document, IngestError> {
    let paragraphs = docx::paragraphs(reader)?;
    tracing::info!(document = %name, paragraphs = paragraphs.len(), "loaded DOCX");
    Ok(Document::flow(name, paragraphs))
}

#[cfg(feature = "pdf")]
fn load_pdf(path: &Path, name: String) -> Result<Document, IngestError> {
    use tocgen_core::PdfBackend;

    let pages = tocgen_pdf_mupdf::MupdfBackend::new().extract_pages(path)?;
    tracing::info!(document = %name, pages = pages.len(), "loaded PDF");
    Ok(Document::paged(name, pages))
}

#[cfg(not(feature = "pdf"))]
fn load_pdf(_path: &Path, _name: String) -> Result<Document, IngestError> {
    Err(IngestError::NoPdfSupport)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes_win_over_extension() {
        assert_eq!(
            detect_kind("scan.docx", b"%PDF-1.7").unwrap(),
            DocumentKind::Pdf
        );
        assert_eq!(
            detect_kind("thesis.docx", b"PK\x03\x04").unwrap(),
            DocumentKind::Docx
        );
        assert_eq!(detect_kind("thesis", b"PK\x03\x04").unwrap(), DocumentKind::Docx);
    }

    #[test]
    fn extension_used_only_without_content() {
        assert_eq!(detect_kind("a.PDF", b"").unwrap(), DocumentKind::Pdf);
        assert!(matches!(
            detect_kind("notes.txt", b"hello"),
            Err(IngestError::Unsupported(_))
        ));
        assert!(matches!(
            detect_kind("fake.pdf", b"PK\x03\x04"),
            Err(IngestError::Unsupported(_))
        ));
    }
}
