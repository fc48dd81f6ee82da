use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for PDF text extraction backends.
///
/// Implementors return one string per page, in page order. A page whose text
/// cannot be read comes back empty rather than failing the whole document;
/// encrypted files and files where no page can be read are errors.
pub trait PdfBackend: Send + Sync {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, BackendError>;
}
