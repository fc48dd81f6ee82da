//! Loaded documents: the read-only text source the windower works from.

/// A loaded document, immutable once built.
///
/// PDFs are `Paged`: one text entry per page, with pages that yielded no
/// text stored as empty strings. DOCX files are `Flow`: an ordered list of
/// paragraphs with no pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Document {
    Paged { name: String, pages: Vec<String> },
    Flow { name: String, paragraphs: Vec<String> },
}

impl Document {
    pub fn paged(name: impl Into<String>, pages: Vec<String>) -> Self {
        Document::Paged {
            name: name.into(),
            pages,
        }
    }

    pub fn flow(name: impl Into<String>, paragraphs: Vec<String>) -> Self {
        Document::Flow {
            name: name.into(),
            paragraphs,
        }
    }

    /// The identity the session store compares on re-submission (file name).
    pub fn name(&self) -> &str {
        match self {
            Document::Paged { name, .. } | Document::Flow { name, .. } => name,
        }
    }

    /// Number of pages; `0` for flow documents.
    pub fn page_count(&self) -> usize {
        match self {
            Document::Paged { pages, .. } => pages.len(),
            Document::Flow { .. } => 0,
        }
    }

    /// Text of the 0-based page `index`. Out-of-range pages read as empty.
    pub fn page_text(&self, index: usize) -> &str {
        match self {
            Document::Paged { pages, .. } => pages.get(index).map(String::as_str).unwrap_or(""),
            Document::Flow { .. } => "",
        }
    }

    /// Whole-document text: pages joined by blank lines, paragraphs by newlines.
    pub fn full_text(&self) -> String {
        match self {
            Document::Paged { pages, .. } => pages.join("\n\n"),
            Document::Flow { paragraphs, .. } => paragraphs.join("\n"),
        }
    }
}
