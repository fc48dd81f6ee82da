//! Text windowing: choose which slices of a document the model gets to see.
//!
//! Every strategy returns an ordered list of [`TextWindow`]s. A window is one
//! dispatchable unit of work; its `text` is what goes into the user turn.
//! Flow documents (DOCX) have no pagination and always come back as a single
//! untagged window, whatever strategy is configured.

use std::fmt;

use thiserror::Error;

use crate::document::Document;

/// Default page marker; `{n}` is replaced with the 1-based page number.
pub const DEFAULT_PAGE_MARKER: &str = "--- PAGE {n} ---";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("document contains no extractable text")]
    EmptyText,
    #[error("invalid windowing parameter: {0}")]
    InvalidParameter(String),
}

/// Where a segment's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentSource {
    /// A single 1-based page.
    Page(usize),
    /// A chunk of running text, or a whole flow document.
    Untagged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    pub text: String,
    pub source: SegmentSource,
}

/// One unit of text dispatched to the completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextWindow {
    pub segments: Vec<TextSegment>,
    /// Rendered text of all segments, page markers included.
    pub text: String,
}

impl TextWindow {
    /// 1-based page numbers covered by this window, in order.
    pub fn pages(&self) -> Vec<usize> {
        self.segments
            .iter()
            .filter_map(|s| match s.source {
                SegmentSource::Page(n) => Some(n),
                SegmentSource::Untagged => None,
            })
            .collect()
    }

    /// Short human-readable description, e.g. `pages 1-10`, or `text` for untagged chunks.
    pub fn label(&self) -> String {
        let pages = self.pages();
        match (pages.first(), pages.last()) {
            (Some(first), Some(last)) if first == last => format!("page {first}"),
            (Some(first), Some(last)) => format!("pages {first}-{last}"),
            _ => "text".to_string(),
        }
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    fn has_text(&self) -> bool {
        self.segments.iter().any(|s| !s.text.trim().is_empty())
    }
}

/// Which pages the budget chunkers read before splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageSelection {
    #[default]
    All,
    HeadTail {
        head: usize,
        tail: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStrategy {
    /// First `head` pages, plus the last `tail` pages when the document is longer.
    HeadTail { head: usize, tail: usize },
    /// Paragraph-aligned chunks of at most `budget` characters.
    CharBudget { budget: usize, pages: PageSelection },
    /// Word-aligned chunks of at most `budget` (word length + 1) units.
    WordBudget { budget: usize, pages: PageSelection },
    /// Contiguous blocks of `pages_per_block` pages.
    PageBlocks { pages_per_block: usize },
}

impl fmt::Display for WindowStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowStrategy::HeadTail { head, tail } => write!(f, "head-tail({head}+{tail})"),
            WindowStrategy::CharBudget { budget, .. } => write!(f, "char-budget({budget})"),
            WindowStrategy::WordBudget { budget, .. } => write!(f, "word-budget({budget})"),
            WindowStrategy::PageBlocks { pages_per_block } => {
                write!(f, "page-blocks({pages_per_block})")
            }
        }
    }
}

impl WindowStrategy {
    fn validate(&self) -> Result<(), WindowError> {
        match *self {
            WindowStrategy::HeadTail { head: 0, tail: 0 } => Err(WindowError::InvalidParameter(
                "head and tail page counts are both zero".into(),
            )),
            WindowStrategy::CharBudget { budget: 0, .. }
            | WindowStrategy::WordBudget { budget: 0, .. } => Err(
                WindowError::InvalidParameter("chunk budget must be greater than zero".into()),
            ),
            WindowStrategy::PageBlocks { pages_per_block: 0 } => Err(
                WindowError::InvalidParameter("block size must be greater than zero".into()),
            ),
            _ => Ok(()),
        }
    }
}

/// Split `document` into windows according to `strategy`.
///
/// `page_marker` is a template such as [`DEFAULT_PAGE_MARKER`] written above
/// each page's text; `None` renders pages without markers.
pub fn window(
    document: &Document,
    strategy: &WindowStrategy,
    page_marker: Option<&str>,
) -> Result<Vec<TextWindow>, WindowError> {
    strategy.validate()?;

    let windows = match document {
        Document::Flow { .. } => {
            let text = document.full_text();
            vec![TextWindow {
                segments: vec![TextSegment {
                    text: text.clone(),
                    source: SegmentSource::Untagged,
                }],
                text,
            }]
        }
        Document::Paged { .. } => match *strategy {
            WindowStrategy::HeadTail { head, tail } => {
                let (head_range, tail_range) = head_tail_ranges(document.page_count(), head, tail);
                [head_range, tail_range]
                    .into_iter()
                    .filter(|r| !r.is_empty())
                    .map(|r| page_window(document, r, page_marker))
                    .collect()
            }
            WindowStrategy::CharBudget { budget, pages } => {
                let text = render_selection(document, pages, page_marker);
                chunk_by_chars(&text, budget)
                    .into_iter()
                    .map(untagged_window)
                    .collect()
            }
            WindowStrategy::WordBudget { budget, pages } => {
                let text = render_selection(document, pages, page_marker);
                chunk_by_words(&text, budget)
                    .into_iter()
                    .map(untagged_window)
                    .collect()
            }
            WindowStrategy::PageBlocks { pages_per_block } => {
                let total = document.page_count();
                (0..total)
                    .step_by(pages_per_block)
                    .map(|start| {
                        page_window(
                            document,
                            start..(start + pages_per_block).min(total),
                            page_marker,
                        )
                    })
                    .collect()
            }
        },
    };

    if !windows.iter().any(TextWindow::has_text) {
        return Err(WindowError::EmptyText);
    }

    tracing::debug!(
        document = document.name(),
        %strategy,
        windows = windows.len(),
        "windowed document"
    );
    Ok(windows)
}

/// 0-based head and tail page ranges. The tail never re-includes a head page.
pub fn head_tail_ranges(
    total: usize,
    head: usize,
    tail: usize,
) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
    let head_end = head.min(total);
    if total <= head {
        return (0..head_end, head_end..head_end);
    }
    let tail_start = total.saturating_sub(tail).max(head);
    (0..head_end, tail_start..total)
}

fn selected_pages(total: usize, selection: PageSelection) -> Vec<usize> {
    match selection {
        PageSelection::All => (0..total).collect(),
        PageSelection::HeadTail { head, tail } => {
            let (h, t) = head_tail_ranges(total, head, tail);
            h.chain(t).collect()
        }
    }
}

fn render_page(number: usize, text: &str, page_marker: Option<&str>) -> String {
    match page_marker {
        Some(template) => format!(
            "{}\n{}\n\n",
            template.replace("{n}", &number.to_string()),
            text
        ),
        None => format!("{text}\n\n"),
    }
}

fn render_selection(
    document: &Document,
    selection: PageSelection,
    page_marker: Option<&str>,
) -> String {
    selected_pages(document.page_count(), selection)
        .into_iter()
        .map(|i| render_page(i + 1, document.page_text(i), page_marker))
        .collect()
}

fn page_window(
    document: &Document,
    range: std::ops::Range<usize>,
    page_marker: Option<&str>,
) -> TextWindow {
    let mut segments = Vec::with_capacity(range.len());
    let mut text = String::new();
    for i in range {
        let page_text = document.page_text(i);
        text.push_str(&render_page(i + 1, page_text, page_marker));
        segments.push(TextSegment {
            text: page_text.to_string(),
            source: SegmentSource::Page(i + 1),
        });
    }
    TextWindow { segments, text }
}

fn untagged_window(text: String) -> TextWindow {
    TextWindow {
        segments: vec![TextSegment {
            text: text.clone(),
            source: SegmentSource::Untagged,
        }],
        text,
    }
}

/// Greedy paragraph packing under a character budget.
///
/// Paragraphs keep their trailing newline, so the chunks concatenate back to
/// `text` exactly. A paragraph longer than `budget` becomes a chunk on its own.
pub fn chunk_by_chars(text: &str, budget: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for paragraph in text.split_inclusive('\n') {
        let len = paragraph.chars().count();
        if current_len > 0 && current_len + len > budget {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(paragraph);
        current_len += len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Greedy word packing; each word costs its length plus one separator.
pub fn chunk_by_words(text: &str, budget: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let cost = word.chars().count() + 1;
        if current_len > 0 && current_len + cost > budget {
            chunks.push(current.join(" "));
            current.clear();
            current_len = 0;
        }
        current.push(word);
        current_len += cost;
    }
    if !current.is_empty() {
        chunks.push(current.join(" "));
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_pdf(pages: usize) -> Document {
        Document::paged(
            "book.pdf",
            (1..=pages).map(|i| format!("text of page {i}")).collect(),
        )
    }

    fn all_pages(windows: &[TextWindow]) -> Vec<usize> {
        windows.iter().flat_map(|w| w.pages()).collect()
    }

    #[test]
    fn head_tail_never_repeats_pages() {
        for total in 0..40 {
            for head in 0..12 {
                for tail in 0..12 {
                    let (h, t) = head_tail_ranges(total, head, tail);
                    let pages: Vec<usize> = h.chain(t).collect();
                    let mut dedup = pages.clone();
                    dedup.dedup();
                    assert_eq!(pages, dedup, "P={total} H={head} T={tail}");
                    let expected = if total > head + tail {
                        head + tail
                    } else {
                        total
                    };
                    assert_eq!(pages.len(), expected, "P={total} H={head} T={tail}");
                }
            }
        }
    }

    #[test]
    fn short_pdf_yields_single_head_window() {
        let doc = numbered_pdf(10);
        let windows = window(
            &doc,
            &WindowStrategy::HeadTail { head: 25, tail: 25 },
            None,
        )
        .unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].pages(), (1..=10).collect::<Vec<_>>());
        assert_eq!(windows[0].label(), "pages 1-10");
    }

    #[test]
    fn long_pdf_yields_head_and_tail_windows() {
        let doc = numbered_pdf(100);
        let windows = window(
            &doc,
            &WindowStrategy::HeadTail { head: 30, tail: 25 },
            Some(DEFAULT_PAGE_MARKER),
        )
        .unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].pages(), (1..=30).collect::<Vec<_>>());
        assert_eq!(windows[1].pages(), (76..=100).collect::<Vec<_>>());
        assert!(windows[1].text.starts_with("--- PAGE 76 ---\ntext of page 76\n\n"));
    }

    #[test]
    fn overlapping_tail_is_clamped_to_head() {
        let doc = numbered_pdf(40);
        let windows = window(
            &doc,
            &WindowStrategy::HeadTail { head: 30, tail: 25 },
            None,
        )
        .unwrap();
        assert_eq!(all_pages(&windows), (1..=40).collect::<Vec<_>>());
    }

    #[test]
    fn missing_page_text_is_empty_not_error() {
        let doc = Document::paged("scan.pdf", vec!["".into(), "Contents".into(), "".into()]);
        let windows = window(&doc, &WindowStrategy::HeadTail { head: 5, tail: 0 }, None).unwrap();
        assert_eq!(windows[0].segments.len(), 3);
        assert_eq!(windows[0].segments[0].text, "");
    }

    #[test]
    fn char_chunks_reconstruct_text() {
        let text = "Spis treści\n1. Wstęp 5\n1.1 Tło 7\n\n2. Metody 12\nbardzo długi akapit bez przerw który przekracza budżet\nkoniec";
        for budget in [1, 5, 10, 20, 40, 1000] {
            let chunks = chunk_by_chars(text, budget);
            assert_eq!(chunks.concat(), text, "budget {budget}");
            for chunk in &chunks[..chunks.len() - 1] {
                let len = chunk.chars().count();
                let single_paragraph = chunk.split_inclusive('\n').count() == 1;
                assert!(len <= budget || single_paragraph, "budget {budget}: {chunk:?}");
            }
        }
    }

    #[test]
    fn char_chunks_emit_trailing_partial() {
        let chunks = chunk_by_chars("aaaa\nbbbb\ncc", 10);
        assert_eq!(chunks, vec!["aaaa\nbbbb\n".to_string(), "cc".to_string()]);
    }

    #[test]
    fn word_chunks_break_on_words() {
        let chunks = chunk_by_words("alpha beta  gamma\ndelta", 12);
        assert_eq!(chunks, vec!["alpha beta", "gamma delta"]);
        let chunks = chunk_by_words("extraordinarily long", 5);
        assert_eq!(chunks, vec!["extraordinarily", "long"]);
    }

    #[test]
    fn budget_strategy_reads_selected_pages() {
        let doc = numbered_pdf(100);
        let windows = window(
            &doc,
            &WindowStrategy::CharBudget {
                budget: 6000,
                pages: PageSelection::HeadTail { head: 30, tail: 25 },
            },
            Some(DEFAULT_PAGE_MARKER),
        )
        .unwrap();
        let text: String = windows.iter().map(|w| w.text.as_str()).collect();
        assert!(text.contains("--- PAGE 30 ---"));
        assert!(!text.contains("--- PAGE 31 ---"));
        assert!(text.contains("--- PAGE 76 ---"));
        assert!(windows.iter().all(|w| w.pages().is_empty()));
    }

    #[test]
    fn page_blocks_cover_range_in_order() {
        let doc = numbered_pdf(60);
        let windows = window(&doc, &WindowStrategy::PageBlocks { pages_per_block: 10 }, None).unwrap();
        assert_eq!(windows.len(), 6);
        assert_eq!(windows[5].pages(), (51..=60).collect::<Vec<_>>());

        let doc = numbered_pdf(23);
        let windows = window(&doc, &WindowStrategy::PageBlocks { pages_per_block: 10 }, None).unwrap();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[2].pages(), vec![21, 22, 23]);
    }

    #[test]
    fn flow_document_is_one_window_for_every_strategy() {
        let doc = Document::flow("a.docx", vec!["Spis treści".into(), "1. Wstęp 5".into()]);
        for strategy in [
            WindowStrategy::HeadTail { head: 1, tail: 1 },
            WindowStrategy::CharBudget {
                budget: 3,
                pages: PageSelection::All,
            },
            WindowStrategy::PageBlocks { pages_per_block: 1 },
        ] {
            let windows = window(&doc, &strategy, Some(DEFAULT_PAGE_MARKER)).unwrap();
            assert_eq!(windows.len(), 1);
            assert_eq!(windows[0].segments[0].source, SegmentSource::Untagged);
            assert_eq!(windows[0].text, "Spis treści\n1. Wstęp 5");
        }
    }

    #[test]
    fn blank_document_is_empty_text_error() {
        let doc = Document::paged("blank.pdf", vec!["   ".into(), "\n".into()]);
        let err = window(&doc, &WindowStrategy::PageBlocks { pages_per_block: 1 }, None).unwrap_err();
        assert_eq!(err, WindowError::EmptyText);

        let doc = Document::flow("blank.docx", vec![]);
        let err = window(&doc, &WindowStrategy::HeadTail { head: 3, tail: 0 }, None).unwrap_err();
        assert_eq!(err, WindowError::EmptyText);
    }

    #[test]
    fn zero_parameters_are_rejected() {
        let doc = numbered_pdf(3);
        assert!(matches!(
            window(&doc, &WindowStrategy::PageBlocks { pages_per_block: 0 }, None),
            Err(WindowError::InvalidParameter(_))
        ));
        assert!(matches!(
            window(
                &doc,
                &WindowStrategy::WordBudget {
                    budget: 0,
                    pages: PageSelection::All
                },
                None
            ),
            Err(WindowError::InvalidParameter(_))
        ));
    }
}
