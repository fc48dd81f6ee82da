//! Built-in instruction prompts.

/// Default system instruction: a complete TOC as one HTML table.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an assistant that turns the table of contents of an uploaded PDF or DOCX document into HTML.

Find the table of contents in the supplied text, recognise every level of its hierarchy (chapters, sections, subsections) and produce one HTML table that is ready to copy. Use only data present in the document; do not add, rename or reorder entries, and keep page numbers exactly as printed. Generate the whole table of contents, not just a fragment.

Steps:
1. Locate the table of contents in the text.
2. For every entry identify the title, the page number and its level. Keep chapter numbers together with their full names.
3. Emit the table in exactly this format. Wrap only top-level chapters in <strong></strong> and add an empty row <tr><td> </td><td> </td></tr> after each of them. Subsection rows are plain.
<table>
  <caption>Table of contents "PUBLICATION TITLE"</caption>
  <tr>
    <th><strong>Contents</strong></th>
    <th>Page</th>
  </tr>
  <tr>
    <td><strong>List of abbreviations</strong></td>
    <td>11</td>
  </tr>
  <tr><td> </td><td> </td></tr>
  <tr>
    <td><strong>1. Research context</strong></td>
    <td>15</td>
  </tr>
  <tr><td> </td><td> </td></tr>
  <tr>
    <td>1.1 Evolution of artificial intelligence</td>
    <td>25</td>
  </tr>
  ...
</table>
4. Do not add CSS.
5. Replace PUBLICATION TITLE with the full title of the book, including its subtitle if there is one.
6. If the document has no table of contents, say that it could not be detected instead of producing a table."#;

/// Default user turn asking the model to resume a truncated answer.
pub const DEFAULT_CONTINUE_PROMPT: &str =
    "Continue the table of contents exactly from where you left off. Do not repeat rows you have already produced.";

/// Appended to the system instruction when a continuation marker is in use.
pub fn marker_instruction(marker: &str) -> String {
    format!(
        "\n\nIf the table of contents does not fit in this answer, stop at a row boundary and end your answer with the literal text {marker}. Omit {marker} once the table is complete."
    )
}

/// The system instruction for a run: `base` plus the marker clause when a
/// marker is configured.
pub fn system_instruction(base: &str, marker: Option<&str>) -> String {
    match marker {
        Some(m) => format!("{base}{}", marker_instruction(m)),
        None => base.to_string(),
    }
}
