//! DOCX paragraph extraction.
//!
//! A DOCX file is a ZIP container; the body lives in `word/document.xml`.
//! Each `w:p` becomes one paragraph string made of its `w:t` runs, with
//! `w:tab` as a tab and `w:br` as a newline. Paragraphs inside tables are
//! included in document order.

use std::io::{BufReader, Read, Seek};

use quick_xml::Reader;
use quick_xml::events::Event;
use zip::ZipArchive;

use crate::IngestError;

const BODY_PART: &str = "word/document.xml";

/// Read all paragraphs of a DOCX document, empty ones included.
pub fn paragraphs<R: Read + Seek>(reader: R) -> Result<Vec<String>, IngestError> {
    let mut archive =
        ZipArchive::new(reader).map_err(|e| IngestError::Docx(format!("not a ZIP container: {e}")))?;
    let part = archive
        .by_name(BODY_PART)
        .map_err(|_| IngestError::Docx(format!("missing {BODY_PART}")))?;
    parse_body(BufReader::new(part))
}

fn parse_body<R: std::io::BufRead>(input: R) -> Result<Vec<String>, IngestError> {
    let mut reader = Reader::from_reader(input);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"p" => current = Some(String::new()),
                b"t" => in_text = true,
                b"tab" => push(&mut current, "\t"),
                b"br" | b"cr" => push(&mut current, "\n"),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"p" => paragraphs.push(String::new()),
                b"tab" => push(&mut current, "\t"),
                b"br" | b"cr" => push(&mut current, "\n"),
                _ => {}
            },
            Ok(Event::Text(ref t)) if in_text => {
                let text = t
                    .unescape()
                    .map_err(|e| IngestError::Docx(format!("bad text run: {e}")))?;
                push(&mut current, &text);
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if let Some(p) = current.take() {
                        paragraphs.push(p);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(IngestError::Docx(format!(
                    "malformed XML at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs)
}

fn push(current: &mut Option<String>, text: &str) {
    if let Some(p) = current {
        p.push_str(text);
    }
}
