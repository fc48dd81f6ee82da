use std::io::{Cursor, Write};

use tocgen_core::{Document, WindowStrategy, window};
use tocgen_ingest::{IngestError, load_bytes, load_document};

fn sample_docx() -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut out);
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(
            br#"<?xml version="1.0"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:r><w:t>Table of contents</w:t></w:r></w:p>
<w:p><w:r><w:t>1. Research context</w:t><w:tab/><w:t>15</w:t></w:r></w:p>
</w:body></w:document>"#,
        )
        .unwrap();
        zip.finish().unwrap();
    }
    out.into_inner()
}

#[test]
fn uploaded_docx_becomes_flow_document() {
    let doc = load_bytes("thesis.docx", &sample_docx()).unwrap();
    assert!(matches!(doc, Document::Flow { .. }));
    assert_eq!(doc.name(), "thesis.docx");
    assert_eq!(
        doc.full_text(),
        "Table of contents\n1. Research context\t15"
    );
}

#[test]
fn docx_on_disk_is_windowed_as_one_unit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("thesis.docx");
    std::fs::write(&path, sample_docx()).unwrap();

    let doc = load_document(&path).unwrap();
    let windows = window(&doc, &WindowStrategy::PageBlocks { pages_per_block: 1 }, None).unwrap();
    assert_eq!(windows.len(), 1);
    assert!(windows[0].text.contains("Research context"));
}

#[test]
fn unsupported_upload_is_rejected() {
    let err = load_bytes("notes.txt", b"plain text").unwrap_err();
    assert!(matches!(err, IngestError::Unsupported(name) if name == "notes.txt"));
}

#[test]
fn missing_file_is_io_error() {
    let err = load_document(std::path::Path::new("/nonexistent/thesis.docx")).unwrap_err();
    assert!(matches!(err, IngestError::Io(_)));
}
