//! Text extraction for resume uploads.
//!
//! Plain text passes through; PDF goes through `pdf-extract`; DOCX is read
//! as a zip archive by walking the text runs of `word/document.xml`.
//! Extraction is lossy and may return little or no text for scanned files.

use anyhow::{anyhow, Context, Result};
use quick_xml::events::Event;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    PlainText,
    Pdf,
    Docx,
    Unsupported,
}

pub fn detect_format(filename: &str) -> DocumentFormat {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    match ext.as_str() {
        "txt" | "text" | "md" => DocumentFormat::PlainText,
        "pdf" => DocumentFormat::Pdf,
        "docx" => DocumentFormat::Docx,
        _ => DocumentFormat::Unsupported,
    }
}

pub fn extract_text(bytes: &[u8], filename: &str) -> Result<String> {
    let text = match detect_format(filename) {
        DocumentFormat::PlainText => String::from_utf8_lossy(bytes).into_owned(),
        DocumentFormat::Pdf => extract_pdf(bytes)?,
        DocumentFormat::Docx => extract_docx(bytes)?,
        DocumentFormat::Unsupported => {
            return Err(anyhow!(
                "Unsupported resume format: {} (expected .txt, .pdf or .docx)",
                filename
            ));
        }
    };
    debug!("Extracted {} chars from {}", text.chars().count(), filename);
    Ok(text)
}

pub fn extract_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    extract_text(&bytes, filename)
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    // pdf-extract panics on some malformed files
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(anyhow!("PDF extraction failed: {}", e)),
        Err(_) => Err(anyhow!("PDF extraction failed: malformed file")),
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).context("DOCX is not a zip archive")?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .context("DOCX has no word/document.xml")?
        .read_to_string(&mut xml)?;

    let mut reader = quick_xml::Reader::from_str(&xml);
    let mut text = String::new();
    let mut in_run = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"t" => in_run = true,
                b"tab" => text.push('\t'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => text.push('\t'),
                b"br" => text.push('\n'),
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_run = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) if in_run => {
                if let Ok(s) = e.unescape() {
                    text.push_str(&s);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(anyhow!("DOCX XML error at {}: {}", reader.buffer_position(), e)),
        }
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx(document_xml: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(document_xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format("resume.PDF"), DocumentFormat::Pdf);
        assert_eq!(detect_format("cv.docx"), DocumentFormat::Docx);
        assert_eq!(detect_format("notes.txt"), DocumentFormat::PlainText);
        assert_eq!(detect_format("photo.png"), DocumentFormat::Unsupported);
        assert_eq!(detect_format("noext"), DocumentFormat::Unsupported);
    }

    #[test]
    fn test_plain_text_passes_through() {
        let text = extract_text(b"Ada Lovelace\nada@example.com", "resume.txt").unwrap();
        assert_eq!(text, "Ada Lovelace\nada@example.com");
    }

    #[test]
    fn test_docx_paragraphs() {
        let bytes = docx(
            r#"<?xml version="1.0"?>
            <w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
            <w:p><w:r><w:t>Ada</w:t></w:r><w:r><w:t xml:space="preserve"> Lovelace</w:t></w:r></w:p>
            <w:p><w:r><w:t>R&amp;D Engineer</w:t></w:r></w:p>
            </w:body></w:document>"#,
        );
        let text = extract_text(&bytes, "resume.docx").unwrap();
        let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        assert_eq!(lines, ["Ada Lovelace", "R&D Engineer"]);
    }

    #[test]
    fn test_bad_inputs_are_errors() {
        assert!(extract_text(b"not a zip", "resume.docx").is_err());
        assert!(extract_text(b"not a pdf", "resume.pdf").is_err());
        assert!(extract_text(b"GIF89a", "resume.gif").is_err());
    }

    #[test]
    fn test_extract_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.txt");
        std::fs::write(&path, "Grace Hopper").unwrap();
        assert_eq!(extract_file(&path).unwrap(), "Grace Hopper");
        assert!(extract_file(&dir.path().join("missing.txt")).is_err());
    }
}
