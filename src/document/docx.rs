//! Plain-text extraction from DOCX archives.

use super::extract::ExtractionError;
use std::io::{Cursor, Read};

const DOCUMENT_XML: &str = "word/document.xml";

/// Extract the body text of a DOCX file held in memory.
pub(crate) fn extract_docx_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|error| ExtractionError::Archive(error.to_string()))?;
    let mut entry = archive
        .by_name(DOCUMENT_XML)
        .map_err(|_| ExtractionError::MissingDocumentXml)?;

    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|error| ExtractionError::Archive(format!("failed to read {DOCUMENT_XML}: {error}")))?;

    Ok(plaintext_from_document_xml(&xml))
}

/// Collect `w:t` runs from `word/document.xml`, one line per `w:p` paragraph.
///
/// Tabs and breaks count only inside runs, so `w:tabs` stop definitions in paragraph
/// properties add nothing. Content under `mc:Fallback` duplicates its `mc:Choice` sibling
/// and is skipped.
pub(crate) fn plaintext_from_document_xml(xml: &str) -> String {
    let mut result = String::new();
    let mut run = String::new();
    let mut in_text = false;
    let mut run_depth = 0usize;
    let mut fallback_depth = 0usize;
    let mut chars = xml.chars();

    while let Some(c) = chars.next() {
        if c != '<' {
            if in_text {
                run.push(c);
            }
            continue;
        }

        let mut tag = String::new();
        for tc in chars.by_ref() {
            if tc == '>' {
                break;
            }
            tag.push(tc);
        }

        let closing = tag.starts_with('/');
        let self_closing = tag.ends_with('/');
        let name = tag
            .trim_start_matches('/')
            .split(|ch: char| ch.is_whitespace() || ch == '/')
            .next()
            .unwrap_or("");

        match (name, closing) {
            ("mc:Fallback", false) if !self_closing => fallback_depth += 1,
            ("mc:Fallback", true) => fallback_depth = fallback_depth.saturating_sub(1),
            _ if fallback_depth > 0 => {}
            ("w:r", false) if !self_closing => run_depth += 1,
            ("w:r", true) => run_depth = run_depth.saturating_sub(1),
            ("w:t", false) if !self_closing => in_text = true,
            ("w:t", true) => {
                result.push_str(&decode_entities(&run));
                run.clear();
                in_text = false;
            }
            ("w:tab", false) if run_depth > 0 => result.push('\t'),
            ("w:br" | "w:cr", false) if run_depth > 0 => result.push('\n'),
            ("w:p", true) => result.push('\n'),
            ("w:p", false) if self_closing => result.push('\n'),
            _ => {}
        }
    }

    result.trim_end().to_string()
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut decoded = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        decoded.push_str(&rest[..start]);
        let candidate = &rest[start..];
        let Some(end) = candidate.find(';') else {
            decoded.push_str(candidate);
            return decoded;
        };
        let entity = &candidate[1..end];
        match decode_entity(entity) {
            Some(ch) => decoded.push(ch),
            None => decoded.push_str(&candidate[..=end]),
        }
        rest = &candidate[end + 1..];
    }
    decoded.push_str(rest);
    decoded
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = entity.strip_prefix("#x").or(entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}
