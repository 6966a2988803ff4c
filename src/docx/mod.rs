//! Template I/O and in-place placeholder patching for `.docx` documents.
//!
//! A `.docx` file is a zip archive of XML parts. Only the text-bearing parts
//! (body, headers, footers, foot- and endnotes) are rewritten; every other
//! entry is raw-copied so images, styles and relationships are untouched.

pub mod placeholder;
mod text;

pub use placeholder::{Substitution, Substitutions, find_placeholders, placeholder_for};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// MIME type of a WordprocessingML document.
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// The main document part every `.docx` must contain.
pub const DOCUMENT_PART: &str = "word/document.xml";

/// Errors reading or writing a template. Any of these fails the whole generation.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template is empty")]
    Empty,
    #[error("template is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("template is not a readable .docx archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("template I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("template has no {DOCUMENT_PART} part")]
    MissingDocument,
    #[error("template part {0} is not valid UTF-8")]
    NotUtf8(String),
}

/// Returns true for archive entries whose `<w:t>` text is patched.
pub fn is_text_part(name: &str) -> bool {
    let Some(file) = name.strip_prefix("word/") else {
        return false;
    };
    let Some(stem) = file.strip_suffix(".xml") else {
        return false;
    };
    if stem.contains('/') {
        return false;
    }
    matches!(stem, "document" | "footnotes" | "endnotes")
        || ["header", "footer"].iter().any(|prefix| {
            stem.strip_prefix(prefix)
                .is_some_and(|n| n.chars().all(|c| c.is_ascii_digit()))
        })
}

/// Encode document bytes for transport to the browser.
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Output of [`Template::patch`].
#[derive(Debug)]
pub struct PatchOutput {
    pub bytes: Vec<u8>,
    /// Number of placeholder occurrences replaced across all parts.
    pub replaced: usize,
}

/// A validated `.docx` template held in memory.
#[derive(Debug, Clone)]
pub struct Template {
    bytes: Vec<u8>,
}

impl Template {
    /// Wrap raw bytes, checking that they form a `.docx` archive.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, TemplateError> {
        if bytes.is_empty() {
            return Err(TemplateError::Empty);
        }
        let mut archive = ZipArchive::new(Cursor::new(bytes.as_slice()))?;
        if archive.by_name(DOCUMENT_PART).is_err() {
            return Err(TemplateError::MissingDocument);
        }
        Ok(Self { bytes })
    }

    /// Decode a base64 payload; a `data:...;base64,` prefix is accepted.
    pub fn from_base64(encoded: &str) -> Result<Self, TemplateError> {
        let encoded = encoded.trim();
        let payload = match encoded.split_once(";base64,") {
            Some((prefix, rest)) if prefix.starts_with("data:") => rest,
            _ => encoded,
        };
        let bytes = STANDARD.decode(payload)?;
        Self::from_bytes(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Placeholder keys used anywhere in the template, first occurrence order.
    pub fn placeholders(&self) -> Result<Vec<String>, TemplateError> {
        let mut keys: Vec<String> = Vec::new();
        for (_, xml) in self.text_parts()? {
            for key in text::part_placeholders(&xml) {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }

    /// Replace every placeholder that has a substitution.
    ///
    /// When nothing is replaced the original bytes are returned unchanged.
    pub fn patch(&self, subs: &Substitutions) -> Result<PatchOutput, TemplateError> {
        let mut patched: HashMap<String, String> = HashMap::new();
        let mut replaced = 0;
        for (name, xml) in self.text_parts()? {
            if let Some(part) = text::patch_part(&xml, subs) {
                debug!(part = %name, replaced = part.replaced, "Patched template part");
                replaced += part.replaced;
                patched.insert(name, part.xml);
            }
        }

        if patched.is_empty() {
            return Ok(PatchOutput {
                bytes: self.bytes.clone(),
                replaced: 0,
            });
        }

        let bytes = self.rewrite(&patched)?;
        Ok(PatchOutput { bytes, replaced })
    }

    fn text_parts(&self) -> Result<Vec<(String, String)>, TemplateError> {
        let mut archive = ZipArchive::new(Cursor::new(self.bytes.as_slice()))?;
        let mut parts = Vec::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if !is_text_part(file.name()) {
                continue;
            }
            let name = file.name().to_string();
            // Declared sizes are untrusted; let the buffer grow as data arrives
            let mut raw = Vec::new();
            file.read_to_end(&mut raw)?;
            let xml = String::from_utf8(raw).map_err(|_| TemplateError::NotUtf8(name.clone()))?;
            parts.push((name, xml));
        }
        Ok(parts)
    }

    /// Rebuild the archive in original entry order, writing patched parts and
    /// raw-copying the rest.
    fn rewrite(&self, patched: &HashMap<String, String>) -> Result<Vec<u8>, TemplateError> {
        let mut archive = ZipArchive::new(Cursor::new(self.bytes.as_slice()))?;
        let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(self.bytes.len())));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for i in 0..archive.len() {
            let name = archive.by_index_raw(i)?.name().to_string();
            match patched.get(&name) {
                Some(xml) => {
                    writer.start_file(name, options)?;
                    writer.write_all(xml.as_bytes())?;
                }
                None => {
                    let file = archive.by_index_raw(i)?;
                    writer.raw_copy_file(file)?;
                }
            }
        }

        Ok(writer.finish()?.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_parts_are_recognised() {
        for name in [
            "word/document.xml",
            "word/header1.xml",
            "word/footer12.xml",
            "word/header.xml",
            "word/footnotes.xml",
            "word/endnotes.xml",
        ] {
            assert!(is_text_part(name), "{name}");
        }
        for name in [
            "word/styles.xml",
            "word/headerx.xml",
            "word/_rels/document.xml.rels",
            "word/media/header1.xml",
            "[Content_Types].xml",
            "docProps/core.xml",
        ] {
            assert!(!is_text_part(name), "{name}");
        }
    }

    #[test]
    fn rejects_non_archives() {
        assert!(matches!(
            Template::from_bytes(Vec::new()),
            Err(TemplateError::Empty)
        ));
        assert!(matches!(
            Template::from_bytes(b"plain text".to_vec()),
            Err(TemplateError::Archive(_))
        ));
        assert!(matches!(
            Template::from_base64("***"),
            Err(TemplateError::Base64(_))
        ));
    }

    #[test]
    fn rejects_archive_without_document() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("readme.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"hi").unwrap();
        let bytes = writer.finish().unwrap().into_inner();
        assert!(matches!(
            Template::from_bytes(bytes),
            Err(TemplateError::MissingDocument)
        ));
    }
}
