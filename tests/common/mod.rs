//! Shared fixtures: in-memory `.docx` archives and a seeded database.

#![allow(dead_code)]

use regex_lite::Regex;
use report_forge::db::Database;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

/// Helper to create a fresh in-memory database with the sample data.
pub fn seeded_db() -> Database {
    let db = Database::open_in_memory().expect("Failed to create in-memory database");
    db.seed_sample().expect("Failed to seed sample data");
    db
}

/// A `w:document` whose body holds one paragraph per entry; each entry is the
/// list of run texts of that paragraph.
pub fn document_xml(paragraphs: &[&[&str]]) -> String {
    let mut body = String::new();
    for runs in paragraphs {
        body.push_str("<w:p>");
        for text in *runs {
            body.push_str(&format!(
                r#"<w:r><w:rPr><w:i/></w:rPr><w:t xml:space="preserve">{}</w:t></w:r>"#,
                text
            ));
        }
        body.push_str("</w:p>");
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
        body
    )
}

/// Build a minimal `.docx` from `(entry name, content)` pairs plus the
/// package boilerplate.
pub fn build_docx(parts: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries = vec![("[Content_Types].xml", CONTENT_TYPES), ("_rels/.rels", ROOT_RELS)];
    entries.extend_from_slice(parts);
    for (name, content) in entries {
        writer.start_file(name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A `.docx` with only a body.
pub fn docx_with_body(paragraphs: &[&[&str]]) -> Vec<u8> {
    build_docx(&[("word/document.xml", &document_xml(paragraphs))])
}

/// Read one archive entry as text.
pub fn read_part(bytes: &[u8], name: &str) -> String {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut out = String::new();
    file.read_to_string(&mut out).unwrap();
    out
}

/// Entry names in archive order.
pub fn entry_names(bytes: &[u8]) -> Vec<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

/// Text of each paragraph of a part, runs concatenated.
pub fn paragraph_texts(xml: &str) -> Vec<String> {
    let node = Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>").unwrap();
    xml.split("</w:p>")
        .filter(|chunk| chunk.contains("<w:p>") || chunk.contains("<w:p "))
        .map(|chunk| {
            node.captures_iter(chunk)
                .map(|c| c[1].to_string())
                .collect::<String>()
        })
        .collect()
}
