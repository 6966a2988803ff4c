//! Placeholder substitution over the `<w:t>` text nodes of one WordprocessingML part.
//!
//! Word freely splits a paragraph's text across runs (spell-check marks, edit
//! sessions, formatting changes), so `[$total_sales]` may arrive as `[$tot` +
//! `al_sales]`. Text nodes are therefore grouped per paragraph, matched on the
//! joined text, and rewritten node by node: the replacement goes into the node
//! where the placeholder starts and the consumed fragments are cut from the
//! nodes that follow.

use super::placeholder::{Substitution, Substitutions, placeholder_regex};
use regex_lite::Regex;
use std::ops::Range;
use std::sync::OnceLock;

/// Run properties for error markers: bold, dark red, yellow highlight.
pub(crate) const ERROR_RUN_PROPERTIES: &str =
    r#"<w:rPr><w:b/><w:color w:val="C00000"/><w:highlight w:val="yellow"/></w:rPr>"#;

fn text_node_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Open tag must not end in `/`: `<w:t/>` is an empty node with no close tag
        Regex::new(r"(?s)<w:t(?:\s|\s[^>]*[^/>])?>(.*?)</w:t>").expect("text node pattern is valid")
    })
}

fn run_open_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<w:r(?:\s[^>]*)?>").expect("run pattern is valid"))
}

/// One `<w:t>` element.
#[derive(Debug)]
struct TextNode {
    /// Whole element, open tag through close tag.
    span: Range<usize>,
    /// Unescaped text content.
    text: String,
}

/// Result of patching one part.
#[derive(Debug)]
pub(crate) struct PatchedPart {
    pub xml: String,
    pub replaced: usize,
}

fn text_nodes(xml: &str) -> Vec<TextNode> {
    text_node_regex()
        .captures_iter(xml)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let content = caps.get(1)?;
            Some(TextNode {
                span: whole.start()..whole.end(),
                text: unescape(content.as_str()),
            })
        })
        .collect()
}

/// Group node indices by paragraph: two nodes share a group when no `</w:p>`
/// lies between them.
fn paragraph_groups(xml: &str, nodes: &[TextNode]) -> Vec<Range<usize>> {
    let para_ends: Vec<usize> = xml.match_indices("</w:p>").map(|(i, _)| i).collect();
    let mut groups = Vec::new();
    let mut start = 0;
    for i in 1..=nodes.len() {
        let split = i == nodes.len() || {
            let prev_end = nodes[i - 1].span.end;
            let next_start = nodes[i].span.start;
            // First paragraph end at or after the previous node
            let idx = para_ends.partition_point(|&p| p < prev_end);
            para_ends.get(idx).is_some_and(|&p| p < next_start)
        };
        if split {
            if start < i {
                groups.push(start..i);
            }
            start = i;
        }
    }
    groups
}

/// Placeholder keys present in a part, in document order.
pub(crate) fn part_placeholders(xml: &str) -> Vec<String> {
    let nodes = text_nodes(xml);
    let mut keys = Vec::new();
    for group in paragraph_groups(xml, &nodes) {
        let joined: String = nodes[group].iter().map(|n| n.text.as_str()).collect();
        keys.extend(super::placeholder::find_placeholders(&joined));
    }
    keys
}

/// A placeholder occurrence to replace, in joined-paragraph coordinates.
struct Edit<'a> {
    range: Range<usize>,
    with: &'a Substitution,
}

/// Rewritten content of a single text node.
#[derive(Debug, PartialEq)]
enum Segment {
    Plain(String),
    Marker(String),
}

/// Patch every placeholder in `xml` that has a substitution.
///
/// Returns `None` when nothing in the part was replaced.
pub(crate) fn patch_part(xml: &str, subs: &Substitutions) -> Option<PatchedPart> {
    let nodes = text_nodes(xml);
    if nodes.is_empty() {
        return None;
    }

    // (node index, new segments) for each touched node, in document order
    let mut rewrites: Vec<(usize, Vec<Segment>)> = Vec::new();
    let mut replaced = 0;

    for group in paragraph_groups(xml, &nodes) {
        let group_nodes = &nodes[group.clone()];
        let mut offsets = Vec::with_capacity(group_nodes.len());
        let mut joined = String::new();
        for node in group_nodes {
            let start = joined.len();
            joined.push_str(&node.text);
            offsets.push(start..joined.len());
        }

        let edits: Vec<Edit<'_>> = placeholder_regex()
            .captures_iter(&joined)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let key = caps.get(1)?.as_str();
                subs.get(key).map(|with| Edit {
                    range: whole.start()..whole.end(),
                    with,
                })
            })
            .collect();
        if edits.is_empty() {
            continue;
        }
        replaced += edits.len();

        for (offset, node_range) in offsets.iter().enumerate() {
            if let Some(segments) = rewrite_node(&joined, node_range, &edits) {
                rewrites.push((group.start + offset, segments));
            }
        }
    }

    if replaced == 0 {
        return None;
    }

    let mut out = String::with_capacity(xml.len() + 64 * rewrites.len());
    let mut cursor = 0;
    for (index, segments) in rewrites {
        let node = &nodes[index];
        out.push_str(&xml[cursor..node.span.start]);
        let has_marker = segments.iter().any(|s| matches!(s, Segment::Marker(_)));
        let run_properties = if has_marker {
            enclosing_run_properties(xml, node.span.start)
        } else {
            None
        };
        render_node(&mut out, &segments, run_properties);
        cursor = node.span.end;
    }
    out.push_str(&xml[cursor..]);

    Some(PatchedPart { xml: out, replaced })
}

/// Compute the new segments of the node covering `node` in `joined`, or `None`
/// when no edit touches it.
fn rewrite_node(joined: &str, node: &Range<usize>, edits: &[Edit<'_>]) -> Option<Vec<Segment>> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut cursor = node.start;
    let mut touched = false;

    for edit in edits {
        if edit.range.end <= node.start || edit.range.start >= node.end {
            continue;
        }
        touched = true;
        if edit.range.start >= node.start {
            push_plain(&mut segments, &joined[cursor..edit.range.start]);
            match edit.with {
                Substitution::Value(text) => push_plain(&mut segments, text),
                Substitution::Error(text) => segments.push(Segment::Marker(text.clone())),
            }
        }
        // Fragments of a placeholder that started in an earlier node are dropped
        cursor = edit.range.end.min(node.end);
    }

    if !touched {
        return None;
    }
    push_plain(&mut segments, &joined[cursor..node.end]);
    Some(segments)
}

fn push_plain(segments: &mut Vec<Segment>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Segment::Plain(last)) = segments.last_mut() {
        last.push_str(text);
    } else {
        segments.push(Segment::Plain(text.to_string()));
    }
}

/// The `<w:rPr>` element of the run containing position `at`, if the node sits
/// in a run. `Some("")` means a run without properties.
fn enclosing_run_properties(xml: &str, at: usize) -> Option<&str> {
    let head = &xml[..at];
    let open = run_open_regex().find_iter(head).last()?;
    // A run closed before `at` is not ours
    if head[open.end()..].contains("</w:r>") {
        return None;
    }
    let after = &head[open.end()..];
    if after.starts_with("<w:rPr>") || after.starts_with("<w:rPr ") {
        let end = after.find("</w:rPr>")? + "</w:rPr>".len();
        Some(&after[..end])
    } else {
        Some("")
    }
}

fn render_node(out: &mut String, segments: &[Segment], run_properties: Option<&str>) {
    let mut pending = String::new();
    for segment in segments {
        match segment {
            Segment::Plain(text) => pending.push_str(text),
            Segment::Marker(text) => match run_properties {
                Some(rpr) => {
                    push_text_element(out, &pending);
                    pending.clear();
                    out.push_str("</w:r><w:r>");
                    out.push_str(ERROR_RUN_PROPERTIES);
                    push_text_element(out, text);
                    out.push_str("</w:r><w:r>");
                    out.push_str(rpr);
                }
                // Not inside a run: no way to style, keep the text
                None => pending.push_str(text),
            },
        }
    }
    push_text_element(out, &pending);
}

fn push_text_element(out: &mut String, text: &str) {
    out.push_str(r#"<w:t xml:space="preserve">"#);
    out.push_str(&escape(text));
    out.push_str("</w:t>");
}

/// Escape text for use as XML character data.
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Decode the predefined XML entities and numeric character references.
/// Unknown or malformed references are kept verbatim.
pub(crate) fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').and_then(|semi| {
            let entity = &rest[1..semi];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            }?;
            Some((c, semi + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
