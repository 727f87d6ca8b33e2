//! HTML tokenization into the arena document.
//!
//! This is a forgiving tokenizer, not a standards-complete tree builder: it keeps
//! element nesting, attributes and text, which is all the page guards read.

use nr_core::GuardResult;
use nr_dom::Document;
use nr_dom::NodeId;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "title", "textarea"];

/// Parses raw HTML into a DOM document.
#[derive(Debug, Default)]
pub struct HtmlParser;

impl HtmlParser {
    /// Parses a full page. Nodes present at load produce no mutation records.
    pub fn parse(&self, input: &str, url: &str) -> Document {
        let mut document = Document::new(url);
        let root = document.root();
        build_tree(&mut document, root, input);
        document.take_mutations();
        document
    }

    /// Parses `input` and appends the resulting top-level nodes to `parent`,
    /// as script-driven insertion would.
    pub fn parse_fragment(
        &self,
        document: &mut Document,
        parent: NodeId,
        input: &str,
    ) -> GuardResult<Vec<NodeId>> {
        let holder = document.create_element("template");
        build_tree(document, holder, input);
        let top_level = document.children(holder).to_vec();
        for node in &top_level {
            document.append_child(parent, *node)?;
        }
        Ok(top_level)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedTag {
    name: String,
    is_end: bool,
    self_closing: bool,
    attributes: Vec<(String, String)>,
}

fn build_tree(document: &mut Document, container: NodeId, input: &str) {
    let bytes = input.as_bytes();
    let mut idx = 0_usize;
    let mut open: Vec<NodeId> = vec![container];

    while idx < bytes.len() {
        let current = open.last().copied().unwrap_or(container);

        if bytes[idx] != b'<' {
            let next = find_byte(bytes, idx, b'<').unwrap_or(bytes.len());
            append_text(document, current, &input[idx..next]);
            idx = next;
            continue;
        }

        if starts_with(bytes, idx, b"<!--") {
            idx = skip_comment(bytes, idx);
            continue;
        }

        if starts_with(bytes, idx, b"<!") {
            idx = skip_to_gt(bytes, idx.saturating_add(2));
            continue;
        }

        if starts_with(bytes, idx, b"<?") {
            idx = skip_processing_instruction(bytes, idx);
            continue;
        }

        let Some((tag, next_idx)) = parse_tag(input, idx) else {
            append_text(document, current, "<");
            idx = idx.saturating_add(1);
            continue;
        };

        if tag.is_end {
            if let Some(position) = open
                .iter()
                .skip(1)
                .rposition(|node| document.is_element(*node, &tag.name))
            {
                open.truncate(position + 1);
            }
            idx = next_idx;
            continue;
        }

        let element = document.create_element(&tag.name);
        for (name, value) in &tag.attributes {
            if let Err(error) = document.set_attribute(element, name, value) {
                tracing::debug!(%error, element, name = name.as_str(), "attribute dropped");
            }
        }
        attach(document, current, element);

        if !tag.self_closing && RAW_TEXT_ELEMENTS.contains(&tag.name.as_str()) {
            let (raw, after_raw) = read_raw_text_until_end_tag(input, next_idx, &tag.name);
            append_text(document, element, raw);
            idx = after_raw;
            continue;
        }

        if !tag.self_closing && !VOID_ELEMENTS.contains(&tag.name.as_str()) {
            open.push(element);
        }
        idx = next_idx;
    }
}

fn append_text(document: &mut Document, parent: NodeId, text: &str) {
    if text.trim().is_empty() {
        return;
    }
    let node = document.create_text(decode_entities(text));
    attach(document, parent, node);
}

/// Appends `node` under `parent`; a refused insertion leaves it detached.
fn attach(document: &mut Document, parent: NodeId, node: NodeId) -> bool {
    match document.append_child(parent, node) {
        Ok(()) => true,
        Err(error) => {
            tracing::debug!(%error, parent, node, "parsed node left detached");
            false
        }
    }
}

fn parse_tag(input: &str, start: usize) -> Option<(ParsedTag, usize)> {
    let bytes = input.as_bytes();
    if bytes.get(start).copied() != Some(b'<') {
        return None;
    }

    let mut idx = start.saturating_add(1);
    let mut is_end = false;
    if bytes.get(idx).copied() == Some(b'/') {
        is_end = true;
        idx = idx.saturating_add(1);
    }

    let name_start = idx;
    while idx < bytes.len() && is_tag_name_char(bytes[idx]) {
        idx = idx.saturating_add(1);
    }

    if idx == name_start {
        return None;
    }

    let name = input[name_start..idx].to_ascii_lowercase();
    let mut attributes = Vec::new();
    let mut self_closing = false;

    loop {
        idx = skip_spaces(bytes, idx);
        let byte = *bytes.get(idx)?;

        match byte {
            b'>' => {
                return Some((
                    ParsedTag {
                        name,
                        is_end,
                        self_closing,
                        attributes,
                    },
                    idx.saturating_add(1),
                ));
            }
            b'/' => {
                self_closing = true;
                idx = idx.saturating_add(1);
            }
            _ => {
                self_closing = false;
                let attr_start = idx;
                while idx < bytes.len()
                    && !bytes[idx].is_ascii_whitespace()
                    && !matches!(bytes[idx], b'=' | b'>' | b'/')
                {
                    idx = idx.saturating_add(1);
                }
                if idx == attr_start {
                    idx = idx.saturating_add(1);
                    continue;
                }
                let attr_name = input[attr_start..idx].to_ascii_lowercase();

                idx = skip_spaces(bytes, idx);
                if bytes.get(idx).copied() != Some(b'=') {
                    attributes.push((attr_name, String::new()));
                    continue;
                }

                idx = skip_spaces(bytes, idx.saturating_add(1));
                let (value, after_value) = read_attribute_value(input, idx)?;
                attributes.push((attr_name, decode_entities(value)));
                idx = after_value;
            }
        }
    }
}

fn read_attribute_value(input: &str, start: usize) -> Option<(&str, usize)> {
    let bytes = input.as_bytes();
    match bytes.get(start).copied()? {
        quote @ (b'"' | b'\'') => {
            let value_start = start.saturating_add(1);
            let end = find_byte(bytes, value_start, quote)?;
            Some((&input[value_start..end], end.saturating_add(1)))
        }
        _ => {
            let mut idx = start;
            while idx < bytes.len() && !bytes[idx].is_ascii_whitespace() && bytes[idx] != b'>' {
                idx = idx.saturating_add(1);
            }
            Some((&input[start..idx], idx))
        }
    }
}

fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_owned();
    }

    input
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

fn read_raw_text_until_end_tag<'a>(
    input: &'a str,
    start: usize,
    tag_name: &str,
) -> (&'a str, usize) {
    let bytes = input.as_bytes();
    let tag_bytes = tag_name.as_bytes();
    let mut idx = start;

    while idx < bytes.len() {
        if bytes[idx] == b'<'
            && bytes.get(idx.saturating_add(1)).copied() == Some(b'/')
            && starts_with_ignore_ascii_case(bytes, idx.saturating_add(2), tag_bytes)
            && tag_name_boundary(bytes, idx.saturating_add(2 + tag_bytes.len()))
        {
            let end = skip_to_gt(bytes, idx);
            return (&input[start..idx], end);
        }

        idx = idx.saturating_add(1);
    }

    (&input[start..], bytes.len())
}

fn skip_comment(bytes: &[u8], start: usize) -> usize {
    find_subslice(bytes, start.saturating_add(4), b"-->")
        .map(|end| end.saturating_add(3))
        .unwrap_or(bytes.len())
}

fn skip_processing_instruction(bytes: &[u8], start: usize) -> usize {
    if let Some(end) = find_subslice(bytes, start.saturating_add(2), b"?>") {
        return end.saturating_add(2);
    }

    skip_to_gt(bytes, start.saturating_add(2))
}

fn skip_to_gt(bytes: &[u8], mut idx: usize) -> usize {
    while idx < bytes.len() {
        if bytes[idx] == b'>' {
            return idx.saturating_add(1);
        }
        idx = idx.saturating_add(1);
    }

    bytes.len()
}

fn tag_name_boundary(bytes: &[u8], idx: usize) -> bool {
    match bytes.get(idx).copied() {
        None => true,
        Some(byte) => byte.is_ascii_whitespace() || byte == b'>' || byte == b'/',
    }
}

fn skip_spaces(bytes: &[u8], mut idx: usize) -> usize {
    while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
        idx = idx.saturating_add(1);
    }
    idx
}

fn is_tag_name_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b':')
}

fn starts_with(bytes: &[u8], idx: usize, pattern: &[u8]) -> bool {
    let end = idx.saturating_add(pattern.len());
    end <= bytes.len() && bytes[idx..end] == *pattern
}

fn starts_with_ignore_ascii_case(bytes: &[u8], idx: usize, pattern: &[u8]) -> bool {
    let end = idx.saturating_add(pattern.len());
    if end > bytes.len() {
        return false;
    }

    bytes[idx..end]
        .iter()
        .zip(pattern.iter())
        .all(|(left, right)| left.eq_ignore_ascii_case(right))
}

fn find_subslice(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= bytes.len() {
        return None;
    }

    bytes[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

fn find_byte(bytes: &[u8], from: usize, byte: u8) -> Option<usize> {
    if from >= bytes.len() {
        return None;
    }

    bytes[from..]
        .iter()
        .position(|candidate| *candidate == byte)
        .map(|offset| from + offset)
}
