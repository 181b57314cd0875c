//! Compact serialization
//!
//! Writes a tree with no whitespace between tags. Namespace declarations and
//! attributes keep their stored order, so parse-then-write is stable.

use super::node::{Element, Node};

/// XML declaration written at the start of every serialized document
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Serializes a document: declaration immediately followed by the root
pub fn to_document_string(root: &Element) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str(XML_DECLARATION);
    write_element(root, &mut out);
    out
}

/// Serializes an element subtree without declaration
pub fn to_fragment_string(element: &Element) -> String {
    let mut out = String::with_capacity(1024);
    write_element(element, &mut out);
    out
}

/// Appends the serialized element to `out`
pub fn write_element(element: &Element, out: &mut String) {
    out.push('<');
    push_name(element, out);

    for decl in &element.namespaces {
        match &decl.prefix {
            Some(prefix) => {
                out.push_str(" xmlns:");
                out.push_str(prefix);
            }
            None => out.push_str(" xmlns"),
        }
        out.push_str("=\"");
        escape_attr(&decl.uri, out);
        out.push('"');
    }

    for attr in &element.attributes {
        out.push(' ');
        out.push_str(&attr.name.to_string());
        out.push_str("=\"");
        escape_attr(&attr.value, out);
        out.push('"');
    }

    if element.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');

    for child in &element.children {
        match child {
            Node::Element(e) => write_element(e, out),
            Node::Text(t) => escape_text(t, out),
            Node::Comment(c) => {
                out.push_str("<!--");
                out.push_str(c);
                out.push_str("-->");
            }
            Node::ProcessingInstruction { target, data } => {
                out.push_str("<?");
                out.push_str(target);
                if !data.is_empty() {
                    out.push(' ');
                    out.push_str(data);
                }
                out.push_str("?>");
            }
        }
    }

    out.push_str("</");
    push_name(element, out);
    out.push('>');
}

fn push_name(element: &Element, out: &mut String) {
    if let Some(prefix) = &element.name.prefix {
        out.push_str(prefix);
        out.push(':');
    }
    out.push_str(&element.name.local);
}

/// Escapes text content
pub fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

/// Escapes an attribute value so that it survives re-parsing unchanged
pub fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

/// Escapes a value for use as element text in a hand-built message
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    escape_text(text, &mut out);
    out
}
