//! Strict XML parsing into the owned tree
//!
//! The parser never recovers: mismatched tags, undeclared prefixes, text
//! outside the root, multiple roots and DTDs are all errors.

use super::node::{Attribute, Element, NamespaceDecl, Node, NsScope, QName};
use crate::domain::{EkuatiaError, Result};
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

/// Parsed document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Whether the input started with an XML declaration
    pub has_declaration: bool,

    /// Root element
    pub root: Element,
}

/// Parses a complete document
///
/// # Errors
///
/// Returns `EkuatiaError::Xml` if the bytes are not UTF-8 or not a
/// namespace-well-formed document.
pub fn parse_document(bytes: &[u8]) -> Result<Document> {
    let input = std::str::from_utf8(bytes)
        .map_err(|e| EkuatiaError::Xml(format!("document is not UTF-8: {e}")))?;
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);

    let mut reader = Reader::from_str(input);
    reader.config_mut().check_end_names = true;
    reader.config_mut().check_comments = true;

    let mut has_declaration = false;
    let mut stack: Vec<(Element, NsScope)> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let position = reader.buffer_position();
        let event = reader
            .read_event()
            .map_err(|e| EkuatiaError::Xml(format!("at byte {position}: {e}")))?;

        match event {
            Event::Decl(_) => {
                if root.is_some() || !stack.is_empty() || has_declaration {
                    return Err(EkuatiaError::Xml(
                        "XML declaration is only allowed at the start".to_string(),
                    ));
                }
                has_declaration = true;
            }
            Event::DocType(_) => {
                return Err(EkuatiaError::Xml("DTDs are not accepted".to_string()));
            }
            Event::Start(start) => {
                ensure_single_root(&root, &stack)?;
                let parent_scope = stack.last().map(|(_, s)| s.clone()).unwrap_or_default();
                let element = element_from_start(&start, &parent_scope)?;
                let scope = parent_scope.enter(&element);
                stack.push((element, scope));
            }
            Event::Empty(start) => {
                ensure_single_root(&root, &stack)?;
                let parent_scope = stack.last().map(|(_, s)| s.clone()).unwrap_or_default();
                let element = element_from_start(&start, &parent_scope)?;
                attach(element, &mut stack, &mut root);
            }
            Event::End(_) => {
                let (element, _) = stack
                    .pop()
                    .ok_or_else(|| EkuatiaError::Xml("unexpected closing tag".to_string()))?;
                attach(element, &mut stack, &mut root);
            }
            Event::Text(text) => {
                let raw = std::str::from_utf8(&text)
                    .map_err(|e| EkuatiaError::Xml(format!("text is not UTF-8: {e}")))?;
                let normalized = normalize_newlines(raw);
                let value = unescape(&normalized)
                    .map_err(|e| EkuatiaError::Xml(format!("bad character reference: {e}")))?
                    .into_owned();
                match stack.last_mut() {
                    Some((parent, _)) => parent.children.push(Node::Text(value)),
                    None if value.chars().all(char::is_whitespace) => {}
                    None => {
                        return Err(EkuatiaError::Xml(
                            "text content outside the root element".to_string(),
                        ))
                    }
                }
            }
            Event::CData(data) => {
                let value = String::from_utf8(data.into_inner().into_owned())
                    .map_err(|e| EkuatiaError::Xml(format!("CDATA is not UTF-8: {e}")))?;
                match stack.last_mut() {
                    Some((parent, _)) => parent.children.push(Node::Text(value)),
                    None => {
                        return Err(EkuatiaError::Xml(
                            "CDATA outside the root element".to_string(),
                        ))
                    }
                }
            }
            Event::Comment(comment) => {
                if let Some((parent, _)) = stack.last_mut() {
                    let text = String::from_utf8_lossy(&comment).into_owned();
                    parent.children.push(Node::Comment(text));
                }
            }
            Event::PI(pi) => {
                if let Some((parent, _)) = stack.last_mut() {
                    let raw = String::from_utf8_lossy(&pi).into_owned();
                    let (target, data) = match raw.split_once(char::is_whitespace) {
                        Some((t, d)) => (t.to_string(), d.trim_start().to_string()),
                        None => (raw, String::new()),
                    };
                    parent
                        .children
                        .push(Node::ProcessingInstruction { target, data });
                }
            }
            Event::Eof => break,
        }
    }

    if !stack.is_empty() {
        return Err(EkuatiaError::Xml(format!(
            "unclosed element <{}>",
            stack[stack.len() - 1].0.name
        )));
    }

    let root = root.ok_or_else(|| EkuatiaError::Xml("document has no root element".to_string()))?;
    Ok(Document {
        has_declaration,
        root,
    })
}

fn ensure_single_root(root: &Option<Element>, stack: &[(Element, NsScope)]) -> Result<()> {
    if root.is_some() && stack.is_empty() {
        return Err(EkuatiaError::Xml(
            "document has more than one root element".to_string(),
        ));
    }
    Ok(())
}

fn attach(element: Element, stack: &mut [(Element, NsScope)], root: &mut Option<Element>) {
    match stack.last_mut() {
        Some((parent, _)) => parent.children.push(Node::Element(element)),
        None => *root = Some(element),
    }
}

fn element_from_start(start: &BytesStart<'_>, parent_scope: &NsScope) -> Result<Element> {
    let raw_name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| EkuatiaError::Xml(format!("element name is not UTF-8: {e}")))?
        .to_string();
    let name = QName::parse(&raw_name);

    let mut namespaces = Vec::new();
    let mut attributes = Vec::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| EkuatiaError::Xml(format!("in <{raw_name}>: {e}")))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| EkuatiaError::Xml(format!("attribute name is not UTF-8: {e}")))?;
        let raw_value = std::str::from_utf8(&attr.value)
            .map_err(|e| EkuatiaError::Xml(format!("attribute value is not UTF-8: {e}")))?;
        let normalized: String = raw_value
            .chars()
            .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
            .collect();
        let value = unescape(&normalized)
            .map_err(|e| EkuatiaError::Xml(format!("bad reference in '{key}': {e}")))?
            .into_owned();

        if key == "xmlns" {
            namespaces.push(NamespaceDecl {
                prefix: None,
                uri: value,
            });
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            if value.is_empty() {
                return Err(EkuatiaError::Xml(format!(
                    "prefix '{prefix}' cannot be undeclared"
                )));
            }
            namespaces.push(NamespaceDecl {
                prefix: Some(prefix.to_string()),
                uri: value,
            });
        } else {
            attributes.push(Attribute {
                name: QName::parse(key),
                value,
            });
        }
    }

    let element = Element {
        name,
        namespaces,
        attributes,
        children: Vec::new(),
    };

    let scope = parent_scope.enter(&element);
    check_prefix(&scope, &element.name)?;
    for attr in &element.attributes {
        check_prefix(&scope, &attr.name)?;
    }

    Ok(element)
}

fn check_prefix(scope: &NsScope, name: &QName) -> Result<()> {
    if let Some(prefix) = name.prefix.as_deref() {
        if prefix != "xml" && scope.resolve(Some(prefix)).is_none() {
            return Err(EkuatiaError::Xml(format!(
                "undeclared namespace prefix '{prefix}' in '{name}'"
            )));
        }
    }
    Ok(())
}

fn normalize_newlines(raw: &str) -> String {
    if raw.contains('\r') {
        raw.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        raw.to_string()
    }
}

/// Whether the raw bytes contain whitespace between two tags
///
/// Checks the serialized form directly, including the gap between the
/// XML declaration and the first element.
pub fn has_inter_tag_whitespace(bytes: &[u8]) -> bool {
    let mut after_tag = false;
    let mut saw_space = false;
    for &b in bytes {
        match b {
            b'>' => {
                after_tag = true;
                saw_space = false;
            }
            b'<' => {
                if after_tag && saw_space {
                    return true;
                }
                after_tag = false;
            }
            b' ' | b'\t' | b'\n' | b'\r' => {
                if after_tag {
                    saw_space = true;
                }
            }
            _ => {
                after_tag = false;
                saw_space = false;
            }
        }
    }
    false
}
