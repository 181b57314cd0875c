//! Exclusive XML canonicalization (without comments)
//!
//! Implements `http://www.w3.org/2001/10/xml-exc-c14n#` for an element
//! subtree. A namespace declaration is emitted on an element only when the
//! element or one of its attributes visibly uses it and the nearest output
//! ancestor has not already emitted the same binding.

use super::node::{Element, Node, NsScope};
use super::write::escape_text;
use std::collections::BTreeMap;

/// Canonicalizes `element` as a document subset apex
///
/// `parent_scope` holds the namespace bindings in scope at the element's
/// parent, so prefixes declared on ancestors still resolve.
pub fn canonicalize(element: &Element, parent_scope: &NsScope) -> String {
    let mut out = String::with_capacity(4096);
    let rendered = BTreeMap::new();
    write_canonical(element, parent_scope, &rendered, &mut out);
    out
}

/// Canonical bytes of `element`, ready for digesting
pub fn canonical_bytes(element: &Element, parent_scope: &NsScope) -> Vec<u8> {
    canonicalize(element, parent_scope).into_bytes()
}

fn write_canonical(
    element: &Element,
    parent_scope: &NsScope,
    rendered: &BTreeMap<String, String>,
    out: &mut String,
) {
    let scope = parent_scope.enter(element);

    // Visibly utilized prefixes; the empty key stands for the default namespace.
    let mut utilized: Vec<String> = vec![element.name.prefix.clone().unwrap_or_default()];
    for attr in &element.attributes {
        if let Some(prefix) = &attr.name.prefix {
            if prefix != "xml" && !utilized.contains(prefix) {
                utilized.push(prefix.clone());
            }
        }
    }

    let mut to_render: BTreeMap<String, String> = BTreeMap::new();
    for prefix in &utilized {
        let key = if prefix.is_empty() { None } else { Some(prefix.as_str()) };
        let uri = scope.resolve(key).unwrap_or("").to_string();
        let already = rendered.get(prefix).map(String::as_str).unwrap_or("");
        if uri != already {
            to_render.insert(prefix.clone(), uri);
        }
    }

    let mut next_rendered = rendered.clone();
    for (prefix, uri) in &to_render {
        next_rendered.insert(prefix.clone(), uri.clone());
    }

    out.push('<');
    out.push_str(&element.name.to_string());

    // BTreeMap order puts the default namespace ("") first, then prefixes.
    for (prefix, uri) in &to_render {
        if prefix.is_empty() {
            out.push_str(" xmlns=\"");
        } else {
            out.push_str(" xmlns:");
            out.push_str(prefix);
            out.push_str("=\"");
        }
        escape_canonical_attr(uri, out);
        out.push('"');
    }

    let mut attrs: Vec<(String, String, &str, String)> = element
        .attributes
        .iter()
        .map(|a| {
            let ns = match &a.name.prefix {
                Some(_) => scope.namespace_of(&a.name).unwrap_or("").to_string(),
                None => String::new(),
            };
            (ns, a.name.local.clone(), a.value.as_str(), a.name.to_string())
        })
        .collect();
    attrs.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));

    for (_, _, value, qname) in attrs {
        out.push(' ');
        out.push_str(&qname);
        out.push_str("=\"");
        escape_canonical_attr(value, out);
        out.push('"');
    }
    out.push('>');

    for child in &element.children {
        match child {
            Node::Element(e) => write_canonical(e, &scope, &next_rendered, out),
            Node::Text(t) => escape_text(t, out),
            Node::Comment(_) => {}
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
    out.push_str(&element.name.to_string());
    out.push('>');
}

fn escape_canonical_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::xml::parse::parse_document;

    fn canon_child(xml: &str, child: &str) -> String {
        let doc = parse_document(xml.as_bytes()).unwrap();
        let scope = NsScope::default().enter(&doc.root);
        let el = doc.root.find_child(child).unwrap();
        canonicalize(el, &scope)
    }

    #[test]
    fn test_apex_renders_inherited_default_namespace() {
        let c = canon_child(
            r#"<rDE xmlns="urn:sifen"><DE Id="1"><a>x</a></DE></rDE>"#,
            "DE",
        );
        assert_eq!(c, r#"<DE xmlns="urn:sifen" Id="1"><a>x</a></DE>"#);
    }

    #[test]
    fn test_unused_namespaces_are_dropped() {
        let c = canon_child(
            r#"<rDE xmlns="urn:sifen" xmlns:xsi="urn:xsi"><DE xmlns:foo="urn:foo" Id="1"/></rDE>"#,
            "DE",
        );
        assert_eq!(c, r#"<DE xmlns="urn:sifen" Id="1"></DE>"#);
    }

    #[test]
    fn test_attributes_sorted_and_empty_elements_expanded() {
        let c = canon_child(
            r#"<r xmlns:b="urn:b" xmlns:a="urn:a"><e z="1" b:y="2" a:y="3" m="4"/></r>"#,
            "e",
        );
        assert_eq!(
            c,
            r#"<e xmlns:a="urn:a" xmlns:b="urn:b" m="4" z="1" a:y="3" b:y="2"></e>"#
        );
    }

    #[test]
    fn test_comments_removed_and_text_escaped() {
        let c = canon_child(r#"<r><e><!-- note -->a &gt; b &amp; c</e></r>"#, "e");
        assert_eq!(c, "<e>a &gt; b &amp; c</e>");
    }

    #[test]
    fn test_default_namespace_not_repeated_in_descendants() {
        let c = canon_child(
            r#"<r xmlns="urn:s"><DE><g xmlns="urn:s"><h/></g></DE></r>"#,
            "DE",
        );
        assert_eq!(c, r#"<DE xmlns="urn:s"><g><h></h></g></DE>"#);
    }

    #[test]
    fn test_undeclared_default_is_rendered_when_needed() {
        let c = canon_child(r#"<r xmlns="urn:s"><DE><x xmlns=""/></DE></r>"#, "DE");
        assert_eq!(c, r#"<DE xmlns="urn:s"><x xmlns=""></x></DE>"#);
    }

    #[test]
    fn test_canonical_form_is_independent_of_serialization_details() {
        let a = canon_child(
            "<r xmlns=\"urn:s\"><DE Id='1' b=\"2\"><x/></DE></r>",
            "DE",
        );
        let b = canon_child(
            "<r xmlns=\"urn:s\"><DE b=\"2\" Id=\"1\"><x></x></DE></r>",
            "DE",
        );
        assert_eq!(a, b);
    }
}
