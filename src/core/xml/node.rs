//! Owned XML tree
//!
//! A small DOM that keeps namespace declarations separate from ordinary
//! attributes, so that canonicalization and namespace normalization can
//! reason about them explicitly.

use std::fmt;

/// Possibly prefixed element or attribute name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    /// Namespace prefix, `None` for unprefixed names
    pub prefix: Option<String>,

    /// Local part
    pub local: String,
}

impl QName {
    /// Builds an unprefixed name
    pub fn local(local: impl Into<String>) -> Self {
        Self {
            prefix: None,
            local: local.into(),
        }
    }

    /// Splits a raw `prefix:local` name
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((prefix, local)) => Self {
                prefix: Some(prefix.to_string()),
                local: local.to_string(),
            },
            None => Self::local(raw),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{prefix}:{}", self.local),
            None => write!(f, "{}", self.local),
        }
    }
}

/// Ordinary (non-`xmlns`) attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

/// Namespace declaration (`xmlns` or `xmlns:prefix`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDecl {
    /// Declared prefix, `None` for the default namespace
    pub prefix: Option<String>,

    /// Namespace URI, empty to undeclare the default namespace
    pub uri: String,
}

impl NamespaceDecl {
    /// Default namespace declaration
    pub fn default_ns(uri: impl Into<String>) -> Self {
        Self {
            prefix: None,
            uri: uri.into(),
        }
    }
}

/// Tree node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

/// Element with its namespace declarations, attributes and children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: QName,
    pub namespaces: Vec<NamespaceDecl>,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

impl Element {
    /// Creates an empty unprefixed element
    pub fn new(local: impl Into<String>) -> Self {
        Self {
            name: QName::local(local),
            namespaces: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Adds a default namespace declaration
    pub fn with_default_namespace(mut self, uri: impl Into<String>) -> Self {
        self.namespaces.push(NamespaceDecl::default_ns(uri));
        self
    }

    /// Adds an unprefixed attribute
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Adds a text child
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// Adds an element child
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Local part of the element name
    pub fn local_name(&self) -> &str {
        &self.name.local
    }

    /// Value of an unprefixed attribute
    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.prefix.is_none() && a.name.local == local)
            .map(|a| a.value.as_str())
    }

    /// Sets (or replaces) an unprefixed attribute
    pub fn set_attr(&mut self, local: impl Into<String>, value: impl Into<String>) {
        let local = local.into();
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|a| a.name.prefix.is_none() && a.name.local == local)
        {
            Some(existing) => existing.value = value,
            None => self.attributes.push(Attribute {
                name: QName::local(local),
                value,
            }),
        }
    }

    /// Default namespace declared directly on this element
    pub fn declared_default_namespace(&self) -> Option<&str> {
        self.namespaces
            .iter()
            .find(|d| d.prefix.is_none())
            .map(|d| d.uri.as_str())
    }

    /// Direct element children
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Direct element children, mutably
    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// First direct child with the given local name
    pub fn find_child(&self, local: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.local_name() == local)
    }

    /// First descendant (depth-first, excluding self) with the given local name
    pub fn find_descendant(&self, local: &str) -> Option<&Element> {
        for child in self.child_elements() {
            if child.local_name() == local {
                return Some(child);
            }
            if let Some(found) = child.find_descendant(local) {
                return Some(found);
            }
        }
        None
    }

    /// All descendants (excluding self) with the given local name, in document order
    pub fn descendants(&self, local: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        self.collect_descendants(local, &mut found);
        found
    }

    fn collect_descendants<'a>(&'a self, local: &str, found: &mut Vec<&'a Element>) {
        for child in self.child_elements() {
            if child.local_name() == local {
                found.push(child);
            }
            child.collect_descendants(local, found);
        }
    }

    /// Counts self and descendants with the given local name
    pub fn count_named(&self, local: &str) -> usize {
        usize::from(self.local_name() == local) + self.descendants(local).len()
    }

    /// Concatenated text of direct text children
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Trimmed text of the first descendant with the given local name
    pub fn descendant_text(&self, local: &str) -> Option<String> {
        self.find_descendant(local).map(|e| e.text().trim().to_string())
    }

    /// Removes every whitespace-only text node in the subtree
    pub fn strip_whitespace_text(&mut self) {
        self.children.retain(|n| match n {
            Node::Text(t) => !t.chars().all(char::is_whitespace),
            _ => true,
        });
        for child in self.child_elements_mut() {
            child.strip_whitespace_text();
        }
    }

    /// Declares on this element every binding it inherits from `parent`
    ///
    /// Lets a subtree be moved out of its document without changing the
    /// namespace of any name in it.
    pub fn detach_from(&mut self, parent: &NsScope) {
        for decl in parent.effective() {
            if self.namespaces.iter().all(|d| d.prefix != decl.prefix) {
                self.namespaces.push(decl);
            }
        }
    }

    /// Removes direct children with the given local name, returning them
    pub fn take_children_named(&mut self, local: &str) -> Vec<Element> {
        let mut taken = Vec::new();
        let mut kept = Vec::with_capacity(self.children.len());
        for node in self.children.drain(..) {
            match node {
                Node::Element(e) if e.local_name() == local => taken.push(e),
                other => kept.push(other),
            }
        }
        self.children = kept;
        taken
    }
}

/// In-scope namespace bindings while walking a tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NsScope {
    bindings: Vec<NamespaceDecl>,
}

impl NsScope {
    /// Scope inside `element`, given that `self` is the scope of its parent
    pub fn enter(&self, element: &Element) -> NsScope {
        let mut bindings = self.bindings.clone();
        bindings.extend(element.namespaces.iter().cloned());
        NsScope { bindings }
    }

    /// Scope built from the chain of ancestors, outermost first
    pub fn from_ancestors<'a>(ancestors: impl IntoIterator<Item = &'a Element>) -> NsScope {
        ancestors
            .into_iter()
            .fold(NsScope::default(), |scope, e| scope.enter(e))
    }

    /// Resolves a prefix; an empty default namespace resolves to `None`
    pub fn resolve(&self, prefix: Option<&str>) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|d| d.prefix.as_deref() == prefix)
            .map(|d| d.uri.as_str())
            .filter(|uri| !uri.is_empty())
    }

    /// Effective bindings, one per prefix, innermost declaration winning
    pub fn effective(&self) -> Vec<NamespaceDecl> {
        let mut seen: Vec<NamespaceDecl> = Vec::new();
        for decl in self.bindings.iter().rev() {
            if seen.iter().all(|d| d.prefix != decl.prefix) {
                seen.push(decl.clone());
            }
        }
        seen.reverse();
        seen
    }

    /// Namespace of an element whose own declarations are already in scope
    pub fn namespace_of(&self, name: &QName) -> Option<&str> {
        if name.prefix.as_deref() == Some("xml") {
            return Some(super::XML_NAMESPACE);
        }
        self.resolve(name.prefix.as_deref())
    }
}
