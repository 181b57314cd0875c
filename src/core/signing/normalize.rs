//! Envelope normalization
//!
//! One pass that turns any accepted input shape into the unsigned envelope
//! layout: `rDE` root declaring the SIFEN default namespace, children ordered
//! by [`envelope_rank`], no whitespace-only text, no comments, no signature.
//! Invariants are asserted afterwards and never patched.

use crate::core::xml::names::{
    BUSINESS, DSIG_NS, ENVELOPE, ID_ATTR, QR_BLOCK, SIFEN_NS, SIGNATURE, VERSION_MARKER,
};
use crate::core::xml::{Element, NamespaceDecl, Node, NsScope};
use crate::domain::{Cdc, EkuatiaError, ProfileViolation, Result};

/// Position of an envelope child in the required sibling order
///
/// `dVerFor` < `DE` < `Signature` < `gCamFuFD` < anything else. The sort
/// using it is stable, so unknown children keep their relative order.
pub fn envelope_rank(local_name: &str) -> u8 {
    match local_name {
        VERSION_MARKER => 0,
        BUSINESS => 1,
        SIGNATURE => 2,
        QR_BLOCK => 3,
        _ => 4,
    }
}

/// Unsigned envelope ready for signing
#[derive(Debug, Clone)]
pub struct NormalizedEnvelope {
    /// `rDE` root
    pub root: Element,

    /// Identifier of the business element
    pub cdc: Cdc,
}

/// Normalizes a parsed input tree
///
/// Accepts a bare `DE` (wrapped in a fresh `rDE` with `dVerFor = version`) or
/// an `rDE`. Existing `Signature` elements are dropped; the caller decides
/// beforehand whether a signature is real and must be kept.
///
/// # Errors
///
/// - `EkuatiaError::Xml` for an unexpected root or a foreign-namespace element
/// - `EkuatiaError::MissingIdentifier` if `DE` has no `Id`
/// - `EkuatiaError::SignatureProfile` if the envelope holds more than one
///   `DE`, `dVerFor` or `gCamFuFD`
pub fn normalize_envelope(mut root: Element, version: &str) -> Result<NormalizedEnvelope> {
    root = match root.local_name() {
        ENVELOPE => root,
        BUSINESS => Element::new(ENVELOPE)
            .with_child(Element::new(VERSION_MARKER).with_text(version))
            .with_child(root),
        other => {
            return Err(EkuatiaError::Xml(format!(
                "expected <{ENVELOPE}> or <{BUSINESS}> as document root, found <{other}>"
            )))
        }
    };

    let scope = NsScope::default();
    unify_namespaces(&mut root, &scope, true)?;
    strip_noise(&mut root);
    root.namespaces.retain(|d| d.prefix.is_some());
    root.namespaces.insert(0, NamespaceDecl::default_ns(SIFEN_NS));

    if root.child_elements().all(|e| e.local_name() != VERSION_MARKER) {
        root.children
            .insert(0, Node::Element(Element::new(VERSION_MARKER).with_text(version)));
    }

    sort_envelope_children(&mut root);

    let cdc = assert_envelope(&root)?;
    Ok(NormalizedEnvelope { root, cdc })
}

/// Stable-sorts element children of the envelope by [`envelope_rank`]
pub fn sort_envelope_children(envelope: &mut Element) {
    envelope.children.sort_by_key(|node| match node {
        Node::Element(e) => envelope_rank(e.local_name()),
        _ => 4,
    });
}

/// Removes signatures, comments, processing instructions and whitespace-only text
fn strip_noise(element: &mut Element) {
    element.children.retain(|node| match node {
        Node::Element(e) => e.local_name() != SIGNATURE,
        Node::Text(t) => !t.chars().all(char::is_whitespace),
        Node::Comment(_) | Node::ProcessingInstruction { .. } => false,
    });
    for child in element.child_elements_mut() {
        strip_noise(child);
    }
}

/// Rewrites SIFEN and no-namespace elements as unprefixed SIFEN elements
///
/// Declarations binding the SIFEN namespace (and default declarations) are
/// removed below the root; the root's single default declaration is added
/// by the caller. Signature subtrees are skipped since they are dropped.
fn unify_namespaces(element: &mut Element, parent: &NsScope, is_root: bool) -> Result<()> {
    let scope = parent.enter(element);

    if element.local_name() == SIGNATURE && scope.namespace_of(&element.name) == Some(DSIG_NS) {
        return Ok(());
    }

    match scope.namespace_of(&element.name) {
        None | Some(SIFEN_NS) => element.name.prefix = None,
        Some(other) => {
            return Err(EkuatiaError::Xml(format!(
                "element <{}> is in unexpected namespace '{other}'",
                element.name
            )))
        }
    }

    let used_prefixes: Vec<String> = element
        .attributes
        .iter()
        .filter_map(|a| a.name.prefix.clone())
        .collect();
    element.namespaces.retain(|decl| match &decl.prefix {
        None => is_root,
        Some(prefix) => decl.uri != SIFEN_NS || used_prefixes.contains(prefix),
    });

    for child in element.child_elements_mut() {
        unify_namespaces(child, &scope, false)?;
    }
    Ok(())
}

/// Checks the structural invariants of a normalized envelope
fn assert_envelope(root: &Element) -> Result<Cdc> {
    let mut violations = Vec::new();

    let businesses: Vec<&Element> = root
        .child_elements()
        .filter(|e| e.local_name() == BUSINESS)
        .collect();
    let business = match businesses.as_slice() {
        [single] => *single,
        [] => {
            return Err(EkuatiaError::MissingIdentifier(format!(
                "<{ENVELOPE}> has no <{BUSINESS}> element"
            )))
        }
        _ => {
            return Err(EkuatiaError::Xml(format!(
                "<{ENVELOPE}> holds {} <{BUSINESS}> elements",
                businesses.len()
            )))
        }
    };

    let id = business.attr(ID_ATTR).unwrap_or("").trim();
    if id.is_empty() {
        return Err(EkuatiaError::MissingIdentifier(format!(
            "<{BUSINESS}> has no {ID_ATTR} attribute"
        )));
    }
    let cdc = Cdc::new(id).map_err(EkuatiaError::MissingIdentifier)?;

    let versions = root
        .child_elements()
        .filter(|e| e.local_name() == VERSION_MARKER)
        .count();
    if versions != 1 {
        return Err(EkuatiaError::Xml(format!(
            "<{ENVELOPE}> holds {versions} <{VERSION_MARKER}> elements"
        )));
    }

    let qr_blocks = root.count_named(QR_BLOCK);
    if qr_blocks > 1 {
        violations.push(ProfileViolation::DuplicateQrBlock(qr_blocks));
    }
    if violations.is_empty() {
        Ok(cdc)
    } else {
        Err(EkuatiaError::SignatureProfile(violations))
    }
}
