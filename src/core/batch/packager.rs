//! Batch envelope assembly
//!
//! Wraps signed documents in `rLoteDE` and enforces the batch invariants at
//! construction time. Nothing is corrected: a violated invariant fails with
//! `PackagingInvariant` naming it.

use super::archive;
use crate::core::signing::SignedDocument;
use crate::core::xml::names::{
    BATCH, BUSINESS, ENVELOPE, FORBIDDEN_IN_BATCH, ID_ATTR, SIFEN_NS,
};
use crate::core::xml::{parse_document, to_document_string, Element, Node, NsScope};
use crate::domain::{Cdc, EkuatiaError, Result};
use std::collections::HashSet;

/// Largest lot the authority accepts
pub const MAX_DOCUMENTS_PER_BATCH: usize = 50;

/// Validated batch envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    root: Element,
    cdcs: Vec<Cdc>,
}

impl Batch {
    /// `rLoteDE` root
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Identifiers of the contained documents, in batch order
    pub fn cdcs(&self) -> &[Cdc] {
        &self.cdcs
    }

    pub fn document_count(&self) -> usize {
        self.cdcs.len()
    }

    /// Serialized batch: one XML declaration, no whitespace between tags
    pub fn to_xml(&self) -> String {
        to_document_string(&self.root)
    }

    /// Single-entry stored archive holding [`Batch::to_xml`]
    pub fn compress(&self) -> Result<Vec<u8>> {
        archive::compress(self.to_xml().as_bytes())
    }

    /// Base64 wire payload for `xDE`
    pub fn payload(&self) -> Result<String> {
        Ok(archive::encode(&self.compress()?))
    }
}

/// Builds batches of signed documents
#[derive(Debug, Clone)]
pub struct BatchPackager {
    max_documents: usize,
}

impl Default for BatchPackager {
    fn default() -> Self {
        Self::new(MAX_DOCUMENTS_PER_BATCH)
    }
}

impl BatchPackager {
    /// Creates a packager accepting up to `max_documents` per batch
    pub fn new(max_documents: usize) -> Self {
        Self {
            max_documents: max_documents.clamp(1, MAX_DOCUMENTS_PER_BATCH),
        }
    }

    /// Wraps one signed document
    pub fn package_single(&self, document: &SignedDocument) -> Result<Batch> {
        self.package(std::slice::from_ref(document))
    }

    /// Wraps signed documents in order
    ///
    /// # Errors
    ///
    /// - `EkuatiaError::Xml` if a document does not parse
    /// - `EkuatiaError::PackagingInvariant` for an empty or oversized batch,
    ///   a forbidden element, a missing or repeated identifier, or a document
    ///   outside the authority namespace
    pub fn package(&self, documents: &[SignedDocument]) -> Result<Batch> {
        let envelopes = documents
            .iter()
            .map(|doc| parse_document(doc.as_bytes()).map(|d| d.root))
            .collect::<Result<Vec<_>>>()?;
        self.assemble(envelopes)
    }

    /// Validates and adopts an externally built `rLoteDE`
    ///
    /// Whitespace between the documents is dropped; anything else that is not
    /// an `rDE` is a violation.
    pub fn package_envelope(&self, bytes: &[u8]) -> Result<Batch> {
        let doc = parse_document(bytes)?;
        let root = doc.root;
        if root.local_name() != BATCH {
            return Err(EkuatiaError::PackagingInvariant(format!(
                "batch root is <{}>, expected <{BATCH}>",
                root.name
            )));
        }

        check_forbidden(&root, BATCH)?;

        let scope = NsScope::default().enter(&root);
        if scope.namespace_of(&root.name) != Some(SIFEN_NS) {
            return Err(EkuatiaError::PackagingInvariant(format!(
                "<{BATCH}> is not in namespace '{SIFEN_NS}'"
            )));
        }

        let mut envelopes = Vec::new();
        for node in root.children {
            match node {
                Node::Element(mut e) if e.local_name() == ENVELOPE => {
                    e.detach_from(&scope);
                    envelopes.push(e);
                }
                Node::Element(e) => {
                    return Err(EkuatiaError::PackagingInvariant(format!(
                        "unexpected <{}> directly inside <{BATCH}>",
                        e.name
                    )))
                }
                Node::Text(t) if !t.chars().all(char::is_whitespace) => {
                    return Err(EkuatiaError::PackagingInvariant(format!(
                        "text content directly inside <{BATCH}>"
                    )))
                }
                _ => {}
            }
        }

        self.assemble(envelopes)
    }

    fn assemble(&self, envelopes: Vec<Element>) -> Result<Batch> {
        if envelopes.is_empty() {
            return Err(EkuatiaError::PackagingInvariant(format!(
                "<{BATCH}> must contain at least one <{ENVELOPE}>"
            )));
        }
        if envelopes.len() > self.max_documents {
            return Err(EkuatiaError::PackagingInvariant(format!(
                "{} documents exceed the limit of {} per batch",
                envelopes.len(),
                self.max_documents
            )));
        }

        let mut root = Element::new(BATCH).with_default_namespace(SIFEN_NS);
        let mut cdcs = Vec::with_capacity(envelopes.len());
        let mut seen = HashSet::new();

        for (position, mut envelope) in envelopes.into_iter().enumerate() {
            let index = position + 1;
            if envelope.local_name() != ENVELOPE {
                return Err(EkuatiaError::PackagingInvariant(format!(
                    "document #{index} is <{}>, expected <{ENVELOPE}>",
                    envelope.name
                )));
            }
            let scope = NsScope::default().enter(&envelope);
            if scope.namespace_of(&envelope.name) != Some(SIFEN_NS) {
                return Err(EkuatiaError::PackagingInvariant(format!(
                    "document #{index} is not in namespace '{SIFEN_NS}'"
                )));
            }
            check_forbidden(&envelope, ENVELOPE)?;

            let cdc = envelope
                .find_child(BUSINESS)
                .and_then(|de| de.attr(ID_ATTR))
                .and_then(|id| Cdc::new(id.trim()).ok())
                .ok_or_else(|| {
                    EkuatiaError::PackagingInvariant(format!(
                        "document #{index} has no <{BUSINESS}> with a non-empty {ID_ATTR}"
                    ))
                })?;
            if !seen.insert(cdc.clone()) {
                return Err(EkuatiaError::PackagingInvariant(format!(
                    "document {cdc} appears twice in the batch"
                )));
            }

            // Declared once on the batch root.
            envelope
                .namespaces
                .retain(|d| !(d.prefix.is_none() && d.uri == SIFEN_NS));

            root.children.push(Node::Element(envelope));
            cdcs.push(cdc);
        }

        tracing::debug!(documents = cdcs.len(), "Packaged batch");
        Ok(Batch { root, cdcs })
    }
}

fn check_forbidden(element: &Element, context: &str) -> Result<()> {
    for name in FORBIDDEN_IN_BATCH {
        let count = element.count_named(name);
        if count > 0 {
            return Err(EkuatiaError::PackagingInvariant(format!(
                "forbidden element <{name}> found {count} time(s) inside <{context}>"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::signing::check_envelope;
    use crate::core::signing::test_support::{signed_document, TEST_CDC};

    const OTHER_CDC: &str = "01800123456001001000000220250101123456780";

    #[test]
    fn test_single_document_batch() {
        let signed = signed_document(TEST_CDC);
        let batch = BatchPackager::default().package_single(&signed).unwrap();

        assert_eq!(batch.document_count(), 1);
        assert_eq!(batch.cdcs()[0].as_str(), TEST_CDC);

        let xml = batch.to_xml();
        assert_eq!(xml.matches(&format!("xmlns=\"{SIFEN_NS}\"")).count(), 1);
        assert_eq!(xml.matches("<?xml").count(), 1);
        assert!(xml.contains(&format!("<{BATCH} xmlns=\"{SIFEN_NS}\"><{ENVELOPE}>")));
    }

    #[test]
    fn test_signature_survives_packaging() {
        let batch = BatchPackager::default()
            .package(&[signed_document(TEST_CDC), signed_document(OTHER_CDC)])
            .unwrap();

        let reparsed = parse_document(batch.to_xml().as_bytes()).unwrap().root;
        let scope = NsScope::default().enter(&reparsed);
        for envelope in reparsed.child_elements() {
            assert!(check_envelope(envelope, &scope).is_empty());
        }
    }

    #[test]
    fn test_empty_batch_rejected() {
        let err = BatchPackager::default().package(&[]).unwrap_err();
        assert!(matches!(err, EkuatiaError::PackagingInvariant(_)));
    }

    #[test]
    fn test_batch_limit() {
        let signed = signed_document(TEST_CDC);
        let other = signed_document(OTHER_CDC);
        let err = BatchPackager::new(1).package(&[signed, other]).unwrap_err();
        assert!(err.to_string().contains("exceed the limit"));
    }

    #[test]
    fn test_duplicate_document_rejected() {
        let signed = signed_document(TEST_CDC);
        let err = BatchPackager::default()
            .package(&[signed.clone(), signed])
            .unwrap_err();
        assert!(err.to_string().contains("appears twice"));
    }

    #[test]
    fn test_envelope_with_submission_id_rejected() {
        let signed = signed_document(TEST_CDC);
        let body = signed.xml().trim_start_matches(crate::core::xml::XML_DECLARATION);
        let envelope = format!(r#"<{BATCH} xmlns="{SIFEN_NS}"><dId>1</dId>{body}</{BATCH}>"#);

        let err = BatchPackager::default()
            .package_envelope(envelope.as_bytes())
            .unwrap_err();
        match err {
            EkuatiaError::PackagingInvariant(msg) => assert!(msg.contains("<dId>")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_envelope_without_documents_rejected() {
        let envelope = format!(r#"<{BATCH} xmlns="{SIFEN_NS}"></{BATCH}>"#);
        let err = BatchPackager::default()
            .package_envelope(envelope.as_bytes())
            .unwrap_err();
        assert!(matches!(err, EkuatiaError::PackagingInvariant(_)));
    }

    #[test]
    fn test_prebuilt_envelope_adopted() {
        let signed = signed_document(TEST_CDC);
        let body = signed.xml().trim_start_matches(crate::core::xml::XML_DECLARATION);
        let envelope = format!("<{BATCH} xmlns=\"{SIFEN_NS}\">\n{body}\n</{BATCH}>");

        let batch = BatchPackager::default()
            .package_envelope(envelope.as_bytes())
            .unwrap();
        let expected = BatchPackager::default().package_single(&signed).unwrap();
        assert_eq!(batch.to_xml(), expected.to_xml());
    }
}
