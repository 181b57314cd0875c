//! Canonical signer
//!
//! Produces the one signed layout the authority accepts: the envelope is
//! normalized, `DE` is digested under exclusive C14N, and the enveloped
//! `Signature` is placed right after `DE`. Every signed document is
//! re-verified before it is returned.

use super::normalize::{normalize_envelope, sort_envelope_children};
use super::profile::{check_signed_document, ensure_conforms, has_real_signature};
use crate::core::certificate::CertificateIdentity;
use crate::core::xml::names::{
    BUSINESS, DSIG_NS, ENVELOPED_SIGNATURE, ENVELOPE, EXC_C14N, ID_ATTR, RSA_SHA256, SHA256,
};
use crate::core::xml::{
    canonical_bytes, parse_document, to_document_string, Element, Node, NsScope,
};
use crate::domain::{Cdc, EkuatiaError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Signed `rDE` document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDocument {
    cdc: Cdc,
    xml: String,
    passthrough: bool,
}

impl SignedDocument {
    /// Identifier of the signed business element
    pub fn cdc(&self) -> &Cdc {
        &self.cdc
    }

    /// Serialized document
    pub fn xml(&self) -> &str {
        &self.xml
    }

    /// Serialized document bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.xml.as_bytes()
    }

    /// Whether an existing signature was kept instead of signing again
    pub fn is_passthrough(&self) -> bool {
        self.passthrough
    }
}

/// Signs documents with one loaded identity
#[derive(Debug, Clone)]
pub struct CanonicalSigner {
    identity: Arc<CertificateIdentity>,
    version: String,
}

impl CanonicalSigner {
    /// Creates a signer
    ///
    /// # Arguments
    ///
    /// * `identity` - Signing identity, shared with the transport
    /// * `version` - Format version written to `dVerFor` when it is missing
    pub fn new(identity: Arc<CertificateIdentity>, version: impl Into<String>) -> Self {
        Self {
            identity,
            version: version.into(),
        }
    }

    /// Signing identity
    pub fn identity(&self) -> &CertificateIdentity {
        &self.identity
    }

    /// Signs a `DE` or `rDE` document
    ///
    /// A document that already carries a signature with a real certificate is
    /// returned byte for byte, after the same profile check a fresh signature
    /// gets. Placeholder signatures are discarded and replaced.
    ///
    /// # Errors
    ///
    /// - `EkuatiaError::Xml` for malformed input
    /// - `EkuatiaError::MissingIdentifier` if `DE` has no `Id`
    /// - `EkuatiaError::Certificate` if the key cannot sign
    /// - `EkuatiaError::SignatureProfile` if the result fails the self-check
    pub fn sign(&self, input: &[u8]) -> Result<SignedDocument> {
        let doc = parse_document(input)?;

        if doc.root.local_name() == ENVELOPE && has_real_signature(&doc.root) {
            return self.passthrough(input, &doc.root);
        }

        let mut envelope = normalize_envelope(doc.root, &self.version)?;
        let envelope_scope = NsScope::default().enter(&envelope.root);

        let business = envelope
            .root
            .find_child(BUSINESS)
            .ok_or_else(|| EkuatiaError::MissingIdentifier(format!("no <{BUSINESS}> element")))?;
        let digest = STANDARD.encode(Sha256::digest(canonical_bytes(business, &envelope_scope)));

        let mut signature = signature_template(envelope.cdc.as_str(), &digest);
        let signature_scope = envelope_scope.enter(&signature);
        let signed_info = signature
            .find_child("SignedInfo")
            .ok_or_else(|| EkuatiaError::Xml("signature template lacks SignedInfo".to_string()))?;
        let value = self
            .identity
            .sign_sha256(&canonical_bytes(signed_info, &signature_scope))?;

        if let Some(slot) = signature
            .child_elements_mut()
            .find(|e| e.local_name() == "SignatureValue")
        {
            slot.children.push(Node::Text(STANDARD.encode(value)));
        }
        signature.children.push(Node::Element(
            Element::new("KeyInfo").with_child(
                Element::new("X509Data").with_child(
                    Element::new("X509Certificate").with_text(self.identity.certificate_base64()?),
                ),
            ),
        ));

        envelope.root.children.push(Node::Element(signature));
        sort_envelope_children(&mut envelope.root);

        let xml = to_document_string(&envelope.root);
        ensure_conforms(check_signed_document(xml.as_bytes())?)?;

        tracing::debug!(cdc = %envelope.cdc, "Signed document");

        Ok(SignedDocument {
            cdc: envelope.cdc,
            xml,
            passthrough: false,
        })
    }

    fn passthrough(&self, input: &[u8], root: &Element) -> Result<SignedDocument> {
        let id = root
            .find_child(BUSINESS)
            .and_then(|de| de.attr(ID_ATTR))
            .unwrap_or("")
            .trim();
        if id.is_empty() {
            return Err(EkuatiaError::MissingIdentifier(format!(
                "<{BUSINESS}> has no {ID_ATTR} attribute"
            )));
        }
        let cdc = Cdc::new(id).map_err(EkuatiaError::MissingIdentifier)?;

        ensure_conforms(check_signed_document(input)?)?;

        let xml = String::from_utf8(input.to_vec())
            .map_err(|e| EkuatiaError::Xml(format!("document is not UTF-8: {e}")))?;

        tracing::info!(cdc = %cdc, "Document already signed, keeping existing signature");

        Ok(SignedDocument {
            cdc,
            xml,
            passthrough: true,
        })
    }
}

/// `Signature` with `SignedInfo` filled in and an empty `SignatureValue`
fn signature_template(cdc: &str, digest: &str) -> Element {
    let transforms = Element::new("Transforms")
        .with_child(Element::new("Transform").with_attr("Algorithm", ENVELOPED_SIGNATURE))
        .with_child(Element::new("Transform").with_attr("Algorithm", EXC_C14N));

    let reference = Element::new("Reference")
        .with_attr("URI", format!("#{cdc}"))
        .with_child(transforms)
        .with_child(Element::new("DigestMethod").with_attr("Algorithm", SHA256))
        .with_child(Element::new("DigestValue").with_text(digest));

    let signed_info = Element::new("SignedInfo")
        .with_child(Element::new("CanonicalizationMethod").with_attr("Algorithm", EXC_C14N))
        .with_child(Element::new("SignatureMethod").with_attr("Algorithm", RSA_SHA256))
        .with_child(reference);

    Element::new("Signature")
        .with_default_namespace(DSIG_NS)
        .with_child(signed_info)
        .with_child(Element::new("SignatureValue"))
}
