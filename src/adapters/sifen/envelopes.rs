//! SOAP 1.2 request envelopes
//!
//! Every request is `<env:Envelope><env:Header/><env:Body><request
//! xmlns="…/sifen/xsd">…</request></env:Body></env:Envelope>`, serialized
//! without whitespace between tags.

use crate::core::xml::names::{PAYLOAD, SIFEN_NS, SOAP_NS, SUBMISSION_ID};
use crate::core::xml::{parse_document, to_document_string, Element, NamespaceDecl, Node, QName};
use crate::domain::{Cdc, EkuatiaError, Result, SubmissionId, TaxId, TrackingNumber};
use regex::Regex;
use std::sync::OnceLock;

/// Submit-batch request element
pub const SUBMIT_BATCH: &str = "rEnvioLote";
/// Query-batch request element
pub const QUERY_BATCH: &str = "rEnviConsLoteDe";
/// Query-taxpayer request element
pub const QUERY_TAXPAYER: &str = "rEnviConsRUC";
/// Query-document request element
pub const QUERY_DOCUMENT: &str = "rEnviConsDeRequest";

const SOAP_PREFIX: &str = "env";

/// `rEnvioLote` carrying the base64 batch payload
pub fn submit_batch(submission_id: &SubmissionId, payload: &str) -> String {
    wrap(
        Element::new(SUBMIT_BATCH)
            .with_default_namespace(SIFEN_NS)
            .with_child(Element::new(SUBMISSION_ID).with_text(submission_id.as_str()))
            .with_child(Element::new(PAYLOAD).with_text(payload)),
    )
}

/// `rEnviConsLoteDe` for one tracking number
pub fn query_batch(submission_id: &SubmissionId, tracking_number: &TrackingNumber) -> String {
    wrap(
        Element::new(QUERY_BATCH)
            .with_default_namespace(SIFEN_NS)
            .with_child(Element::new(SUBMISSION_ID).with_text(submission_id.as_str()))
            .with_child(Element::new("dProtConsLote").with_text(tracking_number.as_str())),
    )
}

/// `rEnviConsRUC`; the registry is queried by number, without check digit
pub fn query_taxpayer(submission_id: &SubmissionId, tax_id: &TaxId) -> String {
    wrap(
        Element::new(QUERY_TAXPAYER)
            .with_default_namespace(SIFEN_NS)
            .with_child(Element::new(SUBMISSION_ID).with_text(submission_id.as_str()))
            .with_child(Element::new("dRUCCons").with_text(tax_id.number())),
    )
}

/// `rEnviConsDeRequest` for one document
pub fn query_document(submission_id: &SubmissionId, cdc: &Cdc) -> String {
    wrap(
        Element::new(QUERY_DOCUMENT)
            .with_default_namespace(SIFEN_NS)
            .with_child(Element::new(SUBMISSION_ID).with_text(submission_id.as_str()))
            .with_child(Element::new("dCDC").with_text(cdc.as_str())),
    )
}

fn soap_element(local: &str) -> Element {
    let mut element = Element::new(local);
    element.name = QName {
        prefix: Some(SOAP_PREFIX.to_string()),
        local: local.to_string(),
    };
    element
}

fn wrap(request: Element) -> String {
    let mut envelope = soap_element("Envelope");
    envelope.namespaces.push(NamespaceDecl {
        prefix: Some(SOAP_PREFIX.to_string()),
        uri: SOAP_NS.to_string(),
    });
    envelope.children.push(Node::Element(soap_element("Header")));
    envelope
        .children
        .push(Node::Element(soap_element("Body").with_child(request)));
    to_document_string(&envelope)
}

/// Identifier and payload read back from a serialized submit envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitEnvelopeParts {
    pub submission_id: Option<String>,
    pub payload: Option<String>,
}

/// Reads `dId` and `xDE` out of an `rEnvioLote` envelope
///
/// # Errors
///
/// Returns `EkuatiaError::Xml` if the envelope is not well-formed.
pub fn read_submit_envelope(bytes: &[u8]) -> Result<SubmitEnvelopeParts> {
    let doc = parse_document(bytes)?;
    let request = doc
        .root
        .find_descendant(SUBMIT_BATCH)
        .ok_or_else(|| EkuatiaError::Xml(format!("no <{SUBMIT_BATCH}> in envelope")))?;
    Ok(SubmitEnvelopeParts {
        submission_id: request.descendant_text(SUBMISSION_ID),
        payload: request.descendant_text(PAYLOAD),
    })
}

fn payload_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(<(?:[A-Za-z_][\w.-]*:)?xDE(?:\s[^>]*)?>)([^<]*)(</(?:[A-Za-z_][\w.-]*:)?xDE>)")
            .expect("payload pattern is valid")
    })
}

/// Replaces the `xDE` content with `[REDACTED <n> bytes]`
///
/// Only the payload is touched; the rest of the message is returned as is.
pub fn redact_payload(message: &str) -> String {
    payload_pattern()
        .replace_all(message, |caps: &regex::Captures<'_>| {
            format!("{}[REDACTED {} bytes]{}", &caps[1], caps[2].len(), &caps[3])
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> SubmissionId {
        SubmissionId::new("250101123456789").unwrap()
    }

    #[test]
    fn test_submit_envelope_layout() {
        let xml = submit_batch(&id(), "UEsDBA==");
        assert_eq!(
            xml,
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><env:Envelope xmlns:env="{SOAP_NS}"><env:Header/><env:Body><rEnvioLote xmlns="{SIFEN_NS}"><dId>250101123456789</dId><xDE>UEsDBA==</xDE></rEnvioLote></env:Body></env:Envelope>"#
            )
        );
    }

    #[test]
    fn test_read_back_submit_envelope() {
        let xml = submit_batch(&id(), "UEsDBA==");
        let parts = read_submit_envelope(xml.as_bytes()).unwrap();
        assert_eq!(parts.submission_id.as_deref(), Some("250101123456789"));
        assert_eq!(parts.payload.as_deref(), Some("UEsDBA=="));
    }

    #[test]
    fn test_query_envelopes() {
        let tracking = TrackingNumber::new("123456").unwrap();
        assert!(query_batch(&id(), &tracking).contains("<dProtConsLote>123456</dProtConsLote>"));

        let ruc = TaxId::new("80012345-6").unwrap();
        assert!(query_taxpayer(&id(), &ruc).contains("<dRUCCons>80012345</dRUCCons>"));

        let cdc = Cdc::new("01800123456001001000000120250101123456789").unwrap();
        assert!(query_document(&id(), &cdc)
            .contains("<dCDC>01800123456001001000000120250101123456789</dCDC>"));
    }

    #[test]
    fn test_redaction_keeps_structure() {
        let xml = submit_batch(&id(), "QUJDREVGRw==");
        let redacted = redact_payload(&xml);
        assert!(redacted.contains("<xDE>[REDACTED 12 bytes]</xDE>"));
        assert!(redacted.contains("<dId>250101123456789</dId>"));
        assert!(!redacted.contains("QUJDREVGRw=="));

        let prefixed = "<s:xDE>AAAA</s:xDE>";
        assert_eq!(redact_payload(prefixed), "<s:xDE>[REDACTED 4 bytes]</s:xDE>");
    }
}
