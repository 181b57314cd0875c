//! Signature profile self-check
//!
//! Read-only verification of a signed envelope against the fixed profile:
//! one signature placed right after `DE`, exclusive C14N, RSA-SHA256,
//! SHA-256 digest over `#<Id>`, the allowed transform lists, a real embedded
//! certificate, and a digest and signature value that actually verify.

use super::normalize::envelope_rank;
use crate::core::xml::names::{
    BUSINESS, DSIG_NS, ENVELOPED_SIGNATURE, EXC_C14N, ID_ATTR, QR_BLOCK, RSA_SHA256, SHA256,
    SIGNATURE,
};
use crate::core::xml::{
    canonical_bytes, has_inter_tag_whitespace, parse_document, Element, Node, NsScope,
};
use crate::domain::{EkuatiaError, ProfileViolation, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use openssl::hash::MessageDigest;
use openssl::sign::Verifier;
use openssl::x509::X509;
use sha2::{Digest, Sha256};

/// Transform lists accepted on the reference, in order
pub const ALLOWED_TRANSFORMS: [&[&str]; 2] = [
    &[ENVELOPED_SIGNATURE],
    &[ENVELOPED_SIGNATURE, EXC_C14N],
];

/// Checks a serialized signed document, including its raw whitespace
///
/// # Errors
///
/// Returns `EkuatiaError::Xml` if the bytes do not parse. Profile problems are
/// returned as the list of violations, empty when the document conforms.
pub fn check_signed_document(bytes: &[u8]) -> Result<Vec<ProfileViolation>> {
    let doc = parse_document(bytes)?;
    let mut violations = Vec::new();
    if has_inter_tag_whitespace(bytes) {
        violations.push(ProfileViolation::InterTagWhitespace);
    }
    violations.extend(check_envelope(&doc.root, &NsScope::default()));
    Ok(violations)
}

/// Checks one signed envelope element
///
/// `parent_scope` holds the namespace bindings in scope at the envelope's
/// parent (empty for a standalone document, the batch root inside a batch).
pub fn check_envelope(envelope: &Element, parent_scope: &NsScope) -> Vec<ProfileViolation> {
    let mut violations = Vec::new();

    let signature_count = envelope.count_named(SIGNATURE);
    if signature_count != 1 {
        violations.push(ProfileViolation::SignatureCount(signature_count));
        return violations;
    }

    let qr_blocks = envelope.count_named(QR_BLOCK);
    if qr_blocks > 1 {
        violations.push(ProfileViolation::DuplicateQrBlock(qr_blocks));
    }

    let children: Vec<&Element> = envelope.child_elements().collect();
    let ranks: Vec<u8> = children.iter().map(|e| envelope_rank(e.local_name())).collect();
    if ranks.windows(2).any(|w| w[0] > w[1]) {
        violations.push(ProfileViolation::EnvelopeOrder(
            children.iter().map(|e| e.local_name().to_string()).collect(),
        ));
    }

    let business_pos = children.iter().position(|e| e.local_name() == BUSINESS);
    let signature_pos = children.iter().position(|e| e.local_name() == SIGNATURE);
    let (business, signature) = match (business_pos, signature_pos) {
        (Some(b), Some(s)) => {
            if s != b + 1 {
                violations.push(ProfileViolation::MisplacedSignature);
            }
            (children[b], children[s])
        }
        (None, _) => {
            violations.push(ProfileViolation::MissingElement("DE"));
            return violations;
        }
        (Some(_), None) => {
            violations.push(ProfileViolation::MisplacedSignature);
            return violations;
        }
    };

    let envelope_scope = parent_scope.enter(envelope);
    let signature_scope = envelope_scope.enter(signature);
    if signature_scope.namespace_of(&signature.name) != Some(DSIG_NS) {
        violations.push(ProfileViolation::MissingElement(
            "Signature in the XML-DSig namespace",
        ));
        return violations;
    }

    let Some(signed_info) = signature.find_child("SignedInfo") else {
        violations.push(ProfileViolation::MissingElement("SignedInfo"));
        return violations;
    };

    let c14n_ok = check_algorithm(
        signed_info.find_child("CanonicalizationMethod"),
        "CanonicalizationMethod",
        EXC_C14N,
        ProfileViolation::CanonicalizationMethod,
        &mut violations,
    );
    let signature_method_ok = check_algorithm(
        signed_info.find_child("SignatureMethod"),
        "SignatureMethod",
        RSA_SHA256,
        ProfileViolation::SignatureMethod,
        &mut violations,
    );

    let reference = signed_info.find_child("Reference");
    let digest_ok = match reference {
        Some(reference) => check_reference(reference, business, &mut violations),
        None => {
            violations.push(ProfileViolation::MissingElement("Reference"));
            false
        }
    };

    let certificate = match signature.find_descendant("X509Certificate") {
        Some(el) => check_certificate(&el.text(), &mut violations),
        None => {
            violations.push(ProfileViolation::MissingElement("X509Certificate"));
            None
        }
    };

    if digest_ok {
        if let Some(reference) = reference {
            verify_digest(reference, business, &envelope_scope, &mut violations);
        }
    }

    if c14n_ok && signature_method_ok {
        match signature.find_child("SignatureValue") {
            Some(value) => {
                if let Some(cert) = &certificate {
                    verify_signature_value(
                        signed_info,
                        &signature_scope,
                        &value.text(),
                        cert,
                        &mut violations,
                    );
                }
            }
            None => violations.push(ProfileViolation::MissingElement("SignatureValue")),
        }
    }

    violations
}

/// Whether the envelope already carries a signature with a real certificate
pub fn has_real_signature(envelope: &Element) -> bool {
    envelope
        .descendants(SIGNATURE)
        .iter()
        .filter_map(|sig| sig.find_descendant("X509Certificate"))
        .any(|cert| parse_certificate(&cert.text()).is_some())
}

fn check_algorithm(
    element: Option<&Element>,
    name: &'static str,
    expected: &str,
    violation: fn(String) -> ProfileViolation,
    violations: &mut Vec<ProfileViolation>,
) -> bool {
    match element {
        None => {
            violations.push(ProfileViolation::MissingElement(name));
            false
        }
        Some(el) => {
            let found = el.attr("Algorithm").unwrap_or("");
            if found == expected {
                true
            } else {
                violations.push(violation(found.to_string()));
                false
            }
        }
    }
}

/// Checks URI, transforms and digest method; true when the digest can be recomputed
fn check_reference(
    reference: &Element,
    business: &Element,
    violations: &mut Vec<ProfileViolation>,
) -> bool {
    let mut ok = true;

    let id = business.attr(ID_ATTR).unwrap_or("");
    let expected = format!("#{id}");
    let found = reference.attr("URI").unwrap_or("");
    if id.is_empty() || found != expected {
        violations.push(ProfileViolation::ReferenceUri {
            expected,
            found: found.to_string(),
        });
        ok = false;
    }

    let transforms = transform_list(reference);
    if !ALLOWED_TRANSFORMS
        .iter()
        .any(|allowed| transforms.iter().map(String::as_str).eq(allowed.iter().copied()))
    {
        violations.push(ProfileViolation::Transforms(transforms));
        ok = false;
    }

    ok &= check_algorithm(
        reference.find_child("DigestMethod"),
        "DigestMethod",
        SHA256,
        ProfileViolation::DigestMethod,
        violations,
    );

    if reference.find_child("DigestValue").is_none() {
        violations.push(ProfileViolation::MissingElement("DigestValue"));
        ok = false;
    }
    ok
}

fn transform_list(reference: &Element) -> Vec<String> {
    reference
        .find_child("Transforms")
        .map(|t| {
            t.child_elements()
                .filter(|e| e.local_name() == "Transform")
                .map(|e| e.attr("Algorithm").unwrap_or("").to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn check_certificate(text: &str, violations: &mut Vec<ProfileViolation>) -> Option<X509> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        violations.push(ProfileViolation::EmptyCertificate);
        return None;
    }
    let cert = parse_certificate(&compact);
    if cert.is_none() {
        violations.push(ProfileViolation::PlaceholderCertificate);
    }
    cert
}

/// Decodes an embedded certificate
///
/// Placeholders such as `PLACEHOLDER`, `DUMMY` or `XXXX...` never decode to a
/// DER certificate, so anything that does not parse is treated as one.
fn parse_certificate(text: &str) -> Option<X509> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }
    let der = STANDARD.decode(compact.as_bytes()).ok()?;
    X509::from_der(&der).ok()
}

fn verify_digest(
    reference: &Element,
    business: &Element,
    envelope_scope: &NsScope,
    violations: &mut Vec<ProfileViolation>,
) {
    let stored: String = reference
        .find_child("DigestValue")
        .map(|e| e.text())
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let transformed = without_signatures(business);
    let digest = Sha256::digest(canonical_bytes(&transformed, envelope_scope));
    if STANDARD.encode(digest) != stored {
        violations.push(ProfileViolation::DigestMismatch);
    }
}

fn verify_signature_value(
    signed_info: &Element,
    signature_scope: &NsScope,
    value: &str,
    cert: &X509,
    violations: &mut Vec<ProfileViolation>,
) {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    let verified = STANDARD
        .decode(compact.as_bytes())
        .ok()
        .and_then(|sig| {
            let key = cert.public_key().ok()?;
            let mut verifier = Verifier::new(MessageDigest::sha256(), &key).ok()?;
            verifier
                .update(&canonical_bytes(signed_info, signature_scope))
                .ok()?;
            verifier.verify(&sig).ok()
        })
        .unwrap_or(false);

    if !verified {
        violations.push(ProfileViolation::InvalidSignatureValue);
    }
}

/// Enveloped-signature transform: the element without nested signatures
fn without_signatures(element: &Element) -> Element {
    let mut copy = element.clone();
    remove_signatures(&mut copy);
    copy
}

fn remove_signatures(element: &mut Element) {
    element
        .children
        .retain(|n| !matches!(n, Node::Element(e) if e.local_name() == SIGNATURE));
    for child in element.child_elements_mut() {
        remove_signatures(child);
    }
}

/// Fails with `SignatureProfile` when the list is not empty
pub fn ensure_conforms(violations: Vec<ProfileViolation>) -> Result<()> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(EkuatiaError::SignatureProfile(violations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::signing::test_support::{signed_document, test_identity, test_signer, TEST_CDC};
    use crate::core::xml::names::SIFEN_NS;
    use test_case::test_case;

    fn signed() -> String {
        signed_document(TEST_CDC).xml().to_string()
    }

    fn transform(algorithm: &str) -> String {
        format!(r#"<Transform Algorithm="{algorithm}"/>"#)
    }

    fn transforms(list: &[&str]) -> String {
        list.iter().map(|a| transform(a)).collect()
    }

    fn replace_transforms(xml: &str, list: &[&str]) -> String {
        let current = transforms(&[ENVELOPED_SIGNATURE, EXC_C14N]);
        assert!(xml.contains(&current));
        xml.replace(&current, &transforms(list))
    }

    fn swapped_transforms(xml: &str) -> String {
        replace_transforms(xml, &[EXC_C14N, ENVELOPED_SIGNATURE])
    }

    fn three_transforms(xml: &str) -> String {
        replace_transforms(xml, &[ENVELOPED_SIGNATURE, EXC_C14N, EXC_C14N])
    }

    fn c14n_only_transform(xml: &str) -> String {
        replace_transforms(xml, &[EXC_C14N])
    }

    fn foreign_reference(xml: &str) -> String {
        xml.replace(&format!(r##"URI="#{TEST_CDC}""##), r##"URI="#other""##)
    }

    fn empty_reference(xml: &str) -> String {
        xml.replace(&format!(r##"URI="#{TEST_CDC}""##), r#"URI="""#)
    }

    fn signature_block(xml: &str) -> (usize, usize) {
        let start = xml.find("<Signature ").unwrap();
        let end = xml.find("</Signature>").unwrap() + "</Signature>".len();
        (start, end)
    }

    fn without_signature(xml: &str) -> String {
        let (start, end) = signature_block(xml);
        format!("{}{}", &xml[..start], &xml[end..])
    }

    fn doubled_signature(xml: &str) -> String {
        let (start, end) = signature_block(xml);
        format!("{}{}{}", &xml[..end], &xml[start..end], &xml[end..])
    }

    fn signature_before_business(xml: &str) -> String {
        let (start, end) = signature_block(xml);
        let block = &xml[start..end];
        without_signature(xml).replacen("<DE ", &format!("{block}<DE "), 1)
    }

    fn certificate(xml: &str, replacement: &str) -> String {
        let real = test_identity().certificate_base64().unwrap();
        assert!(xml.contains(&real));
        xml.replace(&real, replacement)
    }

    fn violations(xml: &str) -> Vec<ProfileViolation> {
        check_signed_document(xml.as_bytes()).unwrap()
    }

    #[test]
    fn test_signed_document_conforms() {
        assert_eq!(violations(&signed()), vec![]);
    }

    #[test_case(swapped_transforms, ProfileViolation::Transforms(vec![EXC_C14N.into(), ENVELOPED_SIGNATURE.into()]) ; "swapped transform order")]
    #[test_case(three_transforms, ProfileViolation::Transforms(vec![ENVELOPED_SIGNATURE.into(), EXC_C14N.into(), EXC_C14N.into()]) ; "extra transform")]
    #[test_case(c14n_only_transform, ProfileViolation::Transforms(vec![EXC_C14N.into()]) ; "missing enveloped transform")]
    #[test_case(foreign_reference, ProfileViolation::ReferenceUri { expected: format!("#{TEST_CDC}"), found: "#other".into() } ; "reference to another id")]
    #[test_case(empty_reference, ProfileViolation::ReferenceUri { expected: format!("#{TEST_CDC}"), found: String::new() } ; "empty reference")]
    fn test_reference_violation_is_reported(edit: fn(&str) -> String, expected: ProfileViolation) {
        let found = violations(&edit(&signed()));
        assert!(found.contains(&expected), "{found:?}");
        // SignedInfo changed, so the stored signature value no longer verifies
        assert!(found.contains(&ProfileViolation::InvalidSignatureValue));
    }

    #[test]
    fn test_enveloped_only_transform_list_is_allowed() {
        let edited = replace_transforms(&signed(), &[ENVELOPED_SIGNATURE]);
        assert_eq!(violations(&edited), vec![ProfileViolation::InvalidSignatureValue]);
    }

    #[test_case("DUMMY", ProfileViolation::PlaceholderCertificate ; "dummy")]
    #[test_case("PLACEHOLDER", ProfileViolation::PlaceholderCertificate ; "placeholder")]
    #[test_case("XXXXXXXXXXXXXXXX", ProfileViolation::PlaceholderCertificate ; "masked")]
    #[test_case("", ProfileViolation::EmptyCertificate ; "empty")]
    fn test_unusable_certificate_is_reported(replacement: &str, expected: ProfileViolation) {
        let edited = certificate(&signed(), replacement);
        assert_eq!(violations(&edited), vec![expected]);
    }

    #[test_case(without_signature, 0 ; "no signature")]
    #[test_case(doubled_signature, 2 ; "two signatures")]
    fn test_signature_count_must_be_one(edit: fn(&str) -> String, count: usize) {
        assert_eq!(
            violations(&edit(&signed())),
            vec![ProfileViolation::SignatureCount(count)]
        );
    }

    #[test]
    fn test_signature_before_business_element() {
        let edited = signature_before_business(&signed());
        assert_eq!(
            violations(&edited),
            vec![
                ProfileViolation::EnvelopeOrder(vec![
                    "dVerFor".into(),
                    "Signature".into(),
                    "DE".into()
                ]),
                ProfileViolation::MisplacedSignature,
            ]
        );
    }

    #[test]
    fn test_signature_after_qr_block() {
        let input = format!(
            r#"<rDE xmlns="{SIFEN_NS}"><DE Id="{TEST_CDC}"><dDVId>9</dDVId></DE><gCamFuFD><dCarQR>https://qr</dCarQR></gCamFuFD></rDE>"#
        );
        let xml = test_signer().sign(input.as_bytes()).unwrap().xml().to_string();
        let (start, end) = signature_block(&xml);
        let block = xml[start..end].to_string();
        let edited = without_signature(&xml).replace("</rDE>", &format!("{block}</rDE>"));

        assert_eq!(
            violations(&edited),
            vec![
                ProfileViolation::EnvelopeOrder(vec![
                    "dVerFor".into(),
                    "DE".into(),
                    "gCamFuFD".into(),
                    "Signature".into()
                ]),
                ProfileViolation::MisplacedSignature,
            ]
        );
    }

    #[test]
    fn test_ensure_conforms() {
        assert!(ensure_conforms(vec![]).is_ok());
        assert!(matches!(
            ensure_conforms(vec![ProfileViolation::MisplacedSignature]),
            Err(EkuatiaError::SignatureProfile(_))
        ));
    }
}
