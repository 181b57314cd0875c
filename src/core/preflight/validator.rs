//! Local re-validation of the exact request bytes

use crate::adapters::sifen::envelopes::read_submit_envelope;
use crate::config::SubmissionConfig;
use crate::core::batch::{decode, read_entries, MAX_DOCUMENTS_PER_BATCH};
use crate::core::signing::check_envelope;
use crate::core::xml::names::{
    ARCHIVE_ENTRY, BATCH, BUSINESS, ENVELOPE, FORBIDDEN_IN_BATCH, ID_ATTR, SIFEN_NS,
};
use crate::core::xml::{has_inter_tag_whitespace, parse_document, Element, NsScope};
use crate::domain::{EkuatiaError, PreflightReport, PreflightViolation, Result};

/// Validator run on every submit envelope before it is sent
///
/// Checks run in transmission order: envelope, payload, archive, batch XML,
/// then each document. A failure that makes later layers unreadable stops
/// the walk; everything else is collected so the report is complete.
///
/// # Example
///
/// ```no_run
/// use ekuatia::core::preflight::PreflightValidator;
///
/// # fn example(envelope: &[u8]) -> ekuatia::domain::Result<()> {
/// let validator = PreflightValidator::default();
/// let report = validator.validate(envelope);
/// for violation in &report.violations {
///     eprintln!("{violation}");
/// }
/// validator.ensure_valid(envelope)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PreflightValidator {
    max_documents: usize,
}

impl Default for PreflightValidator {
    fn default() -> Self {
        Self {
            max_documents: MAX_DOCUMENTS_PER_BATCH,
        }
    }
}

impl PreflightValidator {
    /// Validator enforcing the batch limits of `config`
    pub fn new(config: &SubmissionConfig) -> Self {
        Self {
            max_documents: config.max_documents_per_batch.clamp(1, MAX_DOCUMENTS_PER_BATCH),
        }
    }

    /// Runs every check and returns the itemized report
    pub fn validate(&self, envelope: &[u8]) -> PreflightReport {
        let mut violations = Vec::new();
        self.walk(envelope, &mut violations);

        if violations.is_empty() {
            tracing::debug!(bytes = envelope.len(), "Preflight passed");
        } else {
            tracing::warn!(
                violations = violations.len(),
                first = %violations[0],
                "Preflight failed"
            );
        }

        PreflightReport {
            violations,
            artifacts_dir: None,
        }
    }

    /// Fails with `EkuatiaError::Preflight` when any check fails
    pub fn ensure_valid(&self, envelope: &[u8]) -> Result<()> {
        let report = self.validate(envelope);
        if report.has_violations() {
            Err(EkuatiaError::Preflight(report))
        } else {
            Ok(())
        }
    }

    fn walk(&self, envelope: &[u8], out: &mut Vec<PreflightViolation>) {
        let parts = match read_submit_envelope(envelope) {
            Ok(parts) => parts,
            Err(e) => {
                out.push(PreflightViolation::MalformedEnvelope(error_detail(e)));
                return;
            }
        };

        if parts.submission_id.as_deref().map_or(true, |id| id.trim().is_empty()) {
            out.push(PreflightViolation::MissingSubmissionId);
        }
        let Some(payload) = parts.payload.filter(|p| !p.trim().is_empty()) else {
            out.push(PreflightViolation::MissingPayload);
            return;
        };

        let archive = match decode(&payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                out.push(PreflightViolation::InvalidBase64(error_detail(e)));
                return;
            }
        };
        let entries = match read_entries(&archive) {
            Ok(entries) => entries,
            Err(e) => {
                out.push(PreflightViolation::InvalidArchive(error_detail(e)));
                return;
            }
        };

        let names: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
        if names != [ARCHIVE_ENTRY] {
            out.push(PreflightViolation::UnexpectedArchiveEntries(names));
        }
        let Some(entry) = entries.into_iter().find(|e| e.name == ARCHIVE_ENTRY) else {
            return;
        };
        if !entry.stored {
            out.push(PreflightViolation::CompressedEntry(entry.name.clone()));
        }

        self.check_batch(&entry.contents, out);
    }

    fn check_batch(&self, bytes: &[u8], out: &mut Vec<PreflightViolation>) {
        if has_inter_tag_whitespace(bytes) {
            out.push(PreflightViolation::InterTagWhitespace);
        }
        let root = match parse_document(bytes) {
            Ok(doc) => doc.root,
            Err(e) => {
                out.push(PreflightViolation::MalformedBatch(error_detail(e)));
                return;
            }
        };

        if root.local_name() != BATCH {
            out.push(PreflightViolation::WrongBatchRoot(root.name.to_string()));
        }
        let scope = NsScope::default().enter(&root);
        let namespace = scope.namespace_of(&root.name).unwrap_or_default();
        if namespace != SIFEN_NS {
            out.push(PreflightViolation::WrongNamespace(namespace.to_string()));
        }
        for name in FORBIDDEN_IN_BATCH {
            if root.count_named(name) > 0 {
                out.push(PreflightViolation::ForbiddenElement(name.to_string()));
            }
        }

        let documents: Vec<&Element> = root
            .child_elements()
            .filter(|e| e.local_name() == ENVELOPE)
            .collect();
        if documents.is_empty() {
            out.push(PreflightViolation::NoDocuments);
            return;
        }
        if documents.len() > self.max_documents {
            out.push(PreflightViolation::TooManyDocuments {
                count: documents.len(),
                max: self.max_documents,
            });
        }

        let root_default = root.declared_default_namespace();
        for (position, document) in documents.into_iter().enumerate() {
            let index = position + 1;
            if root_default.is_some() && document.declared_default_namespace() == root_default {
                out.push(PreflightViolation::RedundantNamespace { index });
            }

            let cdc = document
                .find_child(BUSINESS)
                .and_then(|de| de.attr(ID_ATTR))
                .map(str::trim)
                .filter(|id| !id.is_empty());
            let Some(cdc) = cdc else {
                out.push(PreflightViolation::MissingDocumentId { index });
                continue;
            };

            for violation in check_envelope(document, &scope) {
                out.push(PreflightViolation::Signature {
                    index,
                    cdc: cdc.to_string(),
                    violation,
                });
            }
        }
    }
}

fn error_detail(error: EkuatiaError) -> String {
    match error {
        EkuatiaError::Xml(detail) | EkuatiaError::Validation(detail) => detail,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sifen::SubmitRequest;
    use crate::core::batch::{compress, encode, BatchPackager};
    use crate::core::signing::test_support::{signed_document, TEST_CDC};
    use crate::core::xml::names::RSA_SHA256;
    use crate::domain::{ProfileViolation, SubmissionId};

    fn id() -> SubmissionId {
        SubmissionId::new("250101123456789").unwrap()
    }

    fn envelope_for_batch(batch_xml: &str) -> Vec<u8> {
        let payload = encode(&compress(batch_xml.as_bytes()).unwrap());
        SubmitRequest::new(id(), &payload).as_bytes().to_vec()
    }

    fn valid_envelope() -> Vec<u8> {
        let batch = BatchPackager::default()
            .package_single(&signed_document(TEST_CDC))
            .unwrap();
        SubmitRequest::new(id(), &batch.payload().unwrap())
            .as_bytes()
            .to_vec()
    }

    fn document_body() -> String {
        let xml = signed_document(TEST_CDC).xml().to_string();
        let start = xml.find("<rDE").unwrap();
        xml[start..].replacen(&format!(" xmlns=\"{SIFEN_NS}\""), "", 1)
    }

    #[test]
    fn test_packaged_request_passes() {
        let report = PreflightValidator::default().validate(&valid_envelope());
        assert!(report.violations.is_empty(), "{report}");
        assert!(PreflightValidator::default()
            .ensure_valid(&valid_envelope())
            .is_ok());
    }

    #[test]
    fn test_forbidden_element_in_batch() {
        let batch = format!(
            r#"<rLoteDE xmlns="{SIFEN_NS}"><dId>1</dId>{}</rLoteDE>"#,
            document_body()
        );
        let report = PreflightValidator::default().validate(&envelope_for_batch(&batch));
        assert_eq!(
            report.violations,
            vec![PreflightViolation::ForbiddenElement("dId".to_string())]
        );
    }

    #[test]
    fn test_batch_without_documents() {
        let batch = format!(r#"<rLoteDE xmlns="{SIFEN_NS}"/>"#);
        let report = PreflightValidator::default().validate(&envelope_for_batch(&batch));
        assert_eq!(report.violations, vec![PreflightViolation::NoDocuments]);
    }

    #[test]
    fn test_wrong_signature_algorithm() {
        let tampered = document_body().replace(
            RSA_SHA256,
            "http://www.w3.org/2000/09/xmldsig#rsa-sha1",
        );
        let batch = format!(r#"<rLoteDE xmlns="{SIFEN_NS}">{tampered}</rLoteDE>"#);
        let report = PreflightValidator::default().validate(&envelope_for_batch(&batch));
        assert_eq!(report.violations.len(), 1, "{report}");
        assert!(matches!(
            &report.violations[0],
            PreflightViolation::Signature {
                index: 1,
                violation: ProfileViolation::SignatureMethod(_),
                ..
            }
        ));
    }

    #[test]
    fn test_wrong_digest_algorithm() {
        let tampered = document_body().replace(
            "http://www.w3.org/2001/04/xmlenc#sha256",
            "http://www.w3.org/2000/09/xmldsig#sha1",
        );
        let batch = format!(r#"<rLoteDE xmlns="{SIFEN_NS}">{tampered}</rLoteDE>"#);
        let report = PreflightValidator::default().validate(&envelope_for_batch(&batch));
        assert!(report.violations.iter().any(|v| matches!(
            v,
            PreflightViolation::Signature {
                violation: ProfileViolation::DigestMethod(_),
                ..
            }
        )));
        assert!(!report.violations.iter().any(|v| matches!(
            v,
            PreflightViolation::Signature {
                violation: ProfileViolation::SignatureMethod(_),
                ..
            }
        )));
    }

    #[test]
    fn test_redundant_namespace_flagged() {
        let xml = signed_document(TEST_CDC).xml().to_string();
        let start = xml.find("<rDE").unwrap();
        let batch = format!(r#"<rLoteDE xmlns="{SIFEN_NS}">{}</rLoteDE>"#, &xml[start..]);
        let report = PreflightValidator::default().validate(&envelope_for_batch(&batch));
        assert_eq!(
            report.violations,
            vec![PreflightViolation::RedundantNamespace { index: 1 }]
        );
    }

    #[test]
    fn test_whitespace_between_documents() {
        let batch = format!(
            "<rLoteDE xmlns=\"{SIFEN_NS}\">\n  {}\n</rLoteDE>",
            document_body()
        );
        let report = PreflightValidator::default().validate(&envelope_for_batch(&batch));
        assert!(report
            .violations
            .contains(&PreflightViolation::InterTagWhitespace));
    }

    #[test]
    fn test_unreadable_layers_stop_the_walk() {
        let validator = PreflightValidator::default();

        let report = validator.validate(b"<env:Envelope");
        assert!(matches!(
            report.violations.as_slice(),
            [PreflightViolation::MalformedEnvelope(_)]
        ));

        let bad_base64 = SubmitRequest::new(id(), "%%%").as_bytes().to_vec();
        assert!(matches!(
            validator.validate(&bad_base64).violations.as_slice(),
            [PreflightViolation::InvalidBase64(_)]
        ));

        let not_zip = SubmitRequest::new(id(), &encode(b"plain text")).as_bytes().to_vec();
        assert!(matches!(
            validator.validate(&not_zip).violations.as_slice(),
            [PreflightViolation::InvalidArchive(_)]
        ));
    }

    #[test]
    fn test_missing_payload() {
        let envelope = SubmitRequest::new(id(), "").as_bytes().to_vec();
        let report = PreflightValidator::default().validate(&envelope);
        assert_eq!(report.violations, vec![PreflightViolation::MissingPayload]);
    }

    #[test]
    fn test_document_limit() {
        let body = document_body();
        let batch = format!(r#"<rLoteDE xmlns="{SIFEN_NS}">{body}{body}</rLoteDE>"#);
        let config = SubmissionConfig {
            max_documents_per_batch: 1,
            ..SubmissionConfig::default()
        };
        let report = PreflightValidator::new(&config).validate(&envelope_for_batch(&batch));
        assert!(report
            .violations
            .contains(&PreflightViolation::TooManyDocuments { count: 2, max: 1 }));
    }
}
