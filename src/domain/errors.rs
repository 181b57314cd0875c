//! Domain error types
//!
//! This module defines the error hierarchy for the submission pipeline.
//! Signing and packaging failures carry itemized violations so an operator
//! can see exactly which invariant was broken. No error exposes third-party types.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type
///
/// This is the primary error type used throughout the crate.
#[derive(Debug, Error)]
pub enum EkuatiaError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// PKCS#12 container could not be opened (bad password or corrupt data)
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// Key/certificate mismatch, unreadable certificate or issuer mismatch
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// The business element has no identifier attribute
    #[error("Missing identifier: {0}")]
    MissingIdentifier(String),

    /// The signed document does not satisfy the signature profile
    #[error("Signature profile violated: {}", join_violations(.0))]
    SignatureProfile(Vec<ProfileViolation>),

    /// Malformed XML input
    #[error("XML error: {0}")]
    Xml(String),

    /// A batch invariant was violated while packaging
    #[error("Packaging invariant violated: {0}")]
    PackagingInvariant(String),

    /// The exact bytes about to be sent failed local validation
    #[error("Preflight failed: {0}")]
    Preflight(PreflightReport),

    /// Errors talking to the tax authority
    #[error("SIFEN error: {0}")]
    Sifen(#[from] SifenError),

    /// Batch status polling errors
    #[error("Poll error: {0}")]
    Poll(String),

    /// Persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

impl EkuatiaError {
    /// Process exit code for this error
    ///
    /// 2 configuration, 3 validation, 4 connection, 5 fatal.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 2,
            Self::InvalidCredential(_)
            | Self::Certificate(_)
            | Self::MissingIdentifier(_)
            | Self::SignatureProfile(_)
            | Self::Xml(_)
            | Self::PackagingInvariant(_)
            | Self::Preflight(_)
            | Self::Validation(_) => 3,
            Self::Sifen(
                SifenError::ConnectionFailed(_)
                | SifenError::Timeout(_)
                | SifenError::AuthenticationFailed(_),
            ) => 4,
            Self::Sifen(_) | Self::Poll(_) | Self::Storage(_) | Self::Serialization(_) | Self::Io(_) => 5,
        }
    }
}

/// Tax authority transport errors
///
/// Errors that occur while exchanging SOAP messages with SIFEN.
/// These errors don't expose third-party HTTP client types.
#[derive(Debug, Error)]
pub enum SifenError {
    /// Network failure (connect refused, reset, DNS)
    #[error("Failed to reach SIFEN: {0}")]
    ConnectionFailed(String),

    /// Connect or read timeout
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// TLS handshake or client credential rejected by the server
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Malformed or unparsable response
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Well-formed rejection
    #[error("Rejected with code {code}: {message}")]
    Rejected { code: String, message: String },
}

impl SifenError {
    /// Whether the caller may retry the same request
    ///
    /// Only transient transport failures are retryable. Structured rejections
    /// are terminal for the attempt that produced them.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionFailed(_) | Self::Timeout(_))
    }
}

/// One broken rule of the fixed signature profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileViolation {
    /// Number of `Signature` elements is not exactly one
    SignatureCount(usize),
    /// `Signature` is not a direct child of the envelope right after `DE`
    MisplacedSignature,
    /// More than one fiscal-QR block
    DuplicateQrBlock(usize),
    /// Envelope children are not in the canonical order
    EnvelopeOrder(Vec<String>),
    /// Wrong canonicalization algorithm
    CanonicalizationMethod(String),
    /// Wrong signature algorithm
    SignatureMethod(String),
    /// Wrong digest algorithm
    DigestMethod(String),
    /// Transform list is not one of the allowed sequences
    Transforms(Vec<String>),
    /// Reference URI does not point at the business element
    ReferenceUri { expected: String, found: String },
    /// Required signature child is missing
    MissingElement(&'static str),
    /// Embedded certificate is empty
    EmptyCertificate,
    /// Embedded certificate is a placeholder or not a DER certificate
    PlaceholderCertificate,
    /// Recomputed digest differs from the stored digest
    DigestMismatch,
    /// Signature value does not verify with the embedded certificate
    InvalidSignatureValue,
    /// Whitespace between tags in the signed payload
    InterTagWhitespace,
}

impl fmt::Display for ProfileViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SignatureCount(n) => write!(f, "expected exactly one Signature, found {n}"),
            Self::MisplacedSignature => {
                write!(f, "Signature must be the envelope child immediately after DE")
            }
            Self::DuplicateQrBlock(n) => write!(f, "expected at most one gCamFuFD, found {n}"),
            Self::EnvelopeOrder(names) => {
                write!(f, "envelope children out of order: [{}]", names.join(", "))
            }
            Self::CanonicalizationMethod(alg) => {
                write!(f, "unexpected CanonicalizationMethod '{alg}'")
            }
            Self::SignatureMethod(alg) => write!(f, "unexpected SignatureMethod '{alg}'"),
            Self::DigestMethod(alg) => write!(f, "unexpected DigestMethod '{alg}'"),
            Self::Transforms(list) => write!(f, "unexpected transform list [{}]", list.join(", ")),
            Self::ReferenceUri { expected, found } => {
                write!(f, "Reference URI '{found}' does not match '{expected}'")
            }
            Self::MissingElement(name) => write!(f, "missing {name}"),
            Self::EmptyCertificate => write!(f, "X509Certificate is empty"),
            Self::PlaceholderCertificate => {
                write!(f, "X509Certificate is a placeholder, not a DER certificate")
            }
            Self::DigestMismatch => write!(f, "DigestValue does not match the referenced element"),
            Self::InvalidSignatureValue => {
                write!(f, "SignatureValue does not verify against the embedded certificate")
            }
            Self::InterTagWhitespace => write!(f, "whitespace found between tags"),
        }
    }
}

/// One failed preflight check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreflightViolation {
    /// SOAP envelope is not well-formed
    MalformedEnvelope(String),
    /// No `xDE` payload in the envelope
    MissingPayload,
    /// No `dId` submission identifier in the envelope
    MissingSubmissionId,
    /// Payload is not valid base64
    InvalidBase64(String),
    /// Payload is not a readable archive
    InvalidArchive(String),
    /// Archive does not hold exactly the one expected entry
    UnexpectedArchiveEntries(Vec<String>),
    /// Archive entry is compressed instead of stored
    CompressedEntry(String),
    /// Batch XML is not well-formed
    MalformedBatch(String),
    /// Whitespace between tags in the batch XML
    InterTagWhitespace,
    /// Root element is not the batch envelope
    WrongBatchRoot(String),
    /// Batch namespace is not the authority namespace
    WrongNamespace(String),
    /// A transport-only element appears inside the batch
    ForbiddenElement(String),
    /// Batch holds no documents
    NoDocuments,
    /// Batch holds more documents than one lot may carry
    TooManyDocuments { count: usize, max: usize },
    /// A document repeats the batch default namespace declaration
    RedundantNamespace { index: usize },
    /// A document has no business element or an empty identifier
    MissingDocumentId { index: usize },
    /// A document fails the signature profile
    Signature {
        index: usize,
        cdc: String,
        violation: ProfileViolation,
    },
}

impl fmt::Display for PreflightViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedEnvelope(e) => write!(f, "envelope is not well-formed: {e}"),
            Self::MissingPayload => write!(f, "envelope has no xDE payload"),
            Self::MissingSubmissionId => write!(f, "envelope has no dId"),
            Self::InvalidBase64(e) => write!(f, "payload is not valid base64: {e}"),
            Self::InvalidArchive(e) => write!(f, "payload is not a valid archive: {e}"),
            Self::UnexpectedArchiveEntries(names) => {
                write!(f, "archive entries [{}] are not exactly [lote.xml]", names.join(", "))
            }
            Self::CompressedEntry(name) => write!(f, "archive entry '{name}' is not stored"),
            Self::MalformedBatch(e) => write!(f, "batch XML is not well-formed: {e}"),
            Self::InterTagWhitespace => write!(f, "batch XML has whitespace between tags"),
            Self::WrongBatchRoot(name) => write!(f, "batch root is '{name}', expected rLoteDE"),
            Self::WrongNamespace(ns) => write!(f, "batch namespace '{ns}' is not the SIFEN namespace"),
            Self::ForbiddenElement(name) => write!(f, "forbidden element '{name}' inside batch"),
            Self::NoDocuments => write!(f, "batch contains no rDE documents"),
            Self::TooManyDocuments { count, max } => {
                write!(f, "batch contains {count} documents, the limit is {max}")
            }
            Self::RedundantNamespace { index } => {
                write!(f, "document #{index} redeclares the batch default namespace")
            }
            Self::MissingDocumentId { index } => {
                write!(f, "document #{index} has no DE with a non-empty Id")
            }
            Self::Signature {
                index,
                cdc,
                violation,
            } => write!(f, "document #{index} ({cdc}): {violation}"),
        }
    }
}

/// Itemized preflight failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightReport {
    /// Every failed check, in the order found
    pub violations: Vec<PreflightViolation>,

    /// Directory holding the persisted artifacts, when they could be written
    pub artifacts_dir: Option<PathBuf>,
}

impl PreflightReport {
    /// Whether any check failed
    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }
}

impl fmt::Display for PreflightReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} violation(s)", self.violations.len())?;
        for (i, v) in self.violations.iter().enumerate() {
            write!(f, "\n  {}. {v}", i + 1)?;
        }
        if let Some(dir) = &self.artifacts_dir {
            write!(f, "\n  artifacts: {}", dir.display())?;
        }
        Ok(())
    }
}

fn join_violations(violations: &[ProfileViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// Conversion from std::io::Error
impl From<std::io::Error> for EkuatiaError {
    fn from(err: std::io::Error) -> Self {
        EkuatiaError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for EkuatiaError {
    fn from(err: serde_json::Error) -> Self {
        EkuatiaError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for EkuatiaError {
    fn from(err: toml::de::Error) -> Self {
        EkuatiaError::Configuration(format!("TOML parse error: {err}"))
    }
}
