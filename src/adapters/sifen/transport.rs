//! Transport trait and operation results
//!
//! The `SifenTransport` trait abstracts the SOAP exchange so the pipeline and
//! the tracker can run against the real web services or a test double.
//! Implementations never retry on their own; retry policy belongs to the
//! caller.

use super::codes::ResponseCode;
use super::envelopes;
use crate::domain::{Cdc, Result, SubmissionId, TaxId, TrackingNumber};
use async_trait::async_trait;

/// Serialized submit-batch request
///
/// Holds the exact envelope bytes that will be sent, so preflight can run on
/// them rather than on a re-derived copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    submission_id: SubmissionId,
    envelope: String,
}

impl SubmitRequest {
    /// Builds the `rEnvioLote` envelope for a base64 batch payload
    pub fn new(submission_id: SubmissionId, payload: &str) -> Self {
        let envelope = envelopes::submit_batch(&submission_id, payload);
        Self {
            submission_id,
            envelope,
        }
    }

    pub fn submission_id(&self) -> &SubmissionId {
        &self.submission_id
    }

    /// Envelope text
    pub fn envelope(&self) -> &str {
        &self.envelope
    }

    /// Envelope bytes as sent on the wire
    pub fn as_bytes(&self) -> &[u8] {
        self.envelope.as_bytes()
    }
}

/// How a submission was received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Code 0300 with a tracking number to poll
    Queued(TrackingNumber),
    /// Code 0301: not queued, nothing to poll
    NotQueued,
}

/// Parsed `rResEnviLoteDe`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResult {
    pub outcome: SubmitOutcome,
    pub code: ResponseCode,
    pub message: String,
    /// Expected processing time in milliseconds, when given
    pub processing_time: Option<String>,
}

/// Lot-level state reported by a batch query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// 0300: received, not yet processing
    Queued,
    /// 0361
    Processing,
    /// 0362: concluded; per-document results attached
    Done,
    /// 0360: unknown or too old; the batch must be submitted again
    ExpiredWindow,
    /// 0364: each document must be queried by CDC
    RequiresCdc,
}

impl BatchOutcome {
    /// Maps a lot result code; `None` for codes that are not lot states
    pub fn from_code(code: ResponseCode) -> Option<Self> {
        match code {
            ResponseCode::LotQueued => Some(Self::Queued),
            ResponseCode::LotProcessing => Some(Self::Processing),
            ResponseCode::LotConcluded => Some(Self::Done),
            ResponseCode::LotExpired => Some(Self::ExpiredWindow),
            ResponseCode::LotRequiresCdc => Some(Self::RequiresCdc),
            ResponseCode::LotNotQueued
            | ResponseCode::MalformedXml
            | ResponseCode::DocumentNotFound
            | ResponseCode::DocumentFound
            | ResponseCode::TaxpayerNotFound
            | ResponseCode::TaxpayerNoPermission
            | ResponseCode::TaxpayerFound => None,
        }
    }
}

/// Processing result of one document in a concluded lot (`gResProcLote`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentResult {
    pub cdc: String,
    /// `dEstRes`, e.g. `Aprobado`, `Aprobado con observación`, `Rechazado`
    pub status: String,
    pub code: Option<String>,
    pub message: Option<String>,
}

impl DocumentResult {
    pub fn is_rejected(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("rechazado")
    }
}

/// Parsed `rResEnviConsLoteDe`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchQueryResult {
    pub outcome: BatchOutcome,
    pub code: ResponseCode,
    pub message: String,
    pub documents: Vec<DocumentResult>,
}

impl BatchQueryResult {
    /// One-line summary for the persisted record
    pub fn summary(&self) -> String {
        if self.documents.is_empty() {
            return self.message.clone();
        }
        let rejected = self.documents.iter().filter(|d| d.is_rejected()).count();
        let details: Vec<String> = self
            .documents
            .iter()
            .map(|d| match (&d.code, &d.message) {
                (Some(code), Some(msg)) => format!("{}: {} ({code} {msg})", d.cdc, d.status),
                _ => format!("{}: {}", d.cdc, d.status),
            })
            .collect();
        format!(
            "{} [{} document(s), {rejected} rejected] {}",
            self.message,
            self.documents.len(),
            details.join("; ")
        )
    }
}

/// Parsed `rResEnviConsRUC`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxpayerStatus {
    pub code: ResponseCode,
    pub message: String,
    /// `dRazCons`
    pub name: Option<String>,
    /// `dDesEstCons`, e.g. `ACTIVO`
    pub registry_status: Option<String>,
    /// `dRUCFactElec == "S"`
    pub authorized: bool,
}

/// Parsed `rEnviConsDeResponse`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentQueryResult {
    pub code: ResponseCode,
    pub message: String,
    pub found: bool,
}

/// SOAP exchange with the authority
#[async_trait]
pub trait SifenTransport: Send + Sync {
    /// Sends a prepared `rEnvioLote`
    ///
    /// # Errors
    ///
    /// `SifenError::Rejected` for 0160 or a SOAP fault, `SifenError::Protocol`
    /// for unknown codes or a 0300 without tracking number, and the transport
    /// errors for network, timeout and TLS failures.
    async fn submit_batch(&self, request: &SubmitRequest) -> Result<SubmitResult>;

    /// Queries a lot by tracking number
    async fn query_batch_status(&self, tracking_number: &TrackingNumber)
        -> Result<BatchQueryResult>;

    /// Queries the taxpayer registry
    ///
    /// 0501 surfaces as `SifenError::AuthenticationFailed`.
    async fn query_taxpayer_status(&self, tax_id: &TaxId) -> Result<TaxpayerStatus>;

    /// Queries a single document by CDC
    async fn query_document(&self, cdc: &Cdc) -> Result<DocumentQueryResult>;
}
