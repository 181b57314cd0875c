//! SOAP client over mutually authenticated TLS

use super::endpoints::SifenEndpoints;
use super::envelopes;
use super::responses::{
    parse_batch_response, parse_document_response, parse_submit_response,
    parse_taxpayer_response,
};
use super::transport::{
    BatchQueryResult, DocumentQueryResult, SifenTransport, SubmitRequest, SubmitResult,
    TaxpayerStatus,
};
use crate::config::{Environment, IdentityMode, SifenConfig};
use crate::core::certificate::{CertificateIdentity, EphemeralKeyFiles};
use crate::domain::{
    Cdc, EkuatiaError, Result, SifenError, SubmissionId, TaxId, TrackingNumber,
};
use crate::logging::audit::{Exchange, TransportAuditLog};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, ClientBuilder, StatusCode};
use std::error::Error as StdError;
use std::time::{Duration, Instant};

/// SOAP 1.2 content type; the action is not sent
pub const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

/// Client for the SIFEN web services
///
/// The client identity is bound to the TLS connector when the client is
/// built. In [`IdentityMode::PemFiles`] the key material lives in private
/// temporary files that exist exactly as long as the client.
///
/// # Example
///
/// ```no_run
/// use ekuatia::adapters::sifen::{SifenTransport, SoapTransportClient};
/// use ekuatia::config::{secret_string, Environment, SifenConfig};
/// use ekuatia::core::certificate::CertificateIdentity;
/// use ekuatia::domain::TaxId;
///
/// # async fn example() -> ekuatia::domain::Result<()> {
/// let identity = CertificateIdentity::from_file("firma.p12", &secret_string("pw".to_string()))?;
/// let client = SoapTransportClient::new(&SifenConfig::default(), Environment::Test, &identity)?;
///
/// let ruc = TaxId::new("80012345-6").map_err(ekuatia::domain::EkuatiaError::Validation)?;
/// let status = client.query_taxpayer_status(&ruc).await?;
/// println!("authorized: {}", status.authorized);
/// # Ok(())
/// # }
/// ```
pub struct SoapTransportClient {
    client: Client,
    endpoints: SifenEndpoints,
    audit: Option<TransportAuditLog>,
    _key_files: Option<EphemeralKeyFiles>,
}

impl std::fmt::Debug for SoapTransportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoapTransportClient")
            .field("endpoints", &self.endpoints)
            .field("audit", &self.audit.as_ref().map(|a| a.path().to_path_buf()))
            .finish_non_exhaustive()
    }
}

impl SoapTransportClient {
    /// Builds a client for `environment`
    ///
    /// # Errors
    ///
    /// - `EkuatiaError::Configuration` if `require_test_environment` is set and
    ///   `environment` is production, or the CA file cannot be read
    /// - `EkuatiaError::Certificate` if the identity cannot be handed to TLS
    pub fn new(
        config: &SifenConfig,
        environment: Environment,
        identity: &CertificateIdentity,
    ) -> Result<Self> {
        if config.require_test_environment && environment != Environment::Test {
            return Err(EkuatiaError::Configuration(format!(
                "sifen.require_test_environment is set but the environment is '{environment}'"
            )));
        }

        let (tls_identity, key_files) = match config.identity_mode {
            IdentityMode::Pkcs12 => {
                let (der, password) = identity.pkcs12();
                let tls = native_tls::Identity::from_pkcs12(der, password).map_err(|e| {
                    EkuatiaError::Certificate(format!("TLS layer rejected the identity: {e}"))
                })?;
                (tls, None)
            }
            IdentityMode::PemFiles => {
                let files = EphemeralKeyFiles::write(identity)?;
                let cert = std::fs::read(files.certificate_path())?;
                let key = zeroize::Zeroizing::new(std::fs::read(files.key_path())?);
                let tls = native_tls::Identity::from_pkcs8(&cert, &key).map_err(|e| {
                    EkuatiaError::Certificate(format!("TLS layer rejected the key files: {e}"))
                })?;
                (tls, Some(files))
            }
        };

        let mut tls = native_tls::TlsConnector::builder();
        tls.identity(tls_identity)
            .min_protocol_version(Some(native_tls::Protocol::Tlsv12));

        if let Some(ca_path) = &config.tls_ca_cert {
            let pem = std::fs::read(ca_path).map_err(|e| {
                EkuatiaError::Configuration(format!("cannot read sifen.tls_ca_cert {ca_path}: {e}"))
            })?;
            let ca = native_tls::Certificate::from_pem(&pem).map_err(|e| {
                EkuatiaError::Configuration(format!("invalid sifen.tls_ca_cert {ca_path}: {e}"))
            })?;
            tls.add_root_certificate(ca);
        }

        let connector = tls
            .build()
            .map_err(|e| EkuatiaError::Certificate(format!("cannot build TLS connector: {e}")))?;

        let client = ClientBuilder::new()
            .use_preconfigured_tls(connector)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()
            .map_err(|e| EkuatiaError::Configuration(format!("cannot build HTTP client: {e}")))?;

        let endpoints = SifenEndpoints::resolve(environment, &config.endpoints);

        tracing::info!(
            environment = %environment,
            identity_mode = ?config.identity_mode,
            submit_endpoint = %endpoints.submit_batch,
            "SIFEN transport client ready"
        );

        Ok(Self {
            client,
            endpoints,
            audit: None,
            _key_files: key_files,
        })
    }

    /// Appends every exchange to `audit`
    pub fn with_audit_log(mut self, audit: TransportAuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn endpoints(&self) -> &SifenEndpoints {
        &self.endpoints
    }

    /// Posts one envelope and returns the response body
    ///
    /// Non-2xx responses are still returned when they carry a SOAP fault, so
    /// the fault is reported as a rejection.
    async fn exchange(&self, operation: &'static str, url: &str, envelope: &str) -> Result<String> {
        tracing::debug!(
            operation,
            endpoint = %url,
            request = %envelopes::redact_payload(envelope),
            "SIFEN request"
        );

        let started = Instant::now();
        let sent = self
            .client
            .post(url)
            .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .body(envelope.to_string())
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                let error = classify(&e);
                self.audit(operation, url, envelope, None, None, Some(&error.to_string()), started);
                return Err(error.into());
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                let error = classify(&e);
                let text = error.to_string();
                self.audit(operation, url, envelope, Some(status), None, Some(&text), started);
                return Err(error.into());
            }
        };

        tracing::debug!(
            operation,
            http_status = status.as_u16(),
            response = %envelopes::redact_payload(&body),
            "SIFEN response"
        );
        self.audit(operation, url, envelope, Some(status), Some(&body), None, started);

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SifenError::AuthenticationFailed(format!(
                "{operation} refused with HTTP {status}"
            ))
            .into());
        }
        if !status.is_success() && !body.contains("Fault") {
            let snippet: String = body.chars().take(200).collect();
            return Err(SifenError::Protocol(format!(
                "{operation} returned HTTP {status}: {snippet}"
            ))
            .into());
        }
        Ok(body)
    }

    #[allow(clippy::too_many_arguments)]
    fn audit(
        &self,
        operation: &str,
        endpoint: &str,
        request: &str,
        status: Option<StatusCode>,
        response: Option<&str>,
        error: Option<&str>,
        started: Instant,
    ) {
        let Some(audit) = &self.audit else {
            return;
        };
        let exchange = Exchange {
            operation,
            endpoint,
            request,
            http_status: status.map(|s| s.as_u16()),
            response,
            error,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        if let Err(e) = audit.record(&exchange) {
            tracing::warn!(error = %e, path = %audit.path().display(), "Failed to write transport audit entry");
        }
    }
}

/// Maps a client error to the transport taxonomy
fn classify(error: &reqwest::Error) -> SifenError {
    let detail = error_chain(error);
    if error.is_timeout() {
        return SifenError::Timeout(detail);
    }
    let lower = detail.to_lowercase();
    if ["tls", "ssl", "certificate", "handshake", "alert"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        return SifenError::AuthenticationFailed(detail);
    }
    if error.is_decode() || error.is_body() {
        return SifenError::Protocol(detail);
    }
    SifenError::ConnectionFailed(detail)
}

fn error_chain(error: &reqwest::Error) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = error.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}

#[async_trait]
impl SifenTransport for SoapTransportClient {
    async fn submit_batch(&self, request: &SubmitRequest) -> Result<SubmitResult> {
        let body = self
            .exchange("submit_batch", &self.endpoints.submit_batch, request.envelope())
            .await?;
        let result = parse_submit_response(&body)?;
        tracing::info!(
            submission_id = %request.submission_id(),
            code = %result.code,
            message = %result.message,
            "Batch submitted"
        );
        Ok(result)
    }

    async fn query_batch_status(
        &self,
        tracking_number: &TrackingNumber,
    ) -> Result<BatchQueryResult> {
        let envelope = envelopes::query_batch(&SubmissionId::generate(), tracking_number);
        let body = self
            .exchange("query_batch_status", &self.endpoints.query_batch, &envelope)
            .await?;
        parse_batch_response(&body)
    }

    async fn query_taxpayer_status(&self, tax_id: &TaxId) -> Result<TaxpayerStatus> {
        let envelope = envelopes::query_taxpayer(&SubmissionId::generate(), tax_id);
        let body = self
            .exchange("query_taxpayer_status", &self.endpoints.query_taxpayer, &envelope)
            .await?;
        parse_taxpayer_response(&body)
    }

    async fn query_document(&self, cdc: &Cdc) -> Result<DocumentQueryResult> {
        let envelope = envelopes::query_document(&SubmissionId::generate(), cdc);
        let body = self
            .exchange("query_document", &self.endpoints.query_document, &envelope)
            .await?;
        parse_document_response(&body)
    }
}
