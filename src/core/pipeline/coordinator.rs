//! Submission pipeline - signs, packages, checks and sends one batch
//!
//! The pipeline owns the order of operations: sign, record the signed
//! documents, cross-check the issuer, package, preflight the exact envelope,
//! gate on the taxpayer registry, submit, and create the submission record.
//! Any abort persists the intermediate artifacts for audit.

use crate::adapters::sifen::{SifenTransport, SubmitOutcome, SubmitRequest};
use crate::adapters::storage::SubmissionStore;
use crate::config::{EkuatiaConfig, Environment, SubmissionConfig};
use crate::core::batch::{encode, Batch, BatchPackager};
use crate::core::certificate::CertificateIdentity;
use crate::core::preflight::{ArtifactBundle, ArtifactStore, PreflightValidator};
use crate::core::signing::{CanonicalSigner, SignedDocument};
use crate::core::tracker::{BatchSubmission, DocumentRecord};
use crate::core::xml::{to_document_string, Element};
use crate::domain::{Cdc, EkuatiaError, Result, SifenError, SubmissionId, TaxId};
use crate::log_submission;
use chrono::Utc;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Behaviour switches of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Compare the certificate holder with each document issuer
    pub verify_issuer: bool,

    /// Skip the taxpayer registry query (test environment only)
    pub bypass_taxpayer_check: bool,

    /// Stop after preflight
    pub dry_run: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            verify_issuer: true,
            bypass_taxpayer_check: false,
            dry_run: false,
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &EkuatiaConfig) -> Self {
        Self {
            verify_issuer: config.submission.verify_issuer,
            bypass_taxpayer_check: config.sifen.bypass_taxpayer_check,
            dry_run: config.application.dry_run,
        }
    }
}

/// Result of a submission that reached its end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// 0300: recorded as `pending` with a tracking number
    Queued(BatchSubmission),

    /// 0301: recorded as `not_queued`; nothing to poll
    NotQueued(BatchSubmission),

    /// Dry run: everything passed preflight and nothing was sent
    DryRun {
        submission_id: SubmissionId,
        cdcs: Vec<Cdc>,
        artifacts_dir: Option<PathBuf>,
    },
}

impl SubmissionOutcome {
    pub fn submission_id(&self) -> &SubmissionId {
        match self {
            Self::Queued(record) | Self::NotQueued(record) => &record.submission_id,
            Self::DryRun { submission_id, .. } => submission_id,
        }
    }
}

/// Runs submissions for one certificate identity
pub struct SubmissionPipeline {
    signer: CanonicalSigner,
    packager: BatchPackager,
    preflight: PreflightValidator,
    transport: Arc<dyn SifenTransport>,
    store: Arc<dyn SubmissionStore>,
    artifacts: ArtifactStore,
    environment: Environment,
    options: PipelineOptions,
    authorized_taxpayers: Mutex<HashSet<TaxId>>,
}

impl SubmissionPipeline {
    /// Create a new pipeline
    ///
    /// # Errors
    ///
    /// `Configuration` if the taxpayer check is bypassed in production.
    pub fn new(
        signer: CanonicalSigner,
        transport: Arc<dyn SifenTransport>,
        store: Arc<dyn SubmissionStore>,
        environment: Environment,
        submission: &SubmissionConfig,
        options: PipelineOptions,
    ) -> Result<Self> {
        if options.bypass_taxpayer_check && environment == Environment::Production {
            return Err(EkuatiaError::Configuration(
                "the taxpayer check cannot be bypassed in production".to_string(),
            ));
        }

        Ok(Self {
            signer,
            packager: BatchPackager::new(submission.max_documents_per_batch),
            preflight: PreflightValidator::new(submission),
            transport,
            store,
            artifacts: ArtifactStore::new(&submission.artifacts_dir),
            environment,
            options,
            authorized_taxpayers: Mutex::new(HashSet::new()),
        })
    }

    /// Create a pipeline from the loaded configuration
    pub fn from_config(
        config: &EkuatiaConfig,
        identity: Arc<CertificateIdentity>,
        transport: Arc<dyn SifenTransport>,
        store: Arc<dyn SubmissionStore>,
    ) -> Result<Self> {
        let signer = CanonicalSigner::new(identity, config.sifen.version.clone());
        Self::new(
            signer,
            transport,
            store,
            config.environment,
            &config.submission,
            PipelineOptions::from_config(config),
        )
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Signs and submits one document
    pub async fn submit_document(&self, input: &[u8]) -> Result<SubmissionOutcome> {
        self.submit_documents(&[input.to_vec()]).await
    }

    /// Signs the documents and submits them as one batch, in order
    ///
    /// # Errors
    ///
    /// Signing, packaging and preflight errors abort before anything is sent.
    /// Transport errors and rejections are returned as they come. In every
    /// case the intermediate artifacts are written to the artifact store.
    pub async fn submit_documents(&self, inputs: &[Vec<u8>]) -> Result<SubmissionOutcome> {
        let submission_id = SubmissionId::generate();
        let mut bundle = ArtifactBundle {
            unsigned: inputs.to_vec(),
            ..ArtifactBundle::default()
        };
        let result = self.sign_and_send(&submission_id, inputs, &mut bundle).await;
        self.finish(&submission_id, &mut bundle, result)
    }

    /// Submits an externally built `rLoteDE` of already signed documents
    pub async fn submit_envelope(&self, batch_xml: &[u8]) -> Result<SubmissionOutcome> {
        let submission_id = SubmissionId::generate();
        let mut bundle = ArtifactBundle::default();
        let result = self
            .send_envelope(&submission_id, batch_xml, &mut bundle)
            .await;
        if result.is_err() && bundle.batch_xml.is_none() {
            bundle.batch_xml = Some(String::from_utf8_lossy(batch_xml).into_owned());
        }
        self.finish(&submission_id, &mut bundle, result)
    }

    async fn sign_and_send(
        &self,
        submission_id: &SubmissionId,
        inputs: &[Vec<u8>],
        bundle: &mut ArtifactBundle,
    ) -> Result<SubmissionOutcome> {
        let mut signed: Vec<SignedDocument> = Vec::with_capacity(inputs.len());
        for input in inputs {
            let document = self.signer.sign(input)?;
            bundle.signed.push(document.xml().to_string());
            self.store
                .save_document(&DocumentRecord {
                    cdc: document.cdc().clone(),
                    signed_xml: document.xml().to_string(),
                    passthrough: document.is_passthrough(),
                    environment: self.environment,
                    created_at: Utc::now(),
                })
                .await?;
            signed.push(document);
        }

        let batch = self.packager.package(&signed)?;
        self.send(submission_id, &batch, bundle).await
    }

    async fn send_envelope(
        &self,
        submission_id: &SubmissionId,
        batch_xml: &[u8],
        bundle: &mut ArtifactBundle,
    ) -> Result<SubmissionOutcome> {
        let batch = self.packager.package_envelope(batch_xml)?;
        for (envelope, cdc) in batch.root().child_elements().zip(batch.cdcs()) {
            let xml = to_document_string(envelope);
            bundle.signed.push(xml.clone());
            self.store
                .save_document(&DocumentRecord {
                    cdc: cdc.clone(),
                    signed_xml: xml,
                    passthrough: true,
                    environment: self.environment,
                    created_at: Utc::now(),
                })
                .await?;
        }
        self.send(submission_id, &batch, bundle).await
    }

    async fn send(
        &self,
        submission_id: &SubmissionId,
        batch: &Batch,
        bundle: &mut ArtifactBundle,
    ) -> Result<SubmissionOutcome> {
        bundle.batch_xml = Some(batch.to_xml());
        if self.options.verify_issuer {
            self.verify_issuer(batch)?;
        }

        let archive = batch.compress()?;
        let payload = encode(&archive);
        bundle.archive = Some(archive);
        let request = SubmitRequest::new(submission_id.clone(), &payload);
        bundle.payload = Some(payload);
        bundle.envelope = Some(request.envelope().to_string());

        let report = self.preflight.validate(request.as_bytes());
        if report.has_violations() {
            return Err(EkuatiaError::Preflight(report));
        }

        if self.options.dry_run {
            let artifacts_dir = self.persist(submission_id, bundle);
            tracing::info!(
                submission_id = %submission_id,
                documents = batch.document_count(),
                "Dry run passed preflight; nothing was sent"
            );
            return Ok(SubmissionOutcome::DryRun {
                submission_id: submission_id.clone(),
                cdcs: batch.cdcs().to_vec(),
                artifacts_dir,
            });
        }

        if !self.options.bypass_taxpayer_check {
            self.ensure_taxpayer_authorized().await?;
        }

        let result = self.transport.submit_batch(&request).await?;
        log_submission!(submission_id, batch.document_count(), result.code, &result.message);

        match result.outcome {
            SubmitOutcome::Queued(tracking_number) => {
                let record = BatchSubmission::pending(
                    submission_id.clone(),
                    tracking_number,
                    self.environment,
                    batch.cdcs().to_vec(),
                    result.code.code(),
                    result.message,
                );
                self.store.create(&record).await?;
                Ok(SubmissionOutcome::Queued(record))
            }
            SubmitOutcome::NotQueued => {
                let record = BatchSubmission::not_queued(
                    submission_id.clone(),
                    self.environment,
                    batch.cdcs().to_vec(),
                    result.code.code(),
                    result.message,
                );
                self.store.create(&record).await?;
                tracing::warn!(
                    submission_id = %submission_id,
                    code = %result.code,
                    "Batch was not queued"
                );
                Ok(SubmissionOutcome::NotQueued(record))
            }
        }
    }

    fn holder_tax_id(&self) -> Result<TaxId> {
        self.signer.identity().tax_id().ok_or_else(|| {
            EkuatiaError::Certificate(format!(
                "certificate subject '{}' carries no RUC",
                self.signer.identity().subject()
            ))
        })
    }

    fn verify_issuer(&self, batch: &Batch) -> Result<()> {
        let holder = self.holder_tax_id()?;
        for (envelope, cdc) in batch.root().child_elements().zip(batch.cdcs()) {
            let issuer = issuer_of(envelope, cdc).ok_or_else(|| {
                EkuatiaError::Certificate(format!("cannot determine the issuer of document {cdc}"))
            })?;
            if !holder.matches(&issuer) {
                return Err(EkuatiaError::Certificate(format!(
                    "document {cdc} is issued by RUC {issuer}, the certificate belongs to RUC {holder}"
                )));
            }
        }
        Ok(())
    }

    async fn ensure_taxpayer_authorized(&self) -> Result<()> {
        let tax_id = self.holder_tax_id()?;
        let mut authorized = self.authorized_taxpayers.lock().await;
        if authorized.contains(&tax_id) {
            return Ok(());
        }

        let status = self.transport.query_taxpayer_status(&tax_id).await?;
        if !status.authorized {
            return Err(SifenError::Rejected {
                code: status.code.code().to_string(),
                message: format!(
                    "RUC {tax_id} is not enabled for electronic invoicing: {}",
                    status.message
                ),
            }
            .into());
        }

        tracing::info!(
            ruc = %tax_id,
            name = status.name.as_deref().unwrap_or_default(),
            "Taxpayer is enabled for electronic invoicing"
        );
        authorized.insert(tax_id);
        Ok(())
    }

    fn finish(
        &self,
        submission_id: &SubmissionId,
        bundle: &mut ArtifactBundle,
        result: Result<SubmissionOutcome>,
    ) -> Result<SubmissionOutcome> {
        let error = match result {
            Ok(outcome) => return Ok(outcome),
            Err(error) => error,
        };

        match error {
            EkuatiaError::Preflight(mut report) => {
                bundle.violations = report.violations.iter().map(ToString::to_string).collect();
                report.artifacts_dir = self.persist(submission_id, bundle);
                Err(EkuatiaError::Preflight(report))
            }
            other => {
                bundle.violations = vec![other.to_string()];
                self.persist(submission_id, bundle);
                Err(other)
            }
        }
    }

    fn persist(&self, submission_id: &SubmissionId, bundle: &ArtifactBundle) -> Option<PathBuf> {
        match self.artifacts.persist(submission_id, bundle) {
            Ok(dir) => Some(dir),
            Err(e) => {
                tracing::warn!(
                    submission_id = %submission_id,
                    error = %e,
                    "Failed to persist submission artifacts"
                );
                None
            }
        }
    }
}

/// Issuer RUC from `gEmis`, or the RUC embedded in the CDC
fn issuer_of(envelope: &Element, cdc: &Cdc) -> Option<TaxId> {
    envelope
        .find_descendant("gEmis")
        .and_then(|emis| {
            let number = emis.descendant_text("dRucEm")?;
            let check_digit = emis
                .descendant_text("dDVEmi")
                .and_then(|dv| dv.trim().chars().next());
            TaxId::from_parts(number.trim(), check_digit).ok()
        })
        .or_else(|| cdc.embedded_tax_id())
}
