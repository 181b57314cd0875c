//! Integration tests for dry-run mode
//!
//! These tests verify that a dry run signs, packages and preflights the
//! batch normally while nothing reaches the authority or the store.

mod common;

use common::{identity, unsigned_document, MockTransport, SECOND_CDC, TEST_CDC};
use ekuatia::adapters::storage::{MemorySubmissionStore, SubmissionStore};
use ekuatia::config::{Environment, SubmissionConfig};
use ekuatia::core::pipeline::{PipelineOptions, SubmissionOutcome, SubmissionPipeline};
use ekuatia::core::signing::CanonicalSigner;
use std::sync::Arc;
use tempfile::TempDir;

fn dry_run_pipeline(
    transport: Arc<MockTransport>,
    store: Arc<dyn SubmissionStore>,
    artifacts: &TempDir,
) -> SubmissionPipeline {
    SubmissionPipeline::new(
        CanonicalSigner::new(identity(), "150"),
        transport,
        store,
        Environment::Test,
        &SubmissionConfig {
            artifacts_dir: artifacts.path().to_string_lossy().to_string(),
            ..SubmissionConfig::default()
        },
        PipelineOptions {
            dry_run: true,
            ..PipelineOptions::default()
        },
    )
    .unwrap()
}

#[test]
fn test_pipeline_options_dry_run_default() {
    let options = PipelineOptions::default();
    assert!(!options.dry_run);
    assert!(options.verify_issuer);
    assert!(!options.bypass_taxpayer_check);
}

#[tokio::test]
async fn test_dry_run_sends_and_stores_nothing() {
    let artifacts = TempDir::new().unwrap();
    let transport = Arc::new(MockTransport::new());
    let store: Arc<dyn SubmissionStore> = Arc::new(MemorySubmissionStore::new());

    let inputs = vec![
        unsigned_document(TEST_CDC).into_bytes(),
        unsigned_document(SECOND_CDC).into_bytes(),
    ];
    let outcome = dry_run_pipeline(transport.clone(), store.clone(), &artifacts)
        .submit_documents(&inputs)
        .await
        .unwrap();

    let SubmissionOutcome::DryRun { cdcs, .. } = &outcome else {
        panic!("expected a dry run outcome");
    };
    let cdcs: Vec<&str> = cdcs.iter().map(|c| c.as_str()).collect();
    assert_eq!(cdcs, vec![TEST_CDC, SECOND_CDC]);

    assert_eq!(transport.submit_count(), 0);
    assert_eq!(*transport.taxpayer_queries.lock().unwrap(), 0);
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dry_run_keeps_the_envelope_for_inspection() {
    let artifacts = TempDir::new().unwrap();
    let transport = Arc::new(MockTransport::new());
    let store: Arc<dyn SubmissionStore> = Arc::new(MemorySubmissionStore::new());

    let outcome = dry_run_pipeline(transport, store, &artifacts)
        .submit_document(unsigned_document(TEST_CDC).as_bytes())
        .await
        .unwrap();

    let SubmissionOutcome::DryRun {
        submission_id,
        artifacts_dir: Some(dir),
        ..
    } = outcome
    else {
        panic!("expected a dry run with persisted artifacts");
    };
    assert_eq!(dir, artifacts.path().join(submission_id.as_str()));

    let envelope = std::fs::read_to_string(dir.join("envelope.xml")).unwrap();
    assert!(envelope.contains(&format!("<dId>{submission_id}</dId>")));
    assert!(dir.join("batch.xml").exists());
    assert!(dir.join("manifest.json").exists());
}
