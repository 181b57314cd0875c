//! Batch status polling
//!
//! The tracker is the only component that moves a batch through its
//! lifecycle. Each query result becomes a [`StatusUpdate`] that the store
//! applies only if the record is still in the status the tracker read.

use super::record::{BatchStatus, BatchSubmission, StatusUpdate};
use crate::adapters::sifen::{BatchOutcome, SifenTransport};
use crate::adapters::storage::SubmissionStore;
use crate::config::TrackerConfig;
use crate::domain::{EkuatiaError, Result, SubmissionId};
use crate::log_transition;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Totals of one polling round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Records queried
    pub polled: usize,

    /// Records whose status changed
    pub transitioned: usize,

    /// Records that could not be queried or updated
    pub errors: usize,
}

/// Polls queued batches until they reach a terminal status
pub struct BatchStatusTracker {
    transport: Arc<dyn SifenTransport>,
    store: Arc<dyn SubmissionStore>,
    max_error_attempts: u32,
}

impl BatchStatusTracker {
    pub fn new(
        transport: Arc<dyn SifenTransport>,
        store: Arc<dyn SubmissionStore>,
        config: &TrackerConfig,
    ) -> Self {
        Self {
            transport,
            store,
            max_error_attempts: config.max_error_attempts,
        }
    }

    /// Queries every pollable record once
    ///
    /// A failure on one record is logged and counted; the round continues.
    ///
    /// # Errors
    ///
    /// Returns an error only if the pollable records cannot be listed.
    pub async fn poll_once(&self) -> Result<PollSummary> {
        let pollable = self.store.list_pollable(self.max_error_attempts).await?;
        let mut summary = PollSummary::default();

        for record in pollable {
            summary.polled += 1;
            let before = record.status();
            match self.advance(&record).await {
                Ok(after) if after != before => summary.transitioned += 1,
                Ok(_) => {}
                Err(e) => {
                    summary.errors += 1;
                    tracing::warn!(
                        submission_id = %record.submission_id,
                        error = %e,
                        "Failed to poll submission"
                    );
                }
            }
        }

        tracing::info!(
            polled = summary.polled,
            transitioned = summary.transitioned,
            errors = summary.errors,
            "Polling round finished"
        );
        Ok(summary)
    }

    /// Queries one record and returns its resulting status
    ///
    /// A record that is not pollable is returned as stored, without a query.
    ///
    /// # Errors
    ///
    /// `Poll` if the record does not exist or the answer maps to a forbidden
    /// transition, `Storage` if the update loses a race.
    pub async fn poll_submission(&self, submission_id: &SubmissionId) -> Result<BatchStatus> {
        let record = self.load(submission_id).await?;
        if !record.is_pollable(self.max_error_attempts) {
            tracing::debug!(
                submission_id = %submission_id,
                status = %record.status(),
                "Submission is not pollable"
            );
            return Ok(record.status());
        }
        self.advance(&record).await
    }

    /// Settles a batch in `requires_cdc` by querying each document
    ///
    /// The batch becomes `done` when every CDC is found. Otherwise it stays
    /// in `requires_cdc` with a message naming the missing documents.
    ///
    /// # Errors
    ///
    /// `Poll` if the record is not in `requires_cdc` or carries no CDCs.
    pub async fn resolve_by_cdc(&self, submission_id: &SubmissionId) -> Result<BatchStatus> {
        let record = self.load(submission_id).await?;
        if record.status() != BatchStatus::RequiresCdc {
            return Err(EkuatiaError::Poll(format!(
                "submission {submission_id} is '{}', not '{}'",
                record.status(),
                BatchStatus::RequiresCdc
            )));
        }
        if record.cdcs.is_empty() {
            return Err(EkuatiaError::Poll(format!(
                "submission {submission_id} has no documents to query"
            )));
        }

        let mut missing = Vec::new();
        let mut last_code = None;
        let mut failure = None;
        for cdc in &record.cdcs {
            match self.transport.query_document(cdc).await {
                Ok(result) => {
                    last_code = Some(result.code.code().to_string());
                    if !result.found {
                        missing.push(cdc.to_string());
                    }
                }
                Err(e) => {
                    failure = Some(e.to_string());
                    break;
                }
            }
        }

        let (to, code, message) = match failure {
            Some(error) => (BatchStatus::RequiresCdc, None, Some(error)),
            None if missing.is_empty() => (
                BatchStatus::Done,
                last_code,
                Some(format!("{} document(s) found", record.cdcs.len())),
            ),
            None => (
                BatchStatus::RequiresCdc,
                last_code,
                Some(format!("not found: {}", missing.join(", "))),
            ),
        };
        self.apply(&record, to, code, message).await
    }

    /// Polls on `interval` until `shutdown` turns true
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(interval_secs = interval.as_secs(), "Status tracker started");

        while !*shutdown.borrow() {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        tracing::error!(error = %e, "Polling round failed");
                    }
                }
            }
        }

        tracing::info!("Status tracker stopped");
    }

    async fn load(&self, submission_id: &SubmissionId) -> Result<BatchSubmission> {
        self.store
            .get(submission_id)
            .await?
            .ok_or_else(|| EkuatiaError::Poll(format!("submission {submission_id} not found")))
    }

    async fn advance(&self, record: &BatchSubmission) -> Result<BatchStatus> {
        let Some(tracking_number) = record.tracking_number.as_ref() else {
            return Err(EkuatiaError::Poll(format!(
                "submission {} has no tracking number",
                record.submission_id
            )));
        };

        let (to, code, message) = match self.transport.query_batch_status(tracking_number).await
        {
            Ok(result) => {
                let to = match result.outcome {
                    BatchOutcome::Queued => BatchStatus::Pending,
                    BatchOutcome::Processing => BatchStatus::Processing,
                    BatchOutcome::Done => BatchStatus::Done,
                    BatchOutcome::ExpiredWindow => BatchStatus::ExpiredWindow,
                    BatchOutcome::RequiresCdc => BatchStatus::RequiresCdc,
                };
                (to, Some(result.code.code().to_string()), Some(result.summary()))
            }
            Err(e) => {
                tracing::warn!(
                    submission_id = %record.submission_id,
                    tracking_number = %tracking_number,
                    error = %e,
                    "Batch status query failed"
                );
                (BatchStatus::Error, None, Some(e.to_string()))
            }
        };

        self.apply(record, to, code, message).await
    }

    async fn apply(
        &self,
        record: &BatchSubmission,
        to: BatchStatus,
        code: Option<String>,
        message: Option<String>,
    ) -> Result<BatchStatus> {
        let update = StatusUpdate::transition(record, to, code, message).ok_or_else(|| {
            EkuatiaError::Poll(format!(
                "submission {}: transition {} -> {to} is not allowed",
                record.submission_id,
                record.status()
            ))
        })?;

        let updated = self.store.update_status(&update).await?;
        if update.from() != update.to() {
            log_transition!(
                &updated.submission_id,
                update.from(),
                update.to(),
                updated.attempts()
            );
        }
        Ok(updated.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sifen::{
        BatchQueryResult, DocumentQueryResult, ResponseCode, SubmitRequest, SubmitResult,
        TaxpayerStatus,
    };
    use crate::adapters::storage::MemorySubmissionStore;
    use crate::config::Environment;
    use crate::domain::{Cdc, SifenError, TaxId, TrackingNumber};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const CDC: &str = "01800123456001001000000120250101123456789";

    #[derive(Default)]
    struct ScriptedTransport {
        batch: Mutex<VecDeque<Result<BatchQueryResult>>>,
        documents: Mutex<VecDeque<bool>>,
        batch_queries: Mutex<usize>,
    }

    impl ScriptedTransport {
        fn answering(codes: &[ResponseCode]) -> Self {
            let transport = Self::default();
            {
                let mut queue = transport.batch.lock().unwrap();
                for code in codes {
                    queue.push_back(Ok(BatchQueryResult {
                        outcome: BatchOutcome::from_code(*code).unwrap(),
                        code: *code,
                        message: format!("message {code}"),
                        documents: Vec::new(),
                    }));
                }
            }
            transport
        }

        fn queries(&self) -> usize {
            *self.batch_queries.lock().unwrap()
        }
    }

    #[async_trait]
    impl SifenTransport for ScriptedTransport {
        async fn submit_batch(&self, _request: &SubmitRequest) -> Result<SubmitResult> {
            unreachable!("the tracker never submits")
        }

        async fn query_batch_status(&self, _tracking: &TrackingNumber) -> Result<BatchQueryResult> {
            *self.batch_queries.lock().unwrap() += 1;
            self.batch
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(SifenError::Timeout("no scripted answer".into()).into()))
        }

        async fn query_taxpayer_status(&self, _tax_id: &TaxId) -> Result<TaxpayerStatus> {
            unreachable!("the tracker never checks the taxpayer")
        }

        async fn query_document(&self, _cdc: &Cdc) -> Result<DocumentQueryResult> {
            let found = self.documents.lock().unwrap().pop_front().unwrap_or(false);
            let code = if found {
                ResponseCode::DocumentFound
            } else {
                ResponseCode::DocumentNotFound
            };
            Ok(DocumentQueryResult {
                code,
                message: String::new(),
                found,
            })
        }
    }

    fn record() -> BatchSubmission {
        BatchSubmission::pending(
            SubmissionId::new("250101123456789").unwrap(),
            TrackingNumber::new("123456").unwrap(),
            Environment::Test,
            vec![Cdc::new(CDC).unwrap()],
            "0300",
            "Lote recibido con éxito",
        )
    }

    async fn tracker_with(
        transport: ScriptedTransport,
        max_error_attempts: u32,
    ) -> (BatchStatusTracker, Arc<ScriptedTransport>, Arc<MemorySubmissionStore>) {
        let transport = Arc::new(transport);
        let store = Arc::new(MemorySubmissionStore::new());
        store.create(&record()).await.unwrap();
        let config = TrackerConfig {
            poll_interval_seconds: 1,
            max_error_attempts,
        };
        let tracker = BatchStatusTracker::new(transport.clone(), store.clone(), &config);
        (tracker, transport, store)
    }

    fn id() -> SubmissionId {
        SubmissionId::new("250101123456789").unwrap()
    }

    #[tokio::test]
    async fn test_pending_to_done_then_stops() {
        let transport =
            ScriptedTransport::answering(&[ResponseCode::LotProcessing, ResponseCode::LotConcluded]);
        let (tracker, transport, store) = tracker_with(transport, 3).await;

        assert_eq!(tracker.poll_submission(&id()).await.unwrap(), BatchStatus::Processing);
        assert_eq!(tracker.poll_submission(&id()).await.unwrap(), BatchStatus::Done);
        assert_eq!(tracker.poll_submission(&id()).await.unwrap(), BatchStatus::Done);
        assert_eq!(transport.queries(), 2);

        let stored = store.get(&id()).await.unwrap().unwrap();
        assert_eq!(stored.attempts(), 2);
        assert_eq!(stored.last_code.as_deref(), Some("0362"));
        assert!(stored.last_checked_at().is_some());
    }

    #[tokio::test]
    async fn test_processing_answer_of_queued_is_rejected() {
        let transport =
            ScriptedTransport::answering(&[ResponseCode::LotProcessing, ResponseCode::LotQueued]);
        let (tracker, _, store) = tracker_with(transport, 3).await;

        tracker.poll_submission(&id()).await.unwrap();
        let err = tracker.poll_submission(&id()).await.unwrap_err();
        assert!(matches!(err, EkuatiaError::Poll(_)));
        let stored = store.get(&id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), BatchStatus::Processing);
    }

    #[tokio::test]
    async fn test_transport_errors_exhaust_attempts() {
        let (tracker, transport, store) = tracker_with(ScriptedTransport::default(), 2).await;

        assert_eq!(tracker.poll_submission(&id()).await.unwrap(), BatchStatus::Error);
        assert_eq!(tracker.poll_submission(&id()).await.unwrap(), BatchStatus::Error);
        assert_eq!(tracker.poll_submission(&id()).await.unwrap(), BatchStatus::Error);
        assert_eq!(transport.queries(), 2);

        let summary = tracker.poll_once().await.unwrap();
        assert_eq!(summary, PollSummary::default());
        let stored = store.get(&id()).await.unwrap().unwrap();
        assert!(stored.last_message.unwrap().contains("no scripted answer"));
    }

    #[tokio::test]
    async fn test_error_retried_after_many_normal_polls() {
        let transport = ScriptedTransport::answering(&[ResponseCode::LotProcessing; 4]);
        let (tracker, transport, store) = tracker_with(transport, 5).await;

        for _ in 0..5 {
            assert_eq!(tracker.poll_once().await.unwrap().polled, 1);
        }
        let stored = store.get(&id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), BatchStatus::Error);
        assert_eq!(stored.attempts(), 5);
        assert_eq!(stored.error_attempts(), 1);

        let retry = tracker.poll_once().await.unwrap();
        assert_eq!(retry.polled, 1);
        assert_eq!(transport.queries(), 6);
        assert_eq!(store.get(&id()).await.unwrap().unwrap().error_attempts(), 2);
    }

    #[tokio::test]
    async fn test_poll_once_counts() {
        let transport = ScriptedTransport::answering(&[ResponseCode::LotConcluded]);
        let (tracker, _, _) = tracker_with(transport, 3).await;

        let summary = tracker.poll_once().await.unwrap();
        assert_eq!(
            summary,
            PollSummary {
                polled: 1,
                transitioned: 1,
                errors: 0
            }
        );
        assert_eq!(tracker.poll_once().await.unwrap().polled, 0);
    }

    #[tokio::test]
    async fn test_resolve_by_cdc() {
        let transport = ScriptedTransport::answering(&[ResponseCode::LotRequiresCdc]);
        transport.documents.lock().unwrap().extend([false, true]);
        let (tracker, _, store) = tracker_with(transport, 3).await;

        let err = tracker.resolve_by_cdc(&id()).await.unwrap_err();
        assert!(matches!(err, EkuatiaError::Poll(_)));

        assert_eq!(tracker.poll_submission(&id()).await.unwrap(), BatchStatus::RequiresCdc);
        assert_eq!(tracker.resolve_by_cdc(&id()).await.unwrap(), BatchStatus::RequiresCdc);
        let stored = store.get(&id()).await.unwrap().unwrap();
        assert!(stored.last_message.unwrap().starts_with("not found: "));

        assert_eq!(tracker.resolve_by_cdc(&id()).await.unwrap(), BatchStatus::Done);
        assert_eq!(store.get(&id()).await.unwrap().unwrap().last_code.as_deref(), Some("0422"));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (tracker, _, _) = tracker_with(ScriptedTransport::default(), 1).await;
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            tracker.run(Duration::from_millis(10), rx).await;
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
