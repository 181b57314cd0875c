//! Persisted submission records and the status transition table

use crate::config::Environment;
use crate::domain::{Cdc, SubmissionId, TrackingNumber};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a submitted batch
///
/// `pending → processing → {done, expired_window, requires_cdc, error}`.
/// `not_queued` records a 0301 answer; such a batch never had a tracking
/// number and is never polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    Done,
    ExpiredWindow,
    RequiresCdc,
    Error,
    NotQueued,
}

impl BatchStatus {
    pub const ALL: [BatchStatus; 7] = [
        Self::Pending,
        Self::Processing,
        Self::Done,
        Self::ExpiredWindow,
        Self::RequiresCdc,
        Self::Error,
        Self::NotQueued,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::ExpiredWindow => "expired_window",
            Self::RequiresCdc => "requires_cdc",
            Self::Error => "error",
            Self::NotQueued => "not_queued",
        }
    }

    /// No transition ever leaves a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::ExpiredWindow | Self::NotQueued)
    }

    /// Transition table
    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        use BatchStatus::*;
        match (self, next) {
            (Done | ExpiredWindow | NotQueued, _) => false,
            (_, NotQueued) => false,
            (Processing, Pending) => false,
            (RequiresCdc, Done | RequiresCdc) => true,
            (RequiresCdc, _) => false,
            (Pending | Processing | Error, _) => true,
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Unknown batch status '{s}'"))
    }
}

/// One submitted batch
///
/// Created once, when the authority answers the submission. Only the status
/// tracker changes `status`, the attempt counters and the last-checked
/// timestamp, via a [`StatusUpdate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSubmission {
    pub submission_id: SubmissionId,

    /// `None` when the batch was not queued
    pub tracking_number: Option<TrackingNumber>,

    pub environment: Environment,

    /// Documents carried by the batch, in batch order
    pub cdcs: Vec<Cdc>,

    status: BatchStatus,

    attempts: u32,

    /// Consecutive polls that ended in `error`; zero outside that state
    #[serde(default)]
    error_attempts: u32,

    pub last_code: Option<String>,

    pub last_message: Option<String>,

    pub created_at: DateTime<Utc>,

    last_checked_at: Option<DateTime<Utc>>,
}

impl BatchSubmission {
    /// Record for a batch queued under `tracking_number`
    pub fn pending(
        submission_id: SubmissionId,
        tracking_number: TrackingNumber,
        environment: Environment,
        cdcs: Vec<Cdc>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            submission_id,
            tracking_number: Some(tracking_number),
            environment,
            cdcs,
            status: BatchStatus::Pending,
            attempts: 0,
            error_attempts: 0,
            last_code: Some(code.into()),
            last_message: Some(message.into()),
            created_at: Utc::now(),
            last_checked_at: None,
        }
    }

    /// Record for a batch the authority declined to queue
    pub fn not_queued(
        submission_id: SubmissionId,
        environment: Environment,
        cdcs: Vec<Cdc>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            submission_id,
            tracking_number: None,
            environment,
            cdcs,
            status: BatchStatus::NotQueued,
            attempts: 0,
            error_attempts: 0,
            last_code: Some(code.into()),
            last_message: Some(message.into()),
            created_at: Utc::now(),
            last_checked_at: None,
        }
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    /// Number of status queries made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Failed polls since the record last left `error`
    pub fn error_attempts(&self) -> u32 {
        self.error_attempts
    }

    pub fn last_checked_at(&self) -> Option<DateTime<Utc>> {
        self.last_checked_at
    }

    /// Whether a scheduled poll should query this batch
    pub fn is_pollable(&self, max_error_attempts: u32) -> bool {
        match self.status {
            BatchStatus::Pending | BatchStatus::Processing => self.tracking_number.is_some(),
            BatchStatus::Error => {
                self.tracking_number.is_some() && self.error_attempts < max_error_attempts
            }
            _ => false,
        }
    }
}

/// Columns as read back from a database row
#[derive(Debug, Clone)]
pub(crate) struct StoredSubmission {
    pub submission_id: SubmissionId,
    pub tracking_number: Option<TrackingNumber>,
    pub environment: Environment,
    pub cdcs: Vec<Cdc>,
    pub status: BatchStatus,
    pub attempts: u32,
    pub error_attempts: u32,
    pub last_code: Option<String>,
    pub last_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl From<StoredSubmission> for BatchSubmission {
    fn from(row: StoredSubmission) -> Self {
        Self {
            submission_id: row.submission_id,
            tracking_number: row.tracking_number,
            environment: row.environment,
            cdcs: row.cdcs,
            status: row.status,
            attempts: row.attempts,
            error_attempts: row.error_attempts,
            last_code: row.last_code,
            last_message: row.last_message,
            created_at: row.created_at,
            last_checked_at: row.last_checked_at,
        }
    }
}

/// A validated status change
///
/// Only the tracker can build one. Stores apply it with
/// [`StatusUpdate::apply_to`] and must reject it when the stored status is no
/// longer [`StatusUpdate::from`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    submission_id: SubmissionId,
    from: BatchStatus,
    to: BatchStatus,
    attempts: u32,
    error_attempts: u32,
    last_code: Option<String>,
    last_message: Option<String>,
    checked_at: DateTime<Utc>,
}

impl StatusUpdate {
    /// Builds the next state of `current`, counting one more attempt
    ///
    /// The error counter grows while the batch stays in `error` and resets on
    /// any other outcome. Returns `None` when the transition table forbids the
    /// move.
    pub(super) fn transition(
        current: &BatchSubmission,
        to: BatchStatus,
        code: Option<String>,
        message: Option<String>,
    ) -> Option<Self> {
        if !current.status.can_transition_to(to) {
            return None;
        }
        Some(Self {
            submission_id: current.submission_id.clone(),
            from: current.status,
            to,
            attempts: current.attempts.saturating_add(1),
            error_attempts: if to == BatchStatus::Error {
                current.error_attempts.saturating_add(1)
            } else {
                0
            },
            last_code: code.or_else(|| current.last_code.clone()),
            last_message: message.or_else(|| current.last_message.clone()),
            checked_at: Utc::now(),
        })
    }

    pub fn submission_id(&self) -> &SubmissionId {
        &self.submission_id
    }

    /// Status the record must still have for the update to apply
    pub fn from(&self) -> BatchStatus {
        self.from
    }

    pub fn to(&self) -> BatchStatus {
        self.to
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn error_attempts(&self) -> u32 {
        self.error_attempts
    }

    pub fn last_code(&self) -> Option<&str> {
        self.last_code.as_deref()
    }

    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    pub fn checked_at(&self) -> DateTime<Utc> {
        self.checked_at
    }

    /// Writes the update into `record`
    pub fn apply_to(&self, record: &mut BatchSubmission) {
        record.status = self.to;
        record.attempts = self.attempts;
        record.error_attempts = self.error_attempts;
        record.last_code = self.last_code.clone();
        record.last_message = self.last_message.clone();
        record.last_checked_at = Some(self.checked_at);
    }
}

/// A signed document as stored by the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub cdc: Cdc,
    pub signed_xml: String,
    /// Whether the input was already signed
    pub passthrough: bool,
    pub environment: Environment,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn pending() -> BatchSubmission {
        BatchSubmission::pending(
            SubmissionId::new("250101123456789").unwrap(),
            TrackingNumber::new("123456").unwrap(),
            Environment::Test,
            vec![Cdc::new("01800123456001001000000120250101123456789").unwrap()],
            "0300",
            "Lote recibido con éxito",
        )
    }

    #[test_case(BatchStatus::Pending, BatchStatus::Processing, true)]
    #[test_case(BatchStatus::Pending, BatchStatus::Pending, true)]
    #[test_case(BatchStatus::Processing, BatchStatus::Done, true)]
    #[test_case(BatchStatus::Processing, BatchStatus::Pending, false)]
    #[test_case(BatchStatus::Error, BatchStatus::Processing, true)]
    #[test_case(BatchStatus::RequiresCdc, BatchStatus::Done, true)]
    #[test_case(BatchStatus::RequiresCdc, BatchStatus::Error, false)]
    #[test_case(BatchStatus::Done, BatchStatus::Done, false)]
    #[test_case(BatchStatus::Done, BatchStatus::Processing, false)]
    #[test_case(BatchStatus::ExpiredWindow, BatchStatus::Done, false)]
    #[test_case(BatchStatus::Pending, BatchStatus::NotQueued, false)]
    fn test_transition_table(from: BatchStatus, to: BatchStatus, allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn test_status_names_round_trip() {
        for status in BatchStatus::ALL {
            assert_eq!(status.as_str().parse::<BatchStatus>().unwrap(), status);
        }
        assert!("finished".parse::<BatchStatus>().is_err());
    }

    #[test]
    fn test_update_counts_attempts_and_timestamps() {
        let mut record = pending();
        let update = StatusUpdate::transition(
            &record,
            BatchStatus::Processing,
            Some("0361".to_string()),
            None,
        )
        .unwrap();
        assert_eq!(update.from(), BatchStatus::Pending);
        update.apply_to(&mut record);

        assert_eq!(record.status(), BatchStatus::Processing);
        assert_eq!(record.attempts(), 1);
        assert_eq!(record.last_code.as_deref(), Some("0361"));
        assert_eq!(record.last_message.as_deref(), Some("Lote recibido con éxito"));
        assert!(record.last_checked_at().is_some());
    }

    #[test]
    fn test_done_is_final() {
        let mut record = pending();
        StatusUpdate::transition(&record, BatchStatus::Done, None, None)
            .unwrap()
            .apply_to(&mut record);
        assert!(StatusUpdate::transition(&record, BatchStatus::Done, None, None).is_none());
        assert!(!record.is_pollable(3));
    }

    #[test]
    fn test_error_pollable_until_limit() {
        let mut record = pending();
        for _ in 0..3 {
            StatusUpdate::transition(&record, BatchStatus::Error, None, Some("timeout".into()))
                .unwrap()
                .apply_to(&mut record);
        }
        assert_eq!(record.attempts(), 3);
        assert_eq!(record.error_attempts(), 3);
        assert!(record.is_pollable(4));
        assert!(!record.is_pollable(3));
    }

    #[test]
    fn test_error_budget_ignores_earlier_polls() {
        let mut record = pending();
        for _ in 0..4 {
            StatusUpdate::transition(&record, BatchStatus::Processing, Some("0361".into()), None)
                .unwrap()
                .apply_to(&mut record);
        }
        StatusUpdate::transition(&record, BatchStatus::Error, None, Some("timeout".into()))
            .unwrap()
            .apply_to(&mut record);

        assert_eq!(record.attempts(), 5);
        assert_eq!(record.error_attempts(), 1);
        assert!(record.is_pollable(5));

        StatusUpdate::transition(&record, BatchStatus::Processing, Some("0361".into()), None)
            .unwrap()
            .apply_to(&mut record);
        assert_eq!(record.attempts(), 6);
        assert_eq!(record.error_attempts(), 0);
    }

    #[test]
    fn test_records_without_error_counter_deserialize() {
        let mut value = serde_json::to_value(pending()).unwrap();
        value.as_object_mut().unwrap().remove("error_attempts");
        let record: BatchSubmission = serde_json::from_value(value).unwrap();
        assert_eq!(record.error_attempts(), 0);
    }

    #[test]
    fn test_not_queued_is_never_polled() {
        let record = BatchSubmission::not_queued(
            SubmissionId::new("250101123456789").unwrap(),
            Environment::Test,
            vec![],
            "0301",
            "Lote no encolado",
        );
        assert_eq!(record.status(), BatchStatus::NotQueued);
        assert!(record.tracking_number.is_none());
        assert!(!record.is_pollable(10));
    }
}
