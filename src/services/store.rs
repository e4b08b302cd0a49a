use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::api::LabelFilter;
use crate::models::job::{AttemptOutcome, NewPrintJob, PrintJob, PrintJobStatus};
use crate::models::label::{Label, LabelStatus, NewLabel};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("{0}")]
    Unavailable(String),
}

/// Outcome of an atomic insert-if-absent on the dedup key.
#[derive(Debug, Clone, PartialEq)]
pub enum Insertion {
    Created(Label),
    Existing(Label),
}

impl Insertion {
    pub fn is_created(&self) -> bool {
        matches!(self, Insertion::Created(_))
    }

    pub fn into_label(self) -> Label {
        match self {
            Insertion::Created(label) | Insertion::Existing(label) => label,
        }
    }
}

/// Durable label storage, keyed by id and by dedup key.
#[async_trait]
pub trait LabelStore: Send + Sync {
    /// Insert unless a label with the same dedup key exists. Atomic per key:
    /// concurrent callers with an equal key see exactly one `Created`.
    async fn insert_if_absent(&self, label: NewLabel) -> Result<Insertion, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Label>, StoreError>;

    async fn list(&self, filter: &LabelFilter) -> Result<Vec<Label>, StoreError>;

    /// Set print status. `printed_at` is recorded when moving to `printed`.
    async fn set_status(
        &self,
        id: Uuid,
        status: LabelStatus,
        printed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Print job storage. Status transitions are conditional so two callers
/// can never both move the same job into `processing`.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: NewPrintJob) -> Result<PrintJob, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<PrintJob>, StoreError>;

    /// Jobs newest first; `user_id = None` lists every user's jobs.
    async fn list(
        &self,
        user_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PrintJob>, StoreError>;

    /// `pending -> processing`. Returns `None` when the job was not pending.
    async fn begin_submit(&self, id: Uuid) -> Result<Option<PrintJob>, StoreError>;

    /// `failed -> processing` with `retry_count + 1`, only while budget
    /// remains. Returns `None` when the precondition did not hold.
    async fn begin_retry(&self, id: Uuid) -> Result<Option<PrintJob>, StoreError>;

    /// `processing -> success | failed`.
    async fn finish(&self, id: Uuid, outcome: &AttemptOutcome) -> Result<PrintJob, StoreError>;
}

/// Terminal job status for an attempt outcome.
pub fn status_for(outcome: &AttemptOutcome) -> PrintJobStatus {
    match outcome {
        AttemptOutcome::Sent { .. } => PrintJobStatus::Success,
        AttemptOutcome::Failed { .. } => PrintJobStatus::Failed,
    }
}
