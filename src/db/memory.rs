//! Process-local store used when no `DATABASE_URL` is configured, and by
//! the test suites. Not durable.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::api::LabelFilter;
use crate::models::audit::{AuditEntry, AuditQuery, NewAuditEntry};
use crate::models::job::{AttemptOutcome, NewPrintJob, PrintJob, PrintJobStatus};
use crate::models::label::{Label, LabelStatus, NewLabel};
use crate::services::audit::AuditStore;
use crate::services::store::{status_for, Insertion, JobStore, LabelStore, StoreError};

#[derive(Default)]
struct Labels {
    /// Insertion order, for stable listing.
    rows: Vec<Label>,
    by_id: HashMap<Uuid, usize>,
    by_key: HashMap<String, usize>,
}

#[derive(Default)]
pub struct MemoryStore {
    labels: Mutex<Labels>,
    jobs: Mutex<Vec<PrintJob>>,
    audit: Mutex<Vec<AuditEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn matches(label: &Label, filter: &LabelFilter) -> bool {
    filter.status.is_none_or(|s| label.status == s)
        && filter.is_duplicate.is_none_or(|d| label.is_duplicate == d)
        && filter.grade.as_deref().is_none_or(|g| contains_ci(&label.grade, g))
        && filter.section.as_deref().is_none_or(|s| contains_ci(&label.section, s))
        && filter.heat_no.as_deref().is_none_or(|h| contains_ci(&label.heat_no, h))
}

#[async_trait]
impl LabelStore for MemoryStore {
    async fn insert_if_absent(&self, label: NewLabel) -> Result<Insertion, StoreError> {
        let mut labels = self.labels.lock().await;

        if let Some(&idx) = labels.by_key.get(&label.dedup_key) {
            return Ok(Insertion::Existing(labels.rows[idx].clone()));
        }

        let row = label.into_label(Uuid::new_v4(), Utc::now());
        let idx = labels.rows.len();
        labels.by_id.insert(row.id, idx);
        labels.by_key.insert(row.dedup_key.clone(), idx);
        labels.rows.push(row.clone());
        Ok(Insertion::Created(row))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Label>, StoreError> {
        let labels = self.labels.lock().await;
        Ok(labels.by_id.get(&id).map(|&idx| labels.rows[idx].clone()))
    }

    async fn list(&self, filter: &LabelFilter) -> Result<Vec<Label>, StoreError> {
        let labels = self.labels.lock().await;
        Ok(labels
            .rows
            .iter()
            .rev()
            .filter(|l| matches(l, filter))
            .skip(filter.offset().max(0) as usize)
            .take(filter.limit().max(0) as usize)
            .cloned()
            .collect())
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: LabelStatus,
        printed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut labels = self.labels.lock().await;
        let idx = *labels
            .by_id
            .get(&id)
            .ok_or_else(|| StoreError::Corrupt(format!("label {id} vanished")))?;

        let row = &mut labels.rows[idx];
        row.status = status;
        if printed_at.is_some() {
            row.printed_at = printed_at;
        }
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create(&self, job: NewPrintJob) -> Result<PrintJob, StoreError> {
        let row = job.into_job(Uuid::new_v4(), Utc::now());
        self.jobs.lock().await.push(row.clone());
        Ok(row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<PrintJob>, StoreError> {
        Ok(self.jobs.lock().await.iter().find(|j| j.id == id).cloned())
    }

    async fn list(
        &self,
        user_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PrintJob>, StoreError> {
        Ok(self
            .jobs
            .lock()
            .await
            .iter()
            .rev()
            .filter(|j| user_id.is_none() || j.user_id == user_id)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn begin_submit(&self, id: Uuid) -> Result<Option<PrintJob>, StoreError> {
        let mut jobs = self.jobs.lock().await;
        Ok(jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == PrintJobStatus::Pending)
            .map(|job| {
                job.status = PrintJobStatus::Processing;
                job.updated_at = Utc::now();
                job.clone()
            }))
    }

    async fn begin_retry(&self, id: Uuid) -> Result<Option<PrintJob>, StoreError> {
        let mut jobs = self.jobs.lock().await;
        Ok(jobs
            .iter_mut()
            .find(|j| j.id == id && j.can_retry())
            .map(|job| {
                job.status = PrintJobStatus::Processing;
                job.retry_count += 1;
                job.updated_at = Utc::now();
                job.clone()
            }))
    }

    async fn finish(&self, id: Uuid, outcome: &AttemptOutcome) -> Result<PrintJob, StoreError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == PrintJobStatus::Processing)
            .ok_or_else(|| StoreError::Corrupt(format!("print job {id} is not processing")))?;

        job.status = status_for(outcome);
        match outcome {
            AttemptOutcome::Sent { printer } => {
                job.printer = Some(printer.clone());
                job.error_message = None;
            }
            AttemptOutcome::Failed { printer, error } => {
                job.printer = printer.clone();
                job.error_message = Some(error.clone());
            }
        }
        job.updated_at = Utc::now();
        Ok(job.clone())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        let row = entry.into_entry(Uuid::new_v4(), Utc::now());
        self.audit.lock().await.push(row.clone());
        Ok(row)
    }

    async fn list_audit(
        &self,
        user_id: Option<Uuid>,
        query: &AuditQuery,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self
            .audit
            .lock()
            .await
            .iter()
            .rev()
            .filter(|e| user_id.is_none_or(|u| e.user_id == u))
            .filter(|e| query.action.is_none_or(|a| e.action == a.as_ref()))
            .filter(|e| query.resource.as_deref().is_none_or(|r| e.resource == r))
            .skip(query.offset().max(0) as usize)
            .take(query.limit().max(0) as usize)
            .cloned()
            .collect())
    }
}
