use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::models::api::LabelFilter;
use crate::models::job::{AttemptOutcome, NewPrintJob, PrintJob};
use crate::models::label::{Label, LabelStatus, NewLabel};
use crate::models::audit::{AuditEntry, AuditQuery, NewAuditEntry};
use crate::services::audit::AuditStore;
use crate::services::store::{Insertion, JobStore, LabelStore, StoreError};

pub mod audit_queries;
pub mod job_queries;
pub mod label_queries;
pub mod memory;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// Postgres-backed label, print job and audit store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LabelStore for PgStore {
    async fn insert_if_absent(&self, label: NewLabel) -> Result<Insertion, StoreError> {
        if let Some(created) = label_queries::insert_label_if_absent(&self.pool, &label).await? {
            return Ok(Insertion::Created(created));
        }

        // Conflict: the row exists and can only have been committed before ours.
        label_queries::get_label_by_key(&self.pool, &label.dedup_key)
            .await?
            .map(Insertion::Existing)
            .ok_or_else(|| {
                StoreError::Corrupt(format!("dedup key {} conflicted but is absent", label.dedup_key))
            })
    }

    async fn get(&self, id: Uuid) -> Result<Option<Label>, StoreError> {
        Ok(label_queries::get_label(&self.pool, id).await?)
    }

    async fn list(&self, filter: &LabelFilter) -> Result<Vec<Label>, StoreError> {
        Ok(label_queries::list_labels(&self.pool, filter).await?)
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: LabelStatus,
        printed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        match label_queries::update_label_status(&self.pool, id, status, printed_at).await? {
            0 => Err(StoreError::Corrupt(format!("label {id} vanished"))),
            _ => Ok(()),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn create(&self, job: NewPrintJob) -> Result<PrintJob, StoreError> {
        Ok(job_queries::create_print_job(&self.pool, &job).await?)
    }

    async fn get(&self, id: Uuid) -> Result<Option<PrintJob>, StoreError> {
        Ok(job_queries::get_print_job(&self.pool, id).await?)
    }

    async fn list(
        &self,
        user_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PrintJob>, StoreError> {
        Ok(job_queries::list_print_jobs(&self.pool, user_id, limit, offset).await?)
    }

    async fn begin_submit(&self, id: Uuid) -> Result<Option<PrintJob>, StoreError> {
        Ok(job_queries::begin_submit(&self.pool, id).await?)
    }

    async fn begin_retry(&self, id: Uuid) -> Result<Option<PrintJob>, StoreError> {
        Ok(job_queries::begin_retry(&self.pool, id).await?)
    }

    async fn finish(&self, id: Uuid, outcome: &AttemptOutcome) -> Result<PrintJob, StoreError> {
        job_queries::finish_print_job(&self.pool, id, outcome)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("print job {id} is not processing")))
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        Ok(audit_queries::insert_audit_entry(&self.pool, &entry).await?)
    }

    async fn list_audit(
        &self,
        user_id: Option<Uuid>,
        query: &AuditQuery,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(audit_queries::list_audit_entries(&self.pool, user_id, query).await?)
    }
}
