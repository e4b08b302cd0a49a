//! Print job lifecycle.
//!
//! ```text
//! pending ──submit──▶ processing ──▶ success
//!                         │
//!                         └────────▶ failed ──retry (retry_count < max)──▶ processing
//! ```
//!
//! `success` is terminal. A failed job whose budget is spent is exhausted;
//! retrying it is refused without touching the row. Nothing here retries on
//! its own: every attempt follows an explicit caller action.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::models::job::{AttemptOutcome, NewPrintJob, PrintJob, PrintJobStatus};
use crate::models::label::LabelStatus;
use crate::services::auth::Session;
use crate::services::identity::IdentityEncoder;
use crate::services::printer::{BridgeError, PrinterBridge};
use crate::services::store::{JobStore, LabelStore, StoreError};
use crate::services::zpl;

/// Writes of an attempt outcome before the store error is surfaced.
const FINISH_ATTEMPTS: u32 = 3;
const FINISH_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum PrintJobError {
    #[error("print job {0} not found")]
    NotFound(Uuid),

    #[error("label {0} not found")]
    LabelNotFound(Uuid),

    #[error("retry limit reached ({retry_count}/{max_retries})")]
    RetriesExhausted { retry_count: i32, max_retries: i32 },

    #[error("print job already succeeded")]
    AlreadySucceeded,

    #[error("print job is already being processed")]
    AlreadyProcessing,

    #[error("print job has not been attempted yet; submit it instead")]
    NotFailed,

    #[error("print job was already attempted; retry it instead")]
    AlreadyAttempted,

    #[error("print job belongs to another user")]
    Forbidden,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A job after one transmission attempt. `error` is set when the bridge
/// failed; the job itself is then `failed` with the same message stored.
#[derive(Debug)]
pub struct Attempt {
    pub job: PrintJob,
    pub error: Option<BridgeError>,
}

impl Attempt {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

pub struct PrintOrchestrator {
    labels: Arc<dyn LabelStore>,
    jobs: Arc<dyn JobStore>,
    bridge: Arc<dyn PrinterBridge>,
    encoder: IdentityEncoder,
    max_retries: i32,
}

impl PrintOrchestrator {
    pub fn new(
        labels: Arc<dyn LabelStore>,
        jobs: Arc<dyn JobStore>,
        bridge: Arc<dyn PrinterBridge>,
        encoder: IdentityEncoder,
        max_retries: i32,
    ) -> Self {
        Self {
            labels,
            jobs,
            bridge,
            encoder,
            max_retries,
        }
    }

    pub fn bridge(&self) -> &Arc<dyn PrinterBridge> {
        &self.bridge
    }

    /// New `pending` job with the label's print document rendered now.
    pub async fn create_job(
        &self,
        session: &Session,
        label_id: Uuid,
    ) -> Result<PrintJob, PrintJobError> {
        let label = self
            .labels
            .get(label_id)
            .await?
            .ok_or(PrintJobError::LabelNotFound(label_id))?;

        let job = self
            .jobs
            .create(NewPrintJob {
                label_id: label.id,
                user_id: Some(session.user_id),
                zpl_content: zpl::render_label(&label, &self.encoder),
                max_retries: self.max_retries,
            })
            .await?;

        metrics::counter!("print_jobs_created_total").increment(1);
        tracing::info!(job_id = %job.id, label_id = %label.id, user_id = %session.user_id, "Print job created");
        Ok(job)
    }

    /// First attempt of a `pending` job.
    pub async fn submit(
        &self,
        job_id: Uuid,
        target: Option<&str>,
    ) -> Result<Attempt, PrintJobError> {
        let job = match self.jobs.begin_submit(job_id).await? {
            Some(job) => job,
            None => {
                let job = self.load(job_id).await?;
                return Err(match job.status {
                    PrintJobStatus::Processing => PrintJobError::AlreadyProcessing,
                    PrintJobStatus::Success => PrintJobError::AlreadySucceeded,
                    PrintJobStatus::Failed | PrintJobStatus::Pending => {
                        PrintJobError::AlreadyAttempted
                    }
                });
            }
        };

        self.attempt(job, target).await
    }

    /// Create a job for `label_id` and submit it in one step.
    pub async fn print_label(
        &self,
        session: &Session,
        label_id: Uuid,
        target: Option<&str>,
    ) -> Result<Attempt, PrintJobError> {
        let job = self.create_job(session, label_id).await?;
        self.submit(job.id, target).await
    }

    /// Resend a failed job's stored document, spending one retry.
    pub async fn retry(
        &self,
        session: &Session,
        job_id: Uuid,
        target: Option<&str>,
    ) -> Result<Attempt, PrintJobError> {
        let job = self.load(job_id).await?;
        if !session.is_admin() && job.user_id != Some(session.user_id) {
            return Err(PrintJobError::Forbidden);
        }
        retry_precondition(&job)?;

        // The job may have moved between the read above and this update.
        let job = match self.jobs.begin_retry(job_id).await? {
            Some(job) => job,
            None => {
                let job = self.load(job_id).await?;
                retry_precondition(&job)?;
                return Err(PrintJobError::AlreadyProcessing);
            }
        };

        metrics::counter!("print_retries_total").increment(1);
        tracing::info!(
            job_id = %job.id,
            retry_count = job.retry_count,
            max_retries = job.max_retries,
            "Retrying print job"
        );
        self.attempt(job, target).await
    }

    /// Fetch a job the session is allowed to see.
    pub async fn get_job(&self, session: &Session, job_id: Uuid) -> Result<PrintJob, PrintJobError> {
        let job = self.load(job_id).await?;
        if !session.is_admin() && job.user_id != Some(session.user_id) {
            return Err(PrintJobError::Forbidden);
        }
        Ok(job)
    }

    /// Jobs newest first; non-admins see only their own.
    pub async fn list_jobs(
        &self,
        session: &Session,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PrintJob>, PrintJobError> {
        Ok(self.jobs.list(session.scope(), limit, offset).await?)
    }

    async fn load(&self, job_id: Uuid) -> Result<PrintJob, PrintJobError> {
        self.jobs
            .get(job_id)
            .await?
            .ok_or(PrintJobError::NotFound(job_id))
    }

    /// Send a `processing` job and record the outcome on job and label.
    async fn attempt(&self, job: PrintJob, target: Option<&str>) -> Result<Attempt, PrintJobError> {
        let (outcome, error) = match self.bridge.print(&job.zpl_content, target).await {
            Ok(device) => (AttemptOutcome::Sent { printer: device.name }, None),
            Err(e) => (
                AttemptOutcome::Failed {
                    printer: target.map(str::to_string),
                    error: e.to_string(),
                },
                Some(e),
            ),
        };

        let job = self.record_outcome(job.id, &outcome).await?;

        let (label_status, printed_at) = match &error {
            None => {
                metrics::counter!("print_attempts_total", "outcome" => "success").increment(1);
                tracing::info!(job_id = %job.id, printer = ?job.printer, "Print job succeeded");
                (LabelStatus::Printed, Some(Utc::now()))
            }
            Some(e) => {
                metrics::counter!("print_attempts_total", "outcome" => "failed").increment(1);
                tracing::warn!(
                    job_id = %job.id,
                    retry_count = job.retry_count,
                    code = e.code(),
                    error = %e,
                    "Print job failed"
                );
                (LabelStatus::Failed, None)
            }
        };

        // The job row is the record of what was sent; a stale label status
        // must not turn a delivered print into an error for the caller.
        if let Err(e) = self
            .labels
            .set_status(job.label_id, label_status, printed_at)
            .await
        {
            tracing::error!(
                job_id = %job.id,
                label_id = %job.label_id,
                status = %label_status,
                error = %e,
                "Failed to sync label status after print attempt"
            );
        }

        Ok(Attempt { job, error })
    }

    /// Persist the attempt outcome, retrying transient store errors so the
    /// job does not stay `processing` after the send already happened.
    async fn record_outcome(
        &self,
        job_id: Uuid,
        outcome: &AttemptOutcome,
    ) -> Result<PrintJob, PrintJobError> {
        let mut tries = 0;
        loop {
            tries += 1;
            match self.jobs.finish(job_id, outcome).await {
                Ok(job) => return Ok(job),
                Err(e) if tries < FINISH_ATTEMPTS => {
                    tracing::warn!(job_id = %job_id, attempt = tries, error = %e, "Retrying print outcome write");
                    tokio::time::sleep(FINISH_BACKOFF * tries).await;
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Print outcome not recorded");
                    return Err(e.into());
                }
            }
        }
    }
}

fn retry_precondition(job: &PrintJob) -> Result<(), PrintJobError> {
    match job.status {
        PrintJobStatus::Success => Err(PrintJobError::AlreadySucceeded),
        PrintJobStatus::Processing => Err(PrintJobError::AlreadyProcessing),
        PrintJobStatus::Pending => Err(PrintJobError::NotFailed),
        PrintJobStatus::Failed if job.is_exhausted() => {
            metrics::counter!("print_retries_exhausted_total").increment(1);
            Err(PrintJobError::RetriesExhausted {
                retry_count: job.retry_count,
                max_retries: job.max_retries,
            })
        }
        PrintJobStatus::Failed => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::models::job::DEFAULT_MAX_RETRIES;
    use crate::models::label::{Label, RawLabelRecord};
    use crate::services::auth::Role;
    use crate::services::ingest::ingest;
    use crate::services::printer::PrinterDevice;
    use async_trait::async_trait;
    use serde_json::json;
    use crate::models::api::LabelFilter;
    use crate::models::label::NewLabel;
    use crate::services::store::Insertion;
    use chrono::DateTime;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// Bridge that plays back a script of outcomes; succeeds once it runs out.
    #[derive(Default)]
    struct ScriptedBridge {
        script: Mutex<VecDeque<BridgeError>>,
        sent: Mutex<Vec<String>>,
    }

    impl ScriptedBridge {
        fn failing(errors: Vec<BridgeError>) -> Self {
            Self {
                script: Mutex::new(errors.into()),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PrinterBridge for ScriptedBridge {
        async fn discover(&self) -> Result<Vec<PrinterDevice>, BridgeError> {
            Ok(vec![PrinterDevice {
                name: "ZD421".to_string(),
                uid: String::new(),
                connection: "usb".to_string(),
                device_type: "printer".to_string(),
                provider: String::new(),
                manufacturer: String::new(),
            }])
        }

        async fn default_printer(&self) -> Result<Option<PrinterDevice>, BridgeError> {
            Ok(self.discover().await?.pop())
        }

        async fn send(&self, _device: &PrinterDevice, content: &str) -> Result<(), BridgeError> {
            if let Some(err) = self.script.lock().await.pop_front() {
                return Err(err);
            }
            self.sent.lock().await.push(content.to_string());
            Ok(())
        }

        fn backend(&self) -> &'static str {
            "scripted"
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        bridge: Arc<ScriptedBridge>,
        orchestrator: PrintOrchestrator,
        session: Session,
        label: Label,
    }

    async fn fixture(bridge: ScriptedBridge) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let bridge = Arc::new(bridge);
        let session = Session {
            user_id: Uuid::new_v4(),
            role: Role::Operator,
        };
        let records: Vec<RawLabelRecord> = serde_json::from_value(json!([{
            "heat": "C103262", "mill": "MM", "section": "CHANNEL 75*40*4.8",
            "grade": "IS 2062 EZSOBR", "bundle": "1", "unit": "MM"
        }]))
        .unwrap();
        let label = ingest(store.as_ref(), records, &session)
            .await
            .new_labels
            .remove(0);

        let orchestrator = PrintOrchestrator::new(
            store.clone(),
            store.clone(),
            bridge.clone(),
            IdentityEncoder::default(),
            DEFAULT_MAX_RETRIES,
        );

        Fixture {
            store,
            bridge,
            orchestrator,
            session,
            label,
        }
    }

    fn paused() -> BridgeError {
        BridgeError::Transmission("Printer paused".to_string())
    }

    async fn label_status(f: &Fixture) -> LabelStatus {
        LabelStore::get(f.store.as_ref(), f.label.id)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    #[tokio::test]
    async fn test_create_job_renders_document() {
        let f = fixture(ScriptedBridge::default()).await;

        let job = f.orchestrator.create_job(&f.session, f.label.id).await.unwrap();

        assert_eq!(job.status, PrintJobStatus::Pending);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.max_retries, 3);
        assert_eq!(job.zpl_content, zpl::render_label(&f.label, &IdentityEncoder::default()));
    }

    #[tokio::test]
    async fn test_successful_print_marks_label_printed() {
        let f = fixture(ScriptedBridge::default()).await;

        let attempt = f
            .orchestrator
            .print_label(&f.session, f.label.id, None)
            .await
            .unwrap();

        assert!(attempt.succeeded());
        assert_eq!(attempt.job.status, PrintJobStatus::Success);
        assert_eq!(attempt.job.printer.as_deref(), Some("ZD421"));
        assert_eq!(label_status(&f).await, LabelStatus::Printed);
        assert_eq!(f.bridge.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_print_records_message_verbatim() {
        let f = fixture(ScriptedBridge::failing(vec![paused()])).await;

        let attempt = f
            .orchestrator
            .print_label(&f.session, f.label.id, None)
            .await
            .unwrap();

        assert!(!attempt.succeeded());
        assert_eq!(attempt.job.status, PrintJobStatus::Failed);
        assert_eq!(attempt.job.error_message.as_deref(), Some("Printer paused"));
        assert_eq!(attempt.job.retry_count, 0);
        assert_eq!(label_status(&f).await, LabelStatus::Failed);
    }

    #[tokio::test]
    async fn test_retry_resends_same_document_and_corrects_label() {
        let f = fixture(ScriptedBridge::failing(vec![paused()])).await;
        let first = f
            .orchestrator
            .print_label(&f.session, f.label.id, None)
            .await
            .unwrap();

        let retried = f
            .orchestrator
            .retry(&f.session, first.job.id, None)
            .await
            .unwrap();

        assert!(retried.succeeded());
        assert_eq!(retried.job.retry_count, 1);
        assert_eq!(retried.job.status, PrintJobStatus::Success);
        assert_eq!(f.bridge.sent.lock().await[0], first.job.zpl_content);
        assert_eq!(label_status(&f).await, LabelStatus::Printed);
    }

    #[tokio::test]
    async fn test_retries_exhausted_after_budget() {
        let f = fixture(ScriptedBridge::failing(vec![
            paused(),
            paused(),
            paused(),
            paused(),
        ]))
        .await;
        let job_id = f
            .orchestrator
            .print_label(&f.session, f.label.id, None)
            .await
            .unwrap()
            .job
            .id;

        for expected in 1..=3 {
            let attempt = f.orchestrator.retry(&f.session, job_id, None).await.unwrap();
            assert_eq!(attempt.job.retry_count, expected);
            assert_eq!(attempt.job.status, PrintJobStatus::Failed);
        }

        let err = f.orchestrator.retry(&f.session, job_id, None).await.unwrap_err();
        assert!(matches!(
            err,
            PrintJobError::RetriesExhausted {
                retry_count: 3,
                max_retries: 3
            }
        ));

        let job = f.orchestrator.get_job(&f.session, job_id).await.unwrap();
        assert_eq!(job.retry_count, 3);
        assert_eq!(job.status, PrintJobStatus::Failed);
        assert!(job.is_exhausted());
    }

    #[tokio::test]
    async fn test_retry_of_successful_job_rejected() {
        let f = fixture(ScriptedBridge::default()).await;
        let job_id = f
            .orchestrator
            .print_label(&f.session, f.label.id, None)
            .await
            .unwrap()
            .job
            .id;

        let err = f.orchestrator.retry(&f.session, job_id, None).await.unwrap_err();
        assert!(matches!(err, PrintJobError::AlreadySucceeded));
    }

    #[tokio::test]
    async fn test_double_submit_rejected() {
        let f = fixture(ScriptedBridge::default()).await;
        let job = f.orchestrator.create_job(&f.session, f.label.id).await.unwrap();

        // Simulate an in-flight submit.
        f.store.begin_submit(job.id).await.unwrap().unwrap();

        let err = f.orchestrator.submit(job.id, None).await.unwrap_err();
        assert!(matches!(err, PrintJobError::AlreadyProcessing));
        let err = f.orchestrator.retry(&f.session, job.id, None).await.unwrap_err();
        assert!(matches!(err, PrintJobError::AlreadyProcessing));
    }

    #[tokio::test]
    async fn test_pending_job_cannot_be_retried() {
        let f = fixture(ScriptedBridge::default()).await;
        let job = f.orchestrator.create_job(&f.session, f.label.id).await.unwrap();

        let err = f.orchestrator.retry(&f.session, job.id, None).await.unwrap_err();
        assert!(matches!(err, PrintJobError::NotFailed));
    }

    #[tokio::test]
    async fn test_retry_scoped_to_owner() {
        let f = fixture(ScriptedBridge::failing(vec![paused()])).await;
        let job_id = f
            .orchestrator
            .print_label(&f.session, f.label.id, None)
            .await
            .unwrap()
            .job
            .id;

        let stranger = Session {
            user_id: Uuid::new_v4(),
            role: Role::Operator,
        };
        let err = f.orchestrator.retry(&stranger, job_id, None).await.unwrap_err();
        assert!(matches!(err, PrintJobError::Forbidden));

        let admin = Session {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
        };
        assert!(f.orchestrator.retry(&admin, job_id, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_label_and_job() {
        let f = fixture(ScriptedBridge::default()).await;
        let missing = Uuid::new_v4();

        assert!(matches!(
            f.orchestrator.create_job(&f.session, missing).await,
            Err(PrintJobError::LabelNotFound(id)) if id == missing
        ));
        assert!(matches!(
            f.orchestrator.retry(&f.session, missing, None).await,
            Err(PrintJobError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_jobs_scoped_to_session() {
        let f = fixture(ScriptedBridge::default()).await;
        f.orchestrator.create_job(&f.session, f.label.id).await.unwrap();
        let newest = f.orchestrator.create_job(&f.session, f.label.id).await.unwrap();

        let other = Session {
            user_id: Uuid::new_v4(),
            role: Role::Operator,
        };
        assert!(f.orchestrator.list_jobs(&other, 50, 0).await.unwrap().is_empty());

        let mine = f.orchestrator.list_jobs(&f.session, 50, 0).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].id, newest.id);
    }

    /// Memory store whose outcome and label-status writes fail a set number
    /// of times before going through.
    struct FlakyStore {
        inner: Arc<MemoryStore>,
        finish_failures: AtomicUsize,
        status_failures: AtomicUsize,
    }

    impl FlakyStore {
        fn new(inner: Arc<MemoryStore>, finish_failures: usize, status_failures: usize) -> Self {
            Self {
                inner,
                finish_failures: AtomicUsize::new(finish_failures),
                status_failures: AtomicUsize::new(status_failures),
            }
        }

        fn take(counter: &AtomicUsize) -> Result<(), StoreError> {
            match counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
                Ok(_) => Err(StoreError::Unavailable("connection reset".to_string())),
                Err(_) => Ok(()),
            }
        }
    }

    #[async_trait]
    impl LabelStore for FlakyStore {
        async fn insert_if_absent(&self, label: NewLabel) -> Result<Insertion, StoreError> {
            self.inner.insert_if_absent(label).await
        }

        async fn get(&self, id: Uuid) -> Result<Option<Label>, StoreError> {
            LabelStore::get(self.inner.as_ref(), id).await
        }

        async fn list(&self, filter: &LabelFilter) -> Result<Vec<Label>, StoreError> {
            LabelStore::list(self.inner.as_ref(), filter).await
        }

        async fn set_status(
            &self,
            id: Uuid,
            status: LabelStatus,
            printed_at: Option<DateTime<Utc>>,
        ) -> Result<(), StoreError> {
            Self::take(&self.status_failures)?;
            self.inner.set_status(id, status, printed_at).await
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[async_trait]
    impl JobStore for FlakyStore {
        async fn create(&self, job: NewPrintJob) -> Result<PrintJob, StoreError> {
            self.inner.create(job).await
        }

        async fn get(&self, id: Uuid) -> Result<Option<PrintJob>, StoreError> {
            JobStore::get(self.inner.as_ref(), id).await
        }

        async fn list(
            &self,
            user_id: Option<Uuid>,
            limit: i64,
            offset: i64,
        ) -> Result<Vec<PrintJob>, StoreError> {
            JobStore::list(self.inner.as_ref(), user_id, limit, offset).await
        }

        async fn begin_submit(&self, id: Uuid) -> Result<Option<PrintJob>, StoreError> {
            self.inner.begin_submit(id).await
        }

        async fn begin_retry(&self, id: Uuid) -> Result<Option<PrintJob>, StoreError> {
            self.inner.begin_retry(id).await
        }

        async fn finish(&self, id: Uuid, outcome: &AttemptOutcome) -> Result<PrintJob, StoreError> {
            Self::take(&self.finish_failures)?;
            self.inner.finish(id, outcome).await
        }
    }

    fn flaky_orchestrator(f: &Fixture, store: FlakyStore) -> PrintOrchestrator {
        let store = Arc::new(store);
        PrintOrchestrator::new(
            store.clone(),
            store,
            f.bridge.clone(),
            IdentityEncoder::default(),
            DEFAULT_MAX_RETRIES,
        )
    }

    #[tokio::test]
    async fn test_outcome_write_blip_does_not_strand_job() {
        let f = fixture(ScriptedBridge::failing(vec![paused()])).await;
        let orchestrator = flaky_orchestrator(&f, FlakyStore::new(f.store.clone(), 1, 0));

        let attempt = orchestrator
            .print_label(&f.session, f.label.id, None)
            .await
            .unwrap();
        assert_eq!(attempt.job.status, PrintJobStatus::Failed);
        assert_eq!(attempt.job.error_message.as_deref(), Some("Printer paused"));

        let retried = orchestrator
            .retry(&f.session, attempt.job.id, None)
            .await
            .unwrap();
        assert!(retried.succeeded());
        assert_eq!(retried.job.retry_count, 1);
    }

    #[tokio::test]
    async fn test_outcome_write_outage_surfaces_store_error() {
        let f = fixture(ScriptedBridge::default()).await;
        let orchestrator = flaky_orchestrator(&f, FlakyStore::new(f.store.clone(), 10, 0));

        let err = orchestrator
            .print_label(&f.session, f.label.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PrintJobError::Store(_)));
    }

    #[tokio::test]
    async fn test_label_sync_failure_keeps_successful_attempt() {
        let f = fixture(ScriptedBridge::default()).await;
        let orchestrator = flaky_orchestrator(&f, FlakyStore::new(f.store.clone(), 0, 1));

        let attempt = orchestrator
            .print_label(&f.session, f.label.id, None)
            .await
            .unwrap();

        assert!(attempt.succeeded());
        assert_eq!(attempt.job.status, PrintJobStatus::Success);
        assert_eq!(f.bridge.sent.lock().await.len(), 1);
        // The label write was the one that failed.
        assert_eq!(label_status(&f).await, LabelStatus::Pending);
    }
}
