use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Default retry budget for a print job.
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// Status of a print job.
///
/// Older rows may carry `completed`; it reads as `Success`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PrintJobStatus {
    Pending,
    Processing,
    #[serde(alias = "completed")]
    #[strum(to_string = "success", serialize = "completed")]
    Success,
    Failed,
}

/// One print request for a label, with its attempt history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrintJob {
    pub id: Uuid,
    pub label_id: Uuid,
    pub user_id: Option<Uuid>,
    pub status: PrintJobStatus,
    pub zpl_content: String,
    pub retry_count: i32,
    pub max_retries: i32,
    pub error_message: Option<String>,
    pub printer: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PrintJob {
    /// A failed job with budget left.
    pub fn can_retry(&self) -> bool {
        self.status == PrintJobStatus::Failed && self.retry_count < self.max_retries
    }

    /// A failed job whose retry budget is spent. Terminal.
    pub fn is_exhausted(&self) -> bool {
        self.status == PrintJobStatus::Failed && self.retry_count >= self.max_retries
    }
}

/// Insert payload for a new print job.
#[derive(Debug, Clone)]
pub struct NewPrintJob {
    pub label_id: Uuid,
    pub user_id: Option<Uuid>,
    pub zpl_content: String,
    pub max_retries: i32,
}

impl NewPrintJob {
    pub fn into_job(self, id: Uuid, now: DateTime<Utc>) -> PrintJob {
        PrintJob {
            id,
            label_id: self.label_id,
            user_id: self.user_id,
            status: PrintJobStatus::Pending,
            zpl_content: self.zpl_content,
            retry_count: 0,
            max_retries: self.max_retries,
            error_message: None,
            printer: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of one transmission attempt, recorded on the job.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Sent { printer: String },
    Failed { printer: Option<String>, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(status: PrintJobStatus, retry_count: i32) -> PrintJob {
        let mut job = NewPrintJob {
            label_id: Uuid::new_v4(),
            user_id: None,
            zpl_content: "^XA^XZ".to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
        .into_job(Uuid::new_v4(), Utc::now());
        job.status = status;
        job.retry_count = retry_count;
        job
    }

    #[test]
    fn test_status_parses_legacy_completed() {
        assert_eq!("completed".parse::<PrintJobStatus>().unwrap(), PrintJobStatus::Success);
        assert_eq!("success".parse::<PrintJobStatus>().unwrap(), PrintJobStatus::Success);
        assert_eq!(PrintJobStatus::Success.to_string(), "success");
        assert_eq!(PrintJobStatus::Processing.as_ref(), "processing");
    }

    #[test]
    fn test_retry_eligibility() {
        assert!(job(PrintJobStatus::Failed, 0).can_retry());
        assert!(job(PrintJobStatus::Failed, 2).can_retry());
        assert!(!job(PrintJobStatus::Failed, 3).can_retry());
        assert!(job(PrintJobStatus::Failed, 3).is_exhausted());
        assert!(!job(PrintJobStatus::Success, 0).can_retry());
        assert!(!job(PrintJobStatus::Pending, 0).can_retry());
        assert!(!job(PrintJobStatus::Processing, 1).is_exhausted());
    }
}
