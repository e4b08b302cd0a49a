use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::PrintJob;
use crate::models::label::{LabelStatus, RawLabelRecord};

/// POST /api/v1/labels/batch body.
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub labels: Vec<RawLabelRecord>,
}

/// POST /api/v1/labels/print body.
#[derive(Debug, Deserialize, Validate)]
pub struct PrintRequest {
    #[garde(skip)]
    pub id: Uuid,

    #[garde(length(min = 1, max = 200))]
    pub printer: Option<String>,
}

/// Response for a print action: the job is created even when the send fails.
#[derive(Debug, Serialize, Deserialize)]
pub struct PrintResponse {
    pub message: String,
    pub print_job_id: Uuid,
    pub zpl_content: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// POST /api/v1/print-jobs/retry body.
#[derive(Debug, Deserialize, Validate)]
pub struct RetryRequest {
    #[garde(skip)]
    pub job_id: Uuid,

    #[garde(length(min = 1, max = 200))]
    pub printer: Option<String>,
}

/// A print job plus the retry predicates the UI needs to enable its actions.
#[derive(Debug, Serialize, Deserialize)]
pub struct PrintJobView {
    #[serde(flatten)]
    pub job: PrintJob,
    pub retry_eligible: bool,
    pub exhausted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl From<PrintJob> for PrintJobView {
    fn from(job: PrintJob) -> Self {
        Self {
            retry_eligible: job.can_retry(),
            exhausted: job.is_exhausted(),
            job,
            message: None,
            error_code: None,
        }
    }
}

/// Query string for GET /api/v1/labels.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct LabelFilter {
    #[garde(skip)]
    pub status: Option<LabelStatus>,
    #[garde(length(max = 100))]
    pub grade: Option<String>,
    #[garde(length(max = 255))]
    pub section: Option<String>,
    #[garde(length(max = 100))]
    pub heat_no: Option<String>,
    #[garde(skip)]
    pub is_duplicate: Option<bool>,
    #[garde(range(min = 1, max = 500))]
    pub limit: Option<i64>,
    #[garde(range(min = 0))]
    pub offset: Option<i64>,
}

impl LabelFilter {
    pub const DEFAULT_LIMIT: i64 = 50;

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0)
    }
}

/// `?limit=&offset=` for print job listings.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct PageParams {
    #[garde(range(min = 1, max = 500))]
    pub limit: Option<i64>,
    #[garde(range(min = 0))]
    pub offset: Option<i64>,
}

impl PageParams {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(LabelFilter::DEFAULT_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0)
    }
}

/// Both identity payloads for a label and their rendered images.
#[derive(Debug, Serialize, Deserialize)]
pub struct QrCodesResponse {
    pub label_id: Uuid,
    pub traceability_url: String,
    pub attribute_record: String,
    pub traceability_png: Option<String>,
    pub attribute_png: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<String>,
}

/// Printers reachable through the configured bridge.
#[derive(Debug, Serialize, Deserialize)]
pub struct PrintersResponse {
    pub backend: String,
    pub printers: Vec<crate::services::printer::PrinterDevice>,
    pub default: Option<String>,
}
