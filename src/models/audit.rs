use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Actions that leave an audit row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditAction {
    ProcessBatch,
    PrintLabel,
    RetryPrintJob,
}

impl AuditAction {
    /// The resource family the action touches.
    pub fn resource(self) -> &'static str {
        match self {
            AuditAction::ProcessBatch | AuditAction::PrintLabel => "labels",
            AuditAction::RetryPrintJob => "print_jobs",
        }
    }
}

/// One persisted audit row. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<String>,
    pub details: Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub user_id: Uuid,
    pub action: AuditAction,
    pub resource_id: Option<String>,
    pub details: Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl NewAuditEntry {
    pub fn into_entry(self, id: Uuid, now: DateTime<Utc>) -> AuditEntry {
        AuditEntry {
            id,
            user_id: self.user_id,
            action: self.action.to_string(),
            resource: self.action.resource().to_string(),
            resource_id: self.resource_id,
            details: self.details,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            created_at: now,
        }
    }
}

/// Query string for GET /api/v1/audit-logs.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct AuditQuery {
    #[garde(skip)]
    pub action: Option<AuditAction>,
    #[garde(length(max = 50))]
    pub resource: Option<String>,
    /// Only honoured for admins; other sessions always see their own rows.
    #[garde(skip)]
    pub user_id: Option<Uuid>,
    #[garde(range(min = 1, max = 500))]
    pub limit: Option<i64>,
    #[garde(range(min = 0))]
    pub offset: Option<i64>,
}

impl AuditQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(crate::models::api::LabelFilter::DEFAULT_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0)
    }
}

/// GET /api/v1/audit-logs response.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuditLogsResponse {
    pub audit_logs: Vec<AuditEntry>,
    pub count: usize,
}
