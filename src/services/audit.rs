//! Audit trail for ingestion, print and retry actions.
//!
//! Writes are best effort: a failed audit insert is logged and never fails
//! the action it describes.

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::header;
use serde_json::Value;
use uuid::Uuid;

use crate::models::audit::{AuditAction, AuditEntry, AuditQuery, NewAuditEntry};
use crate::services::auth::Session;
use crate::services::store::StoreError;

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError>;

    /// Newest first. `user_id = None` spans every user.
    async fn list_audit(
        &self,
        user_id: Option<Uuid>,
        query: &AuditQuery,
    ) -> Result<Vec<AuditEntry>, StoreError>;
}

/// Where a request came from, as far as the headers tell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOrigin {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl<S: Send + Sync> FromRequestParts<S> for RequestOrigin {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header_str = |name: header::HeaderName| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        Ok(Self {
            // First hop is the client; later hops are proxies.
            ip_address: header_str(header::HeaderName::from_static("x-forwarded-for"))
                .and_then(|v| v.split(',').next())
                .map(|v| v.trim().to_string()),
            user_agent: header_str(header::USER_AGENT).map(str::to_string),
        })
    }
}

pub struct AuditLog {
    store: Arc<dyn AuditStore>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Append one row for `session`'s action. Errors are logged, not returned.
    pub async fn record(
        &self,
        session: &Session,
        origin: &RequestOrigin,
        action: AuditAction,
        resource_id: Option<String>,
        details: Value,
    ) {
        let entry = NewAuditEntry {
            user_id: session.user_id,
            action,
            resource_id,
            details,
            ip_address: origin.ip_address.clone(),
            user_agent: origin.user_agent.clone(),
        };

        if let Err(e) = self.store.append(entry).await {
            metrics::counter!("audit_write_failures_total").increment(1);
            tracing::warn!(user_id = %session.user_id, action = %action, error = %e, "Failed to write audit log");
        }
    }

    /// Rows visible to `session`: its own, or any user's for admins (who may
    /// narrow by `user_id`).
    pub async fn list(
        &self,
        session: &Session,
        query: &AuditQuery,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let user_id = match session.scope() {
            Some(own) => Some(own),
            None => query.user_id,
        };
        self.store.list_audit(user_id, query).await
    }
}
