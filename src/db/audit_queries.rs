use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::audit::{AuditEntry, AuditQuery, NewAuditEntry};

const AUDIT_COLUMNS: &str =
    "id, user_id, action, resource, resource_id, details, ip_address, user_agent, created_at";

fn audit_from_row(row: &PgRow) -> Result<AuditEntry, sqlx::Error> {
    Ok(AuditEntry {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        action: row.try_get("action")?,
        resource: row.try_get("resource")?,
        resource_id: row.try_get("resource_id")?,
        details: row.try_get("details")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Append an audit row
pub async fn insert_audit_entry(
    pool: &PgPool,
    entry: &NewAuditEntry,
) -> Result<AuditEntry, sqlx::Error> {
    let query = format!(
        r#"
        INSERT INTO audit_logs (user_id, action, resource, resource_id, details, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {AUDIT_COLUMNS}
        "#
    );

    let row = sqlx::query(&query)
        .bind(entry.user_id)
        .bind(entry.action.as_ref())
        .bind(entry.action.resource())
        .bind(&entry.resource_id)
        .bind(&entry.details)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .fetch_one(pool)
        .await?;

    audit_from_row(&row)
}

/// List audit rows newest first. `user_id = None` spans every user.
pub async fn list_audit_entries(
    pool: &PgPool,
    user_id: Option<Uuid>,
    params: &AuditQuery,
) -> Result<Vec<AuditEntry>, sqlx::Error> {
    let mut conditions = Vec::new();
    let mut bind_idx = 1u32;

    if user_id.is_some() {
        conditions.push(format!("user_id = ${bind_idx}"));
        bind_idx += 1;
    }
    if params.action.is_some() {
        conditions.push(format!("action = ${bind_idx}"));
        bind_idx += 1;
    }
    if params.resource.is_some() {
        conditions.push(format!("resource = ${bind_idx}"));
        bind_idx += 1;
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let query = format!(
        "SELECT {AUDIT_COLUMNS} FROM audit_logs {where_clause} \
         ORDER BY created_at DESC, id \
         LIMIT ${bind_idx} OFFSET ${next_idx}",
        next_idx = bind_idx + 1,
    );

    let mut q = sqlx::query(&query);
    if let Some(user_id) = user_id {
        q = q.bind(user_id);
    }
    if let Some(action) = params.action {
        q = q.bind(action.as_ref().to_string());
    }
    if let Some(ref resource) = params.resource {
        q = q.bind(resource.clone());
    }

    let rows = q
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await?;

    rows.iter().map(audit_from_row).collect()
}
