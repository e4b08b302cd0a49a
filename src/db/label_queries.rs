use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::api::LabelFilter;
use crate::models::label::{Label, LabelStatus, NewLabel};

const LABEL_COLUMNS: &str = "id, label_id, dedup_key, heat_no, section, grade, mill, unit, \
    bundle_no, product_heading, isi_top, isi_bottom, length, weight, location, pqd, date, \
    time, charge_dtm, user_id, status, is_duplicate, printed_at, created_at, updated_at";

fn label_from_row(row: &PgRow) -> Result<Label, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<LabelStatus>()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(Label {
        id: row.try_get("id")?,
        label_id: row.try_get("label_id")?,
        dedup_key: row.try_get("dedup_key")?,
        heat_no: row.try_get("heat_no")?,
        section: row.try_get("section")?,
        grade: row.try_get("grade")?,
        mill: row.try_get("mill")?,
        unit: row.try_get("unit")?,
        bundle_no: row.try_get("bundle_no")?,
        product_heading: row.try_get("product_heading")?,
        isi_top: row.try_get("isi_top")?,
        isi_bottom: row.try_get("isi_bottom")?,
        length: row.try_get("length")?,
        weight: row.try_get("weight")?,
        location: row.try_get("location")?,
        pqd: row.try_get("pqd")?,
        date: row.try_get("date")?,
        time: row.try_get("time")?,
        charge_dtm: row.try_get("charge_dtm")?,
        user_id: row.try_get("user_id")?,
        status,
        is_duplicate: row.try_get("is_duplicate")?,
        printed_at: row.try_get("printed_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert a label unless its dedup key is taken. `None` means the key
/// already existed; nothing was written.
pub async fn insert_label_if_absent(
    pool: &PgPool,
    label: &NewLabel,
) -> Result<Option<Label>, sqlx::Error> {
    let query = format!(
        r#"
        INSERT INTO labels (label_id, dedup_key, heat_no, section, grade, mill, unit, bundle_no,
                            product_heading, isi_top, isi_bottom, length, weight, location, pqd,
                            date, time, charge_dtm, user_id, status, is_duplicate)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
                $19, 'pending', FALSE)
        ON CONFLICT (dedup_key) DO NOTHING
        RETURNING {LABEL_COLUMNS}
        "#
    );

    let row = sqlx::query(&query)
        .bind(&label.label_id)
        .bind(&label.dedup_key)
        .bind(&label.heat_no)
        .bind(&label.section)
        .bind(&label.grade)
        .bind(&label.mill)
        .bind(&label.unit)
        .bind(&label.bundle_no)
        .bind(&label.product_heading)
        .bind(&label.isi_top)
        .bind(&label.isi_bottom)
        .bind(label.length)
        .bind(label.weight.as_deref())
        .bind(label.location.as_deref())
        .bind(&label.pqd)
        .bind(&label.date)
        .bind(&label.time)
        .bind(&label.charge_dtm)
        .bind(label.user_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(label_from_row).transpose()
}

/// Look up a label by its dedup key
pub async fn get_label_by_key(pool: &PgPool, dedup_key: &str) -> Result<Option<Label>, sqlx::Error> {
    let query = format!("SELECT {LABEL_COLUMNS} FROM labels WHERE dedup_key = $1");
    let row = sqlx::query(&query)
        .bind(dedup_key)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(label_from_row).transpose()
}

/// Get a label by ID
pub async fn get_label(pool: &PgPool, id: Uuid) -> Result<Option<Label>, sqlx::Error> {
    let query = format!("SELECT {LABEL_COLUMNS} FROM labels WHERE id = $1");
    let row = sqlx::query(&query).bind(id).fetch_optional(pool).await?;

    row.as_ref().map(label_from_row).transpose()
}

/// List labels newest first with optional filters.
pub async fn list_labels(pool: &PgPool, filter: &LabelFilter) -> Result<Vec<Label>, sqlx::Error> {
    let mut conditions = Vec::new();
    let mut bind_idx = 1u32;

    if filter.status.is_some() {
        conditions.push(format!("status = ${bind_idx}"));
        bind_idx += 1;
    }
    if filter.grade.is_some() {
        conditions.push(format!("grade ILIKE ${bind_idx}"));
        bind_idx += 1;
    }
    if filter.section.is_some() {
        conditions.push(format!("section ILIKE ${bind_idx}"));
        bind_idx += 1;
    }
    if filter.heat_no.is_some() {
        conditions.push(format!("heat_no ILIKE ${bind_idx}"));
        bind_idx += 1;
    }
    if filter.is_duplicate.is_some() {
        conditions.push(format!("is_duplicate = ${bind_idx}"));
        bind_idx += 1;
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let query = format!(
        "SELECT {LABEL_COLUMNS} FROM labels {where_clause} \
         ORDER BY created_at DESC, id \
         LIMIT ${bind_idx} OFFSET ${next_idx}",
        next_idx = bind_idx + 1,
    );

    let mut q = sqlx::query(&query);
    if let Some(status) = filter.status {
        q = q.bind(status.as_ref().to_string());
    }
    if let Some(ref grade) = filter.grade {
        q = q.bind(format!("%{grade}%"));
    }
    if let Some(ref section) = filter.section {
        q = q.bind(format!("%{section}%"));
    }
    if let Some(ref heat_no) = filter.heat_no {
        q = q.bind(format!("%{heat_no}%"));
    }
    if let Some(is_duplicate) = filter.is_duplicate {
        q = q.bind(is_duplicate);
    }

    let rows = q
        .bind(filter.limit())
        .bind(filter.offset())
        .fetch_all(pool)
        .await?;

    rows.iter().map(label_from_row).collect()
}

/// Update label print status
pub async fn update_label_status(
    pool: &PgPool,
    id: Uuid,
    status: LabelStatus,
    printed_at: Option<DateTime<Utc>>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE labels
        SET status = $2, printed_at = COALESCE($3, printed_at), updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status.as_ref())
    .bind(printed_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
