use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::job::{AttemptOutcome, NewPrintJob, PrintJob, PrintJobStatus};
use crate::services::store::status_for;

const JOB_COLUMNS: &str = "id, label_id, user_id, status, zpl_content, retry_count, \
    max_retries, error_message, printer, created_at, updated_at";

fn job_from_row(row: &PgRow) -> Result<PrintJob, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<PrintJobStatus>()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(PrintJob {
        id: row.try_get("id")?,
        label_id: row.try_get("label_id")?,
        user_id: row.try_get("user_id")?,
        status,
        zpl_content: row.try_get("zpl_content")?,
        retry_count: row.try_get("retry_count")?,
        max_retries: row.try_get("max_retries")?,
        error_message: row.try_get("error_message")?,
        printer: row.try_get("printer")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert a new print job in `pending`
pub async fn create_print_job(pool: &PgPool, job: &NewPrintJob) -> Result<PrintJob, sqlx::Error> {
    let query = format!(
        r#"
        INSERT INTO print_jobs (label_id, user_id, status, zpl_content, retry_count, max_retries)
        VALUES ($1, $2, 'pending', $3, 0, $4)
        RETURNING {JOB_COLUMNS}
        "#
    );

    let row = sqlx::query(&query)
        .bind(job.label_id)
        .bind(job.user_id)
        .bind(&job.zpl_content)
        .bind(job.max_retries)
        .fetch_one(pool)
        .await?;

    job_from_row(&row)
}

/// Get a print job by ID
pub async fn get_print_job(pool: &PgPool, id: Uuid) -> Result<Option<PrintJob>, sqlx::Error> {
    let query = format!("SELECT {JOB_COLUMNS} FROM print_jobs WHERE id = $1");
    let row = sqlx::query(&query).bind(id).fetch_optional(pool).await?;

    row.as_ref().map(job_from_row).transpose()
}

/// List print jobs newest first, optionally for one user
pub async fn list_print_jobs(
    pool: &PgPool,
    user_id: Option<Uuid>,
    limit: i64,
    offset: i64,
) -> Result<Vec<PrintJob>, sqlx::Error> {
    let query = format!(
        r#"
        SELECT {JOB_COLUMNS} FROM print_jobs
        WHERE ($1::uuid IS NULL OR user_id = $1)
        ORDER BY created_at DESC, id
        LIMIT $2 OFFSET $3
        "#
    );

    let rows = sqlx::query(&query)
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    rows.iter().map(job_from_row).collect()
}

/// `pending -> processing`. No row when the job was not pending.
pub async fn begin_submit(pool: &PgPool, id: Uuid) -> Result<Option<PrintJob>, sqlx::Error> {
    let query = format!(
        r#"
        UPDATE print_jobs
        SET status = 'processing', updated_at = NOW()
        WHERE id = $1 AND status = 'pending'
        RETURNING {JOB_COLUMNS}
        "#
    );
    let row = sqlx::query(&query).bind(id).fetch_optional(pool).await?;

    row.as_ref().map(job_from_row).transpose()
}

/// `failed -> processing`, spending one retry. No row when the job is not
/// failed or its budget is spent.
pub async fn begin_retry(pool: &PgPool, id: Uuid) -> Result<Option<PrintJob>, sqlx::Error> {
    let query = format!(
        r#"
        UPDATE print_jobs
        SET status = 'processing', retry_count = retry_count + 1, updated_at = NOW()
        WHERE id = $1 AND status = 'failed' AND retry_count < max_retries
        RETURNING {JOB_COLUMNS}
        "#
    );
    let row = sqlx::query(&query).bind(id).fetch_optional(pool).await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Record the outcome of the attempt on a `processing` job.
pub async fn finish_print_job(
    pool: &PgPool,
    id: Uuid,
    outcome: &AttemptOutcome,
) -> Result<Option<PrintJob>, sqlx::Error> {
    let (printer, error_message) = match outcome {
        AttemptOutcome::Sent { printer } => (Some(printer.as_str()), None),
        AttemptOutcome::Failed { printer, error } => (printer.as_deref(), Some(error.as_str())),
    };

    let query = format!(
        r#"
        UPDATE print_jobs
        SET status = $2, printer = $3, error_message = $4, updated_at = NOW()
        WHERE id = $1 AND status = 'processing'
        RETURNING {JOB_COLUMNS}
        "#
    );
    let row = sqlx::query(&query)
        .bind(id)
        .bind(status_for(outcome).as_ref())
        .bind(printer)
        .bind(error_message)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}
