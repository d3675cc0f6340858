//! Run repository: create, load, CAS status transitions.
//!
//! The CAS update is the fencing mechanism described in spec §4.2/§5: a
//! worker only gets to write the terminal state if it still holds the
//! `claim_epoch` it claimed with. A losing writer's `rows_affected() == 0`
//! and it must stop touching the run.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::RunRow, DbError};

/// Create a new run in `pending` status with `claim_epoch = 0`.
#[allow(clippy::too_many_arguments)]
pub async fn create_run(
    pool: &PgPool,
    tenant_id: Uuid,
    workflow_id: Uuid,
    workflow_version: i32,
    mode: &str,
    input: serde_json::Value,
) -> Result<RunRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let row = sqlx::query_as!(
        RunRow,
        r#"
        INSERT INTO runs
            (id, tenant_id, workflow_id, workflow_version, mode, status, claim_epoch,
             worker_id, input, error_message, started_at, ended_at, created_at)
        VALUES ($1, $2, $3, $4, $5, 'pending', 0, NULL, $6, NULL, NULL, NULL, $7)
        RETURNING id, tenant_id, workflow_id, workflow_version, mode, status, claim_epoch,
                  worker_id, input, error_message, started_at, ended_at, created_at
        "#,
        id,
        tenant_id,
        workflow_id,
        workflow_version,
        mode,
        input,
        now,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Load a run, tenant-scoped.
pub async fn load_run(pool: &PgPool, tenant_id: Uuid, run_id: Uuid) -> Result<RunRow, DbError> {
    let row = sqlx::query_as!(
        RunRow,
        r#"
        SELECT id, tenant_id, workflow_id, workflow_version, mode, status, claim_epoch,
               worker_id, input, error_message, started_at, ended_at, created_at
        FROM runs
        WHERE tenant_id = $1 AND id = $2
        "#,
        tenant_id,
        run_id,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Claim a `pending` run for a worker: `pending -> running`, bumping
/// `claim_epoch` and recording `worker_id`.
///
/// Returns `true` if this call won the claim.
pub async fn claim_run(
    pool: &PgPool,
    run_id: Uuid,
    expected_claim_epoch: i64,
    worker_id: &str,
) -> Result<bool, DbError> {
    let result = sqlx::query!(
        r#"
        UPDATE runs
        SET status = 'running',
            claim_epoch = claim_epoch + 1,
            worker_id = $1,
            started_at = COALESCE(started_at, $2)
        WHERE id = $3 AND status = 'pending' AND claim_epoch = $4
        "#,
        worker_id,
        Utc::now(),
        run_id,
        expected_claim_epoch,
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Seize a stale `running` claim after its lease has expired, fencing the
/// prior worker off via the epoch bump.
pub async fn reclaim_stale_run(
    pool: &PgPool,
    run_id: Uuid,
    expected_claim_epoch: i64,
    new_worker_id: &str,
) -> Result<bool, DbError> {
    let result = sqlx::query!(
        r#"
        UPDATE runs
        SET claim_epoch = claim_epoch + 1, worker_id = $1
        WHERE id = $2 AND status = 'running' AND claim_epoch = $3
        "#,
        new_worker_id,
        run_id,
        expected_claim_epoch,
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Write the terminal status for a run, fenced by `claim_epoch`.
///
/// Returns `true` if this writer still held the lease.
pub async fn finish_run(
    pool: &PgPool,
    run_id: Uuid,
    expected_claim_epoch: i64,
    status: &str,
    error_message: Option<&str>,
) -> Result<bool, DbError> {
    let result = sqlx::query!(
        r#"
        UPDATE runs
        SET status = $1, error_message = $2, ended_at = $3
        WHERE id = $4 AND claim_epoch = $5
        "#,
        status,
        error_message,
        Utc::now(),
        run_id,
        expected_claim_epoch,
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Directly cancel a still-`pending` run (dispatcher-level cancel, §4.1).
pub async fn cancel_pending_run(pool: &PgPool, run_id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query!(
        r#"
        UPDATE runs
        SET status = 'cancelled', ended_at = $1
        WHERE id = $2 AND status = 'pending'
        "#,
        Utc::now(),
        run_id,
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn list_by_workflow(pool: &PgPool, workflow_id: Uuid) -> Result<Vec<RunRow>, DbError> {
    let rows = sqlx::query_as!(
        RunRow,
        r#"
        SELECT id, tenant_id, workflow_id, workflow_version, mode, status, claim_epoch,
               worker_id, input, error_message, started_at, ended_at, created_at
        FROM runs
        WHERE workflow_id = $1
        ORDER BY created_at DESC
        "#,
        workflow_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn list_by_status(pool: &PgPool, status: &str) -> Result<Vec<RunRow>, DbError> {
    let rows = sqlx::query_as!(
        RunRow,
        r#"
        SELECT id, tenant_id, workflow_id, workflow_version, mode, status, claim_epoch,
               worker_id, input, error_message, started_at, ended_at, created_at
        FROM runs
        WHERE status = $1
        ORDER BY created_at ASC
        "#,
        status,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Runs whose `started_at` is older than `lease_timeout` and are still
/// `running` — candidates for `reclaim_stale_run`.
pub async fn list_stale_running(
    pool: &PgPool,
    older_than: DateTime<Utc>,
) -> Result<Vec<RunRow>, DbError> {
    let rows = sqlx::query_as!(
        RunRow,
        r#"
        SELECT id, tenant_id, workflow_id, workflow_version, mode, status, claim_epoch,
               worker_id, input, error_message, started_at, ended_at, created_at
        FROM runs
        WHERE status = 'running' AND started_at < $1
        "#,
        older_than,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
