//! Per-node execution results, one row per `(run_id, node_id)`.
//!
//! A retry does not insert a new row: it upserts the same `(run_id,
//! node_id)` row with a bumped `attempt`, so the row always reflects the
//! latest attempt.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::NodeResultRow, DbError};

#[allow(clippy::too_many_arguments)]
pub async fn upsert_node_result(
    pool: &PgPool,
    run_id: Uuid,
    node_id: &str,
    status: &str,
    attempt: i32,
    input: serde_json::Value,
    output: Option<serde_json::Value>,
    error_message: Option<&str>,
) -> Result<NodeResultRow, DbError> {
    let now = Utc::now();
    let ended_at = matches!(status, "success" | "failed" | "skipped" | "cancelled").then_some(now);

    let row = sqlx::query_as!(
        NodeResultRow,
        r#"
        INSERT INTO node_results
            (run_id, node_id, status, attempt, input, output, error_message, started_at, ended_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (run_id, node_id) DO UPDATE SET
            status = EXCLUDED.status,
            attempt = EXCLUDED.attempt,
            input = EXCLUDED.input,
            output = EXCLUDED.output,
            error_message = EXCLUDED.error_message,
            ended_at = EXCLUDED.ended_at
        RETURNING run_id, node_id, status, attempt, input, output, error_message, started_at, ended_at
        "#,
        run_id,
        node_id,
        status,
        attempt,
        input,
        output,
        error_message,
        now,
        ended_at,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Every node result recorded so far for a run, in start order — the raw
/// material for the run's log view.
pub async fn load_all(pool: &PgPool, run_id: Uuid) -> Result<Vec<NodeResultRow>, DbError> {
    let rows = sqlx::query_as!(
        NodeResultRow,
        r#"
        SELECT run_id, node_id, status, attempt, input, output, error_message, started_at, ended_at
        FROM node_results
        WHERE run_id = $1
        ORDER BY started_at ASC
        "#,
        run_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn load_one(
    pool: &PgPool,
    run_id: Uuid,
    node_id: &str,
) -> Result<Option<NodeResultRow>, DbError> {
    let row = sqlx::query_as!(
        NodeResultRow,
        r#"
        SELECT run_id, node_id, status, attempt, input, output, error_message, started_at, ended_at
        FROM node_results
        WHERE run_id = $1 AND node_id = $2
        "#,
        run_id,
        node_id,
    )
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
