//! Workflow CRUD operations.
//!
//! Workflows are immutable per `(tenant_id, id, version)`: an "edit" in
//! the external API is a new row with `version = previous + 1`, never an
//! `UPDATE` of `definition`.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::WorkflowRow, DbError};

/// Insert a new workflow version.
pub async fn create_workflow(
    pool: &PgPool,
    tenant_id: Uuid,
    name: &str,
    version: i32,
    definition: serde_json::Value,
) -> Result<WorkflowRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let row = sqlx::query_as!(
        WorkflowRow,
        r#"
        INSERT INTO workflows (id, tenant_id, version, name, definition, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, tenant_id, version, name, definition, created_at
        "#,
        id,
        tenant_id,
        version,
        name,
        definition,
        now,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch a specific workflow version, tenant-scoped.
pub async fn get_workflow_version(
    pool: &PgPool,
    tenant_id: Uuid,
    id: Uuid,
    version: i32,
) -> Result<WorkflowRow, DbError> {
    let row = sqlx::query_as!(
        WorkflowRow,
        r#"
        SELECT id, tenant_id, version, name, definition, created_at
        FROM workflows
        WHERE tenant_id = $1 AND id = $2 AND version = $3
        "#,
        tenant_id,
        id,
        version,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Fetch the newest version of a workflow, tenant-scoped.
pub async fn get_latest_workflow(
    pool: &PgPool,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<WorkflowRow, DbError> {
    let row = sqlx::query_as!(
        WorkflowRow,
        r#"
        SELECT id, tenant_id, version, name, definition, created_at
        FROM workflows
        WHERE tenant_id = $1 AND id = $2
        ORDER BY version DESC
        LIMIT 1
        "#,
        tenant_id,
        id,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Find the newest version of the workflow bound to a webhook trigger at
/// `path`, across all tenants — webhook delivery has no tenant context to
/// scope by, only the path it was registered under.
pub async fn find_by_webhook_path(pool: &PgPool, path: &str) -> Result<WorkflowRow, DbError> {
    let trigger = serde_json::json!([{ "type": "webhook", "path": path }]);

    let row = sqlx::query_as!(
        WorkflowRow,
        r#"
        SELECT DISTINCT ON (id) id, tenant_id, version, name, definition, created_at
        FROM workflows
        WHERE definition->'triggers' @> $1
        ORDER BY id, version DESC
        "#,
        trigger,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Return the newest version of every workflow in the tenant, ordered by
/// creation time (newest first).
pub async fn list_workflows(pool: &PgPool, tenant_id: Uuid) -> Result<Vec<WorkflowRow>, DbError> {
    let rows = sqlx::query_as!(
        WorkflowRow,
        r#"
        SELECT DISTINCT ON (id) id, tenant_id, version, name, definition, created_at
        FROM workflows
        WHERE tenant_id = $1
        ORDER BY id, version DESC
        "#,
        tenant_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Permanently delete every version of a workflow.
///
/// Returns `DbError::NotFound` if no row was deleted.
pub async fn delete_workflow(pool: &PgPool, tenant_id: Uuid, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query!(
        "DELETE FROM workflows WHERE tenant_id = $1 AND id = $2",
        tenant_id,
        id,
    )
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
