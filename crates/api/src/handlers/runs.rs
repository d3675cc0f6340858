use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use uuid::Uuid;

use db::repository::{node_results as node_result_repo, workflows as wf_repo};
use engine::RunMode;

use crate::tenant::TenantId;
use crate::AppState;

#[derive(serde::Deserialize)]
pub struct ExecuteWorkflowDto {
    pub input: Value,
}

pub async fn execute(
    TenantId(tenant_id): TenantId,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<ExecuteWorkflowDto>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    let workflow_row = match wf_repo::get_latest_workflow(&state.pool, tenant_id, id).await {
        Ok(w) => w,
        Err(db::DbError::NotFound) => return Err(StatusCode::NOT_FOUND),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };
    let workflow: engine::Workflow = serde_json::from_value(workflow_row.definition)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let run_id = state
        .dispatcher
        .enqueue(&workflow, payload.input, RunMode::Manual)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "runId": run_id }))))
}

pub async fn status(
    TenantId(tenant_id): TenantId,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<queue::RunSnapshot>, StatusCode> {
    match state.dispatcher.status(tenant_id, id).await {
        Ok(snapshot) => Ok(Json(snapshot)),
        Err(queue::QueueError::RunNotFound(_)) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub async fn cancel(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, StatusCode> {
    match state.dispatcher.cancel(id).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(StatusCode::CONFLICT),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub async fn logs(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Vec<db::models::NodeResultRow>>, StatusCode> {
    match node_result_repo::load_all(&state.pool, id).await {
        Ok(rows) => Ok(Json(rows)),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
