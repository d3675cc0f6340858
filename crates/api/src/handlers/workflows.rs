use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use uuid::Uuid;

use db::repository::workflows as wf_repo;
use engine::Workflow;

use crate::tenant::TenantId;
use crate::AppState;

#[derive(serde::Deserialize)]
pub struct CreateWorkflowDto {
    pub name: String,
    pub definition: Value,
}

pub async fn list(
    TenantId(tenant_id): TenantId,
    State(state): State<AppState>,
) -> Result<Json<Vec<db::models::WorkflowRow>>, StatusCode> {
    match wf_repo::list_workflows(&state.pool, tenant_id).await {
        Ok(workflows) => Ok(Json(workflows)),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub async fn get(
    TenantId(tenant_id): TenantId,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<db::models::WorkflowRow>, StatusCode> {
    match wf_repo::get_latest_workflow(&state.pool, tenant_id, id).await {
        Ok(wf) => Ok(Json(wf)),
        Err(db::DbError::NotFound) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub async fn create(
    TenantId(tenant_id): TenantId,
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkflowDto>,
) -> Result<(StatusCode, Json<db::models::WorkflowRow>), StatusCode> {
    // Validate the definition parses as a `Workflow` before persisting it.
    if serde_json::from_value::<Workflow>(payload.definition.clone()).is_err() {
        return Err(StatusCode::BAD_REQUEST);
    }

    match wf_repo::create_workflow(&state.pool, tenant_id, &payload.name, 1, payload.definition).await {
        Ok(wf) => Ok((StatusCode::CREATED, Json(wf))),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub async fn delete(
    TenantId(tenant_id): TenantId,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, StatusCode> {
    match wf_repo::delete_workflow(&state.pool, tenant_id, id).await {
        Ok(_) => Ok(StatusCode::NO_CONTENT),
        Err(db::DbError::NotFound) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
