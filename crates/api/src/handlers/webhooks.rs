use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;

use db::repository::workflows as wf_repo;
use engine::{RunMode, Workflow};

use crate::AppState;

pub async fn handle_webhook(
    Path(path): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    let wf_row = match wf_repo::find_by_webhook_path(&state.pool, &path).await {
        Ok(w) => w,
        Err(db::DbError::NotFound) => return Err(StatusCode::NOT_FOUND),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };
    let workflow: Workflow =
        serde_json::from_value(wf_row.definition).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let run_id = state
        .dispatcher
        .enqueue(&workflow, payload, RunMode::Triggered)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "runId": run_id }))))
}
