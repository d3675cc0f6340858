//! `RunDispatcher` — the external-facing entry point for starting,
//! inspecting, and cancelling runs (spec §4.1).
//!
//! Enqueue is persist-then-enqueue: the run row is the source of truth, the
//! queue message is only a wakeup signal. If the enqueue half fails after
//! the row is committed, the run is left `pending` for a reconciler to pick
//! up rather than rolled back — a worker that lists stale pending runs
//! will eventually claim it.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use db::DbPool;
use engine::{NodeExecutionResult, RunMode, RunStatus, Workflow};

use crate::error::QueueError;
use crate::message::RunMessage;
use crate::partition::PartitionedQueue;

/// A point-in-time view of a run, returned by `RunDispatcher::status`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub run_id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_version: i32,
    pub status: RunStatus,
    pub error_message: Option<String>,
    pub node_results: Vec<NodeExecutionResult>,
}

pub struct RunDispatcher {
    pool: DbPool,
    queue: Arc<dyn PartitionedQueue>,
}

impl RunDispatcher {
    pub fn new(pool: DbPool, queue: Arc<dyn PartitionedQueue>) -> Self {
        Self { pool, queue }
    }

    /// Persist a new `pending` run and enqueue its dispatch message.
    pub async fn enqueue(
        &self,
        workflow: &Workflow,
        input: Value,
        mode: RunMode,
    ) -> Result<Uuid, QueueError> {
        let row = db::repository::runs::create_run(
            &self.pool,
            workflow.tenant_id,
            workflow.id,
            workflow.version,
            &mode.to_string(),
            input.clone(),
        )
        .await?;

        let message = RunMessage {
            run_id: row.id,
            workflow_id: row.workflow_id,
            workflow_version: row.workflow_version,
            tenant_id: row.tenant_id,
            mode,
            input,
            queued_at: chrono::Utc::now(),
            metadata: Value::Null,
        };

        let key = format!("{}:{}", row.tenant_id, row.id);
        self.queue.enqueue(&key, message).await;

        Ok(row.id)
    }

    pub async fn status(&self, tenant_id: Uuid, run_id: Uuid) -> Result<RunSnapshot, QueueError> {
        let row = db::repository::runs::load_run(&self.pool, tenant_id, run_id)
            .await
            .map_err(|e| match e {
                db::DbError::NotFound => QueueError::RunNotFound(run_id),
                other => QueueError::Db(other),
            })?;

        let status: RunStatus = row
            .status
            .parse()
            .map_err(|e: String| QueueError::DefinitionDecode(e))?;

        let node_result_rows = db::repository::node_results::load_all(&self.pool, run_id).await?;
        let mut node_results = Vec::with_capacity(node_result_rows.len());
        for r in node_result_rows {
            let node_status = r
                .status
                .parse()
                .map_err(|e: String| QueueError::DefinitionDecode(e))?;
            node_results.push(NodeExecutionResult {
                run_id: r.run_id,
                node_id: r.node_id,
                status: node_status,
                attempt: r.attempt as u32,
                input: r.input,
                output: r.output,
                error_message: r.error_message,
                started_at: r.started_at,
                ended_at: r.ended_at,
            });
        }

        Ok(RunSnapshot {
            run_id: row.id,
            workflow_id: row.workflow_id,
            workflow_version: row.workflow_version,
            status,
            error_message: row.error_message,
            node_results,
        })
    }

    /// Cancel a run that has not yet been claimed by a worker.
    ///
    /// Returns `false` if the run is already running or terminal — a
    /// running run can only be cancelled through the `CancellationToken`
    /// its owning worker holds, which this dispatcher has no handle to.
    pub async fn cancel(&self, run_id: Uuid) -> Result<bool, QueueError> {
        let cancelled = db::repository::runs::cancel_pending_run(&self.pool, run_id).await?;
        if !cancelled {
            warn!("run {} could not be cancelled while pending (already claimed or terminal)", run_id);
        }
        Ok(cancelled)
    }
}

impl std::fmt::Debug for RunDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunDispatcher").finish_non_exhaustive()
    }
}
