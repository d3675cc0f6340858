//! `Worker` — the single-partition consumer loop (spec §4.2):
//! decode → idempotency check → CAS claim → load workflow → execute →
//! write terminal run → commit offset.
//!
//! A worker process hosts many partitions, one `tokio::task` each, fanned
//! out through a `JoinSet` by `run_partitions`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use db::DbPool;
use engine::{NodeExecutionResult, NodeStatus, RunStatus, Workflow, WorkflowExecutor, WorkflowRun};

use crate::error::QueueError;
use crate::message::RunMessage;
use crate::partition::{OffsetToken, PartitionedQueue};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    /// Backpressure gate (spec §5): caps runs this worker executes at once
    /// across all the partitions it hosts.
    pub max_concurrent_runs: usize,
    /// How long to sleep after an empty poll before trying again.
    pub idle_poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: uuid::Uuid::new_v4().to_string(),
            max_concurrent_runs: 4,
            idle_poll_interval: Duration::from_millis(50),
        }
    }
}

pub struct Worker {
    pool: DbPool,
    queue: Arc<dyn PartitionedQueue>,
    executor: Arc<WorkflowExecutor>,
    config: WorkerConfig,
    permits: Arc<Semaphore>,
}

impl Worker {
    pub fn new(
        pool: DbPool,
        queue: Arc<dyn PartitionedQueue>,
        executor: Arc<WorkflowExecutor>,
        config: WorkerConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_runs));
        Self { pool, queue, executor, config, permits }
    }

    /// Host every partition `0..partition_count` on its own task until
    /// `shutdown` is raised.
    pub async fn run_partitions(self: Arc<Self>, partition_count: u64, shutdown: CancellationToken) {
        let mut tasks = JoinSet::new();
        for partition in 0..partition_count {
            let worker = Arc::clone(&self);
            let shutdown = shutdown.clone();
            tasks.spawn(async move { worker.run_partition(partition, shutdown).await });
        }
        while tasks.join_next().await.is_some() {}
    }

    /// Consume a single partition until `shutdown` is raised.
    pub async fn run_partition(&self, partition: u64, shutdown: CancellationToken) {
        loop {
            if shutdown.is_cancelled() {
                return;
            }

            let Ok(permit) = self.permits.clone().acquire_owned().await else {
                return;
            };

            let Some((message, token)) = self.queue.poll(partition).await else {
                drop(permit);
                tokio::time::sleep(self.config.idle_poll_interval).await;
                continue;
            };

            let run_id = message.run_id;
            if let Err(e) = self.handle_message(message, token, shutdown.clone()).await {
                error!("run {} failed in worker '{}': {}", run_id, self.config.worker_id, e);
            }
            drop(permit);
        }
    }

    async fn handle_message(
        &self,
        message: RunMessage,
        token: OffsetToken,
        shutdown: CancellationToken,
    ) -> Result<(), QueueError> {
        // 1. decode — already a typed `RunMessage` by the time it reaches us.

        // 2. idempotency: a run already terminal was processed by a prior
        // (possibly crashed-and-redelivered) attempt. Commit and move on.
        let row = db::repository::runs::load_run(&self.pool, message.tenant_id, message.run_id)
            .await
            .map_err(|e| match e {
                db::DbError::NotFound => QueueError::RunNotFound(message.run_id),
                other => QueueError::Db(other),
            })?;

        let current_status: RunStatus = row.status.parse().unwrap_or(RunStatus::Pending);
        if current_status.is_terminal() {
            info!("run {} already terminal, skipping re-execution", message.run_id);
            self.queue.commit(token).await;
            return Ok(());
        }

        // 3. CAS claim, fenced by the epoch the dispatcher/previous worker left.
        let claimed = db::repository::runs::claim_run(
            &self.pool,
            message.run_id,
            row.claim_epoch,
            &self.config.worker_id,
        )
        .await?;

        if !claimed {
            warn!("run {} lost the claim race, leaving for its new owner", message.run_id);
            self.queue.commit(token).await;
            return Ok(());
        }
        let claim_epoch = row.claim_epoch + 1;

        // 4. load workflow snapshot
        let workflow_row = db::repository::workflows::get_workflow_version(
            &self.pool,
            message.tenant_id,
            message.workflow_id,
            message.workflow_version,
        )
        .await
        .map_err(|e| match e {
            db::DbError::NotFound => QueueError::WorkflowNotFound {
                workflow_id: message.workflow_id,
                version: message.workflow_version,
            },
            other => QueueError::Db(other),
        })?;
        let workflow: Workflow = serde_json::from_value(workflow_row.definition)
            .map_err(|e| QueueError::DefinitionDecode(e.to_string()))?;

        // A redelivered message may already carry durable node results from
        // a prior (crashed) attempt — load them so `execute` resumes instead
        // of re-invoking adapters that already reached `Success`.
        let prior_results = db::repository::node_results::load_all(&self.pool, message.run_id).await?;
        let node_results = prior_results
            .into_iter()
            .filter_map(|row| row_to_result(row).map(|r| (r.node_id.clone(), r)))
            .collect();

        let mut run = WorkflowRun {
            id: message.run_id,
            workflow_id: workflow.id,
            workflow_version: workflow.version,
            tenant_id: message.tenant_id,
            mode: message.mode,
            input: message.input,
            status: RunStatus::Running,
            started_at: Some(chrono::Utc::now()),
            ended_at: None,
            error_message: None,
            node_results,
        };

        // 5. execute
        let cancellation = shutdown.child_token();
        let result = self.executor.execute(&workflow, &mut run, cancellation).await;

        let (status, error_message) = match &result {
            Ok(outcome) => (outcome.status, None),
            Err(e) => (RunStatus::Failed, Some(e.to_string())),
        };

        // 6. write terminal run, fenced by the epoch we claimed with.
        let wrote = db::repository::runs::finish_run(
            &self.pool,
            message.run_id,
            claim_epoch,
            &status.to_string(),
            error_message.as_deref(),
        )
        .await?;
        if !wrote {
            warn!("run {} terminal write lost the fence, a newer claim took over", message.run_id);
        }

        // 7. commit offset — only after durable persistence above.
        self.queue.commit(token).await;

        result.map(|_| ()).map_err(QueueError::from)
    }
}

/// Decode a persisted `NodeResultRow` back into the engine's domain type,
/// dropping rows whose `status` string doesn't parse — a row this worker
/// itself never wrote (or a schema drift) shouldn't crash redelivery.
fn row_to_result(row: db::models::NodeResultRow) -> Option<NodeExecutionResult> {
    let status: NodeStatus = row.status.parse().ok()?;
    Some(NodeExecutionResult {
        run_id: row.run_id,
        node_id: row.node_id,
        status,
        attempt: row.attempt as u32,
        input: row.input,
        output: row.output,
        error_message: row.error_message,
        started_at: row.started_at,
        ended_at: row.ended_at,
    })
}
