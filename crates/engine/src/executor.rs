//! Workflow execution engine.
//!
//! `WorkflowExecutor` is the central orchestrator (spec §4.3):
//! 1. Validates the DAG and produces a topological plan.
//! 2. Runs the `ready`/`inflight`/`done` scheduler, fanning out up to
//!    `max_parallel` adapter calls at once. `done` is seeded from any node
//!    results the run already carries (spec §4.2 redelivery) so a resumed
//!    run never re-invokes an adapter that already reached `Success`.
//! 3. Assembles each node's input bag, resolves `{{ … }}` config through
//!    `expr`, resolves the credential if any, and dispatches to the
//!    registered adapter with retry/backoff/timeout/cancellation.
//! 4. Persists every `NodeExecutionResult` durably *before* evaluating
//!    successors — the durability boundary of spec §5.
//! 5. Applies control-flow semantics on top of the generic adapter
//!    dispatch: `if`/`switch`/`merge` compose for free with the
//!    edge-condition/predecessor-readiness mechanism above — no
//!    `node.type` match needed; `loop` re-enters a body-scoped
//!    sub-schedule once per item with an isolated `$loop.index`/
//!    `$loop.item` binding, bounded by `maxIterations`; `sub_workflow`
//!    spawns a recursive child `execute` call under a fresh run id,
//!    cascading cancellation parent-to-child only.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;
use serde_json::{json, Value};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use credentials::CredentialResolver;
use db::DbPool;
use expr::{Clock, IdSource, LoopContext, SystemClock, SystemIdSource, VariableBag};
use nodes::{AdapterContext, AdapterOutput, ExecutableNode, NodeError, NodeRegistry, RunMetadata};

use crate::dag::validate_workflow;
use crate::models::{
    Edge, Node, NodeExecutionResult, NodeStatus, RunMode, RunStatus, Workflow, WorkflowRun,
};
use crate::EngineError;

/// Tuning knobs for the executor (spec §5 concurrency model).
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Caps concurrent adapter invocations within a single run.
    pub max_parallel: usize,
    /// How long to wait for in-flight adapters to finish after a
    /// cancellation is raised before marking them `Cancelled` anyway.
    pub drain_timeout: Duration,
    /// Ceiling applied to a `loop` node when its config omits
    /// `maxIterations`.
    pub default_max_iterations: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel: 8,
            drain_timeout: Duration::from_secs(30),
            default_max_iterations: 1_000,
        }
    }
}

/// The final outcome of a run.
#[derive(Debug)]
pub struct ExecutionResult {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// Output of whichever node(s) had no successor, merged by node id.
    pub output: Value,
}

/// Stateless orchestrator; one instance is shared across all runs a worker
/// process handles. All run-scoped state lives in `WorkflowRun` and the
/// scheduler's local variables.
pub struct WorkflowExecutor {
    pool: DbPool,
    registry: Arc<NodeRegistry>,
    credential_resolver: Arc<dyn CredentialResolver>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
    config: ExecutorConfig,
}

impl WorkflowExecutor {
    pub fn new(
        pool: DbPool,
        registry: Arc<NodeRegistry>,
        credential_resolver: Arc<dyn CredentialResolver>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            pool,
            registry,
            credential_resolver,
            clock: Arc::new(SystemClock),
            ids: Arc::new(SystemIdSource),
            config,
        }
    }

    /// Execute `workflow` for the given `run`, honoring `cancellation`.
    ///
    /// `run.node_results` seeds `done` before the scheduler starts: a run
    /// delivered fresh carries none and every root node becomes ready, but a
    /// run resumed after a crash (spec §4.2) carries whatever the previous
    /// attempt durably persisted, and those nodes already at `Success` are
    /// never re-invoked.
    #[instrument(skip(self, workflow, run, cancellation), fields(run_id = %run.id))]
    pub async fn execute(
        &self,
        workflow: &Workflow,
        run: &mut WorkflowRun,
        cancellation: CancellationToken,
    ) -> Result<ExecutionResult, EngineError> {
        let plan = validate_workflow(workflow, &self.registry, self.credential_resolver.as_ref()).await?;
        info!("plan validated, {} nodes in order: {:?}", plan.sorted.len(), plan.sorted);

        let node_map: HashMap<&str, &Node> =
            workflow.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        // Successors per node, derived from the edge list once.
        let mut successors: HashMap<&str, Vec<&Edge>> = HashMap::new();
        for edge in &workflow.edges {
            successors.entry(edge.from.as_str()).or_default().push(edge);
        }

        let mut done: HashMap<String, NodeExecutionResult> = run
            .node_results
            .iter()
            .filter(|(id, r)| node_map.contains_key(id.as_str()) && r.status == NodeStatus::Success)
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect();
        let mut skipped: HashSet<String> = HashSet::new();
        let mut ready: Vec<String> =
            seed_ready(&plan, workflow, &done, &skipped, &self.clock, &self.ids)?;
        let mut inflight: JoinSet<(String, Result<NodeExecutionResult, EngineError>)> = JoinSet::new();
        let mut run_failed = false;

        while !ready.is_empty() || !inflight.is_empty() {
            if cancellation.is_cancelled() {
                break;
            }

            while !ready.is_empty() && inflight.len() < self.config.max_parallel {
                let node_id = ready.remove(0);
                let node = node_map[node_id.as_str()];
                let predecessor_outputs = self.gather_predecessor_outputs(&plan, &node_id, &done);
                let input_bag = merge_input(&run.input, &predecessor_outputs);
                let attempt = done.get(&node_id).map(|r| r.attempt + 1).unwrap_or(1);

                let node = node.clone();
                let run_id = run.id;
                let tenant_id = run.tenant_id;
                let workflow_id = workflow.id;
                let registry = Arc::clone(&self.registry);
                let resolver = Arc::clone(&self.credential_resolver);
                let clock = Arc::clone(&self.clock);
                let ids = Arc::clone(&self.ids);
                let cancel = cancellation.clone();

                inflight.spawn(async move {
                    let result = execute_node(
                        &node,
                        run_id,
                        workflow_id,
                        tenant_id,
                        attempt,
                        input_bag,
                        &registry,
                        resolver.as_ref(),
                        clock.as_ref(),
                        ids.as_ref(),
                        None,
                        &cancel,
                    )
                    .await;
                    (node.id.clone(), result)
                });
            }

            let Some(joined) = inflight.join_next().await else {
                continue;
            };
            let (node_id, outcome) = joined.map_err(|e| EngineError::AdapterError {
                node_id: "unknown".into(),
                message: format!("task join error: {e}"),
                retryable: false,
            })?;

            match outcome {
                Ok(mut result) => {
                    let node_def = node_map[node_id.as_str()];

                    // Control-flow post-processing: `loop`/`sub_workflow`
                    // adapters only emit a raw decision (the item sequence,
                    // the target workflow id) through `result.output`; the
                    // engine is the only layer that can recursively
                    // schedule, so it does the rest here before the result
                    // is persisted as this node's terminal state.
                    if result.status == NodeStatus::Success {
                        match node_def.node_type.as_str() {
                            "loop" => {
                                let items = result
                                    .output
                                    .as_ref()
                                    .and_then(|o| o.get("items"))
                                    .and_then(Value::as_array)
                                    .cloned()
                                    .unwrap_or_default();
                                match self.run_loop(workflow, &plan, run, node_def, &items, &cancellation).await {
                                    Ok(iterations) => {
                                        result.output = Some(json!({ "iterations": iterations }));
                                    }
                                    Err(e) => {
                                        result.status = NodeStatus::Failed;
                                        result.output = None;
                                        result.error_message = Some(e.to_string());
                                    }
                                }
                            }
                            "sub_workflow" => {
                                let workflow_id = result
                                    .output
                                    .as_ref()
                                    .and_then(|o| o.get("workflowId"))
                                    .and_then(Value::as_str)
                                    .map(str::to_string);
                                let child_input = result
                                    .output
                                    .as_ref()
                                    .and_then(|o| o.get("input"))
                                    .cloned()
                                    .unwrap_or(Value::Null);

                                match workflow_id {
                                    Some(workflow_id) => {
                                        match self
                                            .execute_sub_workflow(run, &workflow_id, child_input, &cancellation)
                                            .await
                                        {
                                            Ok(output) => {
                                                result.output = Some(json!({ "subWorkflow": output }));
                                            }
                                            Err(e) => {
                                                result.status = NodeStatus::Failed;
                                                result.output = None;
                                                result.error_message = Some(e.to_string());
                                            }
                                        }
                                    }
                                    None => {
                                        result.status = NodeStatus::Failed;
                                        result.output = None;
                                        result.error_message =
                                            Some("sub_workflow: missing workflowId in adapter output".into());
                                    }
                                }
                            }
                            _ => {}
                        }
                    }

                    let succeeded = result.status == NodeStatus::Success;
                    // Durability boundary: persist before evaluating successors.
                    db::repository::node_results::upsert_node_result(
                        &self.pool,
                        result.run_id,
                        &result.node_id,
                        &result.status.to_string(),
                        result.attempt as i32,
                        result.input.clone(),
                        result.output.clone(),
                        result.error_message.as_deref(),
                    )
                    .await?;

                    done.insert(node_id.clone(), result.clone());

                    if succeeded {
                        for edge in successors.get(node_id.as_str()).cloned().unwrap_or_default() {
                            if edge_condition_holds(edge, &result.output, &self.clock, &self.ids, None)?
                                && all_predecessors_terminal(&plan.predecessors, &edge.to, &done, &skipped)
                                && !ready.contains(&edge.to)
                                && !done.contains_key(&edge.to)
                            {
                                ready.push(edge.to.clone());
                            }
                        }
                    } else if node_def.continue_on_failure {
                        warn!("node '{}' failed but continue_on_failure is set", node_id);
                        propagate_skip(&node_id, &successors, &plan.predecessors, &done, &mut skipped);
                    } else {
                        error!("node '{}' failed, aborting run", node_id);
                        run_failed = true;
                        break;
                    }
                }
                Err(e) => {
                    error!("node '{}' execution error: {}", node_id, e);
                    run_failed = true;
                    break;
                }
            }
        }

        if run_failed || cancellation.is_cancelled() {
            let _ = tokio::time::timeout(self.config.drain_timeout, drain(&mut inflight)).await;
        }

        let final_status = if cancellation.is_cancelled() {
            RunStatus::Cancelled
        } else if run_failed {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };

        run.status = final_status;
        run.ended_at = Some(Utc::now());
        run.node_results = done.clone();

        let output = aggregate_sink_outputs(workflow, &done);

        Ok(ExecutionResult {
            run_id: run.id,
            status: final_status,
            output,
        })
    }

    fn gather_predecessor_outputs(
        &self,
        plan: &crate::dag::ExecutionPlan,
        node_id: &str,
        done: &HashMap<String, NodeExecutionResult>,
    ) -> HashMap<String, Value> {
        plan.predecessors
            .get(node_id)
            .map(|preds| {
                preds
                    .iter()
                    .filter_map(|p| done.get(p).and_then(|r| r.output.clone()).map(|o| (p.clone(), o)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Run a `loop` node's body (spec §4.3.6: Loop/Iterator) once per item
    /// in `items`, sequentially, each iteration getting an isolated
    /// `$loop.index`/`$loop.item` binding and its own `done`/`skipped`
    /// state. The body is the set of node ids named in the loop node's
    /// `config.bodyNodeIds`; body-internal order follows the outer plan's
    /// topological order restricted to that set, which stays a valid order
    /// for the subgraph. Each body node's result is persisted under the
    /// composite key `"{node_id}#{index}"` so iterations never collide in
    /// the `(run_id, node_id)`-keyed `node_results` table.
    async fn run_loop(
        &self,
        workflow: &Workflow,
        plan: &crate::dag::ExecutionPlan,
        run: &WorkflowRun,
        loop_node: &Node,
        items: &[Value],
        cancellation: &CancellationToken,
    ) -> Result<Vec<Value>, EngineError> {
        let max_iterations = loop_node
            .config
            .get("maxIterations")
            .and_then(Value::as_u64)
            .unwrap_or(self.config.default_max_iterations);

        if items.len() as u64 > max_iterations {
            return Err(EngineError::AdapterError {
                node_id: loop_node.id.clone(),
                message: format!(
                    "loop produced {} items, exceeding maxIterations {}",
                    items.len(),
                    max_iterations
                ),
                retryable: false,
            });
        }

        let body_id_set: HashSet<String> = loop_node
            .config
            .get("bodyNodeIds")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();

        let body_node_map: HashMap<&str, &Node> = workflow
            .nodes
            .iter()
            .filter(|n| body_id_set.contains(&n.id))
            .map(|n| (n.id.as_str(), n))
            .collect();

        let mut body_predecessors: HashMap<String, Vec<String>> =
            body_id_set.iter().map(|id| (id.clone(), Vec::new())).collect();
        let body_edges: Vec<&Edge> = workflow
            .edges
            .iter()
            .filter(|e| body_id_set.contains(&e.from) && body_id_set.contains(&e.to))
            .collect();
        for edge in &body_edges {
            body_predecessors.entry(edge.to.clone()).or_default().push(edge.from.clone());
        }
        let body_has_outgoing: HashSet<&str> = body_edges.iter().map(|e| e.from.as_str()).collect();

        let body_order: Vec<String> = plan
            .sorted
            .iter()
            .filter(|id| body_id_set.contains(*id))
            .cloned()
            .collect();

        let mut iteration_outputs = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            if cancellation.is_cancelled() {
                break;
            }
            let loop_ctx = LoopContext { index: index as u64, item: item.clone() };

            let mut body_done: HashMap<String, NodeExecutionResult> = HashMap::new();
            let mut body_skipped: HashSet<String> = HashSet::new();

            for node_id in &body_order {
                let preds = body_predecessors.get(node_id).cloned().unwrap_or_default();
                let all_terminal =
                    preds.iter().all(|p| body_done.contains_key(p) || body_skipped.contains(p));
                let any_skipped = preds.iter().any(|p| body_skipped.contains(p));

                if !all_terminal || any_skipped {
                    body_skipped.insert(node_id.clone());
                    continue;
                }

                let mut condition_failed = false;
                for edge in body_edges.iter().filter(|e| &e.to == node_id) {
                    if let Some(result) = body_done.get(&edge.from) {
                        if !edge_condition_holds(edge, &result.output, &self.clock, &self.ids, Some(&loop_ctx))? {
                            condition_failed = true;
                            break;
                        }
                    }
                }
                if condition_failed {
                    body_skipped.insert(node_id.clone());
                    continue;
                }

                let node = body_node_map[node_id.as_str()];
                let predecessor_outputs: HashMap<String, Value> = preds
                    .iter()
                    .filter_map(|p| body_done.get(p).and_then(|r| r.output.clone()).map(|o| (p.clone(), o)))
                    .collect();
                let input_bag = merge_input(&run.input, &predecessor_outputs);

                let result = execute_node(
                    node,
                    run.id,
                    workflow.id,
                    run.tenant_id,
                    1,
                    input_bag,
                    &self.registry,
                    self.credential_resolver.as_ref(),
                    self.clock.as_ref(),
                    self.ids.as_ref(),
                    Some(loop_ctx.clone()),
                    cancellation,
                )
                .await?;

                let composite_id = format!("{node_id}#{index}");
                db::repository::node_results::upsert_node_result(
                    &self.pool,
                    run.id,
                    &composite_id,
                    &result.status.to_string(),
                    result.attempt as i32,
                    result.input.clone(),
                    result.output.clone(),
                    result.error_message.as_deref(),
                )
                .await?;

                let succeeded = result.status == NodeStatus::Success;
                body_done.insert(node_id.clone(), result);

                if !succeeded {
                    if node.continue_on_failure {
                        propagate_skip(node_id, &body_successors(&body_edges), &body_predecessors, &body_done, &mut body_skipped);
                    } else {
                        return Err(EngineError::AdapterError {
                            node_id: composite_id,
                            message: format!("loop body node '{node_id}' failed on iteration {index}"),
                            retryable: false,
                        });
                    }
                }
            }

            let mut leaf_outputs = serde_json::Map::new();
            for node_id in &body_order {
                if !body_has_outgoing.contains(node_id.as_str()) {
                    if let Some(result) = body_done.get(node_id) {
                        leaf_outputs.insert(node_id.clone(), result.output.clone().unwrap_or(Value::Null));
                    }
                }
            }
            let iteration_output = if leaf_outputs.len() == 1 {
                leaf_outputs.into_values().next().unwrap()
            } else {
                Value::Object(leaf_outputs)
            };
            iteration_outputs.push(iteration_output);
        }

        Ok(iteration_outputs)
    }

    /// Execute the `sub_workflow` node type (spec §4.3.6): look up the
    /// target workflow's latest version, run it as its own durable run
    /// under a fresh run id, and return its output. Cancellation cascades
    /// parent-to-child only, via `CancellationToken::child_token` — the
    /// child can never cancel its parent.
    async fn execute_sub_workflow(
        &self,
        parent_run: &WorkflowRun,
        workflow_id: &str,
        input: Value,
        cancellation: &CancellationToken,
    ) -> Result<Value, EngineError> {
        let workflow_id = Uuid::parse_str(workflow_id).map_err(|e| EngineError::AdapterError {
            node_id: "sub_workflow".into(),
            message: format!("invalid workflowId '{workflow_id}': {e}"),
            retryable: false,
        })?;

        let workflow_row =
            db::repository::workflows::get_latest_workflow(&self.pool, parent_run.tenant_id, workflow_id)
                .await?;
        let child_workflow: Workflow =
            serde_json::from_value(workflow_row.definition).map_err(|e| EngineError::AdapterError {
                node_id: "sub_workflow".into(),
                message: format!("child workflow definition decode failed: {e}"),
                retryable: false,
            })?;

        let run_row = db::repository::runs::create_run(
            &self.pool,
            parent_run.tenant_id,
            child_workflow.id,
            child_workflow.version,
            &RunMode::Triggered.to_string(),
            input.clone(),
        )
        .await?;

        let mut child_run = WorkflowRun {
            id: run_row.id,
            workflow_id: child_workflow.id,
            workflow_version: child_workflow.version,
            tenant_id: parent_run.tenant_id,
            mode: RunMode::Triggered,
            input,
            status: RunStatus::Running,
            started_at: Some(Utc::now()),
            ended_at: None,
            error_message: None,
            node_results: HashMap::new(),
        };

        let child_cancellation = cancellation.child_token();
        let result = Box::pin(self.execute(&child_workflow, &mut child_run, child_cancellation)).await;

        let (status, error_message, output) = match &result {
            Ok(outcome) => (outcome.status, None, Some(outcome.output.clone())),
            Err(e) => (RunStatus::Failed, Some(e.to_string()), None),
        };

        db::repository::runs::finish_run(&self.pool, run_row.id, 0, &status.to_string(), error_message.as_deref())
            .await?;

        match (status, output) {
            (RunStatus::Completed, Some(output)) => Ok(output),
            _ => Err(EngineError::AdapterError {
                node_id: "sub_workflow".into(),
                message: error_message.unwrap_or_else(|| format!("child run {} did not complete", run_row.id)),
                retryable: false,
            }),
        }
    }
}

fn body_successors<'a>(body_edges: &[&'a Edge]) -> HashMap<&'a str, Vec<&'a Edge>> {
    let mut successors: HashMap<&str, Vec<&Edge>> = HashMap::new();
    for edge in body_edges {
        successors.entry(edge.from.as_str()).or_default().push(edge);
    }
    successors
}

/// Compute the initial `ready` set for a (possibly resumed) run: every node
/// whose predecessors are all terminal (`done` or `skipped`) and whose
/// incoming edge conditions — for whichever predecessors already completed
/// — hold. With `done`/`skipped` both empty this reduces to "every
/// predecessor-less node", the fresh-run case; with `done` seeded from a
/// prior attempt's durable results it correctly resumes mid-graph instead.
fn seed_ready(
    plan: &crate::dag::ExecutionPlan,
    workflow: &Workflow,
    done: &HashMap<String, NodeExecutionResult>,
    skipped: &HashSet<String>,
    clock: &Arc<dyn Clock>,
    ids: &Arc<dyn IdSource>,
) -> Result<Vec<String>, EngineError> {
    let mut incoming: HashMap<&str, Vec<&Edge>> = HashMap::new();
    for edge in &workflow.edges {
        incoming.entry(edge.to.as_str()).or_default().push(edge);
    }

    let mut ready = Vec::new();
    for node_id in &plan.sorted {
        if done.contains_key(node_id) || skipped.contains(node_id) {
            continue;
        }
        if !all_predecessors_terminal(&plan.predecessors, node_id, done, skipped) {
            continue;
        }

        let mut eligible = true;
        for edge in incoming.get(node_id.as_str()).cloned().unwrap_or_default() {
            if let Some(result) = done.get(&edge.from) {
                if !edge_condition_holds(edge, &result.output, clock, ids, None)? {
                    eligible = false;
                    break;
                }
            }
        }
        if eligible {
            ready.push(node_id.clone());
        }
    }
    Ok(ready)
}

fn merge_input(run_input: &Value, predecessor_outputs: &HashMap<String, Value>) -> Value {
    let mut merged = run_input.clone();
    if let Some(obj) = merged.as_object_mut() {
        for (k, v) in predecessor_outputs {
            obj.insert(k.clone(), v.clone());
        }
    } else {
        let mut obj = serde_json::Map::new();
        obj.insert("input".to_string(), run_input.clone());
        for (k, v) in predecessor_outputs {
            obj.insert(k.clone(), v.clone());
        }
        merged = Value::Object(obj);
    }
    merged
}

fn all_predecessors_terminal(
    predecessors: &HashMap<String, Vec<String>>,
    node_id: &str,
    done: &HashMap<String, NodeExecutionResult>,
    skipped: &HashSet<String>,
) -> bool {
    predecessors
        .get(node_id)
        .map(|preds| preds.iter().all(|p| done.contains_key(p) || skipped.contains(p)))
        .unwrap_or(true)
}

fn propagate_skip(
    failed_node: &str,
    successors: &HashMap<&str, Vec<&Edge>>,
    predecessors: &HashMap<String, Vec<String>>,
    done: &HashMap<String, NodeExecutionResult>,
    skipped: &mut HashSet<String>,
) {
    let mut frontier = vec![failed_node.to_string()];
    while let Some(node_id) = frontier.pop() {
        for edge in successors.get(node_id.as_str()).cloned().unwrap_or_default() {
            let reachable_another_way = predecessors
                .get(&edge.to)
                .map(|preds| preds.iter().any(|p| p != &node_id && (done.contains_key(p) || !skipped.contains(p))))
                .unwrap_or(false);
            if !reachable_another_way && !skipped.contains(&edge.to) && !done.contains_key(&edge.to) {
                skipped.insert(edge.to.clone());
                frontier.push(edge.to.clone());
            }
        }
    }
}

fn edge_condition_holds(
    edge: &Edge,
    source_output: &Option<Value>,
    clock: &Arc<dyn Clock>,
    ids: &Arc<dyn IdSource>,
    loop_ctx: Option<&LoopContext>,
) -> Result<bool, EngineError> {
    let Some(condition) = &edge.condition else {
        return Ok(true);
    };
    let mut bag = VariableBag::new(source_output.clone().unwrap_or(Value::Null));
    if let Some(loop_ctx) = loop_ctx {
        bag = bag.with_loop(loop_ctx.clone());
    }
    let value = expr::evaluate(condition, &bag, clock.as_ref(), ids.as_ref()).map_err(|e| {
        EngineError::InputAssemblyError {
            node_id: edge.to.clone(),
            message: format!("edge condition error: {e}"),
        }
    })?;
    Ok(!value.is_undefined() && value.truthy())
}

fn aggregate_sink_outputs(workflow: &Workflow, done: &HashMap<String, NodeExecutionResult>) -> Value {
    let has_outgoing: HashSet<&str> = workflow.edges.iter().map(|e| e.from.as_str()).collect();
    let mut out = serde_json::Map::new();
    for node in &workflow.nodes {
        if !has_outgoing.contains(node.id.as_str()) {
            if let Some(result) = done.get(&node.id) {
                out.insert(node.id.clone(), result.output.clone().unwrap_or(Value::Null));
            }
        }
    }
    Value::Object(out)
}

async fn drain(inflight: &mut JoinSet<(String, Result<NodeExecutionResult, EngineError>)>) {
    while inflight.join_next().await.is_some() {}
}

#[allow(clippy::too_many_arguments)]
async fn execute_node(
    node: &Node,
    run_id: Uuid,
    workflow_id: Uuid,
    tenant_id: Uuid,
    first_attempt: u32,
    input_bag: Value,
    registry: &NodeRegistry,
    credential_resolver: &dyn CredentialResolver,
    clock: &dyn Clock,
    ids: &dyn IdSource,
    loop_ctx: Option<LoopContext>,
    cancellation: &CancellationToken,
) -> Result<NodeExecutionResult, EngineError> {
    let started_at = Utc::now();
    let adapter = registry.lookup(&node.node_type).ok_or_else(|| EngineError::UnregisteredAdapter {
        node_id: node.id.clone(),
        node_type: node.node_type.clone(),
    })?;

    let resolved_config = resolve_node_config(node, &input_bag, clock, ids, loop_ctx.as_ref())?;

    let secret = match node.credential_id {
        Some(credential_id) => Some(
            credential_resolver
                .get_decrypted_secret(credential_id, tenant_id)
                .await?,
        ),
        None => None,
    };

    let mut attempt = first_attempt;
    loop {
        if cancellation.is_cancelled() {
            return Ok(terminal_result(
                run_id,
                node,
                attempt,
                input_bag,
                NodeStatus::Cancelled,
                None,
                Some("cancelled before dispatch".into()),
                started_at,
            ));
        }

        let run_metadata = RunMetadata {
            run_id,
            workflow_id,
            node_id: node.id.clone(),
            attempt,
            max_attempts: node.retry.max_attempts,
            retry_delay_ms: retry_delay_ms(&node.retry, attempt),
        };
        let ctx = AdapterContext {
            tenant_id,
            resolved_config: resolved_config.clone(),
            inputs: input_bag.clone(),
            secret: secret.clone(),
            run_metadata,
            cancellation: cancellation.clone(),
        };

        let call = adapter.execute(&ctx);
        let attempt_started = Instant::now();
        let outcome = match node.timeout_ms {
            Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), call).await {
                Ok(inner) => inner,
                Err(_) => {
                    let elapsed_ms = attempt_started.elapsed().as_millis() as u64;
                    if attempt >= node.retry.max_attempts {
                        return Ok(terminal_result(
                            run_id,
                            node,
                            attempt,
                            input_bag,
                            NodeStatus::Failed,
                            None,
                            Some(format!("timed out after {elapsed_ms}ms")),
                            started_at,
                        ));
                    }
                    attempt += 1;
                    sleep_with_cancellation(retry_delay(&node.retry, attempt), cancellation).await;
                    continue;
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(AdapterOutput { success: true, output, .. }) => {
                return Ok(terminal_result(
                    run_id, node, attempt, input_bag, NodeStatus::Success, Some(output), None, started_at,
                ));
            }
            Ok(AdapterOutput { success: false, error_message, retryable, .. }) => {
                let retryable = retryable.unwrap_or(false);
                if !retryable || attempt >= node.retry.max_attempts {
                    return Ok(terminal_result(
                        run_id, node, attempt, input_bag, NodeStatus::Failed, None, error_message, started_at,
                    ));
                }
                attempt += 1;
                sleep_with_cancellation(retry_delay(&node.retry, attempt), cancellation).await;
            }
            Err(NodeError::NonRetryable(msg)) => {
                return Ok(terminal_result(
                    run_id, node, attempt, input_bag, NodeStatus::Failed, None, Some(msg), started_at,
                ));
            }
            Err(NodeError::Retryable(msg)) => {
                if attempt >= node.retry.max_attempts {
                    return Ok(terminal_result(
                        run_id, node, attempt, input_bag, NodeStatus::Failed, None, Some(msg), started_at,
                    ));
                }
                attempt += 1;
                sleep_with_cancellation(retry_delay(&node.retry, attempt), cancellation).await;
            }
        }
    }
}

fn resolve_node_config(
    node: &Node,
    input_bag: &Value,
    clock: &dyn Clock,
    ids: &dyn IdSource,
    loop_ctx: Option<&LoopContext>,
) -> Result<Value, EngineError> {
    let mut bag = VariableBag::new(input_bag.clone());
    if let Some(loop_ctx) = loop_ctx {
        bag = bag.with_loop(loop_ctx.clone());
    }
    expr::resolve_config(&node.config, &bag, clock, ids).map_err(|e| EngineError::InputAssemblyError {
        node_id: node.id.clone(),
        message: e.to_string(),
    })
}

#[allow(clippy::too_many_arguments)]
fn terminal_result(
    run_id: Uuid,
    node: &Node,
    attempt: u32,
    input: Value,
    status: NodeStatus,
    output: Option<Value>,
    error_message: Option<String>,
    started_at: chrono::DateTime<Utc>,
) -> NodeExecutionResult {
    NodeExecutionResult {
        run_id,
        node_id: node.id.clone(),
        status,
        attempt,
        input,
        output,
        error_message,
        started_at,
        ended_at: Some(Utc::now()),
    }
}

/// Attempt 1 has no delay (spec §4.3.4); attempt `k` follows the
/// exponential-or-fixed schedule with optional jitter.
fn retry_delay(policy: &crate::models::RetryPolicy, next_attempt: u32) -> Duration {
    if next_attempt <= 1 {
        return Duration::ZERO;
    }
    let k = next_attempt - 1;
    let base_ms = if policy.use_exponential_backoff {
        let scaled = policy.initial_delay_ms as f64 * policy.multiplier.powi(k as i32 - 1);
        scaled.min(policy.max_delay_ms as f64) as u64
    } else {
        policy.initial_delay_ms
    };
    let jittered_ms = if policy.use_jitter {
        let factor = rand::thread_rng().gen_range(0.5..1.5);
        (base_ms as f64 * factor) as u64
    } else {
        base_ms
    };
    Duration::from_millis(jittered_ms)
}

fn retry_delay_ms(policy: &crate::models::RetryPolicy, attempt: u32) -> u64 {
    retry_delay(policy, attempt + 1).as_millis() as u64
}

async fn sleep_with_cancellation(delay: Duration, cancellation: &CancellationToken) {
    if delay.is_zero() {
        return;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = cancellation.cancelled() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RetryPolicy, TriggerBinding};
    use async_trait::async_trait;
    use credentials::{CredentialError, CredentialMetadata};
    use nodes::mock::MockAdapter;

    struct NoCredentials;

    #[async_trait]
    impl CredentialResolver for NoCredentials {
        async fn get_decrypted_secret(&self, _: Uuid, _: Uuid) -> Result<String, CredentialError> {
            Ok("unused".into())
        }
        async fn validate(&self, _: Uuid, _: Uuid) -> Result<(), CredentialError> {
            Ok(())
        }
        async fn get_metadata(&self, credential_id: Uuid, tenant_id: Uuid) -> Result<CredentialMetadata, CredentialError> {
            Ok(CredentialMetadata { credential_id, tenant_id, key: "k".into(), accessible: true })
        }
        async fn refresh_if_needed(&self, credential_id: Uuid, tenant_id: Uuid) -> Result<CredentialMetadata, CredentialError> {
            self.get_metadata(credential_id, tenant_id).await
        }
    }

    fn node(id: &str, node_type: &str) -> Node {
        Node {
            id: id.into(),
            node_type: node_type.into(),
            config: json!({}),
            credential_id: None,
            retry: RetryPolicy { max_attempts: 1, ..RetryPolicy::default() },
            continue_on_failure: false,
            timeout_ms: None,
        }
    }

    #[test]
    fn retry_delay_has_no_wait_on_first_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(retry_delay(&policy, 1), Duration::ZERO);
    }

    #[test]
    fn retry_delay_grows_exponentially_without_jitter() {
        let policy = RetryPolicy {
            use_jitter: false,
            initial_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 10_000,
            ..RetryPolicy::default()
        };
        assert_eq!(retry_delay(&policy, 2), Duration::from_millis(100));
        assert_eq!(retry_delay(&policy, 3), Duration::from_millis(200));
        assert_eq!(retry_delay(&policy, 4), Duration::from_millis(400));
    }

    #[test]
    fn merge_input_combines_run_input_and_predecessors() {
        let merged = merge_input(&json!({ "a": 1 }), &HashMap::from([("p".to_string(), json!(2))]));
        assert_eq!(merged, json!({ "a": 1, "p": 2 }));
    }

    fn edge(from: &str, to: &str, condition: Option<&str>) -> Edge {
        Edge { from: from.into(), to: to.into(), condition: condition.map(str::to_string) }
    }

    fn success(node_id: &str, output: Value) -> NodeExecutionResult {
        NodeExecutionResult {
            run_id: Uuid::nil(),
            node_id: node_id.into(),
            status: NodeStatus::Success,
            attempt: 1,
            input: json!({}),
            output: Some(output),
            error_message: None,
            started_at: Utc::now(),
            ended_at: Some(Utc::now()),
        }
    }

    #[test]
    fn edge_condition_holds_reads_loop_namespace() {
        let loop_ctx = LoopContext { index: 2, item: json!("c") };
        let e = edge("a", "b", Some("$loop.index == 2"));
        assert!(edge_condition_holds(&e, &None, &(Arc::new(SystemClock) as Arc<dyn Clock>), &(Arc::new(SystemIdSource) as Arc<dyn IdSource>), Some(&loop_ctx)).unwrap());

        let e = edge("a", "b", Some("$loop.item == \"z\""));
        assert!(!edge_condition_holds(&e, &None, &(Arc::new(SystemClock) as Arc<dyn Clock>), &(Arc::new(SystemIdSource) as Arc<dyn IdSource>), Some(&loop_ctx)).unwrap());
    }

    #[test]
    fn seed_ready_picks_root_nodes_on_a_fresh_run() {
        let workflow = Workflow {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            version: 1,
            name: "w".into(),
            nodes: vec![node("a", "mock"), node("b", "mock")],
            edges: vec![edge("a", "b", None)],
            triggers: vec![TriggerBinding::Manual],
        };
        let plan = crate::dag::ExecutionPlan {
            sorted: vec!["a".into(), "b".into()],
            predecessors: HashMap::from([("a".to_string(), vec![]), ("b".to_string(), vec!["a".to_string()])]),
        };
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ids: Arc<dyn IdSource> = Arc::new(SystemIdSource);
        let ready = seed_ready(&plan, &workflow, &HashMap::new(), &HashSet::new(), &clock, &ids).unwrap();
        assert_eq!(ready, vec!["a".to_string()]);
    }

    #[test]
    fn seed_ready_resumes_past_a_node_already_durably_succeeded() {
        let workflow = Workflow {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            version: 1,
            name: "w".into(),
            nodes: vec![node("a", "mock"), node("b", "mock"), node("c", "mock")],
            edges: vec![edge("a", "b", None), edge("b", "c", None)],
            triggers: vec![TriggerBinding::Manual],
        };
        let plan = crate::dag::ExecutionPlan {
            sorted: vec!["a".into(), "b".into(), "c".into()],
            predecessors: HashMap::from([
                ("a".to_string(), vec![]),
                ("b".to_string(), vec!["a".to_string()]),
                ("c".to_string(), vec!["b".to_string()]),
            ]),
        };
        let done = HashMap::from([("a".to_string(), success("a", json!({})))]);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ids: Arc<dyn IdSource> = Arc::new(SystemIdSource);
        let ready = seed_ready(&plan, &workflow, &done, &HashSet::new(), &clock, &ids).unwrap();
        // 'a' already succeeded durably and must not be re-enqueued; 'b' is
        // the new frontier. 'c' stays blocked on 'b'.
        assert_eq!(ready, vec!["b".to_string()]);
    }

    #[test]
    fn seed_ready_respects_a_false_edge_condition_on_resume() {
        let workflow = Workflow {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            version: 1,
            name: "w".into(),
            nodes: vec![node("a", "mock"), node("b", "mock")],
            edges: vec![edge("a", "b", Some("$json.go == true"))],
            triggers: vec![TriggerBinding::Manual],
        };
        let plan = crate::dag::ExecutionPlan {
            sorted: vec!["a".into(), "b".into()],
            predecessors: HashMap::from([("a".to_string(), vec![]), ("b".to_string(), vec!["a".to_string()])]),
        };
        let done = HashMap::from([("a".to_string(), success("a", json!({ "go": false })))]);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ids: Arc<dyn IdSource> = Arc::new(SystemIdSource);
        let ready = seed_ready(&plan, &workflow, &done, &HashSet::new(), &clock, &ids).unwrap();
        assert!(ready.is_empty());
    }
}
