//! Built-in adapters for the control-flow node types named in spec §4.3.6.
//!
//! `if` and `switch` produce a raw branch/case label that an outgoing
//! edge's `condition` expression reads directly — no engine-side
//! special-casing needed. `merge` folds its predecessors' outputs together
//! itself (see `MergeAdapter`). `loop` and `sub_workflow` only produce the
//! raw decision (the item sequence, the target workflow id) — the engine
//! layers the actual per-item sub-scheduling and child-run spawning on top
//! by matching on `node.type`, since only the engine can recursively
//! invoke itself without a circular dependency back into `nodes`.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    traits::{AdapterContext, AdapterOutput},
    ExecutableNode, NodeError,
};

/// `if` / `condition` — `resolved_config.condition` must already be a
/// resolved boolean; output is `{ "branch": "true" | "false" }`.
pub struct IfAdapter;

#[async_trait]
impl ExecutableNode for IfAdapter {
    async fn execute(&self, ctx: &AdapterContext) -> Result<AdapterOutput, NodeError> {
        let start = Instant::now();
        let condition = ctx
            .resolved_config
            .get("condition")
            .and_then(Value::as_bool)
            .ok_or_else(|| NodeError::NonRetryable("if: condition is not a boolean".into()))?;

        let branch = if condition { "true" } else { "false" };
        Ok(AdapterOutput::ok(
            json!({ "branch": branch }),
            start.elapsed().as_millis() as u64,
        ))
    }
}

/// `switch` — `resolved_config.value` selects a case label among
/// `resolved_config.cases` (an array of strings); output is
/// `{ "case": <matched label or "default"> }`.
pub struct SwitchAdapter;

#[async_trait]
impl ExecutableNode for SwitchAdapter {
    async fn execute(&self, ctx: &AdapterContext) -> Result<AdapterOutput, NodeError> {
        let start = Instant::now();
        let value = ctx
            .resolved_config
            .get("value")
            .ok_or_else(|| NodeError::NonRetryable("switch: missing value".into()))?;
        let cases = ctx
            .resolved_config
            .get("cases")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let matched = cases
            .iter()
            .filter_map(Value::as_str)
            .find(|case| Value::String((*case).to_string()) == *value)
            .map(str::to_string)
            .unwrap_or_else(|| "default".to_string());

        Ok(AdapterOutput::ok(
            json!({ "case": matched }),
            start.elapsed().as_millis() as u64,
        ))
    }
}

/// `loop` / `iterator` — `resolved_config.items` is the sequence to drive
/// the loop body over; output echoes the array back so the engine can read
/// it without re-resolving config.
pub struct LoopAdapter;

#[async_trait]
impl ExecutableNode for LoopAdapter {
    async fn execute(&self, ctx: &AdapterContext) -> Result<AdapterOutput, NodeError> {
        let start = Instant::now();
        let items = ctx
            .resolved_config
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| NodeError::NonRetryable("loop: items is not an array".into()))?;

        Ok(AdapterOutput::ok(
            json!({ "items": items }),
            start.elapsed().as_millis() as u64,
        ))
    }
}

/// `merge` — predecessor outputs are pre-merged into `ctx.inputs` (an
/// object keyed by predecessor node id) by the engine before this adapter
/// runs. This adapter combines those per-predecessor objects into one flat
/// object per `resolved_config.strategy` (default `"last_wins"`):
/// `last_wins` and `priority` both apply predecessors in
/// `resolved_config.order` (defaulting to sorted predecessor ids for
/// determinism) — `last_wins` lets a later predecessor overwrite a field
/// set by an earlier one, `priority` keeps whichever value was set first;
/// `merge` recursively deep-merges every predecessor's object instead of
/// overwriting whole values at the top level.
pub struct MergeAdapter;

#[async_trait]
impl ExecutableNode for MergeAdapter {
    async fn execute(&self, ctx: &AdapterContext) -> Result<AdapterOutput, NodeError> {
        let start = Instant::now();
        let strategy = ctx
            .resolved_config
            .get("strategy")
            .and_then(Value::as_str)
            .unwrap_or("last_wins");

        let predecessors = ctx.inputs.as_object().cloned().unwrap_or_default();
        let order: Vec<String> = ctx
            .resolved_config
            .get("order")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_else(|| predecessors.keys().cloned().collect());

        let merged = match strategy {
            "priority" => {
                let mut out = serde_json::Map::new();
                for key in &order {
                    if let Some(Value::Object(obj)) = predecessors.get(key) {
                        for (k, v) in obj {
                            out.entry(k.clone()).or_insert_with(|| v.clone());
                        }
                    }
                }
                Value::Object(out)
            }
            "merge" => {
                let mut out = Value::Object(serde_json::Map::new());
                for key in &order {
                    if let Some(value) = predecessors.get(key) {
                        deep_merge(&mut out, value);
                    }
                }
                out
            }
            _ => {
                let mut out = serde_json::Map::new();
                for key in &order {
                    if let Some(Value::Object(obj)) = predecessors.get(key) {
                        for (k, v) in obj {
                            out.insert(k.clone(), v.clone());
                        }
                    }
                }
                Value::Object(out)
            }
        };

        Ok(AdapterOutput::ok(merged, start.elapsed().as_millis() as u64))
    }
}

fn deep_merge(base: &mut Value, incoming: &Value) {
    match (base, incoming) {
        (Value::Object(base_map), Value::Object(incoming_map)) => {
            for (k, v) in incoming_map {
                match base_map.get_mut(k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        base_map.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (base_slot, incoming_val) => {
            *base_slot = incoming_val.clone();
        }
    }
}

/// `sub_workflow` — resolves the target workflow id and hands the decision
/// back through `output` (`{"workflowId", "input"}`), the same convention
/// `if`/`switch`/`loop` use; the engine reads it to look up the child
/// workflow, spawn a recursive `WorkflowExecutor::execute` call, and fold
/// the child run's output back in. This adapter itself never touches the
/// database or the engine — only the engine can recursively invoke itself.
pub struct SubWorkflowAdapter;

#[async_trait]
impl ExecutableNode for SubWorkflowAdapter {
    async fn execute(&self, ctx: &AdapterContext) -> Result<AdapterOutput, NodeError> {
        let start = Instant::now();
        let workflow_id = ctx
            .resolved_config
            .get("workflowId")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::NonRetryable("sub_workflow: missing workflowId".into()))?;

        Ok(AdapterOutput::ok(
            json!({ "workflowId": workflow_id, "input": ctx.inputs.clone() }),
            start.elapsed().as_millis() as u64,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::RunMetadata;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    fn ctx(resolved_config: Value) -> AdapterContext {
        ctx_with_inputs(resolved_config, json!({}))
    }

    fn ctx_with_inputs(resolved_config: Value, inputs: Value) -> AdapterContext {
        AdapterContext {
            tenant_id: Uuid::nil(),
            resolved_config,
            inputs,
            secret: None,
            run_metadata: RunMetadata {
                run_id: Uuid::nil(),
                workflow_id: Uuid::nil(),
                node_id: "n".into(),
                attempt: 1,
                max_attempts: 1,
                retry_delay_ms: 0,
            },
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn if_adapter_picks_branch() {
        let out = IfAdapter.execute(&ctx(json!({ "condition": true }))).await.unwrap();
        assert_eq!(out.output, json!({ "branch": "true" }));
    }

    #[tokio::test]
    async fn switch_adapter_falls_back_to_default() {
        let out = SwitchAdapter
            .execute(&ctx(json!({ "value": "z", "cases": ["a", "b"] })))
            .await
            .unwrap();
        assert_eq!(out.output, json!({ "case": "default" }));
    }

    #[tokio::test]
    async fn loop_adapter_echoes_items() {
        let out = LoopAdapter
            .execute(&ctx(json!({ "items": [1, 2, 3] })))
            .await
            .unwrap();
        assert_eq!(out.output, json!({ "items": [1, 2, 3] }));
    }

    #[tokio::test]
    async fn merge_last_wins_lets_later_predecessor_overwrite() {
        let inputs = json!({ "a": { "x": 1 }, "b": { "x": 2 } });
        let out = MergeAdapter
            .execute(&ctx_with_inputs(
                json!({ "strategy": "last_wins", "order": ["a", "b"] }),
                inputs,
            ))
            .await
            .unwrap();
        assert_eq!(out.output, json!({ "x": 2 }));
    }

    #[tokio::test]
    async fn merge_priority_keeps_first_predecessor_value() {
        let inputs = json!({ "a": { "x": 1 }, "b": { "x": 2 } });
        let out = MergeAdapter
            .execute(&ctx_with_inputs(
                json!({ "strategy": "priority", "order": ["a", "b"] }),
                inputs,
            ))
            .await
            .unwrap();
        assert_eq!(out.output, json!({ "x": 1 }));
    }

    #[tokio::test]
    async fn merge_deep_merges_nested_objects() {
        let inputs = json!({
            "a": { "user": { "name": "Ada", "role": "admin" } },
            "b": { "user": { "role": "editor", "active": true } },
        });
        let out = MergeAdapter
            .execute(&ctx_with_inputs(
                json!({ "strategy": "merge", "order": ["a", "b"] }),
                inputs,
            ))
            .await
            .unwrap();
        assert_eq!(
            out.output,
            json!({ "user": { "name": "Ada", "role": "editor", "active": true } })
        );
    }

    #[tokio::test]
    async fn sub_workflow_adapter_returns_decision_via_output() {
        let out = SubWorkflowAdapter
            .execute(&ctx_with_inputs(
                json!({ "workflowId": "11111111-1111-1111-1111-111111111111" }),
                json!({ "orderId": 42 }),
            ))
            .await
            .unwrap();
        assert_eq!(
            out.output,
            json!({ "workflowId": "11111111-1111-1111-1111-111111111111", "input": { "orderId": 42 } })
        );
    }
}
