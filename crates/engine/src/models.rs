//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow and a run look
//! like in memory. `Workflow` serialises to/from the JSONB `definition`
//! column; `WorkflowRun`/`NodeExecutionResult` mirror (but are richer
//! than) the `runs`/`node_results` row shapes in the `db` crate.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// TriggerBinding
// ---------------------------------------------------------------------------

/// How a workflow is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerBinding {
    /// Triggered by an incoming HTTP request to `/webhook/{path}`.
    Webhook { path: String },
    /// Triggered manually via the REST API.
    Manual,
    /// Triggered on a cron schedule.
    Cron { expression: String },
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Per-node retry policy (spec §4.3.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub use_exponential_backoff: bool,
    pub use_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            use_exponential_backoff: true,
            use_jitter: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A single step in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within this workflow (referenced by edges).
    pub id: String,
    /// Maps to a registered adapter in the `nodes` crate's `NodeRegistry`.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Arbitrary configuration, may contain unresolved `{{ expr }}`.
    pub config: serde_json::Value,
    pub credential_id: Option<Uuid>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub continue_on_failure: bool,
    pub timeout_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Directed edge from one node to another, optionally gated by a condition
/// expression evaluated against the source node's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub condition: Option<String>,
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A complete, versioned, immutable-per-version workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub version: i32,
    pub name: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub triggers: Vec<TriggerBinding>,
}

impl Workflow {
    /// Convenience constructor for testing.
    pub fn new(
        tenant_id: Uuid,
        name: impl Into<String>,
        triggers: Vec<TriggerBinding>,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            version: 1,
            name: name.into(),
            nodes,
            edges,
            triggers,
        }
    }
}

// ---------------------------------------------------------------------------
// RunMode / RunStatus / NodeStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Manual,
    Scheduled,
    Triggered,
    Replay,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunMode::Manual => "manual",
            RunMode::Scheduled => "scheduled",
            RunMode::Triggered => "triggered",
            RunMode::Replay => "replay",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(RunMode::Manual),
            "scheduled" => Ok(RunMode::Scheduled),
            "triggered" => Ok(RunMode::Triggered),
            "replay" => Ok(RunMode::Replay),
            other => Err(format!("unknown run mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" => Ok(RunStatus::Cancelled),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
    Cancelled,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, NodeStatus::Pending | NodeStatus::Running)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Running => "running",
            NodeStatus::Success => "success",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
            NodeStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for NodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NodeStatus::Pending),
            "running" => Ok(NodeStatus::Running),
            "success" => Ok(NodeStatus::Success),
            "failed" => Ok(NodeStatus::Failed),
            "skipped" => Ok(NodeStatus::Skipped),
            "cancelled" => Ok(NodeStatus::Cancelled),
            other => Err(format!("unknown node status '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeExecutionResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecutionResult {
    pub run_id: Uuid,
    pub node_id: String,
    pub status: NodeStatus,
    pub attempt: u32,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl NodeExecutionResult {
    pub fn duration_ms(&self) -> Option<i64> {
        self.ended_at.map(|end| (end - self.started_at).num_milliseconds())
    }
}

// ---------------------------------------------------------------------------
// WorkflowRun
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_version: i32,
    pub tenant_id: Uuid,
    pub mode: RunMode,
    pub input: serde_json::Value,
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub node_results: HashMap<String, NodeExecutionResult>,
}

impl WorkflowRun {
    pub fn new(workflow: &Workflow, mode: RunMode, input: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id: workflow.id,
            workflow_version: workflow.version,
            tenant_id: workflow.tenant_id,
            mode,
            input,
            status: RunStatus::Pending,
            started_at: None,
            ended_at: None,
            error_message: None,
            node_results: HashMap::new(),
        }
    }
}
