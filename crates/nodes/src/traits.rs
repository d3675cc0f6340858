//! The `ExecutableNode` trait — the contract every adapter must fulfil.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::NodeError;

/// Run-scoped facts an adapter may need without reaching into the engine.
#[derive(Debug, Clone)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub workflow_id: Uuid,
    pub node_id: String,
    pub attempt: u32,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

/// Everything an adapter needs for one `execute` call.
///
/// Built fresh per attempt by the engine (§4.3.3); `resolved_config` has
/// already had every `{{ … }}` placeholder substituted, `inputs` is the
/// merged predecessor-output bag, and `secret` is the one decrypted
/// credential value allowlisted for this node, live only for this call.
#[derive(Debug, Clone)]
pub struct AdapterContext {
    pub tenant_id: Uuid,
    pub resolved_config: Value,
    pub inputs: Value,
    pub secret: Option<String>,
    pub run_metadata: RunMetadata,
    pub cancellation: CancellationToken,
}

/// The structured result every adapter call produces, regardless of
/// success or failure — mirrors the external adapter-contract shape
/// (spec §6) so the engine never has to special-case a transport.
#[derive(Debug, Clone)]
pub struct AdapterOutput {
    pub success: bool,
    pub output: Value,
    pub error_message: Option<String>,
    pub duration_ms: u64,
    pub metadata: Value,
    /// Only meaningful when `success` is false; `None` defers to the
    /// `NodeError` variant the adapter raised instead.
    pub retryable: Option<bool>,
}

impl AdapterOutput {
    pub fn ok(output: Value, duration_ms: u64) -> Self {
        Self {
            success: true,
            output,
            error_message: None,
            duration_ms,
            metadata: Value::Null,
            retryable: None,
        }
    }

    pub fn failed(error_message: impl Into<String>, retryable: bool, duration_ms: u64) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error_message: Some(error_message.into()),
            duration_ms,
            metadata: Value::Null,
            retryable: Some(retryable),
        }
    }
}

/// The core adapter trait. All built-in connectors, control-flow nodes,
/// and future plugin adapters implement this.
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    async fn execute(&self, ctx: &AdapterContext) -> Result<AdapterOutput, NodeError>;
}
