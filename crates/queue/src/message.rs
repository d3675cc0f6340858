//! The message shape carried on the partitioned queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use engine::RunMode;

/// One enqueued run dispatch. Wire shape matches the run row 1-to-1 so a
/// worker can rebuild a `WorkflowRun` without a second database read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMessage {
    pub run_id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_version: i32,
    pub tenant_id: Uuid,
    pub mode: RunMode,
    pub input: Value,
    pub queued_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}
