//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models — they carry no domain behaviour.
//! Domain types (with their richer enums) live in the `engine` crate;
//! these rows store the `Display`/`FromStr` string form of each status so
//! sqlx can map them without a bespoke `Type` impl per enum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// A persisted workflow definition row, keyed by `(tenant_id, id, version)`.
/// Immutable once created — an edit is a new row with `version + 1`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub version: i32,
    pub name: String,
    /// Full JSON workflow definition (nodes, edges, triggers, …)
    pub definition: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// runs
// ---------------------------------------------------------------------------

/// A persisted workflow run row.
///
/// `claim_epoch` fences a stale worker off the run once a new worker has
/// seized the lease (spec §4.2): a worker that loses the CAS race must
/// discard its in-flight writes instead of overwriting the new owner's.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RunRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_version: i32,
    pub mode: String,
    pub status: String,
    pub claim_epoch: i64,
    pub worker_id: Option<String>,
    pub input: serde_json::Value,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// node_results
// ---------------------------------------------------------------------------

/// A persisted node-execution-result row.
///
/// One row per `(run_id, node_id)` — retries mutate the same row in place
/// and bump `attempt`, matching the "at most once per (run, node)"
/// invariant.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NodeResultRow {
    pub run_id: Uuid,
    pub node_id: String,
    pub status: String,
    pub attempt: i32,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// secrets
// ---------------------------------------------------------------------------

/// A persisted secret row. The `credentials` crate owns decrypt/allowlist
/// behaviour; this is just the storage shape.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SecretRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub key: String,
    /// Encrypted value (base64-encoded ciphertext). Encryption-at-rest
    /// itself is an external collaborator (spec Non-goals); this column
    /// only needs to round-trip through whatever scheme guards it.
    pub encrypted_value: String,
}
