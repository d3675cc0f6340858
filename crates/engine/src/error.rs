//! Engine-level error types.

use thiserror::Error;

/// Errors produced by the workflow engine (validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors (§4.3.1) ------

    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    #[error("edge references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference { node_id: String, side: &'static str },

    #[error("workflow graph contains a cycle")]
    CycleDetected,

    #[error("workflow has no trigger node")]
    NoTriggerNode,

    #[error("node '{node_id}' has unregistered type '{node_type}'")]
    UnregisteredAdapter { node_id: String, node_type: String },

    #[error("node '{node_id}' references inaccessible credential {credential_id}")]
    CredentialNotAccessible {
        node_id: String,
        credential_id: uuid::Uuid,
    },

    // ------ Execution errors (§4.3.3 onward) ------

    #[error("node '{node_id}' input assembly failed: {message}")]
    InputAssemblyError { node_id: String, message: String },

    #[error("node '{node_id}' adapter error (retryable={retryable}): {message}")]
    AdapterError {
        node_id: String,
        message: String,
        retryable: bool,
    },

    #[error("node '{node_id}' timed out after {elapsed_ms}ms")]
    TimeoutError { node_id: String, elapsed_ms: u64 },

    #[error("run {run_id} was cancelled")]
    CancellationError { run_id: uuid::Uuid },

    #[error("credential resolution failed: {0}")]
    CredentialError(#[from] credentials::CredentialError),

    #[error("node '{node_id}' exceeded retry limit: {message}")]
    NodeRetryExhausted { node_id: String, message: String },

    #[error("infrastructure error: {0}")]
    Database(#[from] db::DbError),
}
