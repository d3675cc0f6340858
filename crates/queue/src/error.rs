//! Typed error type for the queue crate.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("run {0} not found")]
    RunNotFound(Uuid),

    #[error("workflow {workflow_id} version {version} not found")]
    WorkflowNotFound { workflow_id: Uuid, version: i32 },

    #[error("failed to decode workflow definition: {0}")]
    DefinitionDecode(String),

    #[error("offset token does not match any in-flight message")]
    UnknownOffset,

    #[error(transparent)]
    Db(#[from] db::DbError),

    #[error(transparent)]
    Engine(#[from] engine::EngineError),
}
