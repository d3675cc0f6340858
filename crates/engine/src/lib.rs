//! `engine` crate — core domain models, DAG validation, and the execution engine.

pub mod models;
pub mod error;
pub mod dag;
pub mod executor;

pub use dag::{validate_workflow, ExecutionPlan};
pub use error::EngineError;
pub use executor::{ExecutionResult, ExecutorConfig, WorkflowExecutor};
pub use models::{
    Edge, Node, NodeExecutionResult, NodeStatus, RetryPolicy, RunMode, RunStatus, TriggerBinding,
    Workflow, WorkflowRun,
};
