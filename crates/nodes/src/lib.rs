//! `nodes` crate — the `ExecutableNode` adapter contract, the registry
//! that maps connector-type strings to adapters, and the built-in
//! control-flow node types.
//!
//! The engine crate dispatches execution through the `ExecutableNode`
//! trait object; it never depends on a concrete adapter implementation.

pub mod control_flow;
pub mod error;
pub mod mock;
pub mod registry;
pub mod traits;

pub use error::NodeError;
pub use registry::{register_builtins, NodeRegistry};
pub use traits::{AdapterContext, AdapterOutput, ExecutableNode, RunMetadata};
