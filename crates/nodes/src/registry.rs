//! `NodeRegistry` — maps a connector-type string to its adapter.
//!
//! Built once at process start (`cli`), then read-only for the lifetime of
//! the worker process (spec §4.4) — no hot reload, no interior mutability.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ExecutableNode;

#[derive(Default, Clone)]
pub struct NodeRegistry {
    adapters: HashMap<String, Arc<dyn ExecutableNode>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, node_type: impl Into<String>, adapter: Arc<dyn ExecutableNode>) {
        self.adapters.insert(node_type.into(), adapter);
    }

    pub fn lookup(&self, node_type: &str) -> Option<Arc<dyn ExecutableNode>> {
        self.adapters.get(node_type).cloned()
    }

    pub fn list_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.adapters.contains_key(node_type)
    }
}

/// Register the control-flow adapters every deployment needs regardless of
/// which connector adapters it loads (spec §4.3.6's `if`/`switch`/`loop`/
/// `merge`/`sub_workflow` node types).
pub fn register_builtins(registry: &mut NodeRegistry) {
    use crate::control_flow::{IfAdapter, LoopAdapter, MergeAdapter, SubWorkflowAdapter, SwitchAdapter};

    registry.register("if", Arc::new(IfAdapter));
    registry.register("switch", Arc::new(SwitchAdapter));
    registry.register("loop", Arc::new(LoopAdapter));
    registry.register("merge", Arc::new(MergeAdapter));
    registry.register("sub_workflow", Arc::new(SubWorkflowAdapter));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAdapter;
    use serde_json::json;

    #[test]
    fn register_lookup_and_list() {
        let mut reg = NodeRegistry::new();
        reg.register("mock.echo", Arc::new(MockAdapter::returning("echo", json!({}))));
        reg.register("mock.other", Arc::new(MockAdapter::returning("other", json!({}))));

        assert!(reg.contains("mock.echo"));
        assert!(reg.lookup("mock.echo").is_some());
        assert!(reg.lookup("missing").is_none());
        assert_eq!(reg.list_types(), vec!["mock.echo", "mock.other"]);
    }
}
