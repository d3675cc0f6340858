//! DAG validation — run this before persisting or executing a workflow.
//!
//! Rules enforced (spec §4.3.1):
//! 1. Node IDs must be unique within the workflow.
//! 2. Every edge must reference valid node IDs (both `from` and `to`).
//! 3. The directed graph must be acyclic (topological sort must succeed).
//! 4. At least one trigger is declared.
//! 5. Every node's type has a registered adapter.
//! 6. Every `credential_id` resolves to a credential accessible in the
//!    run's tenant.
//!
//! Ties in the topological sort are broken by lexicographic `node_id` so
//! the plan is deterministic across runs of the same workflow.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use credentials::CredentialResolver;
use nodes::NodeRegistry;
use uuid::Uuid;

use crate::{models::Workflow, EngineError};

/// A validated, topologically-sorted execution plan.
pub struct ExecutionPlan {
    pub sorted: Vec<String>,
    /// `node_id -> direct predecessor node_ids`.
    pub predecessors: HashMap<String, Vec<String>>,
}

/// Validate the workflow's DAG, adapter registrations, and credential
/// accessibility, returning a topologically-sorted execution plan.
pub async fn validate_workflow(
    workflow: &Workflow,
    registry: &NodeRegistry,
    credential_resolver: &dyn CredentialResolver,
) -> Result<ExecutionPlan, EngineError> {
    if workflow.triggers.is_empty() {
        return Err(EngineError::NoTriggerNode);
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &workflow.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    let node_set: HashSet<&str> = workflow.nodes.iter().map(|n| n.id.as_str()).collect();

    for edge in &workflow.edges {
        if !node_set.contains(edge.from.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: edge.from.clone(),
                side: "from",
            });
        }
        if !node_set.contains(edge.to.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: edge.to.clone(),
                side: "to",
            });
        }
    }

    for node in &workflow.nodes {
        if !registry.contains(&node.node_type) {
            return Err(EngineError::UnregisteredAdapter {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
            });
        }
        if let Some(credential_id) = node.credential_id {
            validate_credential(workflow.tenant_id, credential_id, &node.id, credential_resolver)
                .await?;
        }
    }

    let sorted = topological_sort(workflow)?;

    let mut predecessors: HashMap<String, Vec<String>> =
        workflow.nodes.iter().map(|n| (n.id.clone(), Vec::new())).collect();
    for edge in &workflow.edges {
        predecessors.entry(edge.to.clone()).or_default().push(edge.from.clone());
    }

    Ok(ExecutionPlan { sorted, predecessors })
}

async fn validate_credential(
    tenant_id: Uuid,
    credential_id: Uuid,
    node_id: &str,
    resolver: &dyn CredentialResolver,
) -> Result<(), EngineError> {
    resolver
        .validate(credential_id, tenant_id)
        .await
        .map_err(|_| EngineError::CredentialNotAccessible {
            node_id: node_id.to_string(),
            credential_id,
        })
}

/// Kahn's algorithm with a min-heap instead of a FIFO queue so that, among
/// several simultaneously-ready nodes, the lexicographically smallest
/// `node_id` is always emitted first.
fn topological_sort(workflow: &Workflow) -> Result<Vec<String>, EngineError> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();

    for node in &workflow.nodes {
        adjacency.entry(node.id.as_str()).or_default();
        in_degree.entry(node.id.as_str()).or_insert(0);
    }

    for edge in &workflow.edges {
        adjacency.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
        *in_degree.entry(edge.to.as_str()).or_insert(0) += 1;
    }

    let mut heap: BinaryHeap<Reverse<&str>> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&id, _)| Reverse(id))
        .collect();

    let mut sorted: Vec<String> = Vec::with_capacity(workflow.nodes.len());

    while let Some(Reverse(node_id)) = heap.pop() {
        sorted.push(node_id.to_owned());

        if let Some(neighbours) = adjacency.get(node_id) {
            for &neighbour in neighbours {
                let deg = in_degree.entry(neighbour).or_insert(0);
                *deg -= 1;
                if *deg == 0 {
                    heap.push(Reverse(neighbour));
                }
            }
        }
    }

    if sorted.len() != workflow.nodes.len() {
        return Err(EngineError::CycleDetected);
    }

    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Edge, Node, RetryPolicy, TriggerBinding};
    use async_trait::async_trait;
    use credentials::{CredentialError, CredentialMetadata};
    use std::sync::Arc;
    use uuid::Uuid;

    struct AllowAllResolver;

    #[async_trait]
    impl CredentialResolver for AllowAllResolver {
        async fn get_decrypted_secret(&self, _: Uuid, _: Uuid) -> Result<String, CredentialError> {
            Ok("secret".into())
        }
        async fn validate(&self, _: Uuid, _: Uuid) -> Result<(), CredentialError> {
            Ok(())
        }
        async fn get_metadata(&self, credential_id: Uuid, tenant_id: Uuid) -> Result<CredentialMetadata, CredentialError> {
            Ok(CredentialMetadata {
                credential_id,
                tenant_id,
                key: "k".into(),
                accessible: true,
            })
        }
        async fn refresh_if_needed(&self, credential_id: Uuid, tenant_id: Uuid) -> Result<CredentialMetadata, CredentialError> {
            self.get_metadata(credential_id, tenant_id).await
        }
    }

    fn make_node(id: &str) -> Node {
        Node {
            id: id.to_string(),
            node_type: "mock".into(),
            config: serde_json::Value::Null,
            credential_id: None,
            retry: RetryPolicy::default(),
            continue_on_failure: false,
            timeout_ms: None,
        }
    }

    fn edge(from: &str, to: &str) -> Edge {
        Edge { from: from.into(), to: to.into(), condition: None }
    }

    fn make_workflow(nodes: Vec<Node>, edges: Vec<Edge>) -> Workflow {
        Workflow {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            version: 1,
            name: "test".into(),
            nodes,
            edges,
            triggers: vec![TriggerBinding::Manual],
        }
    }

    fn registry_with_mock() -> NodeRegistry {
        use nodes::mock::MockAdapter;
        use serde_json::json;

        let mut reg = NodeRegistry::new();
        reg.register("mock", Arc::new(MockAdapter::returning("m", json!({}))));
        reg
    }

    #[tokio::test]
    async fn valid_linear_dag_returns_sorted_order() {
        let workflow = make_workflow(
            vec![make_node("a"), make_node("b"), make_node("c")],
            vec![edge("a", "b"), edge("b", "c")],
        );

        let plan = validate_workflow(&workflow, &registry_with_mock(), &AllowAllResolver)
            .await
            .expect("should be valid");
        assert_eq!(plan.sorted, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn ties_broken_lexicographically() {
        // b and c both become ready after a; lexicographic order picks b first.
        let workflow = make_workflow(
            vec![make_node("a"), make_node("c"), make_node("b")],
            vec![edge("a", "b"), edge("a", "c")],
        );

        let plan = validate_workflow(&workflow, &registry_with_mock(), &AllowAllResolver)
            .await
            .unwrap();
        assert_eq!(plan.sorted, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn duplicate_node_id_is_rejected() {
        let workflow = make_workflow(vec![make_node("a"), make_node("a")], vec![]);
        assert!(matches!(
            validate_workflow(&workflow, &registry_with_mock(), &AllowAllResolver).await,
            Err(EngineError::DuplicateNodeId(id)) if id == "a"
        ));
    }

    #[tokio::test]
    async fn edge_referencing_missing_node_is_rejected() {
        let workflow = make_workflow(vec![make_node("a")], vec![edge("a", "ghost")]);
        assert!(matches!(
            validate_workflow(&workflow, &registry_with_mock(), &AllowAllResolver).await,
            Err(EngineError::UnknownNodeReference { node_id, .. }) if node_id == "ghost"
        ));
    }

    #[tokio::test]
    async fn cycle_is_detected() {
        let workflow = make_workflow(
            vec![make_node("a"), make_node("b"), make_node("c")],
            vec![edge("a", "b"), edge("b", "c"), edge("c", "a")],
        );
        assert!(matches!(
            validate_workflow(&workflow, &registry_with_mock(), &AllowAllResolver).await,
            Err(EngineError::CycleDetected)
        ));
    }

    #[tokio::test]
    async fn missing_trigger_is_rejected() {
        let mut workflow = make_workflow(vec![make_node("a")], vec![]);
        workflow.triggers.clear();
        assert!(matches!(
            validate_workflow(&workflow, &registry_with_mock(), &AllowAllResolver).await,
            Err(EngineError::NoTriggerNode)
        ));
    }

    #[tokio::test]
    async fn unregistered_adapter_type_is_rejected() {
        let mut node = make_node("a");
        node.node_type = "unknown.type".into();
        let workflow = make_workflow(vec![node], vec![]);
        assert!(matches!(
            validate_workflow(&workflow, &registry_with_mock(), &AllowAllResolver).await,
            Err(EngineError::UnregisteredAdapter { node_id, .. }) if node_id == "a"
        ));
    }
}
