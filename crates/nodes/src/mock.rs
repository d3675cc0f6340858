//! `MockAdapter` — a test double for `ExecutableNode`.
//!
//! Useful in unit and integration tests where a real adapter is either
//! unavailable or irrelevant.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use crate::{
    traits::{AdapterContext, AdapterOutput},
    ExecutableNode, NodeError,
};

/// Behaviour injected into `MockAdapter` at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Fail with a `Retryable` error.
    FailRetryable(String),
    /// Fail with a `NonRetryable` error.
    FailNonRetryable(String),
}

/// A mock adapter that records every call it receives and returns a
/// programmer-specified result.
pub struct MockAdapter {
    /// Label used in test assertions.
    pub name: String,
    pub behaviour: MockBehaviour,
    /// All `inputs` bags seen by this adapter, in call order.
    pub calls: Arc<Mutex<Vec<Value>>>,
}

impl MockAdapter {
    /// Create a mock that always succeeds with the given value.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::ReturnValue(value),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_non_retryable(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::FailNonRetryable(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_retryable(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::FailRetryable(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ExecutableNode for MockAdapter {
    async fn execute(&self, ctx: &AdapterContext) -> Result<AdapterOutput, NodeError> {
        self.calls.lock().unwrap().push(ctx.inputs.clone());

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => {
                // Merge the incoming inputs with the node's own output field
                // so tests can trace the data flowing through the pipeline.
                let mut out = json!({ "node": self.name });
                if let (Some(out_obj), Some(v_obj)) = (out.as_object_mut(), v.as_object()) {
                    for (k, val) in v_obj {
                        out_obj.insert(k.clone(), val.clone());
                    }
                }
                Ok(AdapterOutput::ok(out, 0))
            }
            MockBehaviour::FailRetryable(msg) => Err(NodeError::Retryable(msg.clone())),
            MockBehaviour::FailNonRetryable(msg) => Err(NodeError::NonRetryable(msg.clone())),
        }
    }
}
