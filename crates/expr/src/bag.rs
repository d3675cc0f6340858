//! The variable bag the evaluator reads from.
//!
//! A snapshot, not a live view: adapters and the evaluator both get a
//! read-only copy assembled once per node execution (spec §5 "shared
//! resource policy").

use serde_json::{Map, Value};

/// Flat mapping of namespace roots to the values the expression grammar
/// may read. Construction is the engine's responsibility; the evaluator
/// itself never reaches outside this struct.
#[derive(Debug, Clone, Default)]
pub struct VariableBag {
    /// `$json` — the node's assembled input (run input merged with
    /// predecessor outputs).
    pub json: Value,
    /// `$env` — allowlisted process environment variables, pre-filtered
    /// by the engine before the bag is built.
    pub env: Value,
    /// `$credentials` — allowlisted fields from the resolved credential,
    /// or `None` if the node has no `credentialId` / nothing was
    /// resolved.
    pub credentials: Option<Value>,
    /// `$loop` — present only while executing inside a Loop node's body
    /// (spec §9: isolated bag per iteration with explicit `$loop.index`,
    /// `$loop.item`).
    pub loop_ctx: Option<LoopContext>,
}

#[derive(Debug, Clone)]
pub struct LoopContext {
    pub index: u64,
    pub item: Value,
}

impl VariableBag {
    pub fn new(json: Value) -> Self {
        Self {
            json,
            env: Value::Object(Map::new()),
            credentials: None,
            loop_ctx: None,
        }
    }

    pub fn with_env(mut self, env: Value) -> Self {
        self.env = env;
        self
    }

    pub fn with_credentials(mut self, credentials: Option<Value>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_loop(mut self, ctx: LoopContext) -> Self {
        self.loop_ctx = Some(ctx);
        self
    }
}
