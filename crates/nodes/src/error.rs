//! Node-level error type.

use thiserror::Error;

/// Errors returned by an adapter's `execute` method.
///
/// The engine uses the variant to decide retry behaviour:
/// - `Retryable` — the node is re-attempted per its retry policy.
/// - `NonRetryable` — the node is immediately marked `Failed`, no retry.
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    #[error("retryable node error: {0}")]
    Retryable(String),

    #[error("non-retryable node error: {0}")]
    NonRetryable(String),
}
