//! Expression-evaluator error type.

use thiserror::Error;

/// Errors raised while tokenizing, parsing, or evaluating an expression.
///
/// The engine treats every variant as an `InputAssemblyError`: the node
/// that owns the failing config is marked `Failed` without a retry.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),

    #[error("unterminated string literal starting at position {0}")]
    UnterminatedString(usize),

    #[error("unexpected end of expression")]
    UnexpectedEof,

    #[error("expected {expected}, found '{found}' at position {pos}")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
        pos: usize,
    },

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{name}' expects {expected} argument(s), got {got}")]
    WrongArity {
        name: String,
        expected: &'static str,
        got: usize,
    },

    #[error("unknown namespace '${0}'")]
    UnknownNamespace(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("unterminated template starting at position {0}")]
    UnterminatedTemplate(usize),
}
