//! Walks a `node.config` JSON tree and substitutes `{{ ... }}` placeholders.
//!
//! Embedding is only supported in string leaves (spec §6): non-string
//! leaves pass through untouched.

use serde_json::Value as Json;

use crate::bag::VariableBag;
use crate::clock::{Clock, IdSource};
use crate::error::ExprError;
use crate::eval::eval;
use crate::parser::Parser;

/// Resolve every `{{ expr }}` placeholder in `config` against `bag`.
pub fn resolve_config(
    config: &Json,
    bag: &VariableBag,
    clock: &dyn Clock,
    ids: &dyn IdSource,
) -> Result<Json, ExprError> {
    match config {
        Json::String(s) => resolve_string(s, bag, clock, ids),
        Json::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve_config(item, bag, clock, ids)?);
            }
            Ok(Json::Array(out))
        }
        Json::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve_config(v, bag, clock, ids)?);
            }
            Ok(Json::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// A `{{ ... }}` span found inside a string leaf.
struct Span {
    start: usize,
    end: usize,
    inner: String,
}

fn find_spans(s: &str) -> Result<Vec<Span>, ExprError> {
    let mut spans = Vec::new();
    let mut search_from = 0;
    while let Some(rel_start) = s[search_from..].find("{{") {
        let start = search_from + rel_start;
        let after_open = start + 2;
        let Some(rel_end) = s[after_open..].find("}}") else {
            return Err(ExprError::UnterminatedTemplate(start));
        };
        let inner_end = after_open + rel_end;
        let end = inner_end + 2;
        spans.push(Span {
            start,
            end,
            inner: s[after_open..inner_end].trim().to_string(),
        });
        search_from = end;
    }
    Ok(spans)
}

fn resolve_string(
    s: &str,
    bag: &VariableBag,
    clock: &dyn Clock,
    ids: &dyn IdSource,
) -> Result<Json, ExprError> {
    let spans = find_spans(s)?;
    if spans.is_empty() {
        return Ok(Json::String(s.to_string()));
    }

    // If the whole string (modulo surrounding whitespace) is exactly one
    // span, preserve the expression's native JSON type.
    if spans.len() == 1 && s.trim() == &s[spans[0].start..spans[0].end] {
        let expr = Parser::parse(&spans[0].inner)?;
        let value = eval(&expr, bag, clock, ids)?;
        return Ok(value.into_json());
    }

    // Otherwise, stitch the literal text and stringified expression results
    // together.
    let mut out = String::with_capacity(s.len());
    let mut cursor = 0;
    for span in &spans {
        out.push_str(&s[cursor..span.start]);
        let expr = Parser::parse(&span.inner)?;
        let value = eval(&expr, bag, clock, ids)?;
        out.push_str(&display(&value.into_json()));
        cursor = span.end;
    }
    out.push_str(&s[cursor..]);
    Ok(Json::String(out))
}

fn display(v: &Json) -> String {
    match v {
        Json::String(s) => s.clone(),
        Json::Null => String::new(),
        other => other.to_string(),
    }
}
