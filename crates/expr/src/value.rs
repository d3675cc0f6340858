//! The dynamic runtime value the tree-walker operates on.

use serde_json::Value as Json;

/// A value produced while evaluating an expression.
///
/// `Undefined` is distinct from JSON `null`: it marks "this path did not
/// resolve" and is not coerced to `false` — comparisons against it
/// propagate `Undefined` rather than silently becoming `false` (spec §4.5).
#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    Undefined,
    Json(Json),
}

impl ExprValue {
    pub fn null() -> Self {
        ExprValue::Json(Json::Null)
    }

    pub fn bool(b: bool) -> Self {
        ExprValue::Json(Json::Bool(b))
    }

    pub fn string(s: impl Into<String>) -> Self {
        ExprValue::Json(Json::String(s.into()))
    }

    pub fn number(n: f64) -> Self {
        match serde_json::Number::from_f64(n) {
            Some(num) => ExprValue::Json(Json::Number(num)),
            None => ExprValue::Undefined,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, ExprValue::Undefined)
    }

    /// Converts to a JSON value for output; `Undefined` becomes `null`.
    pub fn into_json(self) -> Json {
        match self {
            ExprValue::Undefined => Json::Null,
            ExprValue::Json(v) => v,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ExprValue::Json(Json::Number(n)) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ExprValue::Json(Json::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ExprValue::Json(Json::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Truthiness for ternary/logical operators. `Undefined` is *not*
    /// silently false here — callers that need boolean-context semantics
    /// (edge conditions, `If` nodes) should check `is_undefined()` first
    /// and treat it as "branch not taken" explicitly.
    pub fn truthy(&self) -> bool {
        match self {
            ExprValue::Undefined => false,
            ExprValue::Json(Json::Null) => false,
            ExprValue::Json(Json::Bool(b)) => *b,
            ExprValue::Json(Json::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            ExprValue::Json(Json::String(s)) => !s.is_empty(),
            ExprValue::Json(Json::Array(a)) => !a.is_empty(),
            ExprValue::Json(Json::Object(o)) => !o.is_empty(),
        }
    }

    pub fn from_json(v: Json) -> Self {
        ExprValue::Json(v)
    }

    /// Property access: `self.field`. Missing keys resolve to `Undefined`,
    /// never an error.
    pub fn get_field(&self, field: &str) -> ExprValue {
        match self {
            ExprValue::Json(Json::Object(map)) => map
                .get(field)
                .cloned()
                .map(ExprValue::Json)
                .unwrap_or(ExprValue::Undefined),
            _ => ExprValue::Undefined,
        }
    }

    /// Index access: `self[index]`. Out-of-range or non-array resolves to
    /// `Undefined`.
    pub fn get_index(&self, index: &ExprValue) -> ExprValue {
        let idx = match index.as_f64() {
            Some(n) if n >= 0.0 => n as usize,
            _ => return ExprValue::Undefined,
        };
        match self {
            ExprValue::Json(Json::Array(arr)) => arr
                .get(idx)
                .cloned()
                .map(ExprValue::Json)
                .unwrap_or(ExprValue::Undefined),
            _ => ExprValue::Undefined,
        }
    }
}

impl From<Json> for ExprValue {
    fn from(v: Json) -> Self {
        ExprValue::Json(v)
    }
}
