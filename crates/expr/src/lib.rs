//! `expr` crate — the `{{ ... }}` template / expression grammar.
//!
//! Grammar: literals, `$json.path` property access, `arr[0]` indexing,
//! arithmetic/relational/logical operators, string concatenation, a
//! ternary, and a fixed set of builtin functions. See [`eval::eval`] for
//! the tree-walker and [`template::resolve_config`] for the
//! `node.config` substitution pass.
//!
//! Evaluation is pure: `now()`/`uuid()` come from an injected
//! [`clock::Clock`]/[`clock::IdSource`] rather than the wall clock, so a
//! fixed `(expr, bag, clock, ids)` tuple is deterministic.

pub mod ast;
pub mod bag;
pub mod clock;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod template;
pub mod value;

pub use bag::{LoopContext, VariableBag};
pub use clock::{Clock, FixedClock, FixedIdSource, IdSource, SystemClock, SystemIdSource};
pub use error::ExprError;
pub use parser::Parser;
pub use template::resolve_config;
pub use value::ExprValue;

/// Convenience: parse and evaluate a single expression (no template
/// braces) in one call.
pub fn evaluate(
    source: &str,
    bag: &VariableBag,
    clock: &dyn Clock,
    ids: &dyn IdSource,
) -> Result<ExprValue, ExprError> {
    let ast = Parser::parse(source)?;
    eval::eval(&ast, bag, clock, ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(json_val: serde_json::Value) -> VariableBag {
        VariableBag::new(json_val)
    }

    #[test]
    fn property_access_and_arithmetic() {
        let b = bag(json!({ "a": 1, "b": 2 }));
        let v = evaluate("$json.a + $json.b", &b, &SystemClock, &SystemIdSource).unwrap();
        assert_eq!(v.into_json(), json!(3.0));
    }

    #[test]
    fn indexing() {
        let b = bag(json!({ "items": [10, 20, 30] }));
        let v = evaluate("$json.items[1]", &b, &SystemClock, &SystemIdSource).unwrap();
        assert_eq!(v.into_json(), json!(20.0));
    }

    #[test]
    fn ternary() {
        let b = bag(json!({ "plan": "premium" }));
        let v = evaluate(
            "$json.plan == 'premium' ? 'yes' : 'no'",
            &b,
            &SystemClock,
            &SystemIdSource,
        )
        .unwrap();
        assert_eq!(v.into_json(), json!("yes"));
    }

    #[test]
    fn undefined_propagates_through_comparison() {
        let b = bag(json!({}));
        let v = evaluate("$json.missing == 'x'", &b, &SystemClock, &SystemIdSource).unwrap();
        assert!(v.is_undefined());
    }

    #[test]
    fn undefined_in_ternary_condition_is_not_coerced_to_false() {
        let b = bag(json!({}));
        let v = evaluate(
            "$json.missing ? 'a' : 'b'",
            &b,
            &SystemClock,
            &SystemIdSource,
        )
        .unwrap();
        assert!(v.is_undefined(), "undefined condition must propagate, not pick the else branch");
    }

    #[test]
    fn builtin_functions() {
        let b = bag(json!({ "name": "Ada" }));
        assert_eq!(
            evaluate("toUpper($json.name)", &b, &SystemClock, &SystemIdSource)
                .unwrap()
                .into_json(),
            json!("ADA")
        );
        assert_eq!(
            evaluate("length($json.name)", &b, &SystemClock, &SystemIdSource)
                .unwrap()
                .into_json(),
            json!(3.0)
        );
        assert_eq!(
            evaluate("contains($json.name, 'Ad')", &b, &SystemClock, &SystemIdSource)
                .unwrap()
                .into_json(),
            json!(true)
        );
    }

    #[test]
    fn deterministic_clock_and_uuid() {
        let fixed_time = chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let fixed_id = uuid::Uuid::nil();
        let clock = FixedClock(fixed_time);
        let ids = FixedIdSource(fixed_id);
        let b = bag(json!({}));

        let now1 = evaluate("now()", &b, &clock, &ids).unwrap();
        let now2 = evaluate("now()", &b, &clock, &ids).unwrap();
        assert_eq!(now1, now2);

        let uuid1 = evaluate("uuid()", &b, &clock, &ids).unwrap();
        assert_eq!(uuid1.into_json(), json!(fixed_id.to_string()));
    }

    #[test]
    fn template_preserves_type_for_single_span() {
        let b = bag(json!({ "count": 3 }));
        let resolved = resolve_config(
            &json!("{{ $json.count }}"),
            &b,
            &SystemClock,
            &SystemIdSource,
        )
        .unwrap();
        assert_eq!(resolved, json!(3.0));
    }

    #[test]
    fn template_mixed_text_stringifies() {
        let b = bag(json!({ "name": "Ada" }));
        let resolved = resolve_config(
            &json!("Hello, {{ $json.name }}!"),
            &b,
            &SystemClock,
            &SystemIdSource,
        )
        .unwrap();
        assert_eq!(resolved, json!("Hello, Ada!"));
    }

    #[test]
    fn non_string_leaves_pass_through() {
        let b = bag(json!({}));
        let resolved = resolve_config(
            &json!({ "count": 5, "enabled": true, "nested": { "x": [1, 2] } }),
            &b,
            &SystemClock,
            &SystemIdSource,
        )
        .unwrap();
        assert_eq!(resolved, json!({ "count": 5, "enabled": true, "nested": { "x": [1, 2] } }));
    }

    #[test]
    fn env_and_credentials_namespaces() {
        let b = VariableBag::new(json!({}))
            .with_env(json!({ "STAGE": "prod" }))
            .with_credentials(Some(json!({ "api_key": "shh" })));
        assert_eq!(
            evaluate("$env.STAGE", &b, &SystemClock, &SystemIdSource)
                .unwrap()
                .into_json(),
            json!("prod")
        );
        assert_eq!(
            evaluate("$credentials.api_key", &b, &SystemClock, &SystemIdSource)
                .unwrap()
                .into_json(),
            json!("shh")
        );
    }

    #[test]
    fn loop_namespace() {
        let b = VariableBag::new(json!({})).with_loop(LoopContext {
            index: 2,
            item: json!("c"),
        });
        assert_eq!(
            evaluate("$loop.index", &b, &SystemClock, &SystemIdSource)
                .unwrap()
                .into_json(),
            json!(2.0)
        );
        assert_eq!(
            evaluate("$loop.item", &b, &SystemClock, &SystemIdSource)
                .unwrap()
                .into_json(),
            json!("c")
        );
    }
}
