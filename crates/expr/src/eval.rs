//! Tree-walking evaluator.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value as Json;

use crate::ast::{BinOp, Expr, UnaryOp};
use crate::bag::VariableBag;
use crate::clock::{Clock, IdSource};
use crate::error::ExprError;
use crate::value::ExprValue;

/// Evaluate a parsed [`Expr`] against a [`VariableBag`].
///
/// Pure and side-effect free: `now()`/`uuid()` are read from the injected
/// `clock`/`ids` rather than the wall clock, so the same `(expr, bag, clock,
/// ids)` tuple always produces the same result (spec §8 determinism).
pub fn eval(
    expr: &Expr,
    bag: &VariableBag,
    clock: &dyn Clock,
    ids: &dyn IdSource,
) -> Result<ExprValue, ExprError> {
    match expr {
        Expr::Number(n) => Ok(ExprValue::number(*n)),
        Expr::String(s) => Ok(ExprValue::string(s.clone())),
        Expr::Bool(b) => Ok(ExprValue::bool(*b)),
        Expr::Null => Ok(ExprValue::null()),

        Expr::Namespace(name) => eval_namespace(name, bag, clock),

        Expr::Field(base, field) => {
            let base_val = eval(base, bag, clock, ids)?;
            Ok(base_val.get_field(field))
        }

        Expr::Index(base, index) => {
            let base_val = eval(base, bag, clock, ids)?;
            let index_val = eval(index, bag, clock, ids)?;
            Ok(base_val.get_index(&index_val))
        }

        Expr::Unary(op, inner) => {
            let v = eval(inner, bag, clock, ids)?;
            if v.is_undefined() {
                return Ok(ExprValue::Undefined);
            }
            match op {
                UnaryOp::Neg => match v.as_f64() {
                    Some(n) => Ok(ExprValue::number(-n)),
                    None => Err(ExprError::Type("cannot negate a non-number".into())),
                },
                UnaryOp::Not => Ok(ExprValue::bool(!v.truthy())),
            }
        }

        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, bag, clock, ids),

        Expr::Ternary(cond, then_branch, else_branch) => {
            let c = eval(cond, bag, clock, ids)?;
            if c.is_undefined() {
                return Ok(ExprValue::Undefined);
            }
            if c.truthy() {
                eval(then_branch, bag, clock, ids)
            } else {
                eval(else_branch, bag, clock, ids)
            }
        }

        Expr::Call(name, args) => {
            let mut values = Vec::with_capacity(args.len());
            for a in args {
                values.push(eval(a, bag, clock, ids)?);
            }
            eval_call(name, &values, clock, ids)
        }
    }
}

fn eval_namespace(name: &str, bag: &VariableBag, clock: &dyn Clock) -> Result<ExprValue, ExprError> {
    match name {
        "json" => Ok(ExprValue::Json(bag.json.clone())),
        "env" => Ok(ExprValue::Json(bag.env.clone())),
        "credentials" => Ok(bag
            .credentials
            .clone()
            .map(ExprValue::Json)
            .unwrap_or(ExprValue::Undefined)),
        "now" => Ok(ExprValue::string(clock.now().to_rfc3339())),
        "loop" => Ok(bag
            .loop_ctx
            .as_ref()
            .map(|l| {
                ExprValue::Json(serde_json::json!({
                    "index": l.index,
                    "item": l.item,
                }))
            })
            .unwrap_or(ExprValue::Undefined)),
        other => Err(ExprError::UnknownNamespace(other.to_string())),
    }
}

fn eval_binary(
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    bag: &VariableBag,
    clock: &dyn Clock,
    ids: &dyn IdSource,
) -> Result<ExprValue, ExprError> {
    // Short-circuit logical operators.
    if matches!(op, BinOp::And | BinOp::Or) {
        let l = eval(lhs, bag, clock, ids)?;
        if l.is_undefined() {
            return Ok(ExprValue::Undefined);
        }
        return match op {
            BinOp::And if !l.truthy() => Ok(ExprValue::bool(false)),
            BinOp::Or if l.truthy() => Ok(ExprValue::bool(true)),
            _ => {
                let r = eval(rhs, bag, clock, ids)?;
                if r.is_undefined() {
                    return Ok(ExprValue::Undefined);
                }
                Ok(ExprValue::bool(r.truthy()))
            }
        };
    }

    let l = eval(lhs, bag, clock, ids)?;
    let r = eval(rhs, bag, clock, ids)?;

    if l.is_undefined() || r.is_undefined() {
        return Ok(ExprValue::Undefined);
    }

    match op {
        BinOp::Add => match (&l, &r) {
            (ExprValue::Json(Json::String(a)), _) => {
                Ok(ExprValue::string(format!("{a}{}", json_to_display(&r.clone().into_json()))))
            }
            (_, ExprValue::Json(Json::String(b))) => {
                Ok(ExprValue::string(format!("{}{b}", json_to_display(&l.clone().into_json()))))
            }
            _ => numeric_op(&l, &r, |a, b| a + b),
        },
        BinOp::Sub => numeric_op(&l, &r, |a, b| a - b),
        BinOp::Mul => numeric_op(&l, &r, |a, b| a * b),
        BinOp::Div => numeric_op(&l, &r, |a, b| a / b),
        BinOp::Rem => numeric_op(&l, &r, |a, b| a % b),
        BinOp::Eq => Ok(ExprValue::bool(json_eq(&l, &r))),
        BinOp::NotEq => Ok(ExprValue::bool(!json_eq(&l, &r))),
        BinOp::Lt => compare(&l, &r, |o| o.is_lt()),
        BinOp::LtEq => compare(&l, &r, |o| o.is_le()),
        BinOp::Gt => compare(&l, &r, |o| o.is_gt()),
        BinOp::GtEq => compare(&l, &r, |o| o.is_ge()),
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    }
}

fn numeric_op(l: &ExprValue, r: &ExprValue, f: impl Fn(f64, f64) -> f64) -> Result<ExprValue, ExprError> {
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => Ok(ExprValue::number(f(a, b))),
        _ => Err(ExprError::Type("arithmetic requires numeric operands".into())),
    }
}

fn compare(l: &ExprValue, r: &ExprValue, f: impl Fn(std::cmp::Ordering) -> bool) -> Result<ExprValue, ExprError> {
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => Ok(ExprValue::bool(
            a.partial_cmp(&b).map(f).unwrap_or(false),
        )),
        _ => match (l.as_str(), r.as_str()) {
            (Some(a), Some(b)) => Ok(ExprValue::bool(f(a.cmp(b)))),
            _ => Err(ExprError::Type("comparison requires numbers or strings".into())),
        },
    }
}

fn json_eq(l: &ExprValue, r: &ExprValue) -> bool {
    match (l, r) {
        (ExprValue::Json(a), ExprValue::Json(b)) => a == b,
        _ => false,
    }
}

fn json_to_display(v: &Json) -> String {
    match v {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn eval_call(
    name: &str,
    args: &[ExprValue],
    clock: &dyn Clock,
    ids: &dyn IdSource,
) -> Result<ExprValue, ExprError> {
    match name {
        "now" => {
            expect_arity(name, args, 0)?;
            Ok(ExprValue::string(clock.now().to_rfc3339()))
        }
        "uuid" => {
            expect_arity(name, args, 0)?;
            Ok(ExprValue::string(ids.next_uuid().to_string()))
        }
        "toUpper" => {
            expect_arity(name, args, 1)?;
            str_arg(name, &args[0]).map(|s| ExprValue::string(s.to_uppercase()))
        }
        "toLower" => {
            expect_arity(name, args, 1)?;
            str_arg(name, &args[0]).map(|s| ExprValue::string(s.to_lowercase()))
        }
        "length" => {
            expect_arity(name, args, 1)?;
            match &args[0] {
                ExprValue::Undefined => Ok(ExprValue::Undefined),
                ExprValue::Json(Json::String(s)) => Ok(ExprValue::number(s.chars().count() as f64)),
                ExprValue::Json(Json::Array(a)) => Ok(ExprValue::number(a.len() as f64)),
                ExprValue::Json(Json::Object(o)) => Ok(ExprValue::number(o.len() as f64)),
                _ => Err(ExprError::Type("length() requires a string, array, or object".into())),
            }
        }
        "contains" => {
            expect_arity(name, args, 2)?;
            match (&args[0], &args[1]) {
                (ExprValue::Undefined, _) | (_, ExprValue::Undefined) => Ok(ExprValue::Undefined),
                (ExprValue::Json(Json::String(hay)), ExprValue::Json(Json::String(needle))) => {
                    Ok(ExprValue::bool(hay.contains(needle.as_str())))
                }
                (ExprValue::Json(Json::Array(hay)), needle) => {
                    let needle_json = needle.clone().into_json();
                    Ok(ExprValue::bool(hay.iter().any(|v| v == &needle_json)))
                }
                _ => Err(ExprError::Type("contains() requires a string/array haystack".into())),
            }
        }
        "addDays" => date_arith(name, args, Duration::days),
        "addHours" => date_arith(name, args, Duration::hours),
        "addMinutes" => date_arith(name, args, Duration::minutes),
        other => Err(ExprError::UnknownFunction(other.to_string())),
    }
}

fn date_arith(
    name: &str,
    args: &[ExprValue],
    make_delta: impl Fn(i64) -> Duration,
) -> Result<ExprValue, ExprError> {
    expect_arity(name, args, 2)?;
    if args[0].is_undefined() || args[1].is_undefined() {
        return Ok(ExprValue::Undefined);
    }
    let date_str = str_arg(name, &args[0])?;
    let amount = args[1]
        .as_f64()
        .ok_or_else(|| ExprError::Type(format!("{name}() requires a numeric second argument")))?;
    let parsed: DateTime<Utc> = DateTime::parse_from_rfc3339(date_str)
        .map_err(|e| ExprError::Type(format!("{name}() could not parse date: {e}")))?
        .with_timezone(&Utc);
    let shifted = parsed + make_delta(amount as i64);
    Ok(ExprValue::string(shifted.to_rfc3339()))
}

fn expect_arity(name: &str, args: &[ExprValue], n: usize) -> Result<(), ExprError> {
    if args.len() == n {
        Ok(())
    } else {
        Err(ExprError::WrongArity {
            name: name.to_string(),
            expected: arity_label(n),
            got: args.len(),
        })
    }
}

fn arity_label(n: usize) -> &'static str {
    match n {
        0 => "0",
        1 => "1",
        2 => "2",
        _ => "several",
    }
}

fn str_arg<'a>(name: &str, v: &'a ExprValue) -> Result<&'a str, ExprError> {
    v.as_str()
        .ok_or_else(|| ExprError::Type(format!("{name}() requires a string argument")))
}
