// Tree-walking evaluator for parsed column expressions

use crate::error::EvalError;
use crate::parser::ast::{BinaryOp, BlockOp, Expr, Method, ParsedExpression, UnaryOp};
use crate::parser::parse;
use crate::value::{compare_values, max_value, min_value, Value};
use std::borrow::Cow;
use std::cmp::Ordering;

/// Evaluation scope: the current record plus the enclosing scope, if any.
struct Scope<'a> {
    value: &'a Value,
    parent: Option<&'a Scope<'a>>,
}

/// Parse `source` and evaluate it against `record`.
pub fn evaluate(source: &str, record: &Value) -> Result<Value, EvalError> {
    let parsed = parse(source)?;
    parsed.evaluate(record)
}

/// Evaluate an already parsed tree against `record`.
pub fn evaluate_expr(expr: &Expr, record: &Value) -> Result<Value, EvalError> {
    let scope = Scope {
        value: record,
        parent: None,
    };
    eval(expr, &scope).map(Cow::into_owned)
}

impl ParsedExpression {
    pub fn evaluate(&self, record: &Value) -> Result<Value, EvalError> {
        evaluate_expr(&self.tree, record)
    }
}

/// Paths into the record are borrowed; only computed values are owned.
fn eval<'v>(expr: &'v Expr, scope: &Scope<'v>) -> Result<Cow<'v, Value>, EvalError> {
    match expr {
        Expr::Value => Ok(Cow::Borrowed(scope.value)),
        Expr::Parent(inner) => match scope.parent {
            Some(parent) => eval(inner, parent),
            None => Ok(Cow::Owned(Value::Null)),
        },
        Expr::Literal(value) => Ok(Cow::Borrowed(value)),
        Expr::Property { object, key } => {
            let object = eval(object, scope)?;
            let key = eval(key, scope)?;
            Ok(read_property(object, &key))
        }
        Expr::Array(items) => items
            .iter()
            .map(|item| eval(item, scope).map(Cow::into_owned))
            .collect::<Result<Vec<_>, _>>()
            .map(|items| Cow::Owned(Value::Array(items))),
        Expr::Unary { op, operand } => {
            let operand = eval(operand, scope)?;
            apply_unary(*op, &operand).map(Cow::Owned)
        }
        Expr::Binary { op, left, right } => {
            let left = eval(left, scope)?;
            match op {
                BinaryOp::And if !left.truthy() => Ok(left),
                BinaryOp::Or if left.truthy() => Ok(left),
                BinaryOp::And | BinaryOp::Or => eval(right, scope),
                _ => {
                    let right = eval(right, scope)?;
                    apply_binary(*op, &left, &right).map(Cow::Owned)
                }
            }
        }
        Expr::Method { object, method } => {
            let object = eval(object, scope)?;
            apply_method(*method, object).map(Cow::Owned)
        }
        Expr::Block { object, op, body } => {
            let object = eval(object, scope)?;
            apply_block(*op, &object, body, scope).map(Cow::Owned)
        }
    }
}

/// Read `key` off a value that may itself be borrowed from the record.
fn read_property<'v>(object: Cow<'v, Value>, key: &Value) -> Cow<'v, Value> {
    match object {
        Cow::Borrowed(object) => lookup(object, key),
        Cow::Owned(object) => Cow::Owned(lookup(&object, key).into_owned()),
    }
}

/// Missing keys, out-of-range indices and reads on scalars yield null.
fn lookup<'a>(object: &'a Value, key: &Value) -> Cow<'a, Value> {
    let found = match (object, key) {
        (Value::Object(map), Value::String(name)) => map.get(name),
        (Value::Array(items), Value::String(name)) if name == "length" => {
            return Cow::Owned(Value::Number(items.len() as f64));
        }
        (Value::String(s), Value::String(name)) if name == "length" => {
            return Cow::Owned(Value::Number(s.chars().count() as f64));
        }
        (Value::Array(items), Value::Number(n)) if n.fract() == 0.0 && *n >= 0.0 => {
            items.get(*n as usize)
        }
        _ => None,
    };
    found.map_or(Cow::Owned(Value::Null), Cow::Borrowed)
}

fn apply_unary(op: UnaryOp, operand: &Value) -> Result<Value, EvalError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!operand.truthy())),
        UnaryOp::Neg => match operand {
            Value::Null => Ok(Value::Null),
            Value::Number(n) => Ok(Value::Number(-n)),
            other => Err(EvalError::InvalidOperand {
                op: "-".to_string(),
                operand: other.describe(),
            }),
        },
    }
}

fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(left == right)),
        BinaryOp::Ne => return Ok(Value::Bool(left != right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare_values(left, right);
            let result = match (op, ordering) {
                (_, None) => false,
                (BinaryOp::Lt, Some(o)) => o == Ordering::Less,
                (BinaryOp::Le, Some(o)) => o != Ordering::Greater,
                (BinaryOp::Gt, Some(o)) => o == Ordering::Greater,
                (_, Some(o)) => o != Ordering::Less,
            };
            return Ok(Value::Bool(result));
        }
        _ => {}
    }

    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            _ => a % b,
        })),
        (Value::String(a), Value::String(b)) if op == BinaryOp::Add => {
            Ok(Value::String(format!("{}{}", a, b)))
        }
        (left, right) => Err(EvalError::TypeMismatch {
            op: op.symbol().to_string(),
            left: left.describe(),
            right: right.describe(),
        }),
    }
}

fn numbers(method: Method, items: &[Value]) -> Result<Vec<f64>, EvalError> {
    items
        .iter()
        .filter(|item| !item.is_null())
        .map(|item| match item {
            Value::Number(n) => Ok(*n),
            other => Err(EvalError::InvalidOperand {
                op: method.name().to_string(),
                operand: other.describe(),
            }),
        })
        .collect()
}

fn apply_method(method: Method, object: Cow<'_, Value>) -> Result<Value, EvalError> {
    let items = match object.as_ref() {
        Value::Null => return Ok(Value::Null),
        Value::Array(items) => items,
        other => {
            return Err(EvalError::NotACollection {
                method: method.name().to_string(),
                found: other.describe(),
            })
        }
    };

    match method {
        Method::Sum => Ok(Value::Number(numbers(method, items)?.iter().sum())),
        Method::Average => {
            let nums = numbers(method, items)?;
            if nums.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(Value::Number(nums.iter().sum::<f64>() / nums.len() as f64))
            }
        }
        Method::Min => Ok(min_value(items).cloned().unwrap_or(Value::Null)),
        Method::Max => Ok(max_value(items).cloned().unwrap_or(Value::Null)),
        Method::Count => Ok(Value::Number(items.len() as f64)),
        Method::Reversed => Ok(Value::Array(items.iter().rev().cloned().collect())),
        Method::Flatten => {
            let mut flat = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Array(inner) => flat.extend(inner.iter().cloned()),
                    other => flat.push(other.clone()),
                }
            }
            Ok(Value::Array(flat))
        }
    }
}

fn apply_block(op: BlockOp, object: &Value, body: &Expr, scope: &Scope) -> Result<Value, EvalError> {
    let items = match object {
        Value::Null => return Ok(Value::Null),
        Value::Array(items) => items,
        other => {
            return Err(EvalError::NotACollection {
                method: op.name().to_string(),
                found: other.describe(),
            })
        }
    };

    let eval_in = |item: &Value| -> Result<Value, EvalError> {
        let inner = Scope {
            value: item,
            parent: Some(scope),
        };
        eval(body, &inner).map(Cow::into_owned)
    };
    let test_in = |item: &Value| -> Result<bool, EvalError> {
        let inner = Scope {
            value: item,
            parent: Some(scope),
        };
        eval(body, &inner).map(|result| result.truthy())
    };

    match op {
        BlockOp::Map => items
            .iter()
            .map(eval_in)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        BlockOp::Filter => {
            let mut kept = Vec::new();
            for item in items {
                if test_in(item)? {
                    kept.push(item.clone());
                }
            }
            Ok(Value::Array(kept))
        }
        BlockOp::Some => {
            for item in items {
                if test_in(item)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        BlockOp::Every => {
            for item in items {
                if !test_in(item)? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        BlockOp::Sorted => {
            let mut keyed = items
                .iter()
                .map(|item| eval_in(item).map(|key| (key, item)))
                .collect::<Result<Vec<_>, _>>()?;
            keyed.sort_by(|(a, _), (b, _)| compare_values(a, b).unwrap_or(Ordering::Equal));
            Ok(Value::Array(keyed.into_iter().map(|(_, item)| item.clone()).collect()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    #[test]
    fn test_map_sum() {
        let data = record(json!({"foo": [{"a": 1}, {"a": 3}]}));
        assert_eq!(evaluate("foo.map{a}.sum()", &data), Ok(Value::Number(4.0)));
    }

    #[test]
    fn test_arithmetic() {
        let data = record(json!({"a": 4, "b": 3}));
        assert_eq!(evaluate("a / 2", &data), Ok(Value::Number(2.0)));
        assert_eq!(evaluate("a * b - 2", &data), Ok(Value::Number(10.0)));
        assert_eq!(evaluate("-(a % b)", &data), Ok(Value::Number(-1.0)));
    }

    #[test]
    fn test_missing_path_is_null() {
        let data = record(json!({"a": {"b": 1}}));
        assert_eq!(evaluate("a.c", &data), Ok(Value::Null));
        assert_eq!(evaluate("x.y.z", &data), Ok(Value::Null));
        assert_eq!(evaluate("missing + 1", &data), Ok(Value::Null));
        assert_eq!(evaluate("missing.map{a}", &data), Ok(Value::Null));
    }

    #[test]
    fn test_nested_path() {
        let data = record(json!({"a": {"b": [10, 20, 30]}}));
        assert_eq!(evaluate("a.b.1", &data), Ok(Value::Number(20.0)));
        assert_eq!(evaluate("a.b[2]", &data), Ok(Value::Number(30.0)));
        assert_eq!(evaluate("a.b.length", &data), Ok(Value::Number(3.0)));
        assert_eq!(evaluate("a.b.9", &data), Ok(Value::Null));
    }

    #[test]
    fn test_collection_method_on_scalar_fails() {
        let data = record(json!({"foo": 5}));
        assert_eq!(
            evaluate("foo.sum()", &data),
            Err(EvalError::NotACollection {
                method: "sum".to_string(),
                found: "Number".to_string(),
            })
        );
        assert!(matches!(
            evaluate("foo.map{a}", &data),
            Err(EvalError::NotACollection { .. })
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let data = record(json!({"s": "x", "n": 1}));
        assert!(matches!(
            evaluate("s * n", &data),
            Err(EvalError::TypeMismatch { .. })
        ));
        assert_eq!(evaluate("s + 'y'", &data), Ok(Value::from("xy")));
    }

    #[test]
    fn test_aggregates() {
        let data = record(json!({"v": [3, 1, 2]}));
        assert_eq!(evaluate("v.min()", &data), Ok(Value::Number(1.0)));
        assert_eq!(evaluate("v.max()", &data), Ok(Value::Number(3.0)));
        assert_eq!(evaluate("v.average()", &data), Ok(Value::Number(2.0)));
        assert_eq!(evaluate("v.count()", &data), Ok(Value::Number(3.0)));
        assert_eq!(
            evaluate("v.reversed()", &data),
            Ok(record(json!([2, 1, 3])))
        );
        assert_eq!(evaluate("v.sorted{this}", &data), Ok(record(json!([1, 2, 3]))));
    }

    #[test]
    fn test_empty_aggregates() {
        let data = record(json!({"v": []}));
        assert_eq!(evaluate("v.sum()", &data), Ok(Value::Number(0.0)));
        assert_eq!(evaluate("v.average()", &data), Ok(Value::Null));
        assert_eq!(evaluate("v.max()", &data), Ok(Value::Null));
    }

    #[test]
    fn test_filter_some_every() {
        let data = record(json!({"v": [1, 5, 10]}));
        assert_eq!(evaluate("v.filter{this > 2}", &data), Ok(record(json!([5, 10]))));
        assert_eq!(evaluate("v.some{this == 5}", &data), Ok(Value::Bool(true)));
        assert_eq!(evaluate("v.every{this > 1}", &data), Ok(Value::Bool(false)));
    }

    #[test]
    fn test_parent_scope() {
        let data = record(json!({"scale": 10, "v": [{"a": 1}, {"a": 2}]}));
        assert_eq!(
            evaluate("v.map{a * ^scale}.sum()", &data),
            Ok(Value::Number(30.0))
        );
        assert_eq!(evaluate("^scale", &data), Ok(Value::Null));
    }

    #[test]
    fn test_flatten() {
        let data = record(json!({"v": [[1, 2], [3], 4]}));
        assert_eq!(evaluate("v.flatten().sum()", &data), Ok(Value::Number(10.0)));
    }

    #[test]
    fn test_logic_short_circuit() {
        let data = record(json!({"a": 0, "b": 7}));
        assert_eq!(evaluate("a || b", &data), Ok(Value::Number(7.0)));
        assert_eq!(evaluate("a && b.sum()", &data), Ok(Value::Number(0.0)));
    }

    #[test]
    fn test_paths_read_through_computed_values() {
        let data = record(json!({"rows": [{"p": {"q": 2}}, {"p": {"q": 5}}], "s": "abc"}));
        assert_eq!(evaluate("rows.reversed().0.p.q", &data), Ok(Value::Number(5.0)));
        assert_eq!(evaluate("rows.map{p}[1].q", &data), Ok(Value::Number(5.0)));
        assert_eq!(evaluate("rows.0.p.q + s.length", &data), Ok(Value::Number(5.0)));
        assert_eq!(evaluate("[s, s][1]", &data), Ok(Value::from("abc")));
        assert_eq!(evaluate("rows.0 || s", &data), Ok(record(json!({"p": {"q": 2}}))));
    }

    #[test]
    fn test_record_is_left_untouched() {
        let data = record(json!({"v": [3, 1, 2], "n": {"m": 1}}));
        let before = data.clone();
        assert_eq!(evaluate("v.sorted{this}.0", &data), Ok(Value::Number(1.0)));
        assert_eq!(evaluate("this", &data), Ok(before.clone()));
        assert_eq!(data, before);
    }

    #[test]
    fn test_parse_error_surfaces() {
        let data = record(json!({}));
        assert!(matches!(evaluate("a +", &data), Err(EvalError::Parse(_))));
    }
}
