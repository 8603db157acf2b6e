// Record values and the runtime kinds used for column type inference

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// A single datum, or a field of one.
///
/// Records are supplied from outside and never mutated by columns. "Undefined"
/// is not a variant: APIs that can produce it return `Option<Value>` instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

/// Runtime class of a non-null value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValueKind {
    Number,
    Date,
    String,
    Boolean,
    Array,
    Object,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Number => "Number",
            ValueKind::Date => "Date",
            ValueKind::String => "String",
            ValueKind::Boolean => "Boolean",
            ValueKind::Array => "Array",
            ValueKind::Object => "Object",
        };
        f.write_str(name)
    }
}

impl Value {
    /// Build an object record from key/value pairs.
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueKind::Boolean),
            Value::Number(_) => Some(ValueKind::Number),
            Value::String(_) => Some(ValueKind::String),
            Value::Date(_) => Some(ValueKind::Date),
            Value::Array(_) => Some(ValueKind::Array),
            Value::Object(_) => Some(ValueKind::Object),
        }
    }

    /// Name used in error messages.
    pub fn describe(&self) -> String {
        match self.kind() {
            Some(kind) => kind.to_string(),
            None => "null".to_string(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Date(d) => Some(d.timestamp_millis() as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Membership test for a key, distinct from reading it.
    pub fn has_key(&self, key: &str) -> bool {
        match self {
            Value::Object(map) => map.contains_key(key),
            _ => false,
        }
    }

    /// Read a key off an object. `None` when the key is absent or the value
    /// is not an object.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(key),
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Date(_) | Value::Array(_) | Value::Object(_) => true,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// Natural ordering used by `min`/`max`.
///
/// Numbers, booleans and dates order numerically (dates by epoch millis),
/// strings lexically. Everything else, including NaN and mixed
/// string/number pairs, is incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::String(_), _) | (_, Value::String(_)) => None,
        _ => {
            let x = a.as_f64()?;
            let y = b.as_f64()?;
            x.partial_cmp(&y)
        }
    }
}

/// Comparable values fall into classes that never compare with each other.
/// Numeric values (numbers, booleans, dates) rank before strings.
fn class_rank(value: &Value) -> Option<u8> {
    match value {
        Value::String(_) => Some(1),
        Value::Number(n) if n.is_nan() => None,
        Value::Number(_) | Value::Bool(_) | Value::Date(_) => Some(0),
        _ => None,
    }
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Number(_) => 0,
        Value::Bool(_) => 1,
        Value::Date(_) => 2,
        _ => 3,
    }
}

/// True when `candidate` should replace `current` as the extreme.
///
/// A total preorder: the lower class wins, then `wanted` ordering inside the
/// class, then kind, then full date precision. The result of a fold is
/// therefore the same whatever order the values arrive in.
fn beats(candidate: &Value, current: &Value, wanted: Ordering) -> bool {
    let (Some(a), Some(b)) = (class_rank(candidate), class_rank(current)) else {
        return false;
    };
    if a != b {
        return a < b;
    }
    match compare_values(candidate, current) {
        Some(Ordering::Equal) | None => {}
        Some(ordering) => return ordering == wanted,
    }
    match kind_rank(candidate).cmp(&kind_rank(current)) {
        Ordering::Equal => {}
        ordering => return ordering == Ordering::Less,
    }
    match (candidate, current) {
        (Value::Date(x), Value::Date(y)) => x.cmp(y) == wanted,
        _ => false,
    }
}

fn extreme<'a, I>(values: I, wanted: Ordering) -> Option<&'a Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut best: Option<&Value> = None;
    for value in values {
        if class_rank(value).is_none() {
            continue;
        }
        best = match best {
            Some(current) if !beats(value, current, wanted) => Some(current),
            _ => Some(value),
        };
    }
    best
}

/// Smallest value. Nulls, NaN, arrays and objects are skipped; when both
/// numeric values and strings are present the numeric minimum wins.
pub fn min_value<'a, I>(values: I) -> Option<&'a Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    extreme(values, Ordering::Less)
}

/// Largest value. Nulls, NaN, arrays and objects are skipped; when both
/// numeric values and strings are present the numeric maximum wins.
pub fn max_value<'a, I>(values: I) -> Option<&'a Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    extreme(values, Ordering::Greater)
}
