use std::collections::BTreeMap;
use std::fmt;

use serde_json::{json, Map, Number};

pub type Document = BTreeMap<String, Value>;

/// A document value as handed over by the query layer.
///
/// `Missing` stands for a field that is absent from the document, which is
/// distinct from an explicit `Null`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Missing,
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    Array(Vec<Value>),
    Object(Document),
}

impl Value {
    pub fn numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Double(_))
    }

    pub fn nullish(&self) -> bool {
        matches!(self, Value::Missing | Value::Null)
    }

    /// The double a percentile accumulator should incorporate, if any.
    ///
    /// Only integers and doubles qualify, and NaN is dropped like any other
    /// non-numeric input.
    pub fn as_percentile_input(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Double(d) if !d.is_nan() => Some(*d),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Missing => "missing",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Converts relaxed extended JSON: `{"$date": ms}`, `{"$numberDouble": "NaN"}`,
    /// `{"$numberLong": "..."}` and `{"$numberInt": "..."}` are recognized,
    /// everything else maps structurally.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                if let Some(v) = from_extended_json(map) {
                    return v;
                }
                Value::Object(
                    map.iter()
                        .map(|(k, v)| (k.clone(), Value::from_json(v)))
                        .collect(),
                )
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Missing | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => json!(b),
            Value::Int(i) => json!(i),
            Value::Double(d) => match Number::from_f64(*d) {
                Some(n) => serde_json::Value::Number(n),
                None => json!({ "$numberDouble": non_finite_name(*d) }),
            },
            Value::String(s) => json!(s),
            Value::Date(ms) => json!({ "$date": ms }),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(doc) => serde_json::Value::Object(
                doc.iter()
                    .filter(|(_, v)| !matches!(v, Value::Missing))
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

fn from_extended_json(map: &Map<String, serde_json::Value>) -> Option<Value> {
    if map.len() != 1 {
        return None;
    }
    let (key, inner) = map.iter().next()?;
    match (key.as_str(), inner) {
        ("$date", serde_json::Value::Number(n)) => n.as_i64().map(Value::Date),
        ("$date", serde_json::Value::Object(o)) => match o.get("$numberLong") {
            Some(serde_json::Value::String(s)) => s.parse().ok().map(Value::Date),
            _ => None,
        },
        ("$numberDouble", serde_json::Value::String(s)) => parse_double(s).map(Value::Double),
        ("$numberLong", serde_json::Value::String(s))
        | ("$numberInt", serde_json::Value::String(s)) => s.parse().ok().map(Value::Int),
        _ => None,
    }
}

pub(crate) fn parse_double(s: &str) -> Option<f64> {
    match s {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        other => other.parse().ok(),
    }
}

pub(crate) fn non_finite_name(d: f64) -> &'static str {
    if d.is_nan() {
        "NaN"
    } else if d > 0.0 {
        "Infinity"
    } else {
        "-Infinity"
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => write!(f, "missing"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Date(ms) => write!(f, "Date({})", ms),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Object(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

/// Builds a [`Document`] from a JSON object; non-objects yield `None`.
pub fn document_from_json(json: &serde_json::Value) -> Option<Document> {
    match Value::from_json(json) {
        Value::Object(doc) => Some(doc),
        _ => None,
    }
}
