//! Expressions used as accumulator operands.
//!
//! Only the subset needed to feed an accumulator is supported: constants,
//! field paths (`"$a.b"`), bound variables (`"$$name"`), array literals and
//! `$concatArrays`. The tree is owned by whoever parsed it; `optimize`
//! consumes it and folds everything that is known at plan time.

use std::collections::HashMap;

use serde_json::json;

use crate::error::{AccumulatorError, Result};
use crate::value::{Document, Value};

/// Plan-time variable bindings, e.g. from an enclosing `let`.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    bound: HashMap<String, Value>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: impl Into<String>, value: Value) -> Self {
        self.bound.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bound.get(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Constant(Value),
    FieldPath(Vec<String>),
    Variable(String),
    Array(Vec<Expression>),
    ConcatArrays(Vec<Expression>),
}

impl Expression {
    pub fn field_path(path: &str) -> Result<Expression> {
        let path = path.strip_prefix('$').unwrap_or(path);
        if path.is_empty() || path.starts_with('$') {
            return Err(AccumulatorError::invalid(format!(
                "invalid field path '{}'",
                path
            )));
        }
        let parts: Vec<String> = path.split('.').map(str::to_string).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(AccumulatorError::invalid(
                "FieldPath field names may not be empty strings.",
            ));
        }
        Ok(Expression::FieldPath(parts))
    }

    pub fn parse(json: &serde_json::Value, vars: &Variables) -> Result<Expression> {
        match json {
            serde_json::Value::String(s) => {
                if let Some(name) = s.strip_prefix("$$") {
                    if vars.get(name).is_none() {
                        return Err(AccumulatorError::invalid(format!(
                            "Use of undefined variable: {}",
                            name
                        )));
                    }
                    Ok(Expression::Variable(name.to_string()))
                } else if s.starts_with('$') {
                    Expression::field_path(s)
                } else {
                    Ok(Expression::Constant(Value::String(s.clone())))
                }
            }
            serde_json::Value::Array(items) => Ok(Expression::Array(
                items
                    .iter()
                    .map(|item| Expression::parse(item, vars))
                    .collect::<Result<_>>()?,
            )),
            serde_json::Value::Object(map) if map.len() == 1 => match map.iter().next() {
                Some((op, arg)) => parse_operator(op, arg, json, vars),
                None => Ok(Expression::Constant(Value::from_json(json))),
            },
            other => Ok(Expression::Constant(Value::from_json(other))),
        }
    }

    /// Folds constant sub-trees and substitutes bound variables.
    pub fn optimize(self, vars: &Variables) -> Result<Expression> {
        match self {
            Expression::Variable(name) => match vars.get(&name) {
                Some(v) => Ok(Expression::Constant(v.clone())),
                None => Err(AccumulatorError::invalid(format!(
                    "Use of undefined variable: {}",
                    name
                ))),
            },
            Expression::Array(items) => {
                let items = items
                    .into_iter()
                    .map(|e| e.optimize(vars))
                    .collect::<Result<Vec<_>>>()?;
                match all_constant(&items) {
                    Some(values) => Ok(Expression::Constant(Value::Array(
                        values.into_iter().map(missing_to_null).collect(),
                    ))),
                    None => Ok(Expression::Array(items)),
                }
            }
            Expression::ConcatArrays(items) => {
                let items = items
                    .into_iter()
                    .map(|e| e.optimize(vars))
                    .collect::<Result<Vec<_>>>()?;
                match all_constant(&items) {
                    Some(values) => Ok(Expression::Constant(concat_arrays(values)?)),
                    None => Ok(Expression::ConcatArrays(items)),
                }
            }
            other => Ok(other),
        }
    }

    pub fn as_constant(&self) -> Option<&Value> {
        match self {
            Expression::Constant(v) => Some(v),
            _ => None,
        }
    }

    pub fn evaluate(&self, doc: &Document) -> Value {
        match self {
            Expression::Constant(v) => v.clone(),
            Expression::FieldPath(parts) => lookup(doc, parts),
            // Variables are folded away by `optimize`.
            Expression::Variable(_) => Value::Missing,
            Expression::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|e| missing_to_null(e.evaluate(doc)))
                    .collect(),
            ),
            Expression::ConcatArrays(items) => {
                concat_arrays(items.iter().map(|e| e.evaluate(doc)).collect())
                    .unwrap_or(Value::Null)
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Expression::Constant(v @ (Value::String(_) | Value::Array(_) | Value::Object(_))) => {
                json!({ "$literal": v.to_json() })
            }
            Expression::Constant(v) => v.to_json(),
            Expression::FieldPath(parts) => json!(format!("${}", parts.join("."))),
            Expression::Variable(name) => json!(format!("$${}", name)),
            Expression::Array(items) => {
                serde_json::Value::Array(items.iter().map(Expression::to_json).collect())
            }
            Expression::ConcatArrays(items) => json!({
                "$concatArrays": items.iter().map(Expression::to_json).collect::<Vec<_>>()
            }),
        }
    }
}

fn parse_operator(
    op: &str,
    arg: &serde_json::Value,
    whole: &serde_json::Value,
    vars: &Variables,
) -> Result<Expression> {
    match op {
        "$literal" => Ok(Expression::Constant(Value::from_json(arg))),
        "$concatArrays" => {
            let operands = match arg {
                serde_json::Value::Array(items) => items
                    .iter()
                    .map(|item| Expression::parse(item, vars))
                    .collect::<Result<_>>()?,
                other => vec![Expression::parse(other, vars)?],
            };
            Ok(Expression::ConcatArrays(operands))
        }
        "$date" | "$numberDouble" | "$numberLong" | "$numberInt" => {
            Ok(Expression::Constant(Value::from_json(whole)))
        }
        other if other.starts_with('$') => Err(AccumulatorError::invalid(format!(
            "Unrecognized expression '{}'",
            other
        ))),
        _ => Ok(Expression::Constant(Value::from_json(whole))),
    }
}

fn all_constant(items: &[Expression]) -> Option<Vec<Value>> {
    items.iter().map(|e| e.as_constant().cloned()).collect()
}

fn missing_to_null(v: Value) -> Value {
    match v {
        Value::Missing => Value::Null,
        other => other,
    }
}

fn concat_arrays(operands: Vec<Value>) -> Result<Value> {
    let mut out = Vec::new();
    for operand in operands {
        match operand {
            Value::Array(items) => out.extend(items),
            v if v.nullish() => return Ok(Value::Null),
            v => {
                return Err(AccumulatorError::invalid(format!(
                    "$concatArrays only supports arrays, not {}",
                    v.type_name()
                )))
            }
        }
    }
    Ok(Value::Array(out))
}

fn lookup(doc: &Document, parts: &[String]) -> Value {
    let Some((head, rest)) = parts.split_first() else {
        return Value::Missing;
    };
    match doc.get(head) {
        None => Value::Missing,
        Some(v) if rest.is_empty() => v.clone(),
        Some(v) => descend(v, rest),
    }
}

fn descend(value: &Value, parts: &[String]) -> Value {
    match value {
        Value::Object(doc) => lookup(doc, parts),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| descend(item, parts))
                .filter(|v| !matches!(v, Value::Missing))
                .collect(),
        ),
        _ => Value::Missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::document_from_json;

    fn parse_opt(json: serde_json::Value, vars: &Variables) -> Result<Expression> {
        Expression::parse(&json, vars)?.optimize(vars)
    }

    #[test]
    fn test_field_path_evaluation() {
        let doc = document_from_json(&json!({"a": {"b": 4}, "c": [{"d": 1}, {"d": 2}, {}]}))
            .unwrap();
        let vars = Variables::new();
        let e = parse_opt(json!("$a.b"), &vars).unwrap();
        assert_eq!(e.evaluate(&doc), Value::Int(4));
        let e = parse_opt(json!("$a.z"), &vars).unwrap();
        assert_eq!(e.evaluate(&doc), Value::Missing);
        let e = parse_opt(json!("$c.d"), &vars).unwrap();
        assert_eq!(
            e.evaluate(&doc),
            Value::Array(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn test_constant_folding_with_variables() {
        let vars = Variables::new().bind(
            "extra",
            Value::Array(vec![Value::Double(0.9)]),
        );
        let e = parse_opt(json!({"$concatArrays": [[0.1, 0.5], "$$extra"]}), &vars).unwrap();
        assert_eq!(
            e,
            Expression::Constant(Value::Array(vec![
                Value::Double(0.1),
                Value::Double(0.5),
                Value::Double(0.9)
            ]))
        );
    }

    #[test]
    fn test_field_path_blocks_folding() {
        let vars = Variables::new();
        let e = parse_opt(json!([0.5, "$x"]), &vars).unwrap();
        assert!(e.as_constant().is_none());
        let doc = document_from_json(&json!({"x": 0.2})).unwrap();
        assert_eq!(
            e.evaluate(&doc),
            Value::Array(vec![Value::Double(0.5), Value::Double(0.2)])
        );
    }

    #[test]
    fn test_parse_errors() {
        let vars = Variables::new();
        assert!(Expression::parse(&json!("$$nope"), &vars).is_err());
        assert!(Expression::parse(&json!({"$sum": [1, 2]}), &vars).is_err());
        assert!(Expression::parse(&json!("$a..b"), &vars).is_err());
        let err = parse_opt(json!({"$concatArrays": [[1], 2]}), &vars).unwrap_err();
        assert!(err.is_specification_error());
    }

    #[test]
    fn test_concat_with_null_is_null() {
        let vars = Variables::new();
        let e = parse_opt(json!({"$concatArrays": [[1], null]}), &vars).unwrap();
        assert_eq!(e, Expression::Constant(Value::Null));
    }

    #[test]
    fn test_to_json_round_trip() {
        let vars = Variables::new().bind("v", Value::Int(1));
        for src in [json!("$a.b"), json!("$$v"), json!({"$concatArrays": ["$a", [1, 2]]})] {
            let e = Expression::parse(&src, &vars).unwrap();
            assert_eq!(Expression::parse(&e.to_json(), &vars).unwrap(), e);
        }
    }
}
