//! Declarative accumulator statements.
//!
//! ```text
//! { "$percentile": { "p": <fractions>, "input": <expr>, "method": <name> } }
//! { "$median":     {                   "input": <expr>, "method": <name> } }
//! ```

use std::fmt;

use serde_json::{json, Map};

use crate::accumulator::{Accumulator, MedianAccumulator, QuantileAccumulator};
use crate::config::AccumulatorConfig;
use crate::error::{AccumulatorError, Result};
use crate::expression::{Expression, Variables};
use crate::method::{parse_fractions, resolve_method, PercentileMethod};
use crate::value::{Document, Value};

const P_FIELD: &str = "p";
const INPUT_FIELD: &str = "input";
const METHOD_FIELD: &str = "method";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccumulatorOp {
    Percentile,
    Median,
}

impl AccumulatorOp {
    pub fn name(self) -> &'static str {
        match self {
            AccumulatorOp::Percentile => "$percentile",
            AccumulatorOp::Median => "$median",
        }
    }

    fn from_name(name: &str) -> Option<AccumulatorOp> {
        match name {
            "$percentile" => Some(AccumulatorOp::Percentile),
            "$median" => Some(AccumulatorOp::Median),
            _ => None,
        }
    }

    fn allowed_fields(self) -> &'static [&'static str] {
        match self {
            AccumulatorOp::Percentile => &[P_FIELD, INPUT_FIELD, METHOD_FIELD],
            AccumulatorOp::Median => &[INPUT_FIELD, METHOD_FIELD],
        }
    }
}

impl fmt::Display for AccumulatorOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A validated `$percentile` or `$median` statement, ready to stamp out
/// accumulators for every group.
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulatorStatement {
    op: AccumulatorOp,
    fractions: Vec<f64>,
    input: Expression,
    method: PercentileMethod,
}

impl AccumulatorStatement {
    /// Parses `{ "$percentile": {...} }` or `{ "$median": {...} }`.
    pub fn parse(
        json: &serde_json::Value,
        vars: &Variables,
        config: &AccumulatorConfig,
    ) -> Result<Self> {
        let op_and_args = json
            .as_object()
            .filter(|obj| obj.len() == 1)
            .and_then(|obj| obj.iter().next())
            .and_then(|(name, args)| AccumulatorOp::from_name(name).map(|op| (op, args)));
        match op_and_args {
            Some((op, args)) => Self::parse_args(op, args, vars, config),
            None => Err(AccumulatorError::invalid(format!(
                "expected a single $percentile or $median field; found {}",
                json
            ))),
        }
    }

    pub fn parse_args(
        op: AccumulatorOp,
        args: &serde_json::Value,
        vars: &Variables,
        config: &AccumulatorConfig,
    ) -> Result<Self> {
        let Some(spec) = args.as_object() else {
            return Err(AccumulatorError::invalid(format!(
                "specification must be an object; found {}",
                args
            )));
        };
        if let Some(unknown) = spec
            .keys()
            .find(|k| !op.allowed_fields().contains(&k.as_str()))
        {
            return Err(AccumulatorError::invalid(format!(
                "{} found an unknown argument: {}",
                op, unknown
            )));
        }

        let input = Expression::parse(required(op, spec, INPUT_FIELD)?, vars)?.optimize(vars)?;

        let method = match required(op, spec, METHOD_FIELD)? {
            serde_json::Value::String(name) => resolve_method(name, config)?,
            other => {
                return Err(AccumulatorError::invalid(format!(
                    "{} 'method' must be a string, but found: {}",
                    op, other
                )))
            }
        };

        let fractions = match op {
            AccumulatorOp::Percentile => {
                let p = Expression::parse(required(op, spec, P_FIELD)?, vars)?.optimize(vars)?;
                parse_fractions(&p)?
            }
            AccumulatorOp::Median => vec![0.5],
        };

        Ok(Self {
            op,
            fractions,
            input,
            method,
        })
    }

    pub fn op(&self) -> AccumulatorOp {
        self.op
    }

    pub fn fractions(&self) -> &[f64] {
        &self.fractions
    }

    pub fn input(&self) -> &Expression {
        &self.input
    }

    pub fn method(&self) -> PercentileMethod {
        self.method
    }

    /// Builds a fresh accumulator for one group.
    pub fn create(
        &self,
        memory_limit: Option<usize>,
        config: &AccumulatorConfig,
    ) -> Result<Box<dyn Accumulator>> {
        Ok(match self.op {
            AccumulatorOp::Percentile => Box::new(QuantileAccumulator::new(
                self.fractions.clone(),
                self.method,
                memory_limit,
                config,
            )?),
            AccumulatorOp::Median => {
                Box::new(MedianAccumulator::new(self.method, memory_limit, config)?)
            }
        })
    }

    /// Evaluates the statement as an expression over one document.
    ///
    /// An array-valued `input` contributes each of its elements, anything
    /// else contributes itself; non-numeric values are ignored as usual.
    pub fn evaluate_expression(&self, doc: &Document, config: &AccumulatorConfig) -> Result<Value> {
        let mut acc = self.create(None, config)?;
        match self.input.evaluate(doc) {
            Value::Array(items) => {
                for item in &items {
                    acc.ingest(item)?;
                }
            }
            scalar => acc.ingest(&scalar)?,
        }
        Ok(acc.finalize(false).into_value().unwrap_or(Value::Null))
    }

    /// The statement in its declarative form; `$median` omits `p`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut args = Map::new();
        args.insert(INPUT_FIELD.to_string(), self.input.to_json());
        if self.op == AccumulatorOp::Percentile {
            args.insert(P_FIELD.to_string(), json!(self.fractions));
        }
        args.insert(METHOD_FIELD.to_string(), json!(self.method.name()));
        json!({ self.op.name(): args })
    }
}

fn required<'a>(
    op: AccumulatorOp,
    spec: &'a Map<String, serde_json::Value>,
    field: &str,
) -> Result<&'a serde_json::Value> {
    spec.get(field).ok_or_else(|| {
        AccumulatorError::invalid(format!("{} requires the '{}' field", op, field))
    })
}
