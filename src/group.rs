//! A small group-by executor around [`AccumulatorStatement`].
//!
//! Each worker runs a [`GroupEvaluator`] over its own documents and hands
//! its partials to a merging evaluator, which combines them one at a time.

use std::collections::HashMap;

use log::debug;
use rayon::prelude::*;

use crate::accumulator::Accumulator;
use crate::algo::PartialState;
use crate::config::AccumulatorConfig;
use crate::error::Result;
use crate::expression::Expression;
use crate::statement::AccumulatorStatement;
use crate::value::{Document, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct GroupResult {
    pub key: Value,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupPartial {
    pub key: Value,
    pub partial: PartialState,
}

#[derive(Debug)]
struct Group {
    key: Value,
    acc: Box<dyn Accumulator>,
}

/// Groups in first-seen order, one accumulator per distinct key.
#[derive(Debug)]
pub struct GroupEvaluator<'a> {
    statement: &'a AccumulatorStatement,
    key: &'a Expression,
    config: &'a AccumulatorConfig,
    groups: Vec<Group>,
    index: HashMap<String, usize>,
}

impl<'a> GroupEvaluator<'a> {
    pub fn new(
        statement: &'a AccumulatorStatement,
        key: &'a Expression,
        config: &'a AccumulatorConfig,
    ) -> Self {
        Self {
            statement,
            key,
            config,
            groups: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    fn group_mut(&mut self, key: Value) -> Result<&mut dyn Accumulator> {
        let key = normalize_key(key);
        let canonical = key.to_json().to_string();
        let idx = match self.index.get(&canonical) {
            Some(idx) => *idx,
            None => {
                let acc = self.statement.create(None, self.config)?;
                self.groups.push(Group { key, acc });
                self.index.insert(canonical, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        Ok(self.groups[idx].acc.as_mut())
    }

    pub fn process(&mut self, doc: &Document) -> Result<()> {
        let key = self.key.evaluate(doc);
        let input = self.statement.input().evaluate(doc);
        self.group_mut(key)?.ingest(&input)
    }

    pub fn merge_partial(&mut self, key: Value, partial: &PartialState) -> Result<()> {
        self.group_mut(key)?.ingest_partial(partial)
    }

    pub fn finish(self) -> Vec<GroupResult> {
        self.groups
            .into_iter()
            .map(|mut g| GroupResult {
                value: g.acc.finalize(false).into_value().unwrap_or(Value::Null),
                key: g.key,
            })
            .collect()
    }

    pub fn into_partials(self) -> Vec<GroupPartial> {
        self.groups
            .into_iter()
            .filter_map(|mut g| {
                g.acc.finalize(true).into_partial().map(|partial| GroupPartial {
                    key: g.key,
                    partial,
                })
            })
            .collect()
    }
}

/// Missing keys group with null, and integral doubles with integers.
fn normalize_key(key: Value) -> Value {
    match key {
        Value::Missing => Value::Null,
        Value::Double(d) if d.fract() == 0.0 && d.abs() < (1u64 << 53) as f64 => {
            Value::Int(d as i64)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_key).collect()),
        Value::Object(doc) => Value::Object(
            doc.into_iter()
                .map(|(k, v)| (k, normalize_key(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Single-worker evaluation.
pub fn evaluate(
    docs: &[Document],
    statement: &AccumulatorStatement,
    key: &Expression,
    config: &AccumulatorConfig,
) -> Result<Vec<GroupResult>> {
    let mut evaluator = GroupEvaluator::new(statement, key, config);
    for doc in docs {
        evaluator.process(doc)?;
    }
    Ok(evaluator.finish())
}

/// Partial group-by of one partition, as a worker would send it.
pub fn partial_groups(
    docs: &[Document],
    statement: &AccumulatorStatement,
    key: &Expression,
    config: &AccumulatorConfig,
) -> Result<Vec<GroupPartial>> {
    let mut evaluator = GroupEvaluator::new(statement, key, config);
    for doc in docs {
        evaluator.process(doc)?;
    }
    Ok(evaluator.into_partials())
}

/// Evaluates every partition in parallel, then merges the partials
/// sequentially into one evaluator.
pub fn evaluate_partitioned(
    partitions: &[Vec<Document>],
    statement: &AccumulatorStatement,
    key: &Expression,
    config: &AccumulatorConfig,
) -> Result<Vec<GroupResult>> {
    let partials = partitions
        .par_iter()
        .map(|docs| partial_groups(docs, statement, key, config))
        .collect::<Result<Vec<_>>>()?;

    let mut merger = GroupEvaluator::new(statement, key, config);
    for (i, worker) in partials.into_iter().enumerate() {
        debug!("merging {} groups from partition {}", worker.len(), i);
        for p in worker {
            merger.merge_partial(p.key, &p.partial)?;
        }
    }
    Ok(merger.finish())
}
