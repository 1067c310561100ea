use std::fmt::Debug;
use std::mem::size_of;

use log::{debug, warn};

use crate::algo::{PartialState, PercentileAlgorithm};
use crate::config::AccumulatorConfig;
use crate::error::{AccumulatorError, Result};
use crate::memory::MemoryTracker;
use crate::method::{ensure_enabled, validate_fractions, PercentileMethod};
use crate::value::Value;

/// What `finalize` hands back: a user-visible value, or a partial for a
/// later merge phase.
#[derive(Debug, Clone, PartialEq)]
pub enum AccumulatorOutput {
    Value(Value),
    Partial(PartialState),
}

impl AccumulatorOutput {
    pub fn into_value(self) -> Option<Value> {
        match self {
            AccumulatorOutput::Value(v) => Some(v),
            AccumulatorOutput::Partial(_) => None,
        }
    }

    pub fn into_partial(self) -> Option<PartialState> {
        match self {
            AccumulatorOutput::Partial(p) => Some(p),
            AccumulatorOutput::Value(_) => None,
        }
    }
}

/// Per-group accumulator lifecycle driven by a group-by executor.
///
/// An instance is used by one thread at a time; nothing here blocks.
pub trait Accumulator: Debug + Send {
    /// Adds one input value. Non-numeric inputs and NaN are ignored.
    fn ingest(&mut self, input: &Value) -> Result<()>;

    /// Merges the partial of a peer accumulator for the same group.
    fn ingest_partial(&mut self, partial: &PartialState) -> Result<()>;

    fn finalize(&mut self, for_merge: bool) -> AccumulatorOutput;

    /// Drops all samples, keeping fractions and method.
    fn reset(&mut self);

    fn memory(&self) -> &MemoryTracker;
}

/// The `$percentile` accumulator.
#[derive(Debug)]
pub struct QuantileAccumulator {
    fractions: Vec<f64>,
    method: PercentileMethod,
    algo: PercentileAlgorithm,
    memory: MemoryTracker,
}

impl QuantileAccumulator {
    /// `memory_limit` overrides `config.max_memory_bytes` for this instance.
    pub fn new(
        fractions: Vec<f64>,
        method: PercentileMethod,
        memory_limit: Option<usize>,
        config: &AccumulatorConfig,
    ) -> Result<Self> {
        validate_fractions(&fractions)?;
        ensure_enabled(method, config)?;
        let mut acc = Self {
            fractions,
            method,
            algo: PercentileAlgorithm::with_max_centroids(
                method,
                config.approximate_max_centroids,
            ),
            memory: MemoryTracker::new(memory_limit.unwrap_or(config.max_memory_bytes)),
        };
        acc.memory.set(acc.footprint());
        Ok(acc)
    }

    pub fn fractions(&self) -> &[f64] {
        &self.fractions
    }

    pub fn method(&self) -> PercentileMethod {
        self.method
    }

    /// Number of samples incorporated so far, including merged partials.
    pub fn count(&self) -> u64 {
        self.algo.count()
    }

    fn footprint(&self) -> usize {
        size_of::<Self>() + self.algo.memory_usage_bytes()
    }

    fn update_memory(&mut self) -> Result<()> {
        self.memory.set(self.footprint());
        if self.memory.within_limit() {
            return Ok(());
        }
        let (used, limit) = (self.memory.current_bytes(), self.memory.max_allowed_bytes());
        warn!(
            "{} percentile accumulator over budget: {} > {} bytes",
            self.method, used, limit
        );
        Err(AccumulatorError::MemoryLimitExceeded { used, limit })
    }

    /// Computed percentiles in request order; empty before the first sample.
    fn compute(&mut self) -> Vec<f64> {
        self.algo.compute_percentiles(&self.fractions)
    }

    fn format_final(n_fractions: usize, pctls: Vec<f64>) -> Value {
        if pctls.is_empty() {
            return Value::Array(vec![Value::Null; n_fractions]);
        }
        Value::Array(pctls.into_iter().map(Value::Double).collect())
    }
}

impl Accumulator for QuantileAccumulator {
    fn ingest(&mut self, input: &Value) -> Result<()> {
        let Some(x) = input.as_percentile_input() else {
            return Ok(());
        };
        self.algo.incorporate(x);
        self.update_memory()
    }

    fn ingest_partial(&mut self, partial: &PartialState) -> Result<()> {
        debug!(
            "merging {} partial with {} samples",
            partial.method(),
            partial.count()
        );
        self.algo.combine(partial)?;
        // Merge-time state cannot spill either; exceeding the budget here is final.
        self.update_memory()
    }

    fn finalize(&mut self, for_merge: bool) -> AccumulatorOutput {
        if for_merge {
            return AccumulatorOutput::Partial(self.algo.serialize());
        }
        let pctls = self.compute();
        AccumulatorOutput::Value(Self::format_final(self.fractions.len(), pctls))
    }

    fn reset(&mut self) {
        debug!("resetting {} percentile accumulator", self.method);
        self.algo = self.algo.cleared();
        self.memory.set(self.footprint());
    }

    fn memory(&self) -> &MemoryTracker {
        &self.memory
    }
}

/// The `$median` accumulator: `$percentile` at 0.5 with a scalar result.
#[derive(Debug)]
pub struct MedianAccumulator {
    inner: QuantileAccumulator,
}

impl MedianAccumulator {
    pub fn new(
        method: PercentileMethod,
        memory_limit: Option<usize>,
        config: &AccumulatorConfig,
    ) -> Result<Self> {
        Ok(Self {
            inner: QuantileAccumulator::new(vec![0.5], method, memory_limit, config)?,
        })
    }

    pub fn method(&self) -> PercentileMethod {
        self.inner.method()
    }

    fn format_final(pctls: Vec<f64>) -> Value {
        if pctls.is_empty() {
            return Value::Null;
        }
        assert_eq!(
            pctls.len(),
            1,
            "the percentile method for median must return a single result"
        );
        Value::Double(pctls[0])
    }
}

impl Accumulator for MedianAccumulator {
    fn ingest(&mut self, input: &Value) -> Result<()> {
        self.inner.ingest(input)
    }

    fn ingest_partial(&mut self, partial: &PartialState) -> Result<()> {
        self.inner.ingest_partial(partial)
    }

    fn finalize(&mut self, for_merge: bool) -> AccumulatorOutput {
        // Only the final shape differs; partials are the percentile ones.
        if for_merge {
            return self.inner.finalize(true);
        }
        AccumulatorOutput::Value(Self::format_final(self.inner.compute()))
    }

    fn reset(&mut self) {
        self.inner.reset()
    }

    fn memory(&self) -> &MemoryTracker {
        self.inner.memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AccumulatorConfig {
        AccumulatorConfig::default()
    }

    fn percentile(ps: &[f64], method: PercentileMethod) -> QuantileAccumulator {
        QuantileAccumulator::new(ps.to_vec(), method, None, &config()).unwrap()
    }

    fn final_value(acc: &mut dyn Accumulator) -> Value {
        acc.finalize(false).into_value().unwrap()
    }

    fn doubles(xs: &[f64]) -> Value {
        Value::Array(xs.iter().map(|x| Value::Double(*x)).collect())
    }

    #[test]
    fn test_construction_validates() {
        let cfg = config();
        for ps in [vec![], vec![1.5], vec![-0.1], vec![0.5, f64::NAN]] {
            let err =
                QuantileAccumulator::new(ps, PercentileMethod::Approximate, None, &cfg).unwrap_err();
            assert!(matches!(err, AccumulatorError::InvalidSpecification(_)));
        }
        let closed = config().with_accurate_percentiles(false);
        let err = QuantileAccumulator::new(vec![0.5], PercentileMethod::Continuous, None, &closed)
            .unwrap_err();
        assert!(matches!(err, AccumulatorError::UnsupportedMethod(_)));
        assert!(MedianAccumulator::new(PercentileMethod::Approximate, None, &closed).is_ok());
    }

    #[test]
    fn test_non_numeric_inputs_yield_nulls() {
        for m in PercentileMethod::all_in_order() {
            let mut acc = percentile(&[0.1, 0.5, 0.5], *m);
            for v in [
                Value::Null,
                Value::Missing,
                Value::from("7"),
                Value::Bool(true),
                Value::Date(1_000),
                Value::Double(f64::NAN),
                Value::Array(vec![Value::Int(1)]),
            ] {
                acc.ingest(&v).unwrap();
            }
            assert_eq!(acc.count(), 0);
            assert_eq!(
                final_value(&mut acc),
                Value::Array(vec![Value::Null, Value::Null, Value::Null])
            );
        }
    }

    #[test]
    fn test_percentiles_in_request_order() {
        let mut acc = percentile(&[0.9, 0.1, 0.5, 0.5], PercentileMethod::Continuous);
        for v in [2i64, 0, 1] {
            acc.ingest(&Value::Int(v)).unwrap();
        }
        assert_eq!(final_value(&mut acc), doubles(&[1.8, 0.2, 1.0, 1.0]));
    }

    #[test]
    fn test_median_shapes() {
        for m in PercentileMethod::all_in_order() {
            let mut acc = MedianAccumulator::new(*m, None, &config()).unwrap();
            assert_eq!(final_value(&mut acc), Value::Null);
            for v in [5i64, 10, 27] {
                acc.ingest(&Value::Int(v)).unwrap();
            }
            assert_eq!(final_value(&mut acc), Value::Double(10.0), "method {}", m);
            assert_eq!(acc.method(), *m);
        }
    }

    #[test]
    fn test_median_partial_is_percentile_partial() {
        let cfg = config();
        let mut median = MedianAccumulator::new(PercentileMethod::Discrete, None, &cfg).unwrap();
        let mut pct = percentile(&[0.5], PercentileMethod::Discrete);
        for v in [3.0, 1.0] {
            median.ingest(&Value::Double(v)).unwrap();
            pct.ingest(&Value::Double(v)).unwrap();
        }
        assert_eq!(median.finalize(true), pct.finalize(true));
    }

    #[test]
    fn test_merge_partials() {
        let cfg = config();
        let mut merger = percentile(&[0.0, 0.5, 1.0], PercentileMethod::Discrete);
        for chunk in [[4.0, 8.0], [1.0, 6.0]] {
            let mut worker = percentile(&[0.0, 0.5, 1.0], PercentileMethod::Discrete);
            for v in chunk {
                worker.ingest(&Value::Double(v)).unwrap();
            }
            let partial = worker.finalize(true).into_partial().unwrap();
            merger.ingest_partial(&partial).unwrap();
        }
        assert_eq!(final_value(&mut merger), doubles(&[1.0, 4.0, 8.0]));

        let mut approx =
            QuantileAccumulator::new(vec![0.5], PercentileMethod::Approximate, None, &cfg).unwrap();
        let partial = merger.finalize(true).into_partial().unwrap();
        assert!(matches!(
            approx.ingest_partial(&partial),
            Err(AccumulatorError::IncompatiblePartial { .. })
        ));
    }

    #[test]
    fn test_memory_limit_is_terminal() {
        let limit = size_of::<QuantileAccumulator>() + 64 * size_of::<f64>();
        let mut acc = QuantileAccumulator::new(
            vec![0.5],
            PercentileMethod::Continuous,
            Some(limit),
            &config(),
        )
        .unwrap();
        let mut failure = None;
        for i in 0..10_000 {
            if let Err(e) = acc.ingest(&Value::Int(i)) {
                failure = Some(e);
                break;
            }
        }
        match failure {
            Some(AccumulatorError::MemoryLimitExceeded { used, limit: reported }) => {
                assert_eq!(used, acc.memory().current_bytes());
                assert_eq!(reported, acc.memory().max_allowed_bytes());
                assert_eq!(reported, limit);
                assert!(used > limit);
            }
            other => panic!("expected memory failure, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_respects_memory_limit() {
        let cfg = config();
        let mut worker = percentile(&[0.5], PercentileMethod::Discrete);
        for i in 0..1_000 {
            worker.ingest(&Value::Int(i)).unwrap();
        }
        let partial = worker.finalize(true).into_partial().unwrap();
        let small = size_of::<QuantileAccumulator>() + 100;
        let mut merger =
            QuantileAccumulator::new(vec![0.5], PercentileMethod::Discrete, Some(small), &cfg)
                .unwrap();
        assert!(matches!(
            merger.ingest_partial(&partial),
            Err(AccumulatorError::MemoryLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_reset_discards_samples() {
        let mut acc = percentile(&[0.5], PercentileMethod::Continuous);
        let empty = acc.memory().current_bytes();
        for i in 0..100 {
            acc.ingest(&Value::Int(i)).unwrap();
        }
        assert!(acc.memory().current_bytes() > empty);
        acc.reset();
        assert_eq!(acc.memory().current_bytes(), empty);
        assert_eq!(final_value(&mut acc), Value::Array(vec![Value::Null]));
        acc.ingest(&Value::Int(3)).unwrap();
        assert_eq!(final_value(&mut acc), doubles(&[3.0]));
        assert_eq!(acc.method(), PercentileMethod::Continuous);
        assert_eq!(acc.fractions(), &[0.5]);
    }

    #[test]
    fn test_configured_compression_reaches_the_sketch() {
        let centroids = |cfg: &AccumulatorConfig| {
            let mut acc =
                QuantileAccumulator::new(vec![0.5], PercentileMethod::Approximate, None, cfg)
                    .unwrap();
            for i in 0..20_000 {
                acc.ingest(&Value::Int(i)).unwrap();
            }
            acc.reset();
            for i in 0..20_000 {
                acc.ingest(&Value::Int(i)).unwrap();
            }
            match acc.finalize(true).into_partial() {
                Some(PartialState::Approximate(s)) => s.centroids.len(),
                other => panic!("unexpected {:?}", other),
            }
        };
        let coarse = centroids(&config().with_approximate_max_centroids(25));
        let fine = centroids(&config());
        assert!(coarse <= 25, "{}", coarse);
        assert!(coarse < fine, "{} vs {}", coarse, fine);
    }

    #[test]
    fn test_infinite_samples_through_the_sketch() {
        let mut acc = percentile(&[0.0, 0.5, 0.9, 1.0], PercentileMethod::Approximate);
        for i in 0..2_000 {
            acc.ingest(&Value::Int(i)).unwrap();
        }
        for _ in 0..500 {
            acc.ingest(&Value::Double(f64::INFINITY)).unwrap();
        }
        let Value::Array(out) = final_value(&mut acc) else {
            panic!("expected an array");
        };
        let out: Vec<f64> = out.iter().map(|v| v.as_f64().unwrap()).collect();
        assert_eq!(out[0], 0.0);
        assert!(out[1].is_finite());
        assert_eq!(&out[2..], &[f64::INFINITY, f64::INFINITY]);
    }
}
