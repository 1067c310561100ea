//! Percentile algorithms.
//!
//! - [`ApproximateSketch`]: bounded-memory t-digest, approximate merge.
//! - [`DiscretePercentile`]: retains samples, nearest-rank result.
//! - [`ContinuousPercentile`]: retains samples, interpolated result.
//!
//! All three are mergeable; [`PercentileAlgorithm::combine`] accepts the
//! [`PartialState`] produced by [`PercentileAlgorithm::serialize`] of the same
//! method.

mod approximate;
mod exact;
mod partial;

pub use approximate::{ApproximateSketch, DEFAULT_MAX_CENTROIDS};
pub use exact::{ContinuousPercentile, DiscretePercentile};
pub use partial::{CentroidState, ExactPartial, PartialState, SketchPartial};

use crate::error::{AccumulatorError, Result};
use crate::method::PercentileMethod;

#[derive(Debug, Clone)]
pub enum PercentileAlgorithm {
    Approximate(ApproximateSketch),
    Discrete(DiscretePercentile),
    Continuous(ContinuousPercentile),
}

impl PercentileAlgorithm {
    pub fn new(method: PercentileMethod) -> Self {
        Self::with_max_centroids(method, DEFAULT_MAX_CENTROIDS)
    }

    /// `max_centroids` only affects the approximate sketch.
    pub fn with_max_centroids(method: PercentileMethod, max_centroids: usize) -> Self {
        match method {
            PercentileMethod::Approximate => {
                PercentileAlgorithm::Approximate(ApproximateSketch::new(max_centroids))
            }
            PercentileMethod::Discrete => PercentileAlgorithm::Discrete(DiscretePercentile::new()),
            PercentileMethod::Continuous => {
                PercentileAlgorithm::Continuous(ContinuousPercentile::new())
            }
        }
    }

    /// An empty algorithm of the same method and compression.
    pub fn cleared(&self) -> Self {
        match self {
            PercentileAlgorithm::Approximate(a) => {
                PercentileAlgorithm::Approximate(ApproximateSketch::new(a.max_centroids()))
            }
            other => PercentileAlgorithm::new(other.method()),
        }
    }

    pub fn method(&self) -> PercentileMethod {
        match self {
            PercentileAlgorithm::Approximate(_) => PercentileMethod::Approximate,
            PercentileAlgorithm::Discrete(_) => PercentileMethod::Discrete,
            PercentileAlgorithm::Continuous(_) => PercentileMethod::Continuous,
        }
    }

    /// Number of samples incorporated, directly or through merged partials.
    pub fn count(&self) -> u64 {
        match self {
            PercentileAlgorithm::Approximate(a) => a.count(),
            PercentileAlgorithm::Discrete(d) => d.count(),
            PercentileAlgorithm::Continuous(c) => c.count(),
        }
    }

    pub fn incorporate(&mut self, x: f64) {
        match self {
            PercentileAlgorithm::Approximate(a) => a.incorporate(x),
            PercentileAlgorithm::Discrete(d) => d.incorporate(x),
            PercentileAlgorithm::Continuous(c) => c.incorporate(x),
        }
    }

    /// One result per fraction, in request order; empty when no sample was seen.
    pub fn compute_percentiles(&mut self, ps: &[f64]) -> Vec<f64> {
        match self {
            PercentileAlgorithm::Approximate(a) => a.compute_percentiles(ps),
            PercentileAlgorithm::Discrete(d) => d.compute_percentiles(ps),
            PercentileAlgorithm::Continuous(c) => c.compute_percentiles(ps),
        }
    }

    pub fn combine(&mut self, partial: &PartialState) -> Result<()> {
        match (self, partial) {
            (PercentileAlgorithm::Approximate(a), PartialState::Approximate(p)) => a.combine(p),
            (PercentileAlgorithm::Discrete(d), PartialState::Discrete(p)) => d.combine(p),
            (PercentileAlgorithm::Continuous(c), PartialState::Continuous(p)) => c.combine(p),
            (algo, partial) => {
                return Err(AccumulatorError::IncompatiblePartial {
                    expected: algo.method().name(),
                    found: partial.method().name(),
                })
            }
        }
        Ok(())
    }

    pub fn serialize(&self) -> PartialState {
        match self {
            PercentileAlgorithm::Approximate(a) => PartialState::Approximate(a.serialize()),
            PercentileAlgorithm::Discrete(d) => PartialState::Discrete(d.serialize()),
            PercentileAlgorithm::Continuous(c) => PartialState::Continuous(c.serialize()),
        }
    }

    /// Heap bytes owned by the algorithm.
    pub fn memory_usage_bytes(&self) -> usize {
        match self {
            PercentileAlgorithm::Approximate(a) => a.memory_usage_bytes(),
            PercentileAlgorithm::Discrete(d) => d.memory_usage_bytes(),
            PercentileAlgorithm::Continuous(c) => c.memory_usage_bytes(),
        }
    }
}
