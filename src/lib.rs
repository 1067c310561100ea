//! Streaming percentile accumulators.
//!
//! A [`QuantileAccumulator`] ingests the values of one group and reports the
//! requested percentiles with one of three methods:
//!
//! - `approximate`: a t-digest with bounded memory,
//! - `discrete`: exact nearest-rank percentile,
//! - `continuous`: exact, linearly interpolated percentile.
//!
//! Accumulators can run as independent partials on several workers; each
//! partial is serialized with `finalize(true)` and folded into a merging
//! accumulator with `ingest_partial`.
//!
//! ```rust
//! use percentile_accum::{Accumulator, AccumulatorConfig, PercentileMethod, QuantileAccumulator, Value};
//!
//! let config = AccumulatorConfig::default();
//! let mut acc =
//!     QuantileAccumulator::new(vec![0.5, 0.9], PercentileMethod::Continuous, None, &config).unwrap();
//! for v in [0, 1, 2] {
//!     acc.ingest(&Value::Int(v)).unwrap();
//! }
//! let out = acc.finalize(false).into_value().unwrap();
//! assert_eq!(out, Value::Array(vec![Value::Double(1.0), Value::Double(1.8)]));
//! ```

pub mod accumulator;
pub mod algo;
pub mod config;
pub mod error;
pub mod expression;
pub mod group;
pub mod memory;
pub mod method;
pub mod statement;
pub mod value;

pub use accumulator::{Accumulator, AccumulatorOutput, MedianAccumulator, QuantileAccumulator};
pub use algo::{PartialState, PercentileAlgorithm};
pub use config::AccumulatorConfig;
pub use error::{AccumulatorError, Result};
pub use expression::{Expression, Variables};
pub use memory::MemoryTracker;
pub use method::{resolve_method, PercentileMethod};
pub use statement::{AccumulatorOp, AccumulatorStatement};
pub use value::{Document, Value};
