//! Mergeable snapshots exchanged between partial and merging accumulators.
//!
//! JSON has no spelling for non-finite doubles. Exact samples are written as
//! numbers when finite and as `"Infinity"`/`"-Infinity"` otherwise; sketches
//! keep infinite samples out of their centroids and send them as two counts.

use serde::{Deserialize, Serialize};

use crate::error::{AccumulatorError, Result};
use crate::method::PercentileMethod;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum PartialState {
    Approximate(SketchPartial),
    Discrete(ExactPartial),
    Continuous(ExactPartial),
}

/// A compressed digest over the finite samples, centroids sorted by mean.
/// `count` includes the infinite samples tallied in `neg_inf` and `pos_inf`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SketchPartial {
    pub count: u64,
    #[serde(default)]
    pub neg_inf: u64,
    #[serde(default)]
    pub pos_inf: u64,
    pub centroids: Vec<CentroidState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CentroidState {
    pub mean: f64,
    pub weight: f64,
}

/// Every retained sample, in no particular order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExactPartial {
    #[serde(with = "float_vec")]
    pub values: Vec<f64>,
}

impl PartialState {
    pub fn method(&self) -> PercentileMethod {
        match self {
            PartialState::Approximate(_) => PercentileMethod::Approximate,
            PartialState::Discrete(_) => PercentileMethod::Discrete,
            PartialState::Continuous(_) => PercentileMethod::Continuous,
        }
    }

    /// Number of samples summarized by this partial.
    pub fn count(&self) -> u64 {
        match self {
            PartialState::Approximate(s) => s.count,
            PartialState::Discrete(e) | PartialState::Continuous(e) => e.values.len() as u64,
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| AccumulatorError::MalformedPartial(e.to_string()))
    }

    pub fn from_json(json: &serde_json::Value) -> Result<PartialState> {
        let partial: PartialState = serde_json::from_value(json.clone())
            .map_err(|e| AccumulatorError::MalformedPartial(e.to_string()))?;
        partial.validate()?;
        Ok(partial)
    }

    fn validate(&self) -> Result<()> {
        match self {
            PartialState::Approximate(s) => {
                let infinite = s.neg_inf.saturating_add(s.pos_inf);
                if infinite > s.count {
                    return Err(AccumulatorError::MalformedPartial(format!(
                        "{} infinite samples exceed the count {}",
                        infinite,
                        s.count
                    )));
                }
                if let Some(c) = s
                    .centroids
                    .iter()
                    .find(|c| !c.mean.is_finite() || !(c.weight > 0.0) || !c.weight.is_finite())
                {
                    return Err(AccumulatorError::MalformedPartial(format!(
                        "invalid centroid (mean {}, weight {})",
                        c.mean, c.weight
                    )));
                }
            }
            PartialState::Discrete(e) | PartialState::Continuous(e) => {
                if e.values.iter().any(|v| v.is_nan()) {
                    return Err(AccumulatorError::MalformedPartial(
                        "NaN sample in exact partial".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum FloatRepr {
    Number(f64),
    Text(String),
}

impl From<f64> for FloatRepr {
    fn from(d: f64) -> Self {
        if d.is_finite() {
            FloatRepr::Number(d)
        } else {
            FloatRepr::Text(crate::value::non_finite_name(d).to_string())
        }
    }
}

impl FloatRepr {
    fn into_f64(self) -> std::result::Result<f64, String> {
        match self {
            FloatRepr::Number(d) => Ok(d),
            FloatRepr::Text(s) => {
                crate::value::parse_double(&s).ok_or_else(|| format!("invalid double {:?}", s))
            }
        }
    }
}

mod float_vec {
    use super::FloatRepr;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(values.iter().map(|d| FloatRepr::from(*d)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f64>, D::Error> {
        Vec::<FloatRepr>::deserialize(d)?
            .into_iter()
            .map(FloatRepr::into_f64)
            .collect::<Result<_, _>>()
            .map_err(D::Error::custom)
    }
}
