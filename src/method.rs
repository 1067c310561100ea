use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::AccumulatorConfig;
use crate::error::{AccumulatorError, Result};
use crate::expression::Expression;
use crate::value::Value;

const ALL_METHODS_MSG: &str =
    "Currently only 'approximate', 'discrete', and 'continuous' can be used as percentile 'method'.";
const APPROXIMATE_ONLY_MSG: &str =
    "Currently only 'approximate' can be used as percentile 'method'.";
const FRACTIONS_MSG: &str =
    "The $percentile 'p' field must be an array of numbers from [0.0, 1.0], but found: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PercentileMethod {
    Approximate,
    Discrete,
    Continuous,
}

impl PercentileMethod {
    pub fn all_in_order() -> &'static [PercentileMethod] {
        use PercentileMethod::*;
        &[Approximate, Discrete, Continuous]
    }

    pub fn name(self) -> &'static str {
        match self {
            PercentileMethod::Approximate => "approximate",
            PercentileMethod::Discrete => "discrete",
            PercentileMethod::Continuous => "continuous",
        }
    }

    /// Exact methods sit behind the `accurate_percentiles` gate.
    pub fn is_accurate(self) -> bool {
        !matches!(self, PercentileMethod::Approximate)
    }

    fn from_name(name: &str) -> Option<PercentileMethod> {
        PercentileMethod::all_in_order()
            .iter()
            .copied()
            .find(|m| m.name() == name)
    }
}

impl fmt::Display for PercentileMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Maps a method name to a [`PercentileMethod`] under the given gate.
///
/// Unknown names are specification errors. A recognized exact method with
/// the gate closed is `UnsupportedMethod`.
pub fn resolve_method(name: &str, config: &AccumulatorConfig) -> Result<PercentileMethod> {
    match PercentileMethod::from_name(name) {
        Some(method) => {
            ensure_enabled(method, config)?;
            Ok(method)
        }
        None if config.accurate_percentiles => {
            Err(AccumulatorError::invalid(ALL_METHODS_MSG))
        }
        None => Err(AccumulatorError::invalid(APPROXIMATE_ONLY_MSG)),
    }
}

pub fn ensure_enabled(method: PercentileMethod, config: &AccumulatorConfig) -> Result<()> {
    if method.is_accurate() && !config.accurate_percentiles {
        return Err(AccumulatorError::UnsupportedMethod(
            APPROXIMATE_ONLY_MSG.to_string(),
        ));
    }
    Ok(())
}

pub fn validate_fractions(ps: &[f64]) -> Result<()> {
    if ps.is_empty() {
        return Err(AccumulatorError::invalid(format!("{}[]", FRACTIONS_MSG)));
    }
    if let Some(p) = ps.iter().find(|p| !(0.0..=1.0).contains(*p)) {
        return Err(AccumulatorError::invalid(format!("{}{}", FRACTIONS_MSG, p)));
    }
    Ok(())
}

/// Extracts the requested fractions from an already optimized `p` operand.
pub fn parse_fractions(expr: &Expression) -> Result<Vec<f64>> {
    let Some(value) = expr.as_constant() else {
        return Err(AccumulatorError::invalid(format!(
            "The $percentile 'p' field must be an array of constant values, but found value: {}.",
            expr.to_json()
        )));
    };
    let items = match value {
        Value::Array(items) if !items.is_empty() => items,
        other => {
            return Err(AccumulatorError::invalid(format!(
                "{}{}",
                FRACTIONS_MSG,
                other.to_json()
            )))
        }
    };
    let mut ps = Vec::with_capacity(items.len());
    for item in items {
        let Some(p) = item.as_f64() else {
            return Err(AccumulatorError::invalid(format!(
                "{}{}",
                FRACTIONS_MSG,
                item.to_json()
            )));
        };
        ps.push(p);
    }
    validate_fractions(&ps)?;
    Ok(ps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Variables;
    use serde_json::json;

    fn gate(open: bool) -> AccumulatorConfig {
        AccumulatorConfig::default().with_accurate_percentiles(open)
    }

    fn fractions(src: serde_json::Value) -> Result<Vec<f64>> {
        let vars = Variables::new();
        parse_fractions(&Expression::parse(&src, &vars)?.optimize(&vars)?)
    }

    #[test]
    fn test_resolve_open_gate() {
        for m in PercentileMethod::all_in_order() {
            assert_eq!(resolve_method(m.name(), &gate(true)).unwrap(), *m);
        }
        let err = resolve_method("exact", &gate(true)).unwrap_err();
        assert_eq!(err, AccumulatorError::InvalidSpecification(ALL_METHODS_MSG.into()));
    }

    #[test]
    fn test_resolve_closed_gate() {
        assert_eq!(
            resolve_method("approximate", &gate(false)).unwrap(),
            PercentileMethod::Approximate
        );
        for name in ["discrete", "continuous"] {
            let err = resolve_method(name, &gate(false)).unwrap_err();
            assert!(matches!(err, AccumulatorError::UnsupportedMethod(_)));
            assert!(err.to_string().contains("'approximate'"));
        }
        let err = resolve_method("Approximate", &gate(false)).unwrap_err();
        assert!(matches!(err, AccumulatorError::InvalidSpecification(_)));
    }

    #[test]
    fn test_fractions_accept_folded_constants() {
        assert_eq!(fractions(json!([0, 0.5, 1, 0.5])).unwrap(), vec![0.0, 0.5, 1.0, 0.5]);
        assert_eq!(
            fractions(json!({"$concatArrays": [[0.1], [0.9]]})).unwrap(),
            vec![0.1, 0.9]
        );
    }

    #[test]
    fn test_fractions_rejections() {
        for bad in [
            json!([]),
            json!(0.5),
            json!([1.5]),
            json!([-0.1]),
            json!([0.5, "a"]),
            json!([null]),
            json!("$p"),
            json!([0.5, "$p"]),
        ] {
            let err = fractions(bad.clone()).unwrap_err();
            assert!(
                matches!(err, AccumulatorError::InvalidSpecification(_)),
                "{} -> {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_validate_rejects_nan() {
        assert!(validate_fractions(&[f64::NAN]).is_err());
        assert!(validate_fractions(&[0.0, 1.0]).is_ok());
    }
}
