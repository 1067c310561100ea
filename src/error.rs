use thiserror::Error;

pub type Result<T, E = AccumulatorError> = std::result::Result<T, E>;

/// Errors surfaced by percentile accumulators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccumulatorError {
    /// Malformed statement: bad fractions, unknown method, bad shape.
    #[error("{0}")]
    InvalidSpecification(String),

    /// The method is recognized but disabled by configuration.
    #[error("{0}")]
    UnsupportedMethod(String),

    /// Ingestion or merge pushed an accumulator over its byte budget.
    #[error(
        "$percentile used too much memory and cannot spill to disk. \
         Used: {used} bytes. Memory limit: {limit} bytes"
    )]
    MemoryLimitExceeded { used: usize, limit: usize },

    /// A partial built by one method was offered to an accumulator of another.
    #[error("incompatible partial state: expected {expected}, found {found}")]
    IncompatiblePartial {
        expected: &'static str,
        found: &'static str,
    },

    /// A serialized partial state could not be decoded.
    #[error("malformed partial state: {0}")]
    MalformedPartial(String),
}

impl AccumulatorError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        AccumulatorError::InvalidSpecification(msg.into())
    }

    /// True for errors raised while validating a statement, as opposed to
    /// errors raised while data flows through an accumulator.
    pub fn is_specification_error(&self) -> bool {
        matches!(
            self,
            AccumulatorError::InvalidSpecification(_) | AccumulatorError::UnsupportedMethod(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_message_reports_usage_and_limit() {
        let err = AccumulatorError::MemoryLimitExceeded {
            used: 2048,
            limit: 1024,
        };
        assert_eq!(
            err.to_string(),
            "$percentile used too much memory and cannot spill to disk. \
             Used: 2048 bytes. Memory limit: 1024 bytes"
        );
        assert!(!err.is_specification_error());
    }

    #[test]
    fn test_specification_classes() {
        assert!(AccumulatorError::invalid("bad").is_specification_error());
        assert!(AccumulatorError::UnsupportedMethod("gated".into()).is_specification_error());
        assert!(!AccumulatorError::MalformedPartial("x".into()).is_specification_error());
    }
}
