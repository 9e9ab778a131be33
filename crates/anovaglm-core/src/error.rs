// =============================================================================
// Error Types
// =============================================================================
//
// One error enum for the whole library. Every fallible function returns
// `Result<T>` (an alias for `std::result::Result<T, AnovaGlmError>`), so
// callers can use `?` everywhere and the Python layer only has to convert
// one type.
//
// CATEGORIES:
// -----------
//   - Configuration: bad parameters or a frame that doesn't fit the
//     two-categorical-predictor layout. Raised before any work starts and
//     carries *all* problems found, not just the first one.
//   - Row data: nothing left to fit once missing values are handled.
//   - Solver: dimension/linear-algebra failures inside IRLS.
//   - Sub-model: a fit failed; tagged with which sub-model it was.
//
// =============================================================================

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnovaGlmError {
    /// Every validation problem found in the parameters and frame.
    #[error("invalid AnovaGLM configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    /// Missing-value handling removed every row.
    #[error("no usable rows remain after missing-value handling ({total} rows in the source frame)")]
    NoUsableRows { total: usize },

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Linear algebra error: {0}")]
    LinearAlgebra(String),

    /// A sub-model fit failed; the whole decomposition is abandoned.
    #[error("sub-model {index} ({model}) failed to fit: {source}")]
    SubModelFit {
        index: usize,
        model: String,
        source: Box<AnovaGlmError>,
    },

    #[error("could not start the fitting thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, AnovaGlmError>;

impl AnovaGlmError {
    /// For `SubModelFit`, the position of the failed spec in the input order.
    pub fn failed_model_index(&self) -> Option<usize> {
        match self {
            AnovaGlmError::SubModelFit { index, .. } => Some(*index),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_lists_every_problem() {
        let err = AnovaGlmError::InvalidConfig(vec![
            "response column 'y' not found".to_string(),
            "predictor 'x' must be categorical".to_string(),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("response column 'y' not found"));
        assert!(msg.contains("predictor 'x' must be categorical"));
    }

    #[test]
    fn test_sub_model_error_names_the_model() {
        let err = AnovaGlmError::SubModelFit {
            index: 2,
            model: "GLM model with predictors A, B".to_string(),
            source: Box::new(AnovaGlmError::LinearAlgebra("singular".to_string())),
        };
        assert_eq!(err.failed_model_index(), Some(2));
        assert!(err.to_string().contains("GLM model with predictors A, B"));
        assert!(err.to_string().contains("singular"));
    }
}
