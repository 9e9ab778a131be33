// =============================================================================
// AnovaGLM Core Library
// =============================================================================
//
// This is the entry point for the pure Rust AnovaGLM library.
// All the encoding and fitting happens here - no Python code involved.
//
// STRUCTURE:
// ----------
//   - anova:       Frame model, contrast/interaction encoding, missing-value
//                  policy, sub-model assembly, parallel fitting, ANOVA table
//   - families:    Distribution families (Gaussian, Tweedie)
//   - links:       Link functions (Identity, Log, Power)
//   - solvers:     IRLS (Iteratively Reweighted Least Squares)
//   - inference:   p-values for coefficients and ANOVA rows
//   - error:       Error types used throughout the library
//
// FOR MAINTAINERS:
// ----------------
// When adding new functionality:
//   1. Add it to the appropriate module (or create a new one)
//   2. Write tests in that module (see existing tests for examples)
//   3. Re-export public items here so users can access them easily
//   4. Update the Python bindings in the `anovaglm` crate
//
// =============================================================================

pub mod anova;
pub mod error;
pub mod families;
pub mod inference;
pub mod links;
pub mod solvers;

// Re-export commonly used items at the top level for convenience
pub use anova::{
    AnovaGlm, AnovaGlmConfig, AnovaGlmOutput, AnovaTable, AnovaTableRow, CategoricalColumn, Column,
    DegreeOfFreedomTable, FitResult, Frame, IrlsFitter, MissingValuesHandling, ModelFitter, ModelSpec,
    NumericColumn, TransformedColumns,
};
pub use error::{AnovaGlmError, Result};
pub use families::{Family, FamilyKind};
pub use inference::{pvalue_f, pvalue_t, pvalue_z};
pub use links::{Link, LinkKind};
pub use solvers::{fit_glm, fit_glm_full, IRLSConfig, IRLSResult};
