// =============================================================================
// GLM Solvers
// =============================================================================
//
// AnovaGLM treats the GLM solver as a black box: "fit these columns with
// this family and link, give me coefficients and a deviance". This module is
// the built-in implementation of that box, a plain IRLS solver with no
// regularization (every ANOVA sub-model is fit with lambda = 0).
//
//     g(E[Y]) = Xβ + offset
//
// IRLS repeatedly linearizes the problem around the current μ and solves a
// weighted least squares system until the deviance stops changing.
//
// =============================================================================

mod irls;

pub use irls::{fit_glm, fit_glm_full, IRLSConfig, IRLSResult};

use ndarray::Array1;

use crate::families::Family;

/// Safe initialization of μ that works for any family.
///
/// Used as fallback when `family.initialize_mu(y)` produces invalid values.
/// Averages each y_i with the global mean, then clamps to the family's range.
pub(crate) fn initialize_mu_safe(y: &Array1<f64>, family: &dyn Family) -> Array1<f64> {
    let y_mean = y.mean().unwrap_or(1.0).max(0.01);
    let raw: Array1<f64> = y.mapv(|yi| (yi + y_mean) / 2.0);
    family.clamp_mu(&raw)
}
