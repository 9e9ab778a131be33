// =============================================================================
// IRLS: Iteratively Reweighted Least Squares
// =============================================================================
//
//     Start with μ⁰ from the family
//     Repeat:
//         1. Working weights   w = prior_w / (V(μ) × g'(μ)²)
//         2. Working response  z = (η - offset) + (y - μ) × g'(μ)
//         3. Solve             (X'WX)β = X'Wz
//         4. Update            η = Xβ + offset,  μ = g⁻¹(η)
//     until the relative deviance change drops below the tolerance.
//
// For Gaussian/identity this is ordinary least squares and converges in one
// step; for Tweedie/log it usually takes a handful of iterations.
//
// ALIASED COLUMNS:
// ----------------
// An empty level combination, or a level with no rows left, makes some
// contrast columns linear combinations of earlier ones and X'WX singular.
// Before iterating, columns are screened in order against the span of the
// columns already kept (a Cholesky of X'WX that skips zero pivots). A column
// whose residual is below `collinear_tolerance` of its own norm is aliased:
// it is left out of the fit and gets a zero coefficient. The rank of the
// fit is the number of columns kept.
//
// =============================================================================

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2, Axis};

use super::initialize_mu_safe;
use crate::error::{AnovaGlmError, Result};
use crate::families::Family;
use crate::links::Link;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration options for the IRLS algorithm.
#[derive(Debug, Clone)]
pub struct IRLSConfig {
    /// Maximum number of iterations before giving up.
    /// Default: 25
    pub max_iterations: usize,

    /// Stop when |D_old - D_new| / |D_old| < tolerance.
    /// Default: 1e-8
    pub tolerance: f64,

    /// Floor for working weights.
    /// Default: 1e-10
    pub min_weight: f64,

    /// Drop aliased columns instead of failing on a rank-deficient design.
    /// Default: true
    pub remove_collinear_columns: bool,

    /// Relative residual below which a column counts as aliased.
    /// Default: 1e-8
    pub collinear_tolerance: f64,
}

impl Default for IRLSConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            tolerance: 1e-8,
            min_weight: 1e-10,
            remove_collinear_columns: true,
            collinear_tolerance: 1e-8,
        }
    }
}

// =============================================================================
// Result Structure
// =============================================================================

/// Results from fitting a GLM using IRLS.
#[derive(Debug, Clone)]
pub struct IRLSResult {
    /// Fitted coefficients β, one per column of X (0 for aliased columns)
    pub coefficients: Array1<f64>,

    /// Fitted values μ = g⁻¹(Xβ + offset)
    pub fitted_values: Array1<f64>,

    /// Linear predictor η = Xβ + offset
    pub linear_predictor: Array1<f64>,

    /// Final (prior-weighted) deviance
    pub deviance: f64,

    pub iterations: usize,

    pub converged: bool,

    /// (X'WX)⁻¹ over all columns of X, scaled by the dispersion to get
    /// Var(β̂). Rows and columns of aliased columns are zero.
    pub covariance_unscaled: Array2<f64>,

    /// Columns of X left out because they were aliased, ascending.
    pub aliased_columns: Vec<usize>,

    /// Number of estimated coefficients.
    pub rank: usize,

    /// Prior weights (all ones when none were given)
    pub prior_weights: Array1<f64>,
}

// =============================================================================
// Main Fitting Functions
// =============================================================================

/// Fit a GLM with no offset and no prior weights.
pub fn fit_glm(
    y: &Array1<f64>,
    x: &Array2<f64>,
    family: &dyn Family,
    link: &dyn Link,
    config: &IRLSConfig,
) -> Result<IRLSResult> {
    fit_glm_full(y, x, family, link, config, None, None)
}

/// Fit a GLM using IRLS with optional offset and prior weights.
///
/// # Arguments
/// * `y` - Response variable (n)
/// * `x` - Design matrix (n × p), including an intercept column if wanted
/// * `family` - Distribution family
/// * `link` - Link function
/// * `config` - Algorithm configuration
/// * `offset` - Added to the linear predictor: η = Xβ + offset
/// * `weights` - Non-negative prior weights
pub fn fit_glm_full(
    y: &Array1<f64>,
    x: &Array2<f64>,
    family: &dyn Family,
    link: &dyn Link,
    config: &IRLSConfig,
    offset: Option<&Array1<f64>>,
    weights: Option<&Array1<f64>>,
) -> Result<IRLSResult> {
    // -------------------------------------------------------------------------
    // Validate inputs
    // -------------------------------------------------------------------------
    let n = y.len();
    let p = x.ncols();

    if x.nrows() != n {
        return Err(AnovaGlmError::DimensionMismatch(format!(
            "X has {} rows but y has {} elements",
            x.nrows(),
            n
        )));
    }

    if n == 0 {
        return Err(AnovaGlmError::EmptyInput("y is empty".to_string()));
    }

    if p == 0 {
        return Err(AnovaGlmError::EmptyInput("X has no columns".to_string()));
    }

    let offset_vec = match offset {
        Some(o) => {
            if o.len() != n {
                return Err(AnovaGlmError::DimensionMismatch(format!(
                    "offset has {} elements but y has {}",
                    o.len(),
                    n
                )));
            }
            o.clone()
        }
        None => Array1::zeros(n),
    };

    let prior_weights = match weights {
        Some(w) => {
            if w.len() != n {
                return Err(AnovaGlmError::DimensionMismatch(format!(
                    "weights has {} elements but y has {}",
                    w.len(),
                    n
                )));
            }
            if w.iter().any(|&wi| wi < 0.0 || !wi.is_finite()) {
                return Err(AnovaGlmError::InvalidValue(
                    "weights must be finite and non-negative".to_string(),
                ));
            }
            w.clone()
        }
        None => Array1::ones(n),
    };

    // -------------------------------------------------------------------------
    // Screen for aliased columns
    // -------------------------------------------------------------------------
    let aliased_columns = find_aliased_columns(x, &prior_weights, config.collinear_tolerance);
    if !aliased_columns.is_empty() {
        if !config.remove_collinear_columns {
            return Err(AnovaGlmError::LinearAlgebra(format!(
                "design matrix is rank deficient: columns {:?} are linear combinations of earlier columns",
                aliased_columns
            )));
        }
        log::debug!(
            "Dropping {} aliased column(s) {:?} of {}",
            aliased_columns.len(),
            aliased_columns,
            p
        );
    }
    let kept: Vec<usize> = (0..p).filter(|j| !aliased_columns.contains(j)).collect();
    if kept.is_empty() {
        return Err(AnovaGlmError::EmptyInput(
            "every column of X is zero on the rows with positive weight".to_string(),
        ));
    }
    let x_kept = x.select(Axis(1), &kept);
    let rank = kept.len();

    // -------------------------------------------------------------------------
    // Initialize μ and η
    // -------------------------------------------------------------------------
    let mut mu = family.initialize_mu(y);
    if !family.is_valid_mu(&mu) {
        mu = initialize_mu_safe(y, family);
    }
    let mut eta = link.link(&mu);
    let mut deviance = family.deviance(y, &mu, Some(&prior_weights));

    // -------------------------------------------------------------------------
    // IRLS loop
    // -------------------------------------------------------------------------
    let mut converged = false;
    let mut iteration = 0;
    let mut coefficients = Array1::zeros(rank);
    let mut cov_unscaled = Array2::zeros((rank, rank));

    while iteration < config.max_iterations {
        iteration += 1;

        let (working_response, combined_weights) =
            working_quantities(y, &mu, &eta, &offset_vec, &prior_weights, family, link, config);

        let (new_coefficients, xtwx_inv) =
            solve_weighted_least_squares(&x_kept, &working_response, &combined_weights)?;

        eta = &x_kept.dot(&new_coefficients) + &offset_vec;
        mu = family.clamp_mu(&link.inverse(&eta));
        coefficients = new_coefficients;
        cov_unscaled = xtwx_inv;

        let deviance_old = deviance;
        deviance = family.deviance(y, &mu, Some(&prior_weights));

        let rel_change = if deviance_old.abs() > 1e-10 {
            (deviance_old - deviance).abs() / deviance_old.abs()
        } else {
            (deviance_old - deviance).abs()
        };

        log::debug!(
            "IRLS iteration {}: deviance = {:.6}, rel_change = {:.2e}",
            iteration,
            deviance,
            rel_change
        );

        if !deviance.is_finite() {
            return Err(AnovaGlmError::InvalidValue(format!(
                "deviance became non-finite at IRLS iteration {}",
                iteration
            )));
        }

        if rel_change < config.tolerance {
            converged = true;
            break;
        }
    }

    // Scatter back to the full column layout
    let mut full_coefficients = Array1::zeros(p);
    let mut full_covariance = Array2::zeros((p, p));
    for (i, &ki) in kept.iter().enumerate() {
        full_coefficients[ki] = coefficients[i];
        for (j, &kj) in kept.iter().enumerate() {
            full_covariance[[ki, kj]] = cov_unscaled[[i, j]];
        }
    }

    Ok(IRLSResult {
        coefficients: full_coefficients,
        fitted_values: mu,
        linear_predictor: eta,
        deviance,
        iterations: iteration,
        converged,
        covariance_unscaled: full_covariance,
        aliased_columns,
        rank,
        prior_weights,
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Working response z and combined weights prior_w × w_irls for one iteration.
#[allow(clippy::too_many_arguments)]
fn working_quantities(
    y: &Array1<f64>,
    mu: &Array1<f64>,
    eta: &Array1<f64>,
    offset: &Array1<f64>,
    prior_weights: &Array1<f64>,
    family: &dyn Family,
    link: &dyn Link,
    config: &IRLSConfig,
) -> (Array1<f64>, Array1<f64>) {
    let variance = family.variance(mu);
    let link_deriv = link.derivative(mu);

    let weights: Array1<f64> = variance
        .iter()
        .zip(link_deriv.iter())
        .zip(prior_weights.iter())
        .map(|((&v, &d), &pw)| pw * (1.0 / (v * d * d)).clamp(config.min_weight, 1e10))
        .collect();

    // Offset is subtracted: we solve for Xβ, not Xβ + offset
    let z: Array1<f64> = eta
        .iter()
        .zip(offset.iter())
        .zip(y.iter().zip(mu.iter()))
        .zip(link_deriv.iter())
        .map(|(((&e, &o), (&yi, &mui)), &d)| (e - o) + (yi - mui) * d)
        .collect();

    (z, weights)
}

/// Indices of columns that are (numerically) linear combinations of the
/// columns before them, under the prior weights.
///
/// Runs a Cholesky factorization of X'WX one column at a time. A column
/// whose squared residual after projecting out the kept columns is at most
/// `tolerance` times its own squared norm is skipped, so earlier columns
/// always win over later ones.
fn find_aliased_columns(x: &Array2<f64>, w: &Array1<f64>, tolerance: f64) -> Vec<usize> {
    let n = x.nrows();
    let p = x.ncols();
    let sqrt_w: Vec<f64> = w.iter().map(|&wi| wi.sqrt()).collect();
    let x_weighted = DMatrix::from_fn(n, p, |i, j| x[[i, j]] * sqrt_w[i]);
    let gram = x_weighted.transpose() * &x_weighted;

    // Rows of the lower-triangular factor for the kept columns
    let mut factor: Vec<Vec<f64>> = Vec::with_capacity(p);
    let mut kept: Vec<usize> = Vec::with_capacity(p);
    let mut aliased = Vec::new();

    for j in 0..p {
        let norm_sq = gram[(j, j)];
        let mut row = Vec::with_capacity(kept.len() + 1);
        for (r, &k) in kept.iter().enumerate() {
            let partial: f64 = factor[r].iter().zip(row.iter()).map(|(a, b)| a * b).sum();
            row.push((gram[(k, j)] - partial) / factor[r][r]);
        }
        let residual = norm_sq - row.iter().map(|v| v * v).sum::<f64>();

        if norm_sq <= 0.0 || residual <= tolerance * norm_sq {
            aliased.push(j);
        } else {
            row.push(residual.sqrt());
            factor.push(row);
            kept.push(j);
        }
    }

    aliased
}

/// Solve weighted least squares: minimize Σ w_i (z_i - x_i'β)²
///
/// Returns (coefficients, (X'WX)⁻¹)
fn solve_weighted_least_squares(
    x: &Array2<f64>,
    z: &Array1<f64>,
    w: &Array1<f64>,
) -> Result<(Array1<f64>, Array2<f64>)> {
    let n = x.nrows();
    let p = x.ncols();

    // X_w = W^(1/2) X, z_w = W^(1/2) z
    let sqrt_w: Vec<f64> = w.iter().map(|&wi| wi.sqrt()).collect();
    let x_weighted = DMatrix::from_fn(n, p, |i, j| x[[i, j]] * sqrt_w[i]);
    let z_weighted = DVector::from_iterator(
        n,
        z.iter().zip(sqrt_w.iter()).map(|(&zi, &swi)| zi * swi),
    );

    let xtx = x_weighted.transpose() * &x_weighted;
    let xtz = x_weighted.transpose() * z_weighted;

    let (coefficients, xtx_inv) = match xtx.clone().cholesky() {
        Some(chol) => {
            let coef = chol.solve(&xtz);
            let inv = chol.solve(&DMatrix::identity(p, p));
            (coef, inv)
        }
        None => {
            let coef = xtx.clone().lu().solve(&xtz).ok_or_else(|| {
                AnovaGlmError::LinearAlgebra(
                    "failed to solve weighted least squares - X'WX is singular. \
                     A category level may have no rows left after missing-value handling."
                        .to_string(),
                )
            })?;
            let inv = xtx.try_inverse().ok_or_else(|| {
                AnovaGlmError::LinearAlgebra("X'WX could not be inverted".to_string())
            })?;
            (coef, inv)
        }
    };

    let coef_array: Array1<f64> = coefficients.iter().copied().collect();
    let cov_array = Array2::from_shape_fn((p, p), |(i, j)| xtx_inv[(i, j)]);

    Ok((coef_array, cov_array))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::{GaussianFamily, TweedieFamily};
    use crate::links::{IdentityLink, LogLink};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_gaussian_identity_is_ols() {
        // y = 2 + 3x exactly
        let x = Array2::from_shape_vec(
            (5, 2),
            vec![1.0, 1.0, 1.0, 2.0, 1.0, 3.0, 1.0, 4.0, 1.0, 5.0],
        )
        .unwrap();
        let y = array![5.0, 8.0, 11.0, 14.0, 17.0];

        let result = fit_glm(&y, &x, &GaussianFamily, &IdentityLink, &IRLSConfig::default()).unwrap();

        assert!(result.converged);
        assert_abs_diff_eq!(result.coefficients[0], 2.0, epsilon = 1e-8);
        assert_abs_diff_eq!(result.coefficients[1], 3.0, epsilon = 1e-8);
        assert!(result.deviance < 1e-10);
    }

    #[test]
    fn test_weights_and_offset() {
        // Intercept-only Gaussian fit: β = weighted mean of (y - offset)
        let x = Array2::ones((3, 1));
        let y = array![1.0, 2.0, 6.0];
        let offset = array![0.0, 0.0, 2.0];
        let weights = array![1.0, 1.0, 2.0];

        let result = fit_glm_full(
            &y,
            &x,
            &GaussianFamily,
            &IdentityLink,
            &IRLSConfig::default(),
            Some(&offset),
            Some(&weights),
        )
        .unwrap();

        // (1 + 2 + 2*4) / 4
        assert_abs_diff_eq!(result.coefficients[0], 11.0 / 4.0, epsilon = 1e-8);
    }

    #[test]
    fn test_tweedie_log_link_converges() {
        let x = Array2::from_shape_vec(
            (6, 2),
            vec![1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0, 1.0, 4.0, 1.0, 5.0],
        )
        .unwrap();
        let y = array![0.0, 2.0, 3.0, 4.0, 0.0, 7.0];

        let result = fit_glm(&y, &x, &TweedieFamily::new(1.5), &LogLink, &IRLSConfig::default()).unwrap();

        assert!(result.converged);
        assert!(result.fitted_values.iter().all(|&m| m > 0.0));
    }

    #[test]
    fn test_dimension_mismatch_error() {
        let x = Array2::from_shape_vec((3, 2), vec![1.0, 1.0, 1.0, 2.0, 1.0, 3.0]).unwrap();
        let y = array![1.0, 2.0];

        let result = fit_glm(&y, &x, &GaussianFamily, &IdentityLink, &IRLSConfig::default());

        assert!(matches!(result.unwrap_err(), AnovaGlmError::DimensionMismatch(_)));
    }

    #[test]
    fn test_aliased_column_is_dropped() {
        // Third column = first + second; y = 1 + 2x exactly
        let x = Array2::from_shape_vec(
            (4, 3),
            vec![1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 2.0, 3.0, 1.0, 3.0, 4.0],
        )
        .unwrap();
        let y = array![1.0, 3.0, 5.0, 7.0];

        let result = fit_glm(&y, &x, &GaussianFamily, &IdentityLink, &IRLSConfig::default()).unwrap();

        assert_eq!(result.aliased_columns, vec![2]);
        assert_eq!(result.rank, 2);
        assert_abs_diff_eq!(result.coefficients[0], 1.0, epsilon = 1e-8);
        assert_abs_diff_eq!(result.coefficients[1], 2.0, epsilon = 1e-8);
        assert_eq!(result.coefficients[2], 0.0);
        assert_eq!(result.covariance_unscaled[[2, 2]], 0.0);
        assert!(result.covariance_unscaled[[1, 1]] > 0.0);
    }

    #[test]
    fn test_zero_weight_rows_can_alias_columns() {
        // Second column is only non-zero on the zero-weight row
        let x = Array2::from_shape_vec((3, 2), vec![1.0, 0.0, 1.0, 0.0, 1.0, 1.0]).unwrap();
        let y = array![2.0, 4.0, 100.0];
        let w = array![1.0, 1.0, 0.0];

        let result = fit_glm_full(
            &y,
            &x,
            &GaussianFamily,
            &IdentityLink,
            &IRLSConfig::default(),
            None,
            Some(&w),
        )
        .unwrap();

        assert_eq!(result.aliased_columns, vec![1]);
        assert_abs_diff_eq!(result.coefficients[0], 3.0, epsilon = 1e-8);
    }

    #[test]
    fn test_rank_deficiency_is_an_error_when_not_removing() {
        let x = Array2::from_shape_vec((3, 2), vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0]).unwrap();
        let y = array![1.0, 2.0, 3.0];
        let config = IRLSConfig {
            remove_collinear_columns: false,
            ..IRLSConfig::default()
        };

        let result = fit_glm(&y, &x, &GaussianFamily, &IdentityLink, &config);

        assert!(matches!(result.unwrap_err(), AnovaGlmError::LinearAlgebra(_)));
    }

    #[test]
    fn test_negative_weights_rejected() {
        let x = Array2::ones((2, 1));
        let y = array![1.0, 2.0];
        let w = array![1.0, -1.0];
        let result = fit_glm_full(
            &y,
            &x,
            &GaussianFamily,
            &IdentityLink,
            &IRLSConfig::default(),
            None,
            Some(&w),
        );
        assert!(matches!(result.unwrap_err(), AnovaGlmError::InvalidValue(_)));
    }
}
