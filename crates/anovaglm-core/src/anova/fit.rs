// =============================================================================
// Parallel Fit Orchestrator
// =============================================================================
//
// Every sub-model is an independent GLM fit over the same shared columns,
// so they all run at once on a dedicated thread pool:
//
//     specs ──► ThreadPool(num_threads = max_parallelism)
//                 │  par_iter().enumerate()
//                 ├─► fit(spec 0) ─┐
//                 ├─► fit(spec 1) ─┤   collect::<Result<Vec<_>>>()
//                 ├─► fit(spec 2) ─┤   keeps input order, stops at the
//                 └─► fit(spec 3) ─┘   first failure
//
// The pool is built per call so `max_parallelism` is a hard bound that
// does not depend on (or starve) the global rayon pool used for encoding.
// Results come back in spec order regardless of which fit finishes first;
// the ANOVA table indexes them by position.
//
// The fitter itself is a trait so the solver can be swapped; `IrlsFitter`
// is the built-in implementation on top of `solvers::fit_glm_full`.
//
// =============================================================================

use ndarray::{Array1, Array2};
use rayon::prelude::*;

use crate::error::{AnovaGlmError, Result};
use crate::families::FamilyKind;
use crate::inference::{pvalue_t, pvalue_z};
use crate::links::LinkKind;
use crate::solvers::{fit_glm_full, IRLSConfig};

use super::submodel::ModelSpec;

/// Name given to the intercept coefficient.
pub const INTERCEPT_NAME: &str = "Intercept";

// =============================================================================
// Settings and results
// =============================================================================

/// Everything a fitter needs besides the columns.
#[derive(Debug, Clone)]
pub struct GlmSettings {
    pub family: FamilyKind,
    pub link: LinkKind,
    /// Prepend a column of ones to every design matrix.
    pub intercept: bool,
    pub compute_p_values: bool,
    pub irls: IRLSConfig,
}

impl Default for GlmSettings {
    fn default() -> Self {
        Self {
            family: FamilyKind::default(),
            link: LinkKind::default(),
            intercept: true,
            compute_p_values: true,
            irls: IRLSConfig::default(),
        }
    }
}

/// Outcome of fitting one sub-model.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Description of the spec this was fitted from.
    pub model: String,

    /// Intercept (when fitted) followed by the spec's column names.
    pub coefficient_names: Vec<String>,

    pub coefficients: Array1<f64>,

    /// Dispersion-scaled standard errors; NaN for aliased coefficients.
    pub std_errors: Array1<f64>,

    /// Two-sided p-values for β = 0, when requested.
    pub p_values: Option<Array1<f64>>,

    pub deviance: f64,

    pub null_deviance: f64,

    /// Pearson χ² / residual degrees of freedom.
    pub dispersion: f64,

    /// Rows with positive weight.
    pub n_obs: usize,

    pub residual_dof: usize,

    /// Number of coefficients actually estimated.
    pub rank: usize,

    /// Coefficients left out because their columns were aliased.
    pub aliased: Vec<String>,

    pub iterations: usize,

    pub converged: bool,
}

impl FitResult {
    /// Coefficient by name.
    pub fn coefficient(&self, name: &str) -> Option<f64> {
        self.coefficient_names
            .iter()
            .position(|n| n == name)
            .map(|i| self.coefficients[i])
    }
}

// =============================================================================
// Fitter
// =============================================================================

/// Fits one sub-model. Implementations are shared across the worker threads.
pub trait ModelFitter: Send + Sync {
    fn fit(&self, spec: &ModelSpec, settings: &GlmSettings) -> Result<FitResult>;
}

/// IRLS with no regularization.
#[derive(Debug, Clone, Copy, Default)]
pub struct IrlsFitter;

impl ModelFitter for IrlsFitter {
    fn fit(&self, spec: &ModelSpec, settings: &GlmSettings) -> Result<FitResult> {
        let family = settings.family.build();
        let link = settings.link.build(&settings.family);
        let y = spec.response();
        let x = spec.design_matrix(settings.intercept);

        let result = fit_glm_full(
            y,
            &x,
            family.as_ref(),
            link.as_ref(),
            &settings.irls,
            spec.offset(),
            spec.weights(),
        )?;

        let n_obs = result.prior_weights.iter().filter(|&&w| w > 0.0).count();
        let n_params = x.ncols();
        let residual_dof = n_obs.saturating_sub(result.rank);

        // Pearson χ² = Σ w (y - μ)² / V(μ)
        let variance = family.variance(&result.fitted_values);
        let pearson: f64 = y
            .iter()
            .zip(result.fitted_values.iter())
            .zip(variance.iter().zip(result.prior_weights.iter()))
            .map(|((&yi, &mu), (&v, &w))| w * (yi - mu).powi(2) / v)
            .sum();
        let dispersion = if residual_dof > 0 {
            pearson / residual_dof as f64
        } else {
            f64::NAN
        };

        let mut std_errors: Array1<f64> = result
            .covariance_unscaled
            .diag()
            .mapv(|v| (v * dispersion).max(0.0).sqrt());
        for &j in &result.aliased_columns {
            std_errors[j] = f64::NAN;
        }

        let p_values = settings.compute_p_values.then(|| {
            let df = residual_dof as f64;
            result
                .coefficients
                .iter()
                .zip(std_errors.iter())
                .map(|(&b, &se)| match settings.family {
                    FamilyKind::Gaussian => pvalue_t(b / se, df),
                    FamilyKind::Tweedie { .. } => pvalue_z(b / se),
                })
                .collect::<Array1<f64>>()
        });

        let null_deviance = if settings.intercept {
            let ones = Array2::<f64>::ones((y.len(), 1));
            fit_glm_full(
                y,
                &ones,
                family.as_ref(),
                link.as_ref(),
                &settings.irls,
                spec.offset(),
                spec.weights(),
            )?
            .deviance
        } else {
            let eta = spec
                .offset()
                .cloned()
                .unwrap_or_else(|| Array1::zeros(y.len()));
            let mu = family.clamp_mu(&link.inverse(&eta));
            family.deviance(y, &mu, Some(&result.prior_weights))
        };

        let mut coefficient_names = Vec::with_capacity(n_params);
        if settings.intercept {
            coefficient_names.push(INTERCEPT_NAME.to_string());
        }
        coefficient_names.extend(spec.column_names());

        let aliased: Vec<String> = result
            .aliased_columns
            .iter()
            .map(|&j| coefficient_names[j].clone())
            .collect();
        if !aliased.is_empty() {
            log::info!(
                "{}: dropped aliased coefficient(s) {}",
                spec,
                aliased.join(", ")
            );
        }

        Ok(FitResult {
            model: spec.description().to_string(),
            coefficient_names,
            coefficients: result.coefficients,
            std_errors,
            p_values,
            deviance: result.deviance,
            null_deviance,
            dispersion,
            n_obs,
            residual_dof,
            rank: result.rank,
            aliased,
            iterations: result.iterations,
            converged: result.converged,
        })
    }
}

// =============================================================================
// Orchestration
// =============================================================================

/// Fit every spec with at most `max_parallelism` fits running at once.
///
/// `None` runs all specs concurrently. Results are in spec order. The first
/// failure aborts the run and is returned as `SubModelFit` naming the spec;
/// no partial results are returned.
pub fn fit_all(
    specs: &[ModelSpec],
    fitter: &dyn ModelFitter,
    settings: &GlmSettings,
    max_parallelism: Option<usize>,
) -> Result<Vec<FitResult>> {
    if specs.is_empty() {
        return Ok(Vec::new());
    }

    let threads = max_parallelism.unwrap_or(specs.len()).clamp(1, specs.len());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("anovaglm-fit-{}", i))
        .build()?;

    log::info!(
        "Submitting {} sub-model fits ({} at a time)",
        specs.len(),
        threads
    );

    let fits = pool.install(|| {
        specs
            .par_iter()
            .enumerate()
            .map(|(index, spec)| -> Result<FitResult> {
                let fit = fitter.fit(spec, settings).map_err(|source| {
                    log::debug!("Sub-model {} ({}) failed: {}", index, spec, source);
                    AnovaGlmError::SubModelFit {
                        index,
                        model: spec.description().to_string(),
                        source: Box::new(source),
                    }
                })?;
                log::debug!(
                    "Fitted sub-model {} ({}): deviance = {:.6}, {} iterations",
                    index,
                    spec,
                    fit.deviance,
                    fit.iterations
                );
                if !fit.converged {
                    log::warn!(
                        "Sub-model {} ({}) did not converge in {} iterations",
                        index,
                        spec,
                        fit.iterations
                    );
                }
                Ok(fit)
            })
            .collect::<Result<Vec<_>>>()
    })?;

    log::info!("All {} sub-model fits complete", fits.len());
    Ok(fits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anova::encoding::{compose_interaction, encode_contrasts};
    use crate::anova::dof::DegreeOfFreedomTable;
    use crate::anova::missing::Predictor;
    use crate::anova::submodel::{build_model_specs, Effect, SharedColumns};
    use approx::assert_abs_diff_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    fn specs(include_joint_model: bool) -> Vec<ModelSpec> {
        let dom = |l: &[&str]| l.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let la = [0, 1, 2, 0, 1, 2, 0, 1, 2, 0, 1, 2];
        let lb = [0, 0, 0, 1, 1, 1, 0, 0, 0, 1, 1, 1];
        let dof = DegreeOfFreedomTable::new("A", 3, "B", 2, include_joint_model);
        let a = encode_contrasts(&dof, Predictor::A, &dom(&["x", "y", "z"]), &la).unwrap();
        let b = encode_contrasts(&dof, Predictor::B, &dom(&["p", "q"]), &lb).unwrap();
        let ab = compose_interaction(&dof, &a, &b).unwrap();
        let y: Array1<f64> = la
            .iter()
            .zip(lb.iter())
            .enumerate()
            .map(|(i, (&a, &b))| 10.0 + 2.0 * a as f64 - 3.0 * b as f64 + 0.1 * (i / 6) as f64)
            .collect();
        let shared = SharedColumns {
            response: Arc::new(y),
            weights: None,
            offset: None,
        };
        build_model_specs(&Arc::new(a), &Arc::new(b), &Arc::new(ab), &shared, include_joint_model).unwrap()
    }

    /// Records which spec finished when; spec `slow` sleeps first.
    struct DelayedFitter {
        slow: usize,
        finished: Mutex<Vec<String>>,
        specs: Vec<String>,
    }

    impl ModelFitter for DelayedFitter {
        fn fit(&self, spec: &ModelSpec, settings: &GlmSettings) -> Result<FitResult> {
            if spec.description() == self.specs[self.slow] {
                thread::sleep(Duration::from_millis(200));
            }
            let fit = IrlsFitter.fit(spec, settings)?;
            self.finished.lock().unwrap().push(spec.description().to_string());
            Ok(fit)
        }
    }

    /// Tracks how many fits run at the same time.
    struct CountingFitter {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ModelFitter for CountingFitter {
        fn fit(&self, spec: &ModelSpec, settings: &GlmSettings) -> Result<FitResult> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(30));
            self.active.fetch_sub(1, Ordering::SeqCst);
            IrlsFitter.fit(spec, settings)
        }
    }

    /// Fails on the additive A + B model.
    struct FailingFitter;

    impl ModelFitter for FailingFitter {
        fn fit(&self, spec: &ModelSpec, settings: &GlmSettings) -> Result<FitResult> {
            if spec.omitted_effect() == Some(Effect::Interaction) {
                return Err(AnovaGlmError::LinearAlgebra("injected failure".to_string()));
            }
            IrlsFitter.fit(spec, settings)
        }
    }

    #[test]
    fn test_results_keep_spec_order_when_first_fit_finishes_last() {
        let specs = specs(true);
        let fitter = DelayedFitter {
            slow: 0,
            finished: Mutex::new(Vec::new()),
            specs: specs.iter().map(|s| s.description().to_string()).collect(),
        };

        let fits = fit_all(&specs, &fitter, &GlmSettings::default(), None).unwrap();

        let finished = fitter.finished.lock().unwrap();
        assert_eq!(finished.last().map(String::as_str), Some(specs[0].description()));
        let models: Vec<&str> = fits.iter().map(|f| f.model.as_str()).collect();
        let expected: Vec<&str> = specs.iter().map(|s| s.description()).collect();
        assert_eq!(models, expected);
    }

    #[test]
    fn test_parallelism_is_bounded() {
        let specs = specs(true);
        let fitter = CountingFitter {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };
        let fits = fit_all(&specs, &fitter, &GlmSettings::default(), Some(2)).unwrap();
        assert_eq!(fits.len(), 4);
        assert!(fitter.peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_failure_names_the_spec() {
        let specs = specs(true);
        let err = fit_all(&specs, &FailingFitter, &GlmSettings::default(), None).unwrap_err();
        assert_eq!(err.failed_model_index(), Some(2));
        match err {
            AnovaGlmError::SubModelFit { model, source, .. } => {
                assert_eq!(model, "GLM model with predictors A, B");
                assert!(matches!(*source, AnovaGlmError::LinearAlgebra(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_irls_fitter_names_and_nesting() {
        let specs = specs(true);
        let fits = fit_all(&specs, &IrlsFitter, &GlmSettings::default(), Some(1)).unwrap();

        let full = &fits[3];
        assert_eq!(
            full.coefficient_names,
            vec!["Intercept", "A_x", "A_y", "B_p", "A_x_B_p", "A_y_B_p"]
        );
        assert_eq!(full.n_obs, 12);
        assert_eq!(full.residual_dof, 6);
        assert_eq!(full.rank, 6);
        assert!(full.aliased.is_empty());
        assert!(full.converged);
        assert!(full.p_values.is_some());

        // Nested models never fit better than the full one.
        for fit in &fits[..3] {
            assert!(fit.deviance >= full.deviance - 1e-9);
            assert!(fit.deviance <= fit.null_deviance + 1e-9);
        }
        // Intercept-only null deviance is shared by every spec.
        for fit in &fits {
            assert_abs_diff_eq!(fit.null_deviance, full.null_deviance, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_no_specs_no_work() {
        let fits = fit_all(&[], &IrlsFitter, &GlmSettings::default(), Some(3)).unwrap();
        assert!(fits.is_empty());
    }
}
