//! ANOVA table from nested sub-model deviances.
//!
//! The full `A + B + A:B` model is the reference. For every effect E whose
//! "full minus E" model was fitted:
//!
//! ```text
//! ΔD = D(full - E) - D(full)
//! F  = (ΔD / dof(E)) / (D(full) / df_resid)
//! p  = P(F(dof(E), df_resid) > F)
//! ```
//!
//! dof(E) is the rank the full model loses without E. With every level
//! combination present that is the nominal k - 1 style count from the
//! degrees-of-freedom table; when columns are aliased it is smaller. An
//! effect with nothing estimable left gets dof 0 and NaN statistics.

use crate::error::{AnovaGlmError, Result};
use crate::inference::pvalue_f;

use super::dof::DegreeOfFreedomTable;
use super::fit::FitResult;
use super::missing::Predictor;
use super::submodel::{Effect, ModelSpec};

#[derive(Debug, Clone, PartialEq)]
pub struct AnovaTableRow {
    /// Effect label: `A`, `B` or `A:B`.
    pub effect: String,
    pub dof: usize,
    /// Deviance lost by dropping the effect from the full model.
    pub deviance_change: f64,
    pub mean_deviance: f64,
    pub f_statistic: f64,
    pub p_value: f64,
    /// Share of the summed deviance changes, in percent.
    pub contribution_percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnovaTable {
    pub rows: Vec<AnovaTableRow>,
    /// Deviance of the full model.
    pub residual_deviance: f64,
    pub residual_dof: usize,
    /// D(full) / df_resid, the F denominator.
    pub dispersion: f64,
}

impl AnovaTable {
    /// Build from specs and their fits, matched by position.
    pub fn assemble(dof: &DegreeOfFreedomTable, specs: &[ModelSpec], fits: &[FitResult]) -> Result<Self> {
        if specs.len() != fits.len() {
            return Err(AnovaGlmError::DimensionMismatch(format!(
                "{} sub-model specs but {} fit results",
                specs.len(),
                fits.len()
            )));
        }

        let full_idx = specs.iter().position(ModelSpec::is_full).ok_or_else(|| {
            AnovaGlmError::InvalidValue("no full model among the sub-models".to_string())
        })?;
        let full = &fits[full_idx];
        let residual_dof = full.residual_dof;
        let dispersion = if residual_dof > 0 {
            full.deviance / residual_dof as f64
        } else {
            f64::NAN
        };

        let mut rows = Vec::with_capacity(Effect::ALL.len());
        for effect in Effect::ALL {
            let Some(idx) = specs.iter().position(|s| s.omitted_effect() == Some(effect)) else {
                continue;
            };
            let (label, nominal) = match effect {
                Effect::PredictorA => (dof.predictor_name(Predictor::A).to_string(), dof.dof(Predictor::A)),
                Effect::PredictorB => (dof.predictor_name(Predictor::B).to_string(), dof.dof(Predictor::B)),
                Effect::Interaction => (dof.interaction_name(), dof.dof_interaction()),
            };
            let df = full.rank.saturating_sub(fits[idx].rank);
            if df != nominal {
                log::warn!(
                    "Effect {} has {} estimable degrees of freedom instead of {} (aliased columns)",
                    label,
                    df,
                    nominal
                );
            }

            // Rounding can leave tiny negative changes for effects with no signal.
            let deviance_change = (fits[idx].deviance - full.deviance).max(0.0);
            let (mean_deviance, f_statistic, p_value) = if df > 0 {
                let mean_deviance = deviance_change / df as f64;
                let f_statistic = mean_deviance / dispersion;
                (
                    mean_deviance,
                    f_statistic,
                    pvalue_f(f_statistic, df as f64, residual_dof as f64),
                )
            } else {
                (f64::NAN, f64::NAN, f64::NAN)
            };

            rows.push(AnovaTableRow {
                effect: label,
                dof: df,
                deviance_change,
                mean_deviance,
                f_statistic,
                p_value,
                contribution_percent: 0.0,
            });
        }

        let total: f64 = rows.iter().map(|r| r.deviance_change).sum();
        if total > 0.0 {
            for row in &mut rows {
                row.contribution_percent = 100.0 * row.deviance_change / total;
            }
        }

        Ok(Self {
            rows,
            residual_deviance: full.deviance,
            residual_dof,
            dispersion,
        })
    }

    pub fn row(&self, effect: &str) -> Option<&AnovaTableRow> {
        self.rows.iter().find(|r| r.effect == effect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anova::encoding::{compose_interaction, encode_contrasts};
    use crate::anova::submodel::{build_model_specs, SharedColumns};
    use approx::assert_abs_diff_eq;
    use ndarray::Array1;
    use std::sync::Arc;

    /// 20 rows; the rank follows from the residual dof.
    fn fit_with(model: &str, deviance: f64, residual_dof: usize) -> FitResult {
        FitResult {
            model: model.to_string(),
            coefficient_names: Vec::new(),
            coefficients: Array1::zeros(0),
            std_errors: Array1::zeros(0),
            p_values: None,
            deviance,
            null_deviance: 100.0,
            dispersion: 1.0,
            n_obs: 20,
            residual_dof,
            rank: 20 - residual_dof,
            aliased: Vec::new(),
            iterations: 1,
            converged: true,
        }
    }

    fn specs(include_joint_model: bool) -> Vec<ModelSpec> {
        let dom = |l: &[&str]| l.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let dof = DegreeOfFreedomTable::new("A", 3, "B", 2, include_joint_model);
        let a = encode_contrasts(&dof, Predictor::A, &dom(&["x", "y", "z"]), &[0, 1, 2, 0]).unwrap();
        let b = encode_contrasts(&dof, Predictor::B, &dom(&["p", "q"]), &[0, 1, 1, 0]).unwrap();
        let ab = compose_interaction(&dof, &a, &b).unwrap();
        let shared = SharedColumns {
            response: Arc::new(Array1::zeros(4)),
            weights: None,
            offset: None,
        };
        build_model_specs(&Arc::new(a), &Arc::new(b), &Arc::new(ab), &shared, include_joint_model).unwrap()
    }

    #[test]
    fn test_rows_from_deviance_differences() {
        let dof = DegreeOfFreedomTable::new("A", 3, "B", 2, true);
        let specs = specs(true);
        let fits = vec![
            fit_with("A, A:B", 30.0, 15),  // missing B
            fit_with("B, A:B", 50.0, 16),  // missing A
            fit_with("A, B", 22.0, 16),    // missing A:B
            fit_with("A, B, A:B", 14.0, 14),
        ];

        let table = AnovaTable::assemble(&dof, &specs, &fits).unwrap();
        assert_eq!(table.residual_dof, 14);
        assert_abs_diff_eq!(table.dispersion, 1.0, epsilon = 1e-12);

        let a = table.row("A").unwrap();
        assert_eq!(a.dof, 2);
        assert_abs_diff_eq!(a.deviance_change, 36.0, epsilon = 1e-12);
        assert_abs_diff_eq!(a.f_statistic, 18.0, epsilon = 1e-12);
        assert!(a.p_value < 0.001);

        let ab = table.row("A:B").unwrap();
        assert_eq!(ab.dof, 2);
        assert_abs_diff_eq!(ab.deviance_change, 8.0, epsilon = 1e-12);

        let total: f64 = table.rows.iter().map(|r| r.contribution_percent).sum();
        assert_abs_diff_eq!(total, 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(table.row("A").unwrap().contribution_percent, 60.0, epsilon = 1e-9);
    }

    #[test]
    fn test_no_interaction_row_without_joint_model() {
        let dof = DegreeOfFreedomTable::new("A", 3, "B", 2, false);
        let specs = specs(false);
        let fits = vec![
            fit_with("A, A:B", 30.0, 15),
            fit_with("B, A:B", 50.0, 16),
            fit_with("A, B, A:B", 14.0, 14),
        ];
        let table = AnovaTable::assemble(&dof, &specs, &fits).unwrap();
        let effects: Vec<&str> = table.rows.iter().map(|r| r.effect.as_str()).collect();
        assert_eq!(effects, vec!["A", "B"]);
    }

    #[test]
    fn test_dof_follows_estimable_rank() {
        // One empty cell: the full model loses a column, A:B keeps one dof.
        let dof = DegreeOfFreedomTable::new("A", 3, "B", 2, true);
        let specs = specs(true);
        let fits = vec![
            fit_with("A, A:B", 30.0, 16),
            fit_with("B, A:B", 50.0, 16),
            fit_with("A, B", 22.0, 16),
            fit_with("A, B, A:B", 15.0, 15),
        ];

        let table = AnovaTable::assemble(&dof, &specs, &fits).unwrap();
        assert_eq!(table.row("A:B").unwrap().dof, 1);
        assert_eq!(table.row("A").unwrap().dof, 1);
        assert_eq!(table.row("B").unwrap().dof, 1);
        assert_abs_diff_eq!(table.row("A:B").unwrap().f_statistic, 7.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fully_aliased_effect_has_no_test() {
        let dof = DegreeOfFreedomTable::new("A", 3, "B", 2, false);
        let specs = specs(false);
        let fits = vec![
            fit_with("A, A:B", 14.0, 15),
            fit_with("B, A:B", 50.0, 16),
            fit_with("A, B, A:B", 14.0, 15),
        ];

        let table = AnovaTable::assemble(&dof, &specs, &fits).unwrap();
        let b = table.row("B").unwrap();
        assert_eq!(b.dof, 0);
        assert_eq!(b.deviance_change, 0.0);
        assert!(b.f_statistic.is_nan() && b.p_value.is_nan());
        assert_abs_diff_eq!(table.row("A").unwrap().contribution_percent, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_mismatched_results_rejected() {
        let dof = DegreeOfFreedomTable::new("A", 3, "B", 2, true);
        let err = AnovaTable::assemble(&dof, &specs(true), &[fit_with("A, B, A:B", 1.0, 1)]).unwrap_err();
        assert!(matches!(err, AnovaGlmError::DimensionMismatch(_)));
    }
}
