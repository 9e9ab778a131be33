// =============================================================================
// AnovaGLM: two-factor ANOVA through nested GLM fits
// =============================================================================
//
// Given a frame with exactly two categorical predictors A and B and a
// numeric response, AnovaGLM measures how much each of A, B and their
// interaction A:B explains by fitting nested GLMs that leave one effect out
// and comparing deviances against the full model.
//
// PIPELINE:
// ---------
//
//   Frame
//     │ validation          all configuration problems reported at once
//     ▼
//   DegreeOfFreedomTable    column widths and effect names for every encoder
//     │
//   ResolvedRows            one synchronized scan: which rows, which levels
//     │
//     ├──► contrasts A ─┐   (rayon::join, each chunked over rows)
//     ├──► contrasts B ─┤
//     │                 ▼
//     │            interaction A:B
//     ├──► weight / offset
//     ▼
//   FrameArena              owns every derived column set (Arc)
//     │
//     ▼
//   ModelSpecs ──► fit_all (bounded pool) ──► FitResults ──► AnovaTable
//     │
//     ▼
//   arena.release()  or  arena.retain() ──► TransformedColumns
//
// The arena is closed on every exit path once the fits are done. A failed
// run always releases it; only a successful one can hand columns back.
//
// =============================================================================

pub mod arena;
pub mod auxiliary;
pub mod dof;
pub mod encoding;
pub mod fit;
pub mod frame;
pub mod missing;
pub mod submodel;
pub mod table;
pub mod validation;

use std::sync::Arc;

use ndarray::Array1;

use crate::error::Result;
use crate::families::FamilyKind;
use crate::links::LinkKind;
use crate::solvers::IRLSConfig;

pub use arena::{FrameArena, TransformedColumns};
pub use auxiliary::{extract_auxiliary, AuxiliaryColumns};
pub use dof::DegreeOfFreedomTable;
pub use encoding::{compose_interaction, encode_contrasts, ContrastColumnSet, InteractionColumnSet};
pub use fit::{fit_all, FitResult, GlmSettings, IrlsFitter, ModelFitter};
pub use frame::{CategoricalColumn, Column, Frame, NumericColumn};
pub use missing::{MissingValuePolicy, MissingValuesHandling, Predictor, ResolvedRows};
pub use submodel::{build_model_specs, Effect, ModelSpec, SharedColumns};
pub use table::{AnovaTable, AnovaTableRow};

// =============================================================================
// Configuration
// =============================================================================

/// Parameters of an AnovaGLM run.
#[derive(Debug, Clone)]
pub struct AnovaGlmConfig {
    pub response_column: String,

    /// Prior weights; missing values in kept rows become 0.
    pub weights_column: Option<String>,

    /// Offset added to the linear predictor; missing values in kept rows become 0.
    pub offset_column: Option<String>,

    /// Columns that are neither predictors nor response/weights/offset.
    pub ignored_columns: Vec<String>,

    /// Default: Gaussian
    pub family: FamilyKind,

    /// Default: the family's canonical choice (identity for Gaussian, log for Tweedie)
    pub link: LinkKind,

    pub missing_values_handling: MissingValuesHandling,

    /// Fill levels for A and B under `PlugValues`.
    pub plug_values: Option<[String; 2]>,

    /// Under `Skip`, also drop rows with a missing weight or offset.
    /// Default: true
    pub skip_missing_auxiliary: bool,

    /// Fit the additive A + B model too, which adds the A:B row to the table.
    /// Default: true
    pub include_joint_model: bool,

    /// Upper bound on concurrent fits. `None` fits every sub-model at once.
    pub max_parallelism: Option<usize>,

    /// Hand the transformed columns back in the output.
    pub save_transformed_columns: bool,

    /// Default: true
    pub compute_p_values: bool,

    /// Default: true
    pub intercept: bool,

    pub irls: IRLSConfig,
}

impl Default for AnovaGlmConfig {
    fn default() -> Self {
        Self {
            response_column: String::new(),
            weights_column: None,
            offset_column: None,
            ignored_columns: Vec::new(),
            family: FamilyKind::default(),
            link: LinkKind::default(),
            missing_values_handling: MissingValuesHandling::default(),
            plug_values: None,
            skip_missing_auxiliary: true,
            include_joint_model: true,
            max_parallelism: None,
            save_transformed_columns: false,
            compute_p_values: true,
            intercept: true,
            irls: IRLSConfig::default(),
        }
    }
}

impl AnovaGlmConfig {
    /// The per-fit part of the configuration.
    pub fn glm_settings(&self) -> GlmSettings {
        GlmSettings {
            family: self.family,
            link: self.link,
            intercept: self.intercept,
            compute_p_values: self.compute_p_values,
            irls: self.irls.clone(),
        }
    }
}

// =============================================================================
// Output
// =============================================================================

#[derive(Debug, Clone)]
pub struct AnovaGlmOutput {
    pub predictor_names: [String; 2],

    /// One per sub-model, in fit order.
    pub model_descriptions: Vec<String>,

    pub dof: DegreeOfFreedomTable,

    /// One per sub-model, in the same order as `model_descriptions`.
    pub fits: Vec<FitResult>,

    pub table: AnovaTable,

    /// Rows used in every fit.
    pub n_obs: usize,

    /// Source rows dropped by missing-value handling.
    pub n_excluded: usize,

    /// Present only with `save_transformed_columns`.
    pub transformed: Option<TransformedColumns>,
}

impl AnovaGlmOutput {
    /// The model with A, B and A:B; always fitted last.
    pub fn full_model(&self) -> Option<&FitResult> {
        self.fits.last()
    }

    pub fn fit(&self, description: &str) -> Option<&FitResult> {
        self.fits.iter().find(|f| f.model == description)
    }
}

// =============================================================================
// Driver
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct AnovaGlm {
    config: AnovaGlmConfig,
}

impl AnovaGlm {
    pub fn new(config: AnovaGlmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnovaGlmConfig {
        &self.config
    }

    /// Run with the built-in IRLS fitter.
    pub fn train(&self, frame: &Frame) -> Result<AnovaGlmOutput> {
        self.train_with(frame, &IrlsFitter)
    }

    /// Run with a caller-supplied fitter.
    pub fn train_with(&self, frame: &Frame, fitter: &dyn ModelFitter) -> Result<AnovaGlmOutput> {
        let config = &self.config;
        let input = validation::validate(config, frame)?;
        let [name_a, name_b] = input.names;
        let [col_a, col_b] = input.predictors;
        log::info!(
            "Validated AnovaGLM input: predictors '{}' ({} levels) and '{}' ({} levels), {} rows",
            name_a,
            col_a.domain().len(),
            name_b,
            col_b.domain().len(),
            frame.nrows()
        );

        let dof = DegreeOfFreedomTable::new(
            name_a,
            col_a.domain().len(),
            name_b,
            col_b.domain().len(),
            config.include_joint_model,
        );

        let rows = ResolvedRows::resolve(
            col_a,
            col_b,
            input.response,
            input.weights,
            input.offset,
            &input.policy,
        )?;

        let (contrast_a, contrast_b) = rayon::join(
            || encode_contrasts(&dof, Predictor::A, col_a.domain(), rows.levels(Predictor::A)),
            || encode_contrasts(&dof, Predictor::B, col_b.domain(), rows.levels(Predictor::B)),
        );
        let (contrast_a, contrast_b) = (contrast_a?, contrast_b?);
        let interaction = compose_interaction(&dof, &contrast_a, &contrast_b)?;
        let auxiliary = extract_auxiliary(input.weights, input.offset, &rows);
        let response = Array1::from_vec(rows.gather(input.response, f64::NAN));

        log::info!(
            "Transformed columns: {} + {} contrast columns, {} interaction columns over {} rows",
            contrast_a.dof(),
            contrast_b.dof(),
            interaction.dof(),
            rows.len()
        );

        let mut arena = FrameArena::new(contrast_a, contrast_b, interaction);
        let weights = match (auxiliary.weights, config.weights_column.as_deref()) {
            (Some(w), Some(name)) => Some(arena.add_auxiliary(name, w)),
            _ => None,
        };
        let offset = match (auxiliary.offset, config.offset_column.as_deref()) {
            (Some(o), Some(name)) => Some(arena.add_auxiliary(name, o)),
            _ => None,
        };
        let shared = SharedColumns {
            response: Arc::new(response),
            weights,
            offset,
        };

        let outcome = self.fit_submodels(&arena, shared, &dof, fitter);

        let transformed = close_arena(arena, &outcome, config.save_transformed_columns);
        let (model_descriptions, fits, table) = outcome?;

        Ok(AnovaGlmOutput {
            predictor_names: [name_a.to_string(), name_b.to_string()],
            model_descriptions,
            dof,
            fits,
            table,
            n_obs: rows.len(),
            n_excluded: rows.n_excluded(),
            transformed,
        })
    }

    /// Build the specs, fit them and assemble the table. Every handle into
    /// the arena taken here is dropped before returning.
    fn fit_submodels(
        &self,
        arena: &FrameArena,
        shared: SharedColumns,
        dof: &DegreeOfFreedomTable,
        fitter: &dyn ModelFitter,
    ) -> Result<(Vec<String>, Vec<FitResult>, AnovaTable)> {
        let specs = build_model_specs(
            arena.contrast_a(),
            arena.contrast_b(),
            arena.interaction(),
            &shared,
            self.config.include_joint_model,
        )?;
        let settings = self.config.glm_settings();
        let fits = fit_all(&specs, fitter, &settings, self.config.max_parallelism)?;
        let table = AnovaTable::assemble(dof, &specs, &fits)?;
        let descriptions = specs.iter().map(|s| s.description().to_string()).collect();
        Ok((descriptions, fits, table))
    }
}

/// Hand the transformed columns back only for a successful run that asked
/// for them; every other path releases the arena without concatenating.
fn close_arena<T>(arena: FrameArena, outcome: &Result<T>, save: bool) -> Option<TransformedColumns> {
    if save && outcome.is_ok() {
        Some(arena.retain())
    } else {
        arena.release();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnovaGlmError;

    fn arena() -> FrameArena {
        let dom = |l: &[&str]| l.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let dof = DegreeOfFreedomTable::new("A", 2, "B", 3, true);
        let a = encode_contrasts(&dof, Predictor::A, &dom(&["x", "y"]), &[0, 1]).unwrap();
        let b = encode_contrasts(&dof, Predictor::B, &dom(&["p", "q", "r"]), &[2, 0]).unwrap();
        let ab = compose_interaction(&dof, &a, &b).unwrap();
        FrameArena::new(a, b, ab)
    }

    #[test]
    fn test_failed_run_never_retains() {
        let failed: Result<()> = Err(AnovaGlmError::LinearAlgebra("singular".to_string()));
        assert!(close_arena(arena(), &failed, true).is_none());
        assert!(close_arena(arena(), &failed, false).is_none());
    }

    #[test]
    fn test_successful_run_retains_on_request() {
        assert!(close_arena(arena(), &Ok(()), false).is_none());
        let kept = close_arena(arena(), &Ok(()), true).unwrap();
        assert_eq!(kept.column_names, vec!["A_x", "B_p", "B_q", "A_x_B_p", "A_x_B_q"]);
        assert_eq!(kept.nrows(), 2);
    }
}
