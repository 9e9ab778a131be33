// =============================================================================
// Sub-model Frame Builder
// =============================================================================
//
// The ANOVA decomposition compares nested models. Each effect E is measured
// by dropping E from the full model and looking at how much deviance that
// costs:
//
//     index   predictors        missing effect
//     0       A, A:B            B
//     1       B, A:B            A
//     2       A, B              A:B        (only with include_joint_model)
//     last    A, B, A:B         -          (the full reference model)
//
// A ModelSpec never copies column data. It holds `Arc` handles to the
// column sets built once by the encoders; every fit reads them in parallel.
// Column order inside a spec is always A columns, B columns, then A:B,
// and coefficient names downstream rely on it.
//
// =============================================================================

use std::fmt;
use std::sync::Arc;

use ndarray::{s, Array1, Array2};

use crate::error::{AnovaGlmError, Result};

use super::encoding::{ContrastColumnSet, InteractionColumnSet};

/// The column groups a sub-model can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    PredictorA,
    PredictorB,
    Interaction,
}

impl Effect {
    pub const ALL: [Effect; 3] = [Effect::PredictorA, Effect::PredictorB, Effect::Interaction];
}

/// Shared, read-only response/weight/offset vectors for every spec.
#[derive(Debug, Clone)]
pub struct SharedColumns {
    pub response: Arc<Array1<f64>>,
    pub weights: Option<Arc<Array1<f64>>>,
    pub offset: Option<Arc<Array1<f64>>>,
}

/// One sub-model, ready to hand to a fitter.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    description: String,
    effects: Vec<Effect>,
    effect_names: Vec<String>,
    contrast_a: Option<Arc<ContrastColumnSet>>,
    contrast_b: Option<Arc<ContrastColumnSet>>,
    interaction: Option<Arc<InteractionColumnSet>>,
    shared: SharedColumns,
}

impl ModelSpec {
    /// e.g. `"GLM model with predictors A, A:B"`.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Effects included, in column order.
    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    /// Effect labels, e.g. `["A", "A:B"]`.
    pub fn effect_names(&self) -> &[String] {
        &self.effect_names
    }

    pub fn contains(&self, effect: Effect) -> bool {
        self.effects.contains(&effect)
    }

    /// Is this the model with every effect?
    pub fn is_full(&self) -> bool {
        Effect::ALL.iter().all(|e| self.contains(*e))
    }

    /// The single effect left out, if exactly one is.
    pub fn omitted_effect(&self) -> Option<Effect> {
        let mut missing = Effect::ALL.iter().copied().filter(|e| !self.contains(*e));
        match (missing.next(), missing.next()) {
            (Some(e), None) => Some(e),
            _ => None,
        }
    }

    pub fn nrows(&self) -> usize {
        self.shared.response.len()
    }

    /// Number of encoded predictor columns (no intercept).
    pub fn ncols(&self) -> usize {
        self.contrast_a.as_ref().map_or(0, |c| c.dof())
            + self.contrast_b.as_ref().map_or(0, |c| c.dof())
            + self.interaction.as_ref().map_or(0, |c| c.dof())
    }

    /// Encoded column names in design-matrix order.
    pub fn column_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.ncols());
        if let Some(a) = &self.contrast_a {
            names.extend(a.names().iter().cloned());
        }
        if let Some(b) = &self.contrast_b {
            names.extend(b.names().iter().cloned());
        }
        if let Some(ab) = &self.interaction {
            names.extend(ab.names().iter().cloned());
        }
        names
    }

    /// Assemble the design matrix, with a leading column of ones when `intercept` is set.
    pub fn design_matrix(&self, intercept: bool) -> Array2<f64> {
        let lead = usize::from(intercept);
        let mut x = Array2::<f64>::zeros((self.nrows(), lead + self.ncols()));
        if intercept {
            x.column_mut(0).fill(1.0);
        }

        let mut at = lead;
        let blocks = [
            self.contrast_a.as_ref().map(|c| c.values()),
            self.contrast_b.as_ref().map(|c| c.values()),
            self.interaction.as_ref().map(|c| c.values()),
        ];
        for block in blocks.into_iter().flatten() {
            let width = block.ncols();
            x.slice_mut(s![.., at..at + width]).assign(block);
            at += width;
        }
        x
    }

    pub fn response(&self) -> &Array1<f64> {
        &self.shared.response
    }

    pub fn weights(&self) -> Option<&Array1<f64>> {
        self.shared.weights.as_deref()
    }

    pub fn offset(&self) -> Option<&Array1<f64>> {
        self.shared.offset.as_deref()
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Build the sub-model specs in their fixed order.
///
/// Fails with `DimensionMismatch` if any column set or shared vector
/// disagrees on the number of rows.
pub fn build_model_specs(
    contrast_a: &Arc<ContrastColumnSet>,
    contrast_b: &Arc<ContrastColumnSet>,
    interaction: &Arc<InteractionColumnSet>,
    shared: &SharedColumns,
    include_joint_model: bool,
) -> Result<Vec<ModelSpec>> {
    let n = shared.response.len();
    let lengths = [
        ("contrast columns of ".to_string() + contrast_a.predictor(), contrast_a.nrows()),
        ("contrast columns of ".to_string() + contrast_b.predictor(), contrast_b.nrows()),
        ("interaction columns".to_string(), interaction.nrows()),
        ("weights".to_string(), shared.weights.as_ref().map_or(n, |w| w.len())),
        ("offset".to_string(), shared.offset.as_ref().map_or(n, |o| o.len())),
    ];
    for (what, len) in lengths {
        if len != n {
            return Err(AnovaGlmError::DimensionMismatch(format!(
                "{} have {} rows but the response has {}",
                what, len, n
            )));
        }
    }

    let mut layouts = vec![
        vec![Effect::PredictorA, Effect::Interaction],
        vec![Effect::PredictorB, Effect::Interaction],
    ];
    if include_joint_model {
        layouts.push(vec![Effect::PredictorA, Effect::PredictorB]);
    }
    layouts.push(Effect::ALL.to_vec());

    let label = |effect: Effect| -> String {
        match effect {
            Effect::PredictorA => contrast_a.predictor().to_string(),
            Effect::PredictorB => contrast_b.predictor().to_string(),
            Effect::Interaction => interaction.effect().to_string(),
        }
    };

    let specs = layouts
        .into_iter()
        .map(|effects| {
            let effect_names: Vec<String> = effects.iter().map(|&e| label(e)).collect();
            let has = |e: Effect| effects.contains(&e);
            ModelSpec {
                description: format!("GLM model with predictors {}", effect_names.join(", ")),
                contrast_a: has(Effect::PredictorA).then(|| Arc::clone(contrast_a)),
                contrast_b: has(Effect::PredictorB).then(|| Arc::clone(contrast_b)),
                interaction: has(Effect::Interaction).then(|| Arc::clone(interaction)),
                shared: shared.clone(),
                effect_names,
                effects,
            }
        })
        .collect();

    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anova::encoding::{compose_interaction, encode_contrasts};
    use crate::anova::dof::DegreeOfFreedomTable;
    use crate::anova::missing::Predictor;
    use ndarray::array;

    fn domain(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    fn fixture() -> (Arc<ContrastColumnSet>, Arc<ContrastColumnSet>, Arc<InteractionColumnSet>) {
        let dof = DegreeOfFreedomTable::new("A", 3, "B", 2, true);
        let a = encode_contrasts(&dof, Predictor::A, &domain(&["x", "y", "z"]), &[0, 1, 2, 0]).unwrap();
        let b = encode_contrasts(&dof, Predictor::B, &domain(&["p", "q"]), &[0, 1, 1, 0]).unwrap();
        let ab = compose_interaction(&dof, &a, &b).unwrap();
        (Arc::new(a), Arc::new(b), Arc::new(ab))
    }

    fn shared(n: usize) -> SharedColumns {
        SharedColumns {
            response: Arc::new(Array1::linspace(1.0, n as f64, n)),
            weights: None,
            offset: None,
        }
    }

    #[test]
    fn test_four_specs_in_fixed_order() {
        let (a, b, ab) = fixture();
        let specs = build_model_specs(&a, &b, &ab, &shared(4), true).unwrap();
        let descriptions: Vec<&str> = specs.iter().map(|s| s.description()).collect();
        assert_eq!(
            descriptions,
            vec![
                "GLM model with predictors A, A:B",
                "GLM model with predictors B, A:B",
                "GLM model with predictors A, B",
                "GLM model with predictors A, B, A:B",
            ]
        );
        assert_eq!(specs[0].omitted_effect(), Some(Effect::PredictorB));
        assert_eq!(specs[1].omitted_effect(), Some(Effect::PredictorA));
        assert_eq!(specs[2].omitted_effect(), Some(Effect::Interaction));
        assert!(specs[3].is_full());
    }

    #[test]
    fn test_three_specs_without_joint_model() {
        let (a, b, ab) = fixture();
        let specs = build_model_specs(&a, &b, &ab, &shared(4), false).unwrap();
        assert_eq!(specs.len(), 3);
        assert!(specs.iter().all(|s| s.contains(Effect::Interaction)));
        assert!(specs[2].is_full());
    }

    #[test]
    fn test_design_matrix_column_order() {
        let (a, b, ab) = fixture();
        let specs = build_model_specs(&a, &b, &ab, &shared(4), true).unwrap();
        let full = &specs[3];

        assert_eq!(
            full.column_names(),
            vec!["A_x", "A_y", "B_p", "A_x_B_p", "A_y_B_p"]
        );
        let x = full.design_matrix(true);
        assert_eq!(x.dim(), (4, 6));
        // row 2: A = z (-1, -1), B = q (-1), A:B = (1, 1)
        assert_eq!(x.row(2).to_vec(), vec![1.0, -1.0, -1.0, -1.0, 1.0, 1.0]);

        let no_intercept = specs[1].design_matrix(false);
        assert_eq!(no_intercept.column(0), array![1.0, -1.0, -1.0, 1.0]);
    }

    #[test]
    fn test_specs_share_column_storage() {
        let (a, b, ab) = fixture();
        let specs = build_model_specs(&a, &b, &ab, &shared(4), true).unwrap();
        // A is used by specs 0, 2 and 3, plus the local handle
        assert_eq!(Arc::strong_count(&a), 4);
        assert_eq!(Arc::strong_count(&ab), 4);
        drop(specs);
        assert_eq!(Arc::strong_count(&a), 1);
    }

    #[test]
    fn test_misaligned_rows_are_rejected() {
        let (a, b, ab) = fixture();
        let err = build_model_specs(&a, &b, &ab, &shared(3), true).unwrap_err();
        assert!(matches!(err, AnovaGlmError::DimensionMismatch(_)));

        let mut bad = shared(4);
        bad.offset = Some(Arc::new(array![0.0, 0.0]));
        let err = build_model_specs(&a, &b, &ab, &bad, true).unwrap_err();
        assert!(matches!(err, AnovaGlmError::DimensionMismatch(_)));
    }
}
