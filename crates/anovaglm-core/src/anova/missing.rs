// =============================================================================
// Missing-Value Policy and Row Resolution
// =============================================================================
//
// Every derived column set (A contrasts, B contrasts, A:B interaction,
// weight, offset, response) must describe the *same rows in the same order*.
// The only way to guarantee that is to decide row membership once:
//
//     source frame ──► ResolvedRows::resolve ──► [kept source rows + level indices]
//                                                   │
//                        ┌──────────────┬───────────┼─────────────┐
//                        ▼              ▼           ▼             ▼
//                   A contrasts    B contrasts  interaction   weight/offset
//
// `MissingValuePolicy::resolve_row` is the single rule deciding whether a
// row survives and which level indices it carries. Nothing downstream looks
// at the raw columns again.
//
// A row whose response is missing is excluded in every mode: it has
// nothing to contribute to any fit.
//
// MODES:
// ------
//   - Impute: a missing level is replaced by a per-predictor fill level
//     (the modal level, or a user-supplied plug level). No row is dropped
//     for a missing predictor.
//   - Skip:   a row with either predictor missing is dropped everywhere.
//             Missing weight/offset values drop the row too, unless
//             `skip_missing_auxiliary` is switched off.
//
// =============================================================================

use crate::error::{AnovaGlmError, Result};

use super::frame::{CategoricalColumn, NumericColumn};

/// How missing predictor values are handled, as a configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingValuesHandling {
    /// Impute with each predictor's most frequent level.
    #[default]
    MeanImputation,
    /// Impute with caller-supplied plug levels.
    PlugValues,
    /// Drop rows with missing predictor values.
    Skip,
}

impl MissingValuesHandling {
    pub fn imputes(&self) -> bool {
        !matches!(self, MissingValuesHandling::Skip)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "mean_imputation" | "meanimputation" | "impute" => Some(Self::MeanImputation),
            "plug_values" | "plugvalues" => Some(Self::PlugValues),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }
}

/// Resolved row-inclusion rule for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingValuePolicy {
    /// Substitute `fills[0]` / `fills[1]` for missing A / B levels.
    Impute { fills: [u32; 2] },
    /// Drop incomplete rows.
    Skip { skip_missing_auxiliary: bool },
}

impl MissingValuePolicy {
    /// Decide one row from its raw predictor levels.
    ///
    /// Returns `None` when the row must be excluded, otherwise the level
    /// indices to encode (fill levels substituted under Impute).
    pub fn resolve_row(&self, raw_a: Option<u32>, raw_b: Option<u32>) -> Option<(u32, u32)> {
        match *self {
            MissingValuePolicy::Impute { fills } => {
                Some((raw_a.unwrap_or(fills[0]), raw_b.unwrap_or(fills[1])))
            }
            MissingValuePolicy::Skip { .. } => Some((raw_a?, raw_b?)),
        }
    }

    /// Does a row with these auxiliary values (`None` = missing) stay in?
    pub fn keeps_auxiliary(&self, values: &[Option<f64>]) -> bool {
        match *self {
            MissingValuePolicy::Impute { .. } => true,
            MissingValuePolicy::Skip {
                skip_missing_auxiliary,
            } => !skip_missing_auxiliary || values.iter().all(Option::is_some),
        }
    }
}

/// Weight used for a kept row whose weight is missing: the row carries no
/// information into the fit but keeps its position.
pub const MISSING_WEIGHT_FILL: f64 = 0.0;

/// Offset used for a kept row whose offset is missing.
pub const MISSING_OFFSET_FILL: f64 = 0.0;

/// Which of the two predictors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Predictor {
    A,
    B,
}

/// Rows surviving the missing-value policy, in source order, with the
/// level indices every encoder must use.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRows {
    source_rows: Vec<usize>,
    levels_a: Vec<u32>,
    levels_b: Vec<u32>,
    n_source: usize,
}

impl ResolvedRows {
    /// One synchronized scan over the source rows.
    ///
    /// Fails with `NoUsableRows` when nothing survives.
    pub fn resolve(
        a: &CategoricalColumn,
        b: &CategoricalColumn,
        response: &NumericColumn,
        weights: Option<&NumericColumn>,
        offset: Option<&NumericColumn>,
        policy: &MissingValuePolicy,
    ) -> Result<Self> {
        let n_source = a.len();
        if b.len() != n_source
            || response.len() != n_source
            || weights.is_some_and(|w| w.len() != n_source)
            || offset.is_some_and(|o| o.len() != n_source)
        {
            return Err(AnovaGlmError::DimensionMismatch(
                "predictor, response and auxiliary columns have different lengths".to_string(),
            ));
        }

        let mut source_rows = Vec::with_capacity(n_source);
        let mut levels_a = Vec::with_capacity(n_source);
        let mut levels_b = Vec::with_capacity(n_source);
        let mut aux = Vec::with_capacity(2);
        let mut missing_response = 0;

        for row in 0..n_source {
            if response.get(row).is_none() {
                missing_response += 1;
                continue;
            }
            let Some((la, lb)) = policy.resolve_row(a.get(row), b.get(row)) else {
                continue;
            };
            aux.clear();
            aux.extend(weights.map(|w| w.get(row)));
            aux.extend(offset.map(|o| o.get(row)));
            if !policy.keeps_auxiliary(&aux) {
                continue;
            }
            source_rows.push(row);
            levels_a.push(la);
            levels_b.push(lb);
        }

        if source_rows.is_empty() {
            return Err(AnovaGlmError::NoUsableRows { total: n_source });
        }

        log::info!(
            "Resolved {} of {} rows for encoding ({} excluded, {} for a missing response)",
            source_rows.len(),
            n_source,
            n_source - source_rows.len(),
            missing_response
        );

        Ok(Self {
            source_rows,
            levels_a,
            levels_b,
            n_source,
        })
    }

    /// Number of rows kept.
    pub fn len(&self) -> usize {
        self.source_rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_rows.is_empty()
    }

    /// Number of rows in the source frame.
    pub fn n_source(&self) -> usize {
        self.n_source
    }

    pub fn n_excluded(&self) -> usize {
        self.n_source - self.source_rows.len()
    }

    /// Source row index of each kept row.
    pub fn source_rows(&self) -> &[usize] {
        &self.source_rows
    }

    /// Level indices of a predictor for the kept rows (imputed where needed).
    pub fn levels(&self, predictor: Predictor) -> &[u32] {
        match predictor {
            Predictor::A => &self.levels_a,
            Predictor::B => &self.levels_b,
        }
    }

    /// Pull a numeric column onto the kept rows, replacing missing values with `fill`.
    pub fn gather(&self, column: &NumericColumn, fill: f64) -> Vec<f64> {
        self.source_rows
            .iter()
            .map(|&r| column.get(r).unwrap_or(fill))
            .collect()
    }
}
