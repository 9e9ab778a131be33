//! Up-front checks on the configuration and the frame.
//!
//! Every problem is collected and reported together in one
//! `InvalidConfig` error; nothing is encoded until the input passes.

use crate::error::{AnovaGlmError, Result};
use crate::families::FamilyKind;
use crate::links::LinkKind;

use super::frame::{CategoricalColumn, Column, Frame, NumericColumn};
use super::missing::{MissingValuePolicy, MissingValuesHandling};
use super::AnovaGlmConfig;

/// References into the frame for a run that passed validation.
#[derive(Debug)]
pub struct ValidatedInput<'a> {
    pub names: [&'a str; 2],
    pub predictors: [&'a CategoricalColumn; 2],
    pub response: &'a NumericColumn,
    pub weights: Option<&'a NumericColumn>,
    pub offset: Option<&'a NumericColumn>,
    pub policy: MissingValuePolicy,
}

/// Look up an optional numeric column, recording why it is unusable.
fn numeric_column<'a>(
    frame: &'a Frame,
    role: &str,
    name: &str,
    problems: &mut Vec<String>,
) -> Option<&'a NumericColumn> {
    match frame.column(name) {
        None => {
            problems.push(format!("{} column '{}' not found in the frame", role, name));
            None
        }
        Some(Column::Categorical(_)) => {
            problems.push(format!("{} column '{}' must be numeric", role, name));
            None
        }
        Some(Column::Numeric(col)) => Some(col),
    }
}

fn check_family_and_link(config: &AnovaGlmConfig, problems: &mut Vec<String>) {
    if let FamilyKind::Tweedie { var_power } = config.family {
        if !var_power.is_finite() || var_power < 0.0 || (var_power > 0.0 && var_power < 1.0) {
            problems.push(format!(
                "tweedie variance power must be 0 or >= 1, got {}",
                var_power
            ));
        }
    }

    match (config.link.resolve(&config.family), &config.family) {
        (LinkKind::Power(p), _) if !p.is_finite() => {
            problems.push(format!("link power must be finite, got {}", p));
        }
        (LinkKind::Identity, FamilyKind::Tweedie { .. }) => {
            problems.push("tweedie family needs a log or power link, not identity".to_string());
        }
        _ => {}
    }
}

fn check_response(config: &AnovaGlmConfig, response: &NumericColumn, problems: &mut Vec<String>) {
    // Missing values are fine here; those rows are excluded when rows are resolved.
    let name = &config.response_column;
    if let FamilyKind::Tweedie { var_power } = config.family {
        let values = response.values().iter().filter(|v| !v.is_nan());
        if var_power >= 2.0 {
            if values.clone().any(|&v| v <= 0.0) {
                problems.push(format!(
                    "response column '{}' must be positive for tweedie power {}",
                    name, var_power
                ));
            }
        } else if var_power >= 1.0 && values.clone().any(|&v| v < 0.0) {
            problems.push(format!(
                "response column '{}' must be non-negative for tweedie power {}",
                name, var_power
            ));
        }
    }
}

/// Fill levels for the impute modes; `None` when a problem was recorded.
fn impute_fills(
    config: &AnovaGlmConfig,
    names: [&str; 2],
    predictors: [&CategoricalColumn; 2],
    problems: &mut Vec<String>,
) -> Option<[u32; 2]> {
    let mut fills = [0u32; 2];
    let mut ok = true;
    match config.missing_values_handling {
        MissingValuesHandling::MeanImputation => {
            for i in 0..2 {
                match predictors[i].mode() {
                    Some(level) => fills[i] = level,
                    None => {
                        problems.push(format!(
                            "predictor '{}' has no values to impute from",
                            names[i]
                        ));
                        ok = false;
                    }
                }
            }
        }
        MissingValuesHandling::PlugValues => match &config.plug_values {
            None => {
                problems.push("missing_values_handling is PlugValues but no plug values were given".to_string());
                ok = false;
            }
            Some(plugs) => {
                for i in 0..2 {
                    match predictors[i].level_index(&plugs[i]) {
                        Some(level) => fills[i] = level,
                        None => {
                            problems.push(format!(
                                "plug value '{}' is not a level of predictor '{}'",
                                plugs[i], names[i]
                            ));
                            ok = false;
                        }
                    }
                }
            }
        },
        MissingValuesHandling::Skip => {}
    }
    ok.then_some(fills)
}

/// Check everything and resolve the columns a run needs.
pub fn validate<'a>(config: &AnovaGlmConfig, frame: &'a Frame) -> Result<ValidatedInput<'a>> {
    let mut problems = Vec::new();

    if frame.nrows() == 0 {
        problems.push("the frame has no rows".to_string());
    }
    if config.max_parallelism == Some(0) {
        problems.push("max_parallelism must be at least 1".to_string());
    }
    if config.irls.max_iterations == 0 {
        problems.push("max_iterations must be at least 1".to_string());
    }
    if config.irls.tolerance.is_nan() || config.irls.tolerance <= 0.0 {
        problems.push(format!("tolerance must be positive, got {}", config.irls.tolerance));
    }
    let collinear = config.irls.collinear_tolerance;
    if collinear.is_nan() || collinear <= 0.0 || collinear >= 1.0 {
        problems.push(format!("collinear tolerance must be in (0, 1), got {}", collinear));
    }
    check_family_and_link(config, &mut problems);

    // Response, weights and offset
    let response = if config.response_column.is_empty() {
        problems.push("response column is not set".to_string());
        None
    } else {
        numeric_column(frame, "response", &config.response_column, &mut problems)
    };
    if let Some(response) = response {
        check_response(config, response, &mut problems);
    }

    let weights = config
        .weights_column
        .as_deref()
        .and_then(|name| numeric_column(frame, "weights", name, &mut problems));
    if let Some(w) = weights {
        if w.values().iter().any(|&v| v < 0.0) {
            problems.push("weights must be non-negative".to_string());
        }
    }
    let offset = config
        .offset_column
        .as_deref()
        .and_then(|name| numeric_column(frame, "offset", name, &mut problems));

    for ignored in &config.ignored_columns {
        if frame.column(ignored).is_none() {
            problems.push(format!("ignored column '{}' not found in the frame", ignored));
        }
    }

    // Predictors: everything not claimed by another role
    let reserved = |name: &str| {
        name == config.response_column
            || config.weights_column.as_deref() == Some(name)
            || config.offset_column.as_deref() == Some(name)
            || config.ignored_columns.iter().any(|c| c == name)
    };
    let candidates: Vec<(&str, &Column)> = frame.iter().filter(|(name, _)| !reserved(name)).collect();

    if candidates.len() != 2 {
        let names: Vec<&str> = candidates.iter().map(|(n, _)| *n).collect();
        problems.push(format!(
            "AnovaGLM needs exactly 2 predictors, found {}: [{}]",
            candidates.len(),
            names.join(", ")
        ));
    }

    let mut categorical = Vec::with_capacity(2);
    for &(name, column) in &candidates {
        match column {
            Column::Numeric(_) => {
                problems.push(format!("predictor '{}' must be categorical, found a numeric column", name));
            }
            Column::Categorical(col) => {
                if col.domain().len() < 2 {
                    problems.push(format!(
                        "predictor '{}' needs at least 2 levels, found {}",
                        name,
                        col.domain().len()
                    ));
                }
                categorical.push((name, col));
            }
        }
    }

    let (names, predictors) = match categorical.as_slice() {
        [(na, ca), (nb, cb)] if candidates.len() == 2 => ([*na, *nb], [*ca, *cb]),
        _ => return Err(AnovaGlmError::InvalidConfig(problems)),
    };

    let policy = match config.missing_values_handling {
        MissingValuesHandling::Skip => Some(MissingValuePolicy::Skip {
            skip_missing_auxiliary: config.skip_missing_auxiliary,
        }),
        _ => impute_fills(config, names, predictors, &mut problems)
            .map(|fills| MissingValuePolicy::Impute { fills }),
    };

    match (problems.is_empty(), response, policy) {
        (true, Some(response), Some(policy)) => Ok(ValidatedInput {
            names,
            predictors,
            response,
            weights,
            offset,
            policy,
        }),
        _ => Err(AnovaGlmError::InvalidConfig(problems)),
    }
}
