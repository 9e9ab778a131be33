// =============================================================================
// Family, Link and Missing-Value Name Parsing
// =============================================================================
//
// Python passes these options as strings. The helpers here turn them into
// the core configuration enums and reject unknown names with a clear
// message instead of silently defaulting.
// =============================================================================

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use anovaglm_core::anova::MissingValuesHandling;
use anovaglm_core::families::FamilyKind;
use anovaglm_core::links::LinkKind;

/// Parse a family name. `var_power` is used only for Tweedie.
pub(crate) fn family_from_name(name: &str, var_power: f64) -> PyResult<FamilyKind> {
    let family = FamilyKind::from_name(name, var_power).ok_or_else(|| {
        PyValueError::new_err(format!(
            "Unknown family '{}'. AnovaGLM supports 'gaussian' and 'tweedie'.",
            name
        ))
    })?;
    if matches!(family, FamilyKind::Tweedie { .. }) && var_power > 0.0 && var_power < 1.0 {
        return Err(PyValueError::new_err(format!(
            "var_power must be 0 or >= 1, got {}",
            var_power
        )));
    }
    Ok(family)
}

/// Parse a link name; `None` means the family default.
///
/// For the power link the exponent is `1 - var_power`, the Tweedie
/// canonical link.
pub(crate) fn link_from_name(name: Option<&str>, var_power: f64) -> PyResult<LinkKind> {
    LinkKind::from_name(name, 1.0 - var_power).ok_or_else(|| {
        PyValueError::new_err(format!(
            "Unknown link '{}'. Use 'identity', 'log', 'power' or leave unset for the family default.",
            name.unwrap_or_default()
        ))
    })
}

pub(crate) fn missing_values_from_name(name: &str) -> PyResult<MissingValuesHandling> {
    MissingValuesHandling::from_name(name).ok_or_else(|| {
        PyValueError::new_err(format!(
            "Unknown missing_values_handling '{}'. Use 'mean_imputation', 'plug_values' or 'skip'.",
            name
        ))
    })
}
