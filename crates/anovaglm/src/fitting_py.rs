// =============================================================================
// AnovaGLM Entry Point (Python Binding)
// =============================================================================
//
// `anova_glm` builds a frame from the two label lists and the response,
// runs the core AnovaGLM pipeline with the GIL released, and wraps the
// output in an `AnovaGLMResults`.
// =============================================================================

use numpy::PyReadonlyArray1;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use anovaglm_core::solvers::IRLSConfig;
use anovaglm_core::{AnovaGlm, AnovaGlmConfig, CategoricalColumn, Frame, NumericColumn};

use crate::families_py::{family_from_name, link_from_name, missing_values_from_name};
use crate::results_py::PyAnovaGLMResults;

const RESPONSE_COLUMN: &str = "__response__";
const WEIGHTS_COLUMN: &str = "__weights__";
const OFFSET_COLUMN: &str = "__offset__";

fn frame_error(e: anovaglm_core::AnovaGlmError) -> PyErr {
    PyValueError::new_err(format!("Invalid input data: {}", e))
}

/// Two-factor ANOVA through nested GLM fits.
///
/// `a` and `b` are the categorical predictors as lists of labels
/// (None for missing); `y` is the response.
#[pyfunction]
#[pyo3(name = "anova_glm", signature = (
    a, b, y, a_name="A", b_name="B", weights=None, offset=None,
    family="gaussian", link=None, var_power=1.5,
    missing_values_handling="mean_imputation", plug_values=None,
    skip_missing_auxiliary=true, include_joint_model=true, max_parallelism=None,
    save_transformed_columns=false, compute_p_values=true, max_iter=25, tol=1e-8
))]
#[allow(clippy::too_many_arguments)]
pub fn anova_glm_py(
    py: Python<'_>,
    a: Vec<Option<String>>,
    b: Vec<Option<String>>,
    y: PyReadonlyArray1<f64>,
    a_name: &str,
    b_name: &str,
    weights: Option<PyReadonlyArray1<f64>>,
    offset: Option<PyReadonlyArray1<f64>>,
    family: &str,
    link: Option<&str>,
    var_power: f64,
    missing_values_handling: &str,
    plug_values: Option<(String, String)>,
    skip_missing_auxiliary: bool,
    include_joint_model: bool,
    max_parallelism: Option<usize>,
    save_transformed_columns: bool,
    compute_p_values: bool,
    max_iter: usize,
    tol: f64,
) -> PyResult<PyAnovaGLMResults> {
    let family = family_from_name(family, var_power)?;
    let link = link_from_name(link, var_power)?;
    let missing_values_handling = missing_values_from_name(missing_values_handling)?;

    let mut frame = Frame::new();
    frame
        .add_column(a_name, CategoricalColumn::from_labels(&a))
        .map_err(frame_error)?;
    frame
        .add_column(b_name, CategoricalColumn::from_labels(&b))
        .map_err(frame_error)?;
    frame
        .add_column(RESPONSE_COLUMN, NumericColumn::new(y.as_array().to_vec()))
        .map_err(frame_error)?;
    if let Some(w) = &weights {
        frame
            .add_column(WEIGHTS_COLUMN, NumericColumn::new(w.as_array().to_vec()))
            .map_err(frame_error)?;
    }
    if let Some(o) = &offset {
        frame
            .add_column(OFFSET_COLUMN, NumericColumn::new(o.as_array().to_vec()))
            .map_err(frame_error)?;
    }

    let config = AnovaGlmConfig {
        response_column: RESPONSE_COLUMN.to_string(),
        weights_column: weights.is_some().then(|| WEIGHTS_COLUMN.to_string()),
        offset_column: offset.is_some().then(|| OFFSET_COLUMN.to_string()),
        family,
        link,
        missing_values_handling,
        plug_values: plug_values.map(|(pa, pb)| [pa, pb]),
        skip_missing_auxiliary,
        include_joint_model,
        max_parallelism,
        save_transformed_columns,
        compute_p_values,
        irls: IRLSConfig {
            max_iterations: max_iter,
            tolerance: tol,
            ..IRLSConfig::default()
        },
        ..AnovaGlmConfig::default()
    };

    let model = AnovaGlm::new(config);
    let output = py
        .allow_threads(|| model.train(&frame))
        .map_err(|e| PyValueError::new_err(format!("AnovaGLM failed: {}", e)))?;

    Ok(PyAnovaGLMResults { inner: output })
}
