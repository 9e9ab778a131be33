// =============================================================================
// AnovaGLM Results
// =============================================================================
//
// Holds the outcome of an AnovaGLM run: one fitted GLM per sub-model, the
// degrees-of-freedom table, the ANOVA table and, when requested, the
// transformed columns.
// =============================================================================

use numpy::{IntoPyArray, PyArray1, PyArray2};
use pyo3::exceptions::PyIndexError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use anovaglm_core::{AnovaGlmOutput, FitResult};

/// Results from an AnovaGLM run.
///
/// Sub-models are indexed in fit order; `model_descriptions` names them.
/// The last one is always the full model with both predictors and their
/// interaction.
#[pyclass(name = "AnovaGLMResults")]
#[derive(Clone)]
pub struct PyAnovaGLMResults {
    pub(crate) inner: AnovaGlmOutput,
}

// =============================================================================
// Helper Methods (not exposed to Python)
// =============================================================================

impl PyAnovaGLMResults {
    fn model(&self, index: usize) -> PyResult<&FitResult> {
        self.inner.fits.get(index).ok_or_else(|| {
            PyIndexError::new_err(format!(
                "model index {} out of range ({} sub-models)",
                index,
                self.inner.fits.len()
            ))
        })
    }
}

#[pymethods]
impl PyAnovaGLMResults {
    /// Names of the two predictors, A first.
    #[getter]
    fn predictor_names(&self) -> Vec<String> {
        self.inner.predictor_names.to_vec()
    }

    /// One description per sub-model, e.g. "GLM model with predictors A, A:B".
    #[getter]
    fn model_descriptions(&self) -> Vec<String> {
        self.inner.model_descriptions.clone()
    }

    /// Number of rows used in every fit.
    #[getter]
    fn n_obs(&self) -> usize {
        self.inner.n_obs
    }

    /// Source rows dropped by missing-value handling.
    #[getter]
    fn n_excluded(&self) -> usize {
        self.inner.n_excluded
    }

    /// Deviance of each sub-model.
    #[getter]
    fn deviances(&self) -> Vec<f64> {
        self.inner.fits.iter().map(|f| f.deviance).collect()
    }

    #[getter]
    fn null_deviances(&self) -> Vec<f64> {
        self.inner.fits.iter().map(|f| f.null_deviance).collect()
    }

    /// Did every sub-model converge?
    #[getter]
    fn converged(&self) -> Vec<bool> {
        self.inner.fits.iter().map(|f| f.converged).collect()
    }

    /// Degrees of freedom per effect: A, B, A:B and (with the joint model) A,B.
    #[getter]
    fn dof<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let dict = PyDict::new_bound(py);
        for (effect, dof) in self.inner.dof.entries() {
            dict.set_item(effect, dof)?;
        }
        Ok(dict)
    }

    /// Coefficient names of one sub-model, intercept first.
    fn coefficient_names(&self, model: usize) -> PyResult<Vec<String>> {
        Ok(self.model(model)?.coefficient_names.clone())
    }

    fn coefficients<'py>(&self, py: Python<'py>, model: usize) -> PyResult<Bound<'py, PyArray1<f64>>> {
        Ok(self.model(model)?.coefficients.clone().into_pyarray_bound(py))
    }

    fn std_errors<'py>(&self, py: Python<'py>, model: usize) -> PyResult<Bound<'py, PyArray1<f64>>> {
        Ok(self.model(model)?.std_errors.clone().into_pyarray_bound(py))
    }

    /// Number of coefficients estimated in one sub-model.
    fn rank(&self, model: usize) -> PyResult<usize> {
        Ok(self.model(model)?.rank)
    }

    /// Coefficients dropped from one sub-model because their columns were aliased.
    fn aliased(&self, model: usize) -> PyResult<Vec<String>> {
        Ok(self.model(model)?.aliased.clone())
    }

    /// Coefficient p-values, or None when they were not computed.
    fn p_values<'py>(&self, py: Python<'py>, model: usize) -> PyResult<Option<Bound<'py, PyArray1<f64>>>> {
        Ok(self
            .model(model)?
            .p_values
            .clone()
            .map(|p| p.into_pyarray_bound(py)))
    }

    /// The ANOVA table as a dict of equally long columns.
    fn anova_table<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let rows = &self.inner.table.rows;
        let dict = PyDict::new_bound(py);
        dict.set_item("effect", rows.iter().map(|r| r.effect.clone()).collect::<Vec<_>>())?;
        dict.set_item("dof", rows.iter().map(|r| r.dof).collect::<Vec<_>>())?;
        dict.set_item("deviance", rows.iter().map(|r| r.deviance_change).collect::<Vec<_>>())?;
        dict.set_item("mean_deviance", rows.iter().map(|r| r.mean_deviance).collect::<Vec<_>>())?;
        dict.set_item("f", rows.iter().map(|r| r.f_statistic).collect::<Vec<_>>())?;
        dict.set_item("p_value", rows.iter().map(|r| r.p_value).collect::<Vec<_>>())?;
        dict.set_item(
            "contribution_percent",
            rows.iter().map(|r| r.contribution_percent).collect::<Vec<_>>(),
        )?;
        dict.set_item("residual_deviance", self.inner.table.residual_deviance)?;
        dict.set_item("residual_dof", self.inner.table.residual_dof)?;
        Ok(dict)
    }

    /// (column names, matrix) of the transformed columns, if they were kept.
    fn transformed_columns<'py>(
        &self,
        py: Python<'py>,
    ) -> Option<(Vec<String>, Bound<'py, PyArray2<f64>>)> {
        self.inner
            .transformed
            .as_ref()
            .map(|t| (t.column_names.clone(), t.values.clone().into_pyarray_bound(py)))
    }

    /// Plain-text ANOVA table.
    fn summary(&self) -> String {
        let mut out = format!(
            "AnovaGLM: {} x {} ({} rows, {} excluded)\n",
            self.inner.predictor_names[0], self.inner.predictor_names[1], self.inner.n_obs, self.inner.n_excluded
        );
        out.push_str(&format!(
            "{:<20} {:>5} {:>14} {:>12} {:>12} {:>9}\n",
            "effect", "dof", "deviance", "F", "p-value", "contrib%"
        ));
        for r in &self.inner.table.rows {
            out.push_str(&format!(
                "{:<20} {:>5} {:>14.6} {:>12.4} {:>12.4e} {:>9.2}\n",
                r.effect, r.dof, r.deviance_change, r.f_statistic, r.p_value, r.contribution_percent
            ));
        }
        out.push_str(&format!(
            "{:<20} {:>5} {:>14.6}\n",
            "residual", self.inner.table.residual_dof, self.inner.table.residual_deviance
        ));
        out
    }

    fn __repr__(&self) -> String {
        format!(
            "AnovaGLMResults(predictors=[{}, {}], models={}, n_obs={})",
            self.inner.predictor_names[0],
            self.inner.predictor_names[1],
            self.inner.fits.len(),
            self.inner.n_obs
        )
    }
}
