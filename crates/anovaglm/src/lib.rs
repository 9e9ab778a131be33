// =============================================================================
// AnovaGLM Python Bindings
// =============================================================================
//
// This module creates the bridge between Rust and Python using PyO3.
// It wraps the pure Rust code from `anovaglm-core` and exposes it as
// a Python module that can be imported with `import anovaglm`.
//
// STRUCTURE:
// ----------
// - `families_py`: string → family / link / missing-value mode parsing
// - `fitting_py`:  the `anova_glm` entry point
// - `results_py`:  the `AnovaGLMResults` class
//
// FOR MAINTAINERS:
// ----------------
// When adding new functionality:
// 1. Implement the logic in `anovaglm-core` first
// 2. Create a Python wrapper here that calls the Rust code
// 3. Add it to the module in the `_anovaglm` function at the bottom
//
// =============================================================================

use pyo3::prelude::*;

mod families_py;
mod fitting_py;
mod results_py;

use fitting_py::anova_glm_py;
use results_py::PyAnovaGLMResults;

// =============================================================================
// Module Registration
// =============================================================================

/// AnovaGLM: two-factor ANOVA through nested GLMs, with a Rust backend
///
/// This is the internal Rust module. Users should import from the
/// Python wrapper: `import anovaglm`
#[pymodule]
fn _anovaglm(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyAnovaGLMResults>()?;
    m.add_function(wrap_pyfunction!(anova_glm_py, m)?)?;
    Ok(())
}
