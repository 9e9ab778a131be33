// =============================================================================
// Statistical Inference
// =============================================================================
//
// P-values for the two places AnovaGLM needs them:
//   - Coefficients of each sub-model:  t (or z for large df) tests of β = 0
//   - Rows of the ANOVA table:         F tests on deviance differences
//
// =============================================================================

use statrs::distribution::{ContinuousCDF, FisherSnedecor, Normal, StudentsT};

/// Two-tailed p-value from a z-statistic.
pub fn pvalue_z(z: f64) -> f64 {
    if !z.is_finite() {
        return f64::NAN;
    }

    let normal = match Normal::new(0.0, 1.0) {
        Ok(d) => d,
        Err(_) => return f64::NAN,
    };

    // P(|Z| > |z|) = 2 * (1 - Φ(|z|))
    2.0 * (1.0 - normal.cdf(z.abs()))
}

/// Two-tailed p-value from a t-statistic with `df` degrees of freedom.
///
/// Falls back to the normal approximation for df > 1000.
pub fn pvalue_t(t: f64, df: f64) -> f64 {
    if !t.is_finite() || df <= 0.0 {
        return f64::NAN;
    }

    if df > 1000.0 {
        return pvalue_z(t);
    }

    let t_dist = match StudentsT::new(0.0, 1.0, df) {
        Ok(d) => d,
        Err(_) => return f64::NAN,
    };

    2.0 * (1.0 - t_dist.cdf(t.abs()))
}

/// Upper-tail p-value of an F statistic: P(F_{df1, df2} > f).
///
/// Used for the ANOVA table, where `f` compares the deviance explained by
/// an effect (per degree of freedom) to the residual dispersion.
pub fn pvalue_f(f: f64, df1: f64, df2: f64) -> f64 {
    if !f.is_finite() || f < 0.0 || df1 <= 0.0 || df2 <= 0.0 {
        return f64::NAN;
    }

    let f_dist = match FisherSnedecor::new(df1, df2) {
        Ok(d) => d,
        Err(_) => return f64::NAN,
    };

    (1.0 - f_dist.cdf(f)).clamp(0.0, 1.0)
}
