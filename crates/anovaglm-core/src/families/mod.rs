// =============================================================================
// Distribution Families
// =============================================================================
//
// A family tells the solver two things about the response:
//
//   1. How the variance depends on the mean:  Var(Y) = φ × V(μ)
//   2. How to measure lack of fit:            the (unit) deviance
//
// AnovaGLM only supports the two families whose deviance differences have a
// sensible F-test interpretation when comparing nested sub-models:
//
//   - Gaussian:  V(μ) = 1      (ordinary linear regression)
//   - Tweedie:   V(μ) = μ^p    (p = 1 Poisson-like, 1 < p < 2 compound
//                               Poisson-Gamma, p = 2 Gamma-like)
//
// =============================================================================

use ndarray::Array1;

/// Behaviour the IRLS solver needs from a distribution family.
pub trait Family: Send + Sync {
    /// Human-readable family name.
    fn name(&self) -> &str;

    /// Variance function V(μ).
    fn variance(&self, mu: &Array1<f64>) -> Array1<f64>;

    /// Deviance contribution of a single observation (unweighted).
    fn unit_deviance(&self, y: f64, mu: f64) -> f64;

    /// Total deviance: Σ wᵢ × d(yᵢ, μᵢ)
    fn deviance(&self, y: &Array1<f64>, mu: &Array1<f64>, weights: Option<&Array1<f64>>) -> f64 {
        match weights {
            Some(w) => y
                .iter()
                .zip(mu.iter())
                .zip(w.iter())
                .map(|((&yi, &mui), &wi)| wi * self.unit_deviance(yi, mui))
                .sum(),
            None => y
                .iter()
                .zip(mu.iter())
                .map(|(&yi, &mui)| self.unit_deviance(yi, mui))
                .sum(),
        }
    }

    /// Starting values for μ.
    fn initialize_mu(&self, y: &Array1<f64>) -> Array1<f64>;

    /// Is every μ inside the family's domain?
    fn is_valid_mu(&self, mu: &Array1<f64>) -> bool;

    /// Pull μ back inside the family's domain.
    fn clamp_mu(&self, mu: &Array1<f64>) -> Array1<f64>;
}

// =============================================================================
// Gaussian
// =============================================================================

/// Normal errors with constant variance.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianFamily;

impl Family for GaussianFamily {
    fn name(&self) -> &str {
        "Gaussian"
    }

    fn variance(&self, mu: &Array1<f64>) -> Array1<f64> {
        Array1::ones(mu.len())
    }

    fn unit_deviance(&self, y: f64, mu: f64) -> f64 {
        (y - mu) * (y - mu)
    }

    fn initialize_mu(&self, y: &Array1<f64>) -> Array1<f64> {
        y.clone()
    }

    fn is_valid_mu(&self, mu: &Array1<f64>) -> bool {
        mu.iter().all(|m| m.is_finite())
    }

    fn clamp_mu(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.clone()
    }
}

// =============================================================================
// Tweedie
// =============================================================================

const MU_FLOOR: f64 = 1e-10;

/// Tweedie family with variance power `p`: V(μ) = μ^p.
///
/// `p` must be 0 or at least 1; the (0, 1) range has no corresponding
/// distribution and is rejected during validation.
#[derive(Debug, Clone, Copy)]
pub struct TweedieFamily {
    pub var_power: f64,
}

impl TweedieFamily {
    pub fn new(var_power: f64) -> Self {
        Self { var_power }
    }
}

impl Family for TweedieFamily {
    fn name(&self) -> &str {
        "Tweedie"
    }

    fn variance(&self, mu: &Array1<f64>) -> Array1<f64> {
        let p = self.var_power;
        mu.mapv(|m| m.max(MU_FLOOR).powf(p))
    }

    fn unit_deviance(&self, y: f64, mu: f64) -> f64 {
        let p = self.var_power;
        if p == 0.0 {
            return (y - mu) * (y - mu);
        }
        let mu = mu.max(MU_FLOOR);
        if p == 1.0 {
            // Poisson deviance; y ln(y/μ) → 0 as y → 0
            let ylogy = if y > 0.0 { y * (y / mu).ln() } else { 0.0 };
            2.0 * (ylogy - (y - mu))
        } else if p == 2.0 {
            let y = y.max(MU_FLOOR);
            2.0 * ((mu / y).ln() + y / mu - 1.0)
        } else {
            let first = if y > 0.0 {
                y.powf(2.0 - p) / ((1.0 - p) * (2.0 - p))
            } else {
                0.0
            };
            2.0 * (first - y * mu.powf(1.0 - p) / (1.0 - p) + mu.powf(2.0 - p) / (2.0 - p))
        }
    }

    fn initialize_mu(&self, y: &Array1<f64>) -> Array1<f64> {
        let y_mean = y.mean().unwrap_or(1.0).max(0.01);
        self.clamp_mu(&y.mapv(|yi| (yi + y_mean) / 2.0))
    }

    fn is_valid_mu(&self, mu: &Array1<f64>) -> bool {
        if self.var_power == 0.0 {
            mu.iter().all(|m| m.is_finite())
        } else {
            mu.iter().all(|&m| m.is_finite() && m > 0.0)
        }
    }

    fn clamp_mu(&self, mu: &Array1<f64>) -> Array1<f64> {
        if self.var_power == 0.0 {
            mu.clone()
        } else {
            mu.mapv(|m| m.max(MU_FLOOR))
        }
    }
}

// =============================================================================
// Family selection
// =============================================================================

/// The families AnovaGLM accepts, as configuration values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum FamilyKind {
    #[default]
    Gaussian,
    Tweedie { var_power: f64 },
}

impl FamilyKind {
    /// Build the family object used by the solver.
    pub fn build(&self) -> Box<dyn Family> {
        match *self {
            FamilyKind::Gaussian => Box::new(GaussianFamily),
            FamilyKind::Tweedie { var_power } => Box::new(TweedieFamily::new(var_power)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FamilyKind::Gaussian => "gaussian",
            FamilyKind::Tweedie { .. } => "tweedie",
        }
    }

    /// Parse a family name; anything other than gaussian/tweedie is unsupported.
    pub fn from_name(name: &str, var_power: f64) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "gaussian" | "normal" => Some(FamilyKind::Gaussian),
            "tweedie" => Some(FamilyKind::Tweedie { var_power }),
            _ => None,
        }
    }
}
