// =============================================================================
// Link Functions
// =============================================================================
//
// The link g connects the mean to the linear predictor: η = g(μ) = Xβ.
//
//   - Identity: η = μ            (default for Gaussian)
//   - Log:      η = log(μ)       (default for Tweedie, keeps μ positive)
//   - Power:    η = μ^λ          (λ = 0 is treated as log)
//
// The solver needs g, its inverse, and dη/dμ.
//
// =============================================================================

use ndarray::Array1;

use crate::families::FamilyKind;

pub trait Link: Send + Sync {
    fn name(&self) -> &str;

    /// η = g(μ)
    fn link(&self, mu: &Array1<f64>) -> Array1<f64>;

    /// μ = g⁻¹(η)
    fn inverse(&self, eta: &Array1<f64>) -> Array1<f64>;

    /// dη/dμ = g'(μ)
    fn derivative(&self, mu: &Array1<f64>) -> Array1<f64>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityLink;

impl Link for IdentityLink {
    fn name(&self) -> &str {
        "identity"
    }

    fn link(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.clone()
    }

    fn inverse(&self, eta: &Array1<f64>) -> Array1<f64> {
        eta.clone()
    }

    fn derivative(&self, mu: &Array1<f64>) -> Array1<f64> {
        Array1::ones(mu.len())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogLink;

impl Link for LogLink {
    fn name(&self) -> &str {
        "log"
    }

    fn link(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.mapv(|m| m.max(1e-300).ln())
    }

    fn inverse(&self, eta: &Array1<f64>) -> Array1<f64> {
        // Cap η so exp() can't overflow
        eta.mapv(|e| e.min(700.0).exp())
    }

    fn derivative(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.mapv(|m| 1.0 / m.max(1e-300))
    }
}

/// η = μ^λ. Only meaningful for positive μ, so it pairs with Tweedie.
#[derive(Debug, Clone, Copy)]
pub struct PowerLink {
    pub power: f64,
}

impl Link for PowerLink {
    fn name(&self) -> &str {
        "power"
    }

    fn link(&self, mu: &Array1<f64>) -> Array1<f64> {
        if self.power == 0.0 {
            return LogLink.link(mu);
        }
        mu.mapv(|m| m.max(1e-300).powf(self.power))
    }

    fn inverse(&self, eta: &Array1<f64>) -> Array1<f64> {
        if self.power == 0.0 {
            return LogLink.inverse(eta);
        }
        let inv = 1.0 / self.power;
        eta.mapv(|e| e.max(1e-300).powf(inv))
    }

    fn derivative(&self, mu: &Array1<f64>) -> Array1<f64> {
        if self.power == 0.0 {
            return LogLink.derivative(mu);
        }
        let lambda = self.power;
        mu.mapv(|m| lambda * m.max(1e-300).powf(lambda - 1.0))
    }
}

// =============================================================================
// Link selection
// =============================================================================

/// Link as a configuration value. `FamilyDefault` defers to the family.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LinkKind {
    #[default]
    FamilyDefault,
    Identity,
    Log,
    Power(f64),
}

impl LinkKind {
    /// Resolve `FamilyDefault` for a family: identity for Gaussian, log for Tweedie.
    pub fn resolve(&self, family: &FamilyKind) -> LinkKind {
        match (self, family) {
            (LinkKind::FamilyDefault, FamilyKind::Gaussian) => LinkKind::Identity,
            (LinkKind::FamilyDefault, FamilyKind::Tweedie { .. }) => LinkKind::Log,
            (other, _) => *other,
        }
    }

    pub fn build(&self, family: &FamilyKind) -> Box<dyn Link> {
        match self.resolve(family) {
            LinkKind::Identity | LinkKind::FamilyDefault => Box::new(IdentityLink),
            LinkKind::Log => Box::new(LogLink),
            LinkKind::Power(power) => Box::new(PowerLink { power }),
        }
    }

    /// Parse a link name. `None` or "family_default" means use the family's default.
    pub fn from_name(name: Option<&str>, power: f64) -> Option<Self> {
        match name.map(|n| n.to_lowercase()) {
            None => Some(LinkKind::FamilyDefault),
            Some(n) => match n.as_str() {
                "family_default" => Some(LinkKind::FamilyDefault),
                "identity" => Some(LinkKind::Identity),
                "log" => Some(LinkKind::Log),
                "power" | "tweedie" => Some(LinkKind::Power(power)),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_log_link_roundtrip() {
        let mu = array![0.5, 1.0, 4.0];
        let back = LogLink.inverse(&LogLink.link(&mu));
        for (a, b) in mu.iter().zip(back.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_power_link_derivative() {
        let link = PowerLink { power: 0.5 };
        let d = link.derivative(&array![4.0]);
        assert_abs_diff_eq!(d[0], 0.25, epsilon = 1e-12);
        let eta = link.link(&array![9.0]);
        assert_abs_diff_eq!(eta[0], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_power_zero_is_log() {
        let link = PowerLink { power: 0.0 };
        assert_abs_diff_eq!(link.link(&array![1.0])[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_family_default_resolution() {
        assert_eq!(LinkKind::FamilyDefault.resolve(&FamilyKind::Gaussian), LinkKind::Identity);
        assert_eq!(
            LinkKind::FamilyDefault.resolve(&FamilyKind::Tweedie { var_power: 1.5 }),
            LinkKind::Log
        );
        assert_eq!(LinkKind::Log.resolve(&FamilyKind::Gaussian), LinkKind::Log);
        assert_eq!(LinkKind::from_name(Some("logit"), 0.0), None);
    }
}
