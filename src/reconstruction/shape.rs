//! Radially symmetric particle shape function.
//!
//! f(x) = c · (l - |x|²/l)^α   for |x| ≤ l,   0 otherwise,
//!
//! where l is the support radius and α the smoothness exponent. The
//! normalizer c makes the 2D integral of f equal one:
//!
//!   ∫ f dV = π l^(α+2) Γ(α+1) / Γ(α+2) · c⁻¹... solved for c:
//!   c = Γ(α + 2) / (π l^(α+2) Γ(α + 1)).

use statrs::function::gamma::gamma;
use std::f64::consts::PI;

/// Compactly supported polynomial bump with unit integral.
#[derive(Clone, Copy, Debug)]
pub struct ShapeFunction {
    radius: f64,
    radius_squared: f64,
    alpha: f64,
    normalizer: f64,
}

impl ShapeFunction {
    /// Shape with support radius `radius` and exponent `alpha` (the
    /// classic choice is α = 2).
    pub fn new(radius: f64, alpha: f64) -> Self {
        assert!(radius > 0.0, "shape radius must be positive");
        let normalizer = gamma(alpha + 2.0) / (PI * radius.powf(alpha + 2.0) * gamma(alpha + 1.0));
        ShapeFunction {
            radius,
            radius_squared: radius * radius,
            alpha,
            normalizer,
        }
    }

    /// Evaluate at an offset from the particle center.
    pub fn eval(&self, dx: f64, dy: f64) -> f64 {
        let r_squared = dx * dx + dy * dy;
        if self.radius == 0.0 || r_squared > self.radius_squared {
            0.0
        } else {
            self.normalizer * (self.radius - r_squared / self.radius).powf(self.alpha)
        }
    }

    /// Value at the center, the shape's maximum.
    pub fn peak(&self) -> f64 {
        self.normalizer * self.radius.powf(self.alpha)
    }

    /// Support radius.
    pub fn radius(&self) -> f64 {
        self.radius
    }
}

impl Default for ShapeFunction {
    /// Degenerate point shape (no support, evaluates to zero). Placeholder
    /// for particle slots that have not been populated yet.
    fn default() -> Self {
        ShapeFunction {
            radius: 0.0,
            radius_squared: 0.0,
            alpha: 2.0,
            normalizer: 0.0,
        }
    }
}
