//! # Isotropic spherical normal distribution
//!
//! A rotationally symmetric distribution on the unit sphere whose density depends only on the
//! angular distance θ to its center:
//!
//! ```text
//! f(θ; λ) = exp(-λ θ² / 2) / Z(λ),      Z(λ) = 2π ∫₀^π exp(-λ θ² / 2) sin θ dθ
//! ```
//!
//! `λ` is a concentration in **1/radian²**; the angular variance is roughly `2/λ` for large λ.
//! Diffusion over a duration `t` (million years) with a per-million-year concentration `λ`
//! uses the concentration `λ / t` (see [`SphericalNormal::with_duration`]).
//!
//! Sampling is exact: θ is drawn from a Rayleigh proposal of scale `1/√λ` (density
//! ∝ θ exp(-λθ²/2)) and accepted with probability `sin θ / θ`, the azimuth is uniform.
use nalgebra::Vector3;
use rand::Rng;
use rand_distr::StandardNormal;

use super::destination;
use crate::constants::{MillionYears, Radian, DPI};
use crate::stochmap_errors::StochMapError;

/// Number of Simpson intervals used for the normalization constant.
const SIMPSON_STEPS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphericalNormal {
    lambda: f64,
    log_norm: f64,
}

impl SphericalNormal {
    /// Build a spherical normal with concentration `lambda` (1/radian²).
    ///
    /// Return
    /// ----------
    /// * `Err(StochMapError::InvalidParameter)` if `lambda` is not finite and strictly positive.
    pub fn new(lambda: f64) -> Result<Self, StochMapError> {
        if !(lambda.is_finite() && lambda > 0.0) {
            return Err(StochMapError::InvalidParameter(format!(
                "spherical normal concentration must be > 0, got {lambda}"
            )));
        }
        Ok(SphericalNormal {
            lambda,
            log_norm: normalization(lambda).ln(),
        })
    }

    /// Concentration of a diffusion process with per-million-year concentration `lambda`
    /// after `duration` million years.
    pub fn with_duration(lambda: f64, duration: MillionYears) -> Result<Self, StochMapError> {
        Self::new(lambda / duration)
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Probability density (per steradian) at angular distance `theta` from the center.
    #[inline]
    pub fn density(&self, theta: Radian) -> f64 {
        (-0.5 * self.lambda * theta * theta - self.log_norm).exp()
    }

    /// Draw an angular distance from the center.
    pub fn sample_angle<R: Rng + ?Sized>(&self, rng: &mut R) -> Radian {
        let sigma = 1.0 / self.lambda.sqrt();
        loop {
            let x: f64 = rng.sample(StandardNormal);
            let y: f64 = rng.sample(StandardNormal);
            let theta = sigma * (x * x + y * y).sqrt();
            if theta > std::f64::consts::PI {
                continue;
            }
            if theta == 0.0 || rng.random::<f64>() < theta.sin() / theta {
                return theta;
            }
        }
    }

    /// Draw a point around `center` (a unit vector).
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, center: &Vector3<f64>) -> Vector3<f64> {
        let theta = self.sample_angle(rng);
        let phi = rng.random_range(0.0..DPI);
        destination(center, theta, phi)
    }
}

/// `Z(λ)` by Simpson integration, truncated where the integrand vanishes.
fn normalization(lambda: f64) -> f64 {
    let upper = (12.0 / lambda.sqrt()).min(std::f64::consts::PI);
    let h = upper / SIMPSON_STEPS as f64;
    let f = |t: f64| (-0.5 * lambda * t * t).exp() * t.sin();

    let mut sum = f(0.0) + f(upper);
    for i in 1..SIMPSON_STEPS {
        let w = if i % 2 == 1 { 4.0 } else { 2.0 };
        sum += w * f(i as f64 * h);
    }
    DPI * sum * h / 3.0
}
