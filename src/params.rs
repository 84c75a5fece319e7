//! # Reconstruction parameters
//!
//! [`ReconParams`] gathers every tunable of the analytics pipeline (KDE concentration, worker
//! pool size, credible bound, length units, null-model settings, rotation target) in one
//! immutable value handed to each component entry point.
//!
//! Build it with [`ReconParams::builder`], which validates the values, or start from
//! [`ReconParams::default`].
use std::cmp::Ordering::{Equal, Greater, Less};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{years_to_my, PixelId, Years, EARTH_RADIUS_KM};
use crate::stochmap_errors::StochMapError;

/// Configuration of a reconstruction run.
///
/// Fields
/// -----------------
/// * `kde_lambda` – concentration of the smoothing kernel (1/radian²).
/// * `workers` – number of KDE worker threads.
/// * `queue_capacity` – length of the bounded KDE job queue, `None` uses `4 × workers`.
/// * `bound` – credible mass kept after smoothing, in `(0, 1]`; `1.0` keeps every pixel.
/// * `earth_radius_km` – sphere radius used to convert radians into kilometres.
/// * `null_particles` – number of simulated particles per node (`0` disables the null model).
/// * `null_lambda` – fixed null-model concentration (per million years); `None` draws the
///   concentration per segment from the sample's category weights.
/// * `reference_pixel` – starting pixel of every null-model walk.
/// * `seed` – base seed of the null model; node `n` uses `seed + n`.
/// * `rotate_to` – optional target age (years) for the Rotator.
///
/// Defaults
/// -----------------
/// * `kde_lambda`: 100.0
/// * `workers`: available parallelism (1 if unknown)
/// * `queue_capacity`: `None`
/// * `bound`: 1.0
/// * `earth_radius_km`: 6371.0088
/// * `null_particles`: 1000
/// * `null_lambda`: `None`
/// * `reference_pixel`: 0
/// * `seed`: 0
/// * `rotate_to`: `None`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconParams {
    // --- KDE ---
    pub kde_lambda: f64,
    pub workers: usize,
    pub queue_capacity: Option<usize>,
    pub bound: f64,

    // --- Units ---
    pub earth_radius_km: f64,

    // --- Null model ---
    pub null_particles: usize,
    pub null_lambda: Option<f64>,
    pub reference_pixel: PixelId,
    pub seed: u64,

    // --- Rotation ---
    pub rotate_to: Option<Years>,
}

impl ReconParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fluent builder starting from the defaults.
    ///
    /// ```rust,no_run
    /// use stochmap::params::ReconParams;
    ///
    /// let params = ReconParams::builder()
    ///     .kde_lambda(250.0)
    ///     .workers(4)
    ///     .bound(0.95)
    ///     .build()
    ///     .unwrap();
    /// ```
    pub fn builder() -> ReconParamsBuilder {
        ReconParamsBuilder::new()
    }

    /// Effective KDE queue length.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(4 * self.workers)
    }
}

impl Default for ReconParams {
    fn default() -> Self {
        ReconParams {
            kde_lambda: 100.0,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            queue_capacity: None,
            bound: 1.0,

            earth_radius_km: EARTH_RADIUS_KM,

            null_particles: 1000,
            null_lambda: None,
            reference_pixel: 0,
            seed: 0,

            rotate_to: None,
        }
    }
}

/// Builder for [`ReconParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct ReconParamsBuilder {
    params: ReconParams,
}

impl ReconParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kde_lambda(mut self, v: f64) -> Self {
        self.params.kde_lambda = v;
        self
    }
    pub fn workers(mut self, v: usize) -> Self {
        self.params.workers = v;
        self
    }
    pub fn queue_capacity(mut self, v: usize) -> Self {
        self.params.queue_capacity = Some(v);
        self
    }
    pub fn bound(mut self, v: f64) -> Self {
        self.params.bound = v;
        self
    }
    pub fn earth_radius_km(mut self, v: f64) -> Self {
        self.params.earth_radius_km = v;
        self
    }
    pub fn null_particles(mut self, v: usize) -> Self {
        self.params.null_particles = v;
        self
    }
    pub fn null_lambda(mut self, v: f64) -> Self {
        self.params.null_lambda = Some(v);
        self
    }
    pub fn reference_pixel(mut self, v: PixelId) -> Self {
        self.params.reference_pixel = v;
        self
    }
    pub fn seed(mut self, v: u64) -> Self {
        self.params.seed = v;
        self
    }
    pub fn rotate_to(mut self, v: Years) -> Self {
        self.params.rotate_to = Some(v);
        self
    }

    /// Return true iff x > 0.0 and not NaN.
    #[inline]
    fn gt0(x: f64) -> bool {
        x.partial_cmp(&0.0) == Some(Greater)
    }

    /// Return true iff a <= b and neither is NaN.
    #[inline]
    fn le(a: f64, b: f64) -> bool {
        matches!(a.partial_cmp(&b), Some(Less) | Some(Equal))
    }

    /// Validate and produce the [`ReconParams`].
    ///
    /// Validation rules
    /// -----------------
    /// * `kde_lambda > 0`, finite.
    /// * `workers ≥ 1`, `queue_capacity ≥ 1` when set.
    /// * `0 < bound ≤ 1`.
    /// * `earth_radius_km > 0`.
    /// * `null_lambda > 0`, finite, when set.
    ///
    /// `reference_pixel` is checked against the pixelation by the null model itself.
    pub fn build(self) -> Result<ReconParams, StochMapError> {
        let p = &self.params;

        if !(Self::gt0(p.kde_lambda) && p.kde_lambda.is_finite()) {
            return Err(StochMapError::InvalidParameter(
                "kde_lambda must be finite and > 0".into(),
            ));
        }
        if p.workers == 0 {
            return Err(StochMapError::InvalidParameter(
                "workers must be >= 1".into(),
            ));
        }
        if p.queue_capacity == Some(0) {
            return Err(StochMapError::InvalidParameter(
                "queue_capacity must be >= 1".into(),
            ));
        }
        if !(Self::gt0(p.bound) && Self::le(p.bound, 1.0)) {
            return Err(StochMapError::InvalidParameter(
                "require 0 < bound <= 1".into(),
            ));
        }
        if !Self::gt0(p.earth_radius_km) {
            return Err(StochMapError::InvalidParameter(
                "earth_radius_km must be > 0".into(),
            ));
        }
        if let Some(l) = p.null_lambda {
            if !(Self::gt0(l) && l.is_finite()) {
                return Err(StochMapError::InvalidParameter(
                    "null_lambda must be finite and > 0".into(),
                ));
            }
        }

        Ok(self.params)
    }
}

impl fmt::Display for ReconParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let null_lambda = match self.null_lambda {
            Some(l) => format!("{l:.3}"),
            None => "sample".to_string(),
        };
        let rotate_to = match self.rotate_to {
            Some(a) => format!("{:.3} My", years_to_my(a)),
            None => "none".to_string(),
        };

        if f.alternate() {
            const PARAM_COL: usize = 40;
            writeln!(f, "Reconstruction Parameters")?;
            writeln!(f, "-------------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = if s.len() < PARAM_COL {
                        " ".repeat(PARAM_COL - s.len())
                    } else {
                        " ".to_string()
                    };
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            writeln!(f, "[KDE]")?;
            line!("kde_lambda      = {:.3}", self.kde_lambda, "Kernel concentration (1/rad²)")?;
            line!("workers         = {}", self.workers, "Worker threads")?;
            line!("queue_capacity  = {}", self.queue_capacity(), "Bounded job queue length")?;
            line!("bound           = {:.3}", self.bound, "Credible mass kept")?;

            writeln!(f, "\n[Units]")?;
            line!("earth_radius_km = {:.4}", self.earth_radius_km, "Sphere radius")?;

            writeln!(f, "\n[Null model]")?;
            line!("null_particles  = {}", self.null_particles, "Particles per node")?;
            line!("null_lambda     = {}", null_lambda, "Concentration (1/rad² per My)")?;
            line!("reference_pixel = {}", self.reference_pixel, "Walk start")?;
            line!("seed            = {}", self.seed, "Base RNG seed")?;

            writeln!(f, "\n[Rotation]")?;
            line!("rotate_to       = {}", rotate_to, "Target age")?;

            Ok(())
        } else {
            write!(
                f,
                "ReconParams(kde_lambda={:.2}, workers={}, bound={:.3}, radius={:.1}km, null_particles={}, null_lambda={}, seed={}, rotate_to={})",
                self.kde_lambda,
                self.workers,
                self.bound,
                self.earth_radius_km,
                self.null_particles,
                null_lambda,
                self.seed,
                rotate_to,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = ReconParams::default();
        assert_eq!(p.kde_lambda, 100.0);
        assert!(p.workers >= 1);
        assert_eq!(p.queue_capacity(), 4 * p.workers);
        assert_eq!(p.bound, 1.0);
        assert_eq!(p.null_particles, 1000);
        assert_eq!(p.null_lambda, None);
        assert!(ReconParams::builder().build().is_ok());
    }

    #[test]
    fn test_builder_validation() {
        assert!(ReconParams::builder().kde_lambda(0.0).build().is_err());
        assert!(ReconParams::builder().kde_lambda(f64::NAN).build().is_err());
        assert!(ReconParams::builder().workers(0).build().is_err());
        assert!(ReconParams::builder().queue_capacity(0).build().is_err());
        assert!(ReconParams::builder().bound(0.0).build().is_err());
        assert!(ReconParams::builder().bound(1.5).build().is_err());
        assert!(ReconParams::builder().earth_radius_km(-1.0).build().is_err());
        assert!(ReconParams::builder().null_lambda(0.0).build().is_err());

        let p = ReconParams::builder()
            .workers(3)
            .queue_capacity(5)
            .bound(0.9)
            .rotate_to(5_000_000)
            .build()
            .unwrap();
        assert_eq!(p.queue_capacity(), 5);
        assert_eq!(p.rotate_to, Some(5_000_000));
    }

    #[test]
    fn test_display() {
        let p = ReconParams::builder()
            .workers(2)
            .null_lambda(50.0)
            .build()
            .unwrap();
        let compact = format!("{p}");
        assert!(compact.starts_with("ReconParams(kde_lambda=100.00, workers=2"));
        assert!(compact.contains("null_lambda=50.000"));

        let pretty = format!("{p:#}");
        assert!(pretty.contains("[Null model]"));
        assert!(pretty.contains("queue_capacity  = 8"));
        assert!(pretty.contains("rotate_to       = none"));
    }
}
