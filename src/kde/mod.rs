//! # KDE Smoother
//!
//! Spreads the point masses of a stage distribution over the sphere with a spherical normal
//! kernel:
//!
//! ```text
//! kde(p) = Σ_s mass(s) · f(dist(s, p); λ)      for every admissible pixel p
//! ```
//!
//! [`smooth`] is a pure function of its inputs. Smoothing a whole [`SampleIndex`] is done by the
//! worker pool in [`pool`].
//!
//! Admissibility
//! -----------------
//! An [`Admissibility`] mask can zero pixels where the lineage cannot live (for example open ocean
//! for a terrestrial lineage). [`AllPixels`] admits the whole sphere; [`StagePrior`] reads a
//! per-stage landscape prior and rejects pixels whose prior is not positive.
//!
//! [`SampleIndex`]: crate::sample::SampleIndex
pub mod pool;

use std::collections::BTreeMap;

use nalgebra::Vector3;

use crate::constants::{PixelId, Years};
use crate::geometry::spherical_normal::SphericalNormal;
use crate::geometry::{great_circle, Pixelation};
use crate::sample::{DistKind, StageDistribution};
use crate::stages::StageTable;

/// Pixels a distribution may occupy at a given age.
pub trait Admissibility: Send + Sync {
    fn admits(&self, age: Years, pixel: PixelId) -> bool;
}

/// Every pixel is admissible.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllPixels;

impl Admissibility for AllPixels {
    #[inline]
    fn admits(&self, _age: Years, _pixel: PixelId) -> bool {
        true
    }
}

/// Landscape prior defined per stage.
///
/// An age uses the prior of its closest stage. Ages whose stage has no prior admit every pixel;
/// pixels beyond the end of a prior vector have a zero prior.
#[derive(Debug, Clone, Default)]
pub struct StagePrior {
    stages: StageTable,
    priors: BTreeMap<Years, Vec<f64>>,
}

impl StagePrior {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the prior (one value per pixel) of a stage.
    pub fn insert(&mut self, stage: Years, prior: Vec<f64>) {
        self.priors.insert(stage, prior);
        self.stages = StageTable::new(self.priors.keys().copied());
    }

    pub fn prior(&self, age: Years, pixel: PixelId) -> Option<f64> {
        let stage = self.stages.closest_stage_age(age);
        self.priors
            .get(&stage)
            .map(|p| p.get(pixel as usize).copied().unwrap_or(0.0))
    }
}

impl Admissibility for StagePrior {
    fn admits(&self, age: Years, pixel: PixelId) -> bool {
        self.prior(age, pixel).map_or(true, |p| p > 0.0)
    }
}

/// Kernel density estimate of `dist` over every admissible pixel.
///
/// Arguments
/// -----------------
/// * `dist` – Point masses; only positive values are used, so raw log-likelihoods must be
///   normalized first (as [`pool::smooth_index`] does).
/// * `age` – Age of the distribution, passed to the mask.
/// * `pix` – Pixelation of the distribution.
/// * `kernel` – Spherical normal kernel.
/// * `mask` – Admissibility mask.
///
/// Return
/// ----------
/// * A [`DistKind::Kde`] distribution holding the positive densities (not normalized).
pub fn smooth<P, A>(
    dist: &StageDistribution,
    age: Years,
    pix: &P,
    kernel: &SphericalNormal,
    mask: &A,
) -> StageDistribution
where
    P: Pixelation + ?Sized,
    A: Admissibility + ?Sized,
{
    let sources: Vec<(Vector3<f64>, f64)> = dist
        .sorted()
        .into_iter()
        .filter(|&(_, m)| m > 0.0)
        .map(|(px, m)| (pix.vector(px), m))
        .collect();

    let mut out = StageDistribution::new(DistKind::Kde);
    if sources.is_empty() {
        return out;
    }
    for px in 0..pix.len() as PixelId {
        if !mask.admits(age, px) {
            continue;
        }
        let v = pix.vector(px);
        let density: f64 = sources
            .iter()
            .map(|(s, m)| m * kernel.density(great_circle(s, &v)))
            .sum();
        if density > 0.0 {
            out.add(px, density);
        }
    }
    out
}
