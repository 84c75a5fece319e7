//! # Null-Model Simulator
//!
//! Reference distribution of the distance travelled along a branch by a lineage diffusing freely
//! on the sphere. Each simulated particle starts at a fixed reference pixel and, for every
//! segment of the branch, takes one spherical-normal step of concentration `λ / duration`; the
//! arrival point is snapped to its pixel, and the great-circle distance between successive pixels
//! is accumulated, exactly as for observed particles.
//!
//! The concentration `λ` is either fixed, or drawn for each segment among the relaxed-clock
//! categories observed in the sample, with a probability equal to the category's share of rows.
//!
//! The 5% and 95% quantiles of the simulated distances form the [`NullEnvelope`] against which
//! observed distances are classified as slower or faster than expected.
use std::collections::BTreeMap;

use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::constants::{years_to_my, MillionYears, NodeId, PixelId, Radian, Years};
use crate::geometry::spherical_normal::SphericalNormal;
use crate::geometry::Pixelation;
use crate::params::ReconParams;
use crate::sample::CategoryWeight;
use crate::stats::{quantile, sort_sample};
use crate::stochmap_errors::StochMapError;

/// 5% / 95% quantiles of a simulated distance distribution (radians).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NullEnvelope {
    pub x005: Radian,
    pub x095: Radian,
}

impl NullEnvelope {
    /// Envelope of an ascending sample (`NaN` bounds if empty).
    pub fn from_sorted(sorted: &[f64]) -> Self {
        NullEnvelope {
            x005: quantile(0.05, sorted),
            x095: quantile(0.95, sorted),
        }
    }

    /// Fraction of `observed` values below the 5% bound.
    pub fn slower(&self, observed: &[f64]) -> f64 {
        fraction(observed, |d| d < self.x005)
    }

    /// Fraction of `observed` values above the 95% bound.
    pub fn faster(&self, observed: &[f64]) -> f64 {
        fraction(observed, |d| d > self.x095)
    }
}

fn fraction<F: Fn(f64) -> bool>(values: &[f64], pred: F) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().filter(|&&v| pred(v)).count() as f64 / values.len() as f64
}

/// Durations (million years) of the segments of a branch.
///
/// The branch runs from `parent_age` down to `node_age`; every waypoint age strictly inside
/// that interval starts a new segment. Zero-length segments are dropped.
pub fn segments<I>(parent_age: Years, node_age: Years, waypoints: I) -> Vec<MillionYears>
where
    I: IntoIterator<Item = Years>,
{
    let mut bounds: Vec<Years> = waypoints
        .into_iter()
        .filter(|&a| a > node_age && a < parent_age)
        .collect();
    bounds.push(parent_age);
    bounds.push(node_age);
    bounds.sort_unstable_by(|a, b| b.cmp(a));
    bounds.dedup();

    bounds
        .windows(2)
        .map(|w| years_to_my(w[0] - w[1]))
        .filter(|&d| d > 0.0)
        .collect()
}

/// Concentrations to choose from, with their weights (`None` for a single fixed value).
#[derive(Debug, Clone)]
struct Concentrations {
    lambdas: Vec<f64>,
    weights: Option<WeightedIndex<u64>>,
}

/// Random-walk simulator for one tree.
#[derive(Debug, Clone)]
pub struct NullModel {
    concentrations: Concentrations,
    reference: PixelId,
    particles: usize,
    seed: u64,
}

impl NullModel {
    /// Build the simulator of a tree.
    ///
    /// Arguments
    /// -----------------
    /// * `params` – `null_lambda`, `reference_pixel`, `null_particles` and `seed`.
    /// * `categories` – Category weights of the tree, used when `null_lambda` is unset.
    /// * `pix` – Pixelation, used to check the reference pixel.
    ///
    /// Return
    /// ----------
    /// * `Err(StochMapError::InvalidParameter)` if the reference pixel is out of range.
    /// * `Err(StochMapError::InvalidCategoryWeights)` if no fixed concentration is given and the
    ///   categories are empty, have no rows, or carry a non-positive concentration.
    pub fn new<P: Pixelation + ?Sized>(
        params: &ReconParams,
        categories: &BTreeMap<u32, CategoryWeight>,
        pix: &P,
    ) -> Result<Self, StochMapError> {
        if params.reference_pixel as usize >= pix.len() {
            return Err(StochMapError::InvalidParameter(format!(
                "reference pixel {} out of range ({} pixels)",
                params.reference_pixel,
                pix.len()
            )));
        }

        let concentrations = match params.null_lambda {
            Some(l) => Concentrations {
                lambdas: vec![l],
                weights: None,
            },
            None => {
                if let Some((cat, c)) = categories
                    .iter()
                    .find(|(_, c)| !(c.lambda.is_finite() && c.lambda > 0.0))
                {
                    return Err(StochMapError::InvalidCategoryWeights(format!(
                        "category {cat} has concentration {}",
                        c.lambda
                    )));
                }
                let weights = WeightedIndex::new(categories.values().map(|c| c.count))
                    .map_err(|e| StochMapError::InvalidCategoryWeights(e.to_string()))?;
                Concentrations {
                    lambdas: categories.values().map(|c| c.lambda).collect(),
                    weights: Some(weights),
                }
            }
        };

        Ok(NullModel {
            concentrations,
            reference: params.reference_pixel,
            particles: params.null_particles,
            seed: params.seed,
        })
    }

    fn draw_category<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        self.concentrations
            .weights
            .as_ref()
            .map_or(0, |w| w.sample(rng))
    }

    /// Simulated distances (radians, ascending) along a branch made of `segments`.
    pub fn simulate<P, R>(
        &self,
        pix: &P,
        segments: &[MillionYears],
        rng: &mut R,
    ) -> Result<Vec<f64>, StochMapError>
    where
        P: Pixelation + ?Sized,
        R: Rng + ?Sized,
    {
        // kernels[segment][category]
        let kernels = segments
            .iter()
            .map(|&duration| {
                self.concentrations
                    .lambdas
                    .iter()
                    .map(|&l| SphericalNormal::with_duration(l, duration))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut distances = Vec::with_capacity(self.particles);
        for _ in 0..self.particles {
            let mut px = self.reference;
            let mut total = 0.0;
            for step in &kernels {
                let kernel = &step[self.draw_category(rng)];
                let next = pix.pixel_at(&kernel.sample(rng, &pix.vector(px)));
                total += pix.distance(px, next);
                px = next;
            }
            distances.push(total);
        }
        sort_sample(&mut distances);
        Ok(distances)
    }

    /// Envelope of the branch above `node`, with the node's own deterministic seed.
    pub fn envelope<P: Pixelation + ?Sized>(
        &self,
        pix: &P,
        node: NodeId,
        segments: &[MillionYears],
    ) -> Result<NullEnvelope, StochMapError> {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(node as u64));
        let distances = self.simulate(pix, segments, &mut rng)?;
        Ok(NullEnvelope::from_sorted(&distances))
    }
}
