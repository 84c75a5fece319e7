//! # Rotator
//!
//! Re-expresses a stage distribution in the pixel frame of another age through a
//! [`PlateMotion`] model. A non-present frame is first brought back to the present-day frame,
//! then moved to the target stage.
//!
//! When a pixel maps to several destination pixels (plate splitting), its whole value is added to
//! every destination: mass is replicated, not partitioned. Total mass is therefore only conserved
//! when every source pixel has exactly one destination. Pixels without destination are dropped.
use tracing::info;

use crate::constants::{Years, PRESENT};
use crate::params::ReconParams;
use crate::sample::{SampleIndex, StageDistribution};
use crate::stages::PlateMotion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Present,
    Stage(Years),
}

fn frame<M: PlateMotion + ?Sized>(age: Years, motion: &M) -> Frame {
    if age <= PRESENT {
        Frame::Present
    } else {
        Frame::Stage(motion.closest_stage_age(age))
    }
}

/// Move every value of `dist` through `lookup`, replicating it on each destination.
fn remap<'m, F>(dist: &StageDistribution, lookup: F) -> StageDistribution
where
    F: Fn(u32) -> Option<&'m [u32]>,
{
    let mut out = StageDistribution::new(dist.kind());
    for (&px, &v) in dist.values() {
        if let Some(dest) = lookup(px) {
            for &d in dest {
                out.add(d, v);
            }
        }
    }
    out.set_normalized(dist.is_normalized());
    out
}

/// Rotate `dist`, sampled at `from_age`, into the frame of `to_age`.
///
/// Arguments
/// -----------------
/// * `dist` – Distribution in the frame of the stage closest to `from_age`.
/// * `from_age`, `to_age` – Ages in years; `0` is the present-day frame.
/// * `motion` – Plate-motion model.
///
/// Return
/// ----------
/// * A new distribution with the same kind. If both ages snap to the same frame the input is
///   returned unchanged.
pub fn rotate<M: PlateMotion + ?Sized>(
    dist: &StageDistribution,
    from_age: Years,
    to_age: Years,
    motion: &M,
) -> StageDistribution {
    let from = frame(from_age, motion);
    let to = frame(to_age, motion);
    if from == to {
        return dist.clone();
    }

    let present = match from {
        Frame::Present => dist.clone(),
        Frame::Stage(s) => remap(dist, |px| motion.present_pixels(s, px)),
    };
    match to {
        Frame::Present => present,
        Frame::Stage(s) => remap(&present, |px| motion.stage_pixels(s, px)),
    }
}

/// Rotate every distribution of the index into the frame of `to_age`, in place.
pub fn rotate_index<M: PlateMotion + ?Sized>(index: &mut SampleIndex, to_age: Years, motion: &M) {
    let mut rotated = 0usize;
    for stage in index.stages_mut() {
        let age = stage.age;
        stage.dist = rotate(&stage.dist, age, to_age, motion);
        for d in stage.categories.values_mut() {
            *d = rotate(d, age, to_age, motion);
        }
        rotated += 1;
    }
    info!(stages = rotated, to_age, "distributions rotated");
}

/// Rotate the index into the frame of `params.rotate_to`, if set.
///
/// Return
/// ----------
/// * The target age, or `None` when no rotation was requested.
pub fn rotate_to_target<M: PlateMotion + ?Sized>(
    index: &mut SampleIndex,
    params: &ReconParams,
    motion: &M,
) -> Option<Years> {
    let to_age = params.rotate_to?;
    rotate_index(index, to_age, motion);
    Some(to_age)
}
