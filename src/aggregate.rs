//! # Aggregator
//!
//! Turns raw stage distributions into probability-like values. The transform is selected by the
//! [`DistKind`] tag of the distribution:
//!
//! | kind       | transform                                   |
//! |------------|---------------------------------------------|
//! | `freq`     | `v / Σv` (idempotent)                       |
//! | `kde`      | `v / Σv`                                    |
//! | `log-like` | `exp(v - max v)`, retagged `like`           |
//! | `like`     | none                                        |
//!
//! A distribution whose values sum to zero (or less) is left untouched. The tag always describes
//! the values it sits on, so a written and re-read distribution normalizes to the same values.
//!
//! [`credible_range`] then restricts a normalized distribution to its highest-density pixels.
use crate::sample::{DistKind, SampleIndex, StageDistribution};

/// Normalize a single distribution according to its kind.
pub fn normalize(dist: &mut StageDistribution) {
    match dist.kind() {
        DistKind::Freq | DistKind::Kde => scale(dist),
        DistKind::Like => dist.set_normalized(!dist.is_empty()),
        DistKind::LogLike => {
            let Some(max) = dist.max() else {
                return;
            };
            for v in dist.values_mut().values_mut() {
                *v = (*v - max).exp();
            }
            let total = dist.sum();
            dist.set_total(total);
            dist.set_kind(DistKind::Like);
            dist.set_normalized(true);
        }
    }
}

/// `v / Σv`, with the total recomputed from the values.
fn scale(dist: &mut StageDistribution) {
    let total = dist.sum();
    if total <= 0.0 || !total.is_finite() {
        return;
    }
    for v in dist.values_mut().values_mut() {
        *v /= total;
    }
    dist.set_total(1.0);
    dist.set_normalized(true);
}

/// Normalize every distribution of the index, per-category distributions included.
pub fn normalize_index(index: &mut SampleIndex) {
    for stage in index.stages_mut() {
        normalize(&mut stage.dist);
        for d in stage.categories.values_mut() {
            normalize(d);
        }
    }
}

/// Keep the highest-valued pixels until their cumulated value reaches `bound × Σv`.
///
/// Pixels are ranked by decreasing value (ties by increasing pixel id), so the result is
/// deterministic. Kept values are not rescaled. `bound ≥ 1` keeps every pixel.
pub fn credible_range(dist: &mut StageDistribution, bound: f64) {
    if bound >= 1.0 || dist.is_empty() {
        return;
    }
    let target = bound * dist.sum();

    let mut ranked: Vec<_> = dist.values().iter().map(|(&p, &v)| (p, v)).collect();
    ranked.sort_unstable_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut cumulative = 0.0;
    let mut keep = ranked.len();
    for (i, &(_, v)) in ranked.iter().enumerate() {
        cumulative += v;
        if cumulative >= target {
            keep = i + 1;
            break;
        }
    }

    let values = dist.values_mut();
    for &(p, _) in &ranked[keep..] {
        values.remove(&p);
    }
    let total = dist.sum();
    dist.set_total(total);
}
