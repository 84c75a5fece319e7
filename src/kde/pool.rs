//! Worker pool smoothing every stage distribution of a [`SampleIndex`].
//!
//! ```text
//!  feeder ──jobs (bounded)──▶ worker × N ──outcomes──▶ coordinator ──▶ SampleIndex
//! ```
//!
//! * Before the pass, the coordinator moves every stage distribution out of the index into a
//!   [`KdeJob`] addressed by its [`StageKey`].
//! * A feeder thread pushes the jobs into a bounded queue; `N` named worker threads pull jobs,
//!   normalize them by their type tag (so raw log-likelihoods become positive masses), smooth,
//!   normalize and bound the estimate, and push the outcome.
//! * The calling thread drains outcomes in any order and writes each one back by key. It is the
//!   only writer of the index during the pass.
//!
//! The pass ends when every worker has hung up; if fewer outcomes than jobs came back, the pass
//! fails with [`StochMapError::KdePoolDisconnected`].
use std::thread;
use std::time::Instant;

use crossbeam_channel::bounded;
use tracing::info;

use super::{smooth, Admissibility};
use crate::aggregate::{credible_range, normalize};
use crate::constants::Years;
use crate::geometry::spherical_normal::SphericalNormal;
use crate::geometry::Pixelation;
use crate::params::ReconParams;
use crate::progress::{fmt_dur, PassProgress};
use crate::sample::{CategoryKey, SampleIndex, StageDistribution, StageKey};
use crate::stochmap_errors::StochMapError;

struct KdeJob {
    key: StageKey,
    age: Years,
    dist: StageDistribution,
    categories: Vec<(CategoryKey, StageDistribution)>,
}

struct KdeOutcome {
    key: StageKey,
    dist: StageDistribution,
    categories: Vec<(CategoryKey, StageDistribution)>,
}

/// Normalize, smooth, and bound a single distribution.
fn process<P, A>(
    mut dist: StageDistribution,
    age: Years,
    pix: &P,
    kernel: &SphericalNormal,
    mask: &A,
    bound: f64,
) -> StageDistribution
where
    P: Pixelation + ?Sized,
    A: Admissibility + ?Sized,
{
    normalize(&mut dist);
    let mut out = smooth(&dist, age, pix, kernel, mask);
    normalize(&mut out);
    credible_range(&mut out, bound);
    out
}

/// Replace every stage distribution of `index` (per-category ones included) by its normalized
/// kernel density estimate.
///
/// Arguments
/// -----------------
/// * `index` – Loaded sample index, modified in place.
/// * `pix` – Pixelation of the sample.
/// * `mask` – Admissibility mask.
/// * `params` – Uses `kde_lambda`, `workers`, `queue_capacity` and `bound`.
///
/// Return
/// ----------
/// * `Ok(n)` with the number of smoothed stages.
/// * `Err` if the kernel is invalid, a worker thread cannot be spawned, or results went missing.
pub fn smooth_index<P, A>(
    index: &mut SampleIndex,
    pix: &P,
    mask: &A,
    params: &ReconParams,
) -> Result<usize, StochMapError>
where
    P: Pixelation + ?Sized,
    A: Admissibility + ?Sized,
{
    let kernel = SphericalNormal::new(params.kde_lambda)?;
    let start = Instant::now();

    let jobs: Vec<KdeJob> = index
        .stage_keys()
        .into_iter()
        .filter_map(|key| {
            let stage = index.stage_mut(key)?;
            Some(KdeJob {
                key,
                age: stage.age,
                dist: std::mem::take(&mut stage.dist),
                categories: std::mem::take(&mut stage.categories).into_iter().collect(),
            })
        })
        .collect();
    let submitted = jobs.len();
    let workers = params.workers.max(1);
    let bound = params.bound;
    let kernel = &kernel;

    let mut progress = PassProgress::new(submitted as u64);
    let received = thread::scope(|s| -> Result<usize, StochMapError> {
        let (job_tx, job_rx) = bounded::<KdeJob>(params.queue_capacity().max(1));
        let (out_tx, out_rx) = bounded::<KdeOutcome>(params.queue_capacity().max(1));

        s.spawn(move || {
            for job in jobs {
                if job_tx.send(job).is_err() {
                    break;
                }
            }
        });

        for w in 0..workers {
            let rx = job_rx.clone();
            let tx = out_tx.clone();
            thread::Builder::new()
                .name(format!("kde-worker-{w}"))
                .spawn_scoped(s, move || {
                    for job in rx {
                        let age = job.age;
                        let dist = process(job.dist, age, pix, kernel, mask, bound);
                        let categories = job
                            .categories
                            .into_iter()
                            .map(|(k, d)| (k, process(d, age, pix, kernel, mask, bound)))
                            .collect();
                        let outcome = KdeOutcome {
                            key: job.key,
                            dist,
                            categories,
                        };
                        if tx.send(outcome).is_err() {
                            break;
                        }
                    }
                })?;
        }
        drop(job_rx);
        drop(out_tx);

        let mut received = 0usize;
        for outcome in out_rx {
            if let Some(stage) = index.stage_mut(outcome.key) {
                stage.dist = outcome.dist;
                stage.categories = outcome.categories.into_iter().collect();
            }
            received += 1;
            progress.inc();
        }
        Ok(received)
    })?;
    progress.finish();

    if received < submitted {
        return Err(StochMapError::KdePoolDisconnected(submitted - received));
    }
    info!(
        jobs = submitted,
        workers,
        lambda = params.kde_lambda,
        elapsed = %fmt_dur(start.elapsed()),
        "KDE pass done"
    );
    Ok(received)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::pixelation::IsoPixelation;
    use crate::kde::AllPixels;
    use crate::sample::DistKind;
    use approx::assert_relative_eq;

    fn index_with(pixels: &[(u32, Years, u32)]) -> SampleIndex {
        let mut idx = SampleIndex::new();
        for &(node, age, px) in pixels {
            idx.tree_or_insert("t")
                .node_or_insert(node)
                .stage_or_insert(age, DistKind::Freq)
                .dist
                .add(px, 1.0);
        }
        idx.finish();
        idx
    }

    #[test]
    fn test_pool_matches_serial_smoothing() {
        let pix = IsoPixelation::new(24).unwrap();
        let mut idx = index_with(&[(1, 0, 10), (1, 5, 40), (2, 0, 100), (3, 7, 150)]);
        let serial = idx.clone();

        let params = ReconParams::builder()
            .workers(3)
            .queue_capacity(1)
            .kde_lambda(30.0)
            .build()
            .unwrap();
        let n = smooth_index(&mut idx, &pix, &AllPixels, &params).unwrap();
        assert_eq!(n, 4);

        let kernel = SphericalNormal::new(30.0).unwrap();
        for key in serial.stage_keys() {
            let before = serial.stage(key).unwrap();
            let after = idx.stage(key).unwrap();
            let expected = process(before.dist.clone(), before.age, &pix, &kernel, &AllPixels, 1.0);
            assert_eq!(after.dist.kind(), DistKind::Kde);
            assert_relative_eq!(after.dist.sum(), 1.0, epsilon = 1e-9);
            for (p, v) in expected.sorted() {
                assert_relative_eq!(after.dist.get(p).unwrap(), v, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_pool_with_single_worker_and_bound() {
        let pix = IsoPixelation::new(24).unwrap();
        let mut idx = index_with(&[(1, 0, 10)]);
        let params = ReconParams::builder()
            .workers(1)
            .bound(0.5)
            .build()
            .unwrap();
        smooth_index(&mut idx, &pix, &AllPixels, &params).unwrap();
        let d = &idx.trees()[0].nodes()[0].stages()[0].dist;
        assert!(d.total() >= 0.5 - 1e-9);
        assert!(d.len() < pix.len());
        assert!(d.get(10).is_some());
    }

    #[test]
    fn test_raw_log_likelihoods_are_smoothed() {
        let pix = IsoPixelation::new(24).unwrap();
        let mut idx = SampleIndex::new();
        let s = idx
            .tree_or_insert("t")
            .node_or_insert(1)
            .stage_or_insert(0, DistKind::LogLike);
        s.dist.add(10, -1.0);
        s.dist.add(40, -3.0);
        idx.finish();

        let params = ReconParams::builder().workers(2).kde_lambda(30.0).build().unwrap();
        assert_eq!(smooth_index(&mut idx, &pix, &AllPixels, &params).unwrap(), 1);
        let d = &idx.trees()[0].nodes()[0].stages()[0].dist;
        assert_eq!(d.kind(), DistKind::Kde);
        assert!(!d.is_empty());
        assert_relative_eq!(d.sum(), 1.0, epsilon = 1e-9);
        assert!(d.get(10).unwrap() > d.get(40).unwrap());
    }

    #[test]
    fn test_empty_index() {
        let pix = IsoPixelation::new(8).unwrap();
        let mut idx = SampleIndex::new();
        let params = ReconParams::builder().workers(2).build().unwrap();
        assert_eq!(smooth_index(&mut idx, &pix, &AllPixels, &params), Ok(0));
    }
}
