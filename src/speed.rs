//! # Displacement / Speed Analyzer
//!
//! Two views of how far lineages travelled:
//!
//! * **per branch** ([`branch_stats`]) – for every non-root node, the biological distance of each
//!   particle (sum of its moves along the branch), the geographic distance between the first and
//!   last waypoint, their medians and 95% intervals, and the implied speed. When a null model is
//!   configured, the observed distances are compared with its [`NullEnvelope`].
//! * **per time slice** ([`time_slice_stats`]) – for every stage of a [`StageTable`], the distance
//!   moved by each particle summed over all branches crossing the slice, divided by the total
//!   branch length inside the slice.
//!
//! Distances are kept in radians and branch lengths in million years; the Result Emitter converts
//! to kilometres.
//!
//! A branch of zero length yields a non-finite speed, which is reported as is.
use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::constants::{years_to_my, FastHashMap, MillionYears, NodeId, ParticleId, Radian, Years};
use crate::geometry::Pixelation;
use crate::null_model::{segments, NullEnvelope, NullModel};
use crate::params::ReconParams;
use crate::sample::{SampleIndex, SampleTree};
use crate::stages::StageTable;
use crate::stats::{sort_sample, Summary};
use crate::stochmap_errors::StochMapError;
use crate::topology::TreeLookup;

/// Displacement statistics of the branch leading to a node.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchStats {
    pub tree: String,
    pub node: NodeId,
    /// Summed move distance of each particle (radians).
    pub distance: Summary,
    /// Direct distance between the first and last waypoint (radians).
    pub geographic: Summary,
    pub branch_length: MillionYears,
    /// Median biological distance per million years (radians / My).
    pub speed: f64,
    pub particles: usize,
    pub null: Option<NullEnvelope>,
    /// Fraction of particles below the null 5% bound.
    pub slower: f64,
    /// Fraction of particles above the null 95% bound.
    pub faster: f64,
}

/// Displacement statistics of one tree at one time slice.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSliceStats {
    pub tree: String,
    /// Stage age (years) naming the slice.
    pub stage: Years,
    /// Per-particle distance moved during the slice (radians).
    pub distance: Summary,
    /// Total branch length inside the slice.
    pub branch_length: MillionYears,
    /// Median distance per million years of lineage time (radians / My).
    pub speed: f64,
    pub particles: usize,
}

fn null_model_for<P: Pixelation + ?Sized>(
    tree: &SampleTree,
    pix: &P,
    params: &ReconParams,
) -> Result<Option<NullModel>, StochMapError> {
    if params.null_particles == 0 {
        return Ok(None);
    }
    if params.null_lambda.is_none() && tree.categories.is_empty() {
        warn!(
            tree = tree.name.as_str(),
            "no relaxed-clock category and no fixed concentration, null model skipped"
        );
        return Ok(None);
    }
    NullModel::new(params, &tree.categories, pix).map(Some)
}

/// Per-branch displacement statistics.
///
/// Arguments
/// -----------------
/// * `index` – Stochastic-mapping sample.
/// * `trees` – Topology of the sampled trees; trees it does not know are skipped.
/// * `pix` – Pixelation of the sample.
/// * `params` – Null-model settings (`null_particles = 0` disables the comparison).
///
/// Return
/// ----------
/// * One entry per sampled non-root node with particle records, trees by name then nodes by id.
/// * `Err` only from the null-model configuration.
///
/// See also
/// ------------
/// * [`time_slice_stats`] – Same distances pooled by time slice.
pub fn branch_stats<P: Pixelation + ?Sized>(
    index: &SampleIndex,
    trees: &dyn TreeLookup,
    pix: &P,
    params: &ReconParams,
) -> Result<Vec<BranchStats>, StochMapError> {
    let mut out = Vec::new();
    for tree in index.trees() {
        let name = tree.name.as_str();
        if !trees.has_tree(name) {
            warn!(tree = name, "tree without topology skipped");
            continue;
        }
        let null = null_model_for(tree, pix, params)?;

        for node in tree.nodes() {
            if node.branch.is_empty() || trees.is_root(name, node.id) {
                continue;
            }
            let (Some(parent), Some(node_age)) =
                (trees.parent(name, node.id), trees.node_age(name, node.id))
            else {
                continue;
            };
            let Some(parent_age) = trees.node_age(name, parent) else {
                continue;
            };
            let branch_length = years_to_my(parent_age - node_age);

            let mut bio: Vec<Radian> = node.branch.values().map(|b| b.distance).collect();
            let mut geo: Vec<Radian> = node
                .branch
                .values()
                .map(|b| pix.distance(b.start, b.end))
                .collect();
            sort_sample(&mut bio);
            sort_sample(&mut geo);
            let distance = Summary::from_sorted(&bio);

            let envelope = match &null {
                Some(model) => {
                    let segs = segments(parent_age, node_age, node.stages().iter().map(|s| s.age));
                    Some(model.envelope(pix, node.id, &segs)?)
                }
                None => None,
            };
            let (slower, faster) = envelope.map_or((f64::NAN, f64::NAN), |e| {
                (e.slower(&bio), e.faster(&bio))
            });

            out.push(BranchStats {
                tree: tree.name.clone(),
                node: node.id,
                distance,
                geographic: Summary::from_sorted(&geo),
                branch_length,
                speed: distance.median / branch_length,
                particles: bio.len(),
                null: envelope,
                slower,
                faster,
            });
        }
    }
    info!(branches = out.len(), "branch speed analysis done");
    Ok(out)
}

/// Lineage time (years) inside each stage for every branch of a tree.
fn slice_lengths(trees: &dyn TreeLookup, name: &str, stages: &StageTable) -> FastHashMap<Years, Years> {
    let mut lengths = FastHashMap::default();
    for n in trees.post_order(name) {
        let Some(parent) = trees.parent(name, n) else {
            continue;
        };
        let (Some(young), Some(old)) = (trees.node_age(name, n), trees.node_age(name, parent))
        else {
            continue;
        };
        for &s in stages.ages() {
            let ov = stages.overlap(s, young, old);
            if ov > 0 {
                *lengths.entry(s).or_insert(0) += ov;
            }
        }
    }
    lengths
}

/// Per-time-slice displacement statistics.
///
/// Every stage crossed by a branch of the tree is reported, with or without sampled moves. The
/// distance of a particle in a slice is the sum of its moves, over every node, whose starting age
/// snaps to that stage; particles of the tree that did not move count as zero.
///
/// Return
/// ----------
/// * Entries by tree name, then stage from oldest to youngest.
pub fn time_slice_stats(
    index: &SampleIndex,
    trees: &dyn TreeLookup,
    stages: &StageTable,
) -> Vec<TimeSliceStats> {
    let mut out = Vec::new();
    for tree in index.trees() {
        let name = tree.name.as_str();
        if !trees.has_tree(name) {
            warn!(tree = name, "tree without topology skipped");
            continue;
        }
        let lengths = slice_lengths(trees, name, stages);

        let mut pooled: FastHashMap<Years, FastHashMap<ParticleId, Radian>> =
            FastHashMap::default();
        for node in tree.nodes() {
            for stage in node.stages() {
                let slice = pooled.entry(stages.closest_stage_age(stage.age)).or_default();
                for (&p, &d) in &stage.moves {
                    *slice.entry(p).or_insert(0.0) += d;
                }
            }
        }

        let slices: BTreeSet<Years> = lengths.keys().chain(pooled.keys()).copied().collect();
        for &s in slices.iter().rev() {
            let moves = pooled.get(&s);
            let mut values: Vec<Radian> = tree
                .particles
                .iter()
                .map(|p| moves.and_then(|m| m.get(p)).copied().unwrap_or(0.0))
                .collect();
            sort_sample(&mut values);
            let distance = Summary::from_sorted(&values);
            let branch_length = years_to_my(lengths.get(&s).copied().unwrap_or(0));

            out.push(TimeSliceStats {
                tree: tree.name.clone(),
                stage: s,
                distance,
                branch_length,
                speed: distance.median / branch_length,
                particles: values.len(),
            });
        }
    }
    info!(slices = out.len(), "time-slice speed analysis done");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::YEARS_PER_MY;
    use crate::geometry::pixelation::IsoPixelation;
    use crate::sample::{BranchRecord, DistKind};
    use crate::topology::{TimeTree, TreeSet};
    use approx::assert_relative_eq;

    const MY: Years = YEARS_PER_MY as Years;

    // root 0 (5 My) → 1 (0), 2 (2 My)
    fn topology() -> TreeSet {
        let mut t = TimeTree::new("t", 0, 5 * MY);
        t.add_node(1, 0, 0).unwrap();
        t.add_node(2, 0, 2 * MY).unwrap();
        let mut set = TreeSet::new();
        set.insert(t);
        set
    }

    #[test]
    fn test_slice_lengths() {
        let set = topology();
        let stages = StageTable::new([0, MY, 3 * MY, 10 * MY]);
        let l = slice_lengths(&set, "t", &stages);
        // stage 10 My covers (3, ∞): 2 + 2
        assert_eq!(l.get(&(10 * MY)), Some(&(4 * MY)));
        // stage 3 My covers (1, 3]: 2 + 1
        assert_eq!(l.get(&(3 * MY)), Some(&(3 * MY)));
        // stage 1 My covers (0, 1]: node 1 only
        assert_eq!(l.get(&MY), Some(&MY));
        assert_eq!(l.get(&0), None);
    }

    #[test]
    fn test_time_slice_pools_branches() {
        let set = topology();
        let stages = StageTable::new([0, 10 * MY]);
        let mut idx = SampleIndex::new();
        {
            let t = idx.tree_or_insert("t");
            t.particles.extend([0, 1, 2]);
            for p in 0..3 {
                let s = t.node_or_insert(1).stage_or_insert(5 * MY, DistKind::Freq);
                s.moves.insert(p, 2.0);
            }
            for p in 0..2 {
                let s = t.node_or_insert(2).stage_or_insert(4 * MY, DistKind::Freq);
                s.moves.insert(p, 1.0);
            }
        }
        idx.finish();

        let out = time_slice_stats(&idx, &set, &stages);
        assert_eq!(out.len(), 1);
        let slice = &out[0];
        assert_eq!(slice.stage, 10 * MY);
        assert_eq!(slice.particles, 3);
        assert_relative_eq!(slice.branch_length, 8.0);
        // per particle: 3, 3, 2
        assert_eq!(slice.distance.median, 3.0);
        assert_eq!(slice.distance.q025, 2.0);
        assert_relative_eq!(slice.speed, 3.0 / 8.0);
    }

    #[test]
    fn test_branch_stats_skips_root_and_unknown_trees() {
        let set = topology();
        let pix = IsoPixelation::new(24).unwrap();
        let mut idx = SampleIndex::new();
        {
            let t = idx.tree_or_insert("t");
            for id in [0, 2] {
                let n = t.node_or_insert(id);
                n.stage_or_insert(5 * MY, DistKind::Freq);
                n.branch.insert(0, BranchRecord::new(5 * MY, 10, 12, 0.4));
                n.branch.insert(1, BranchRecord::new(5 * MY, 10, 10, 0.0));
            }
            idx.tree_or_insert("other")
                .node_or_insert(1)
                .branch
                .insert(0, BranchRecord::new(MY, 1, 2, 0.1));
        }
        idx.finish();

        let params = ReconParams::builder().null_particles(0).build().unwrap();
        let out = branch_stats(&idx, &set, &pix, &params).unwrap();
        assert_eq!(out.len(), 1);
        let b = &out[0];
        assert_eq!((b.tree.as_str(), b.node), ("t", 2));
        assert_eq!(b.particles, 2);
        assert_relative_eq!(b.branch_length, 3.0);
        assert_eq!(b.distance.median, 0.0);
        assert_eq!(b.distance.q975, 0.4);
        assert_eq!(b.geographic.q975, pix.distance(10, 12));
        assert!(b.null.is_none());
        assert!(b.slower.is_nan());
    }

    #[test]
    fn test_zero_length_branch_is_not_guarded() {
        let mut t = TimeTree::new("t", 0, MY);
        t.add_node(1, 0, MY).unwrap();
        let mut set = TreeSet::new();
        set.insert(t);

        let pix = IsoPixelation::new(24).unwrap();
        let mut idx = SampleIndex::new();
        idx.tree_or_insert("t")
            .node_or_insert(1)
            .branch
            .insert(0, BranchRecord::new(MY, 10, 12, 0.4));
        idx.finish();

        let params = ReconParams::builder().null_particles(0).build().unwrap();
        let out = branch_stats(&idx, &set, &pix, &params).unwrap();
        assert!(out[0].speed.is_infinite());
    }
}
