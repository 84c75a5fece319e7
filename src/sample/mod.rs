//! # Sample Index
//!
//! Sparse hierarchical storage of reconstruction samples:
//!
//! ```text
//! tree (by name) → node (by id) → stage (by age) → [ (category, trait) ] → pixel → value
//! ```
//!
//! The index is an arena: trees live in a `Vec` with a hash index on the normalized name only;
//! nodes are kept sorted by id inside their tree, and stages sorted by age (oldest first) inside
//! their node. Once loading is finished, a `(tree, node, stage)` position is addressed by a
//! [`StageKey`] of plain indices, which the KDE pool uses to hand distributions to workers and
//! write them back.
//!
//! Stochastic-mapping samples additionally keep, per particle:
//! * the distance moved during each stage ([`StageSample::moves`]),
//! * the accumulated [`BranchRecord`] along the branch leading to the node.
//!
//! Tables are parsed by the [`reader`] submodule.
pub mod reader;

use std::collections::{BTreeMap, BTreeSet};

use crate::constants::{FastHashMap, NodeId, ParticleId, PixelId, Radian, Years};

/// Type tag of a distribution, selecting the transform applied by the Aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistKind {
    /// Raw particle counts (or frequencies once normalized).
    Freq,
    /// Log-likelihoods from an inference engine.
    LogLike,
    /// Likelihoods scaled to a maximum of 1, obtained from `LogLike` values.
    Like,
    /// Kernel density values.
    Kde,
}

impl DistKind {
    /// Parse a `type` tag (`freq`, `log-like`, `like`, `kde`, case-insensitive).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "freq" => Some(DistKind::Freq),
            "log-like" => Some(DistKind::LogLike),
            "like" => Some(DistKind::Like),
            "kde" => Some(DistKind::Kde),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            DistKind::Freq => "freq",
            DistKind::LogLike => "log-like",
            DistKind::Like => "like",
            DistKind::Kde => "kde",
        }
    }
}

/// Pixel-indexed scalar distribution at one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageDistribution {
    values: FastHashMap<PixelId, f64>,
    total: f64,
    kind: DistKind,
    normalized: bool,
}

impl Default for StageDistribution {
    fn default() -> Self {
        Self::new(DistKind::Freq)
    }
}

impl StageDistribution {
    pub fn new(kind: DistKind) -> Self {
        StageDistribution {
            values: FastHashMap::default(),
            total: 0.0,
            kind,
            normalized: false,
        }
    }

    /// Build a distribution from already computed values; the total is their sum.
    pub fn from_values(kind: DistKind, values: FastHashMap<PixelId, f64>, normalized: bool) -> Self {
        let total = values.values().sum();
        StageDistribution {
            values,
            total,
            kind,
            normalized,
        }
    }

    /// Add `v` to a pixel and to the running total.
    #[inline]
    pub fn add(&mut self, pixel: PixelId, v: f64) {
        *self.values.entry(pixel).or_insert(0.0) += v;
        self.total += v;
    }

    pub fn get(&self, pixel: PixelId) -> Option<f64> {
        self.values.get(&pixel).copied()
    }

    pub fn values(&self) -> &FastHashMap<PixelId, f64> {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut FastHashMap<PixelId, f64> {
        &mut self.values
    }

    /// Accumulated total used for normalization.
    pub fn total(&self) -> f64 {
        self.total
    }

    pub(crate) fn set_total(&mut self, total: f64) {
        self.total = total;
    }

    pub fn kind(&self) -> DistKind {
        self.kind
    }

    pub(crate) fn set_kind(&mut self, kind: DistKind) {
        self.kind = kind;
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    pub(crate) fn set_normalized(&mut self, normalized: bool) {
        self.normalized = normalized;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sum of the stored values.
    pub fn sum(&self) -> f64 {
        self.values.values().sum()
    }

    /// Largest stored value, `None` if empty.
    pub fn max(&self) -> Option<f64> {
        self.values.values().copied().reduce(f64::max)
    }

    /// `(pixel, value)` pairs by ascending pixel id.
    pub fn sorted(&self) -> Vec<(PixelId, f64)> {
        let mut v: Vec<(PixelId, f64)> = self.values.iter().map(|(&p, &x)| (p, x)).collect();
        v.sort_unstable_by_key(|&(p, _)| p);
        v
    }
}

/// Secondary key of per-category distributions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CategoryKey {
    pub category: u32,
    pub trait_state: String,
}

/// Samples of one node at one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSample {
    pub age: Years,
    pub dist: StageDistribution,
    pub categories: BTreeMap<CategoryKey, StageDistribution>,
    /// Distance (radians) moved by each particle during this stage.
    pub moves: FastHashMap<ParticleId, Radian>,
}

impl StageSample {
    pub fn new(age: Years, kind: DistKind) -> Self {
        StageSample {
            age,
            dist: StageDistribution::new(kind),
            categories: BTreeMap::new(),
            moves: FastHashMap::default(),
        }
    }
}

/// Displacement of one particle along the branch leading to a node.
///
/// The start is the `from` pixel of the oldest row of the particle, the end the `to` pixel of its
/// youngest row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchRecord {
    /// Accumulated great-circle distance of every move (radians).
    pub distance: Radian,
    pub start_age: Years,
    pub start: PixelId,
    pub end_age: Years,
    pub end: PixelId,
}

impl BranchRecord {
    pub fn new(age: Years, from: PixelId, to: PixelId, distance: Radian) -> Self {
        BranchRecord {
            distance,
            start_age: age,
            start: from,
            end_age: age,
            end: to,
        }
    }

    /// Account for one more segment starting at `age`.
    pub fn update(&mut self, age: Years, from: PixelId, to: PixelId, distance: Radian) {
        self.distance += distance;
        if age > self.start_age {
            self.start_age = age;
            self.start = from;
        }
        if age < self.end_age {
            self.end_age = age;
            self.end = to;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleNode {
    pub id: NodeId,
    /// Stages by decreasing age.
    stages: Vec<StageSample>,
    pub branch: FastHashMap<ParticleId, BranchRecord>,
}

impl SampleNode {
    pub fn new(id: NodeId) -> Self {
        SampleNode {
            id,
            stages: Vec::new(),
            branch: FastHashMap::default(),
        }
    }

    /// Stages, oldest first.
    pub fn stages(&self) -> &[StageSample] {
        &self.stages
    }

    pub fn stages_mut(&mut self) -> &mut [StageSample] {
        &mut self.stages
    }

    pub fn stage(&self, age: Years) -> Option<&StageSample> {
        self.stage_index(age).ok().map(|i| &self.stages[i])
    }

    fn stage_index(&self, age: Years) -> Result<usize, usize> {
        // descending order
        self.stages.binary_search_by(|s| age.cmp(&s.age))
    }

    /// Stage at `age`, created with `kind` if missing.
    pub fn stage_or_insert(&mut self, age: Years, kind: DistKind) -> &mut StageSample {
        let i = match self.stage_index(age) {
            Ok(i) => i,
            Err(i) => {
                self.stages.insert(i, StageSample::new(age, kind));
                i
            }
        };
        &mut self.stages[i]
    }

    /// Replace every stage, keeping the decreasing-age order.
    pub fn set_stages(&mut self, mut stages: Vec<StageSample>) {
        stages.sort_by(|a, b| b.age.cmp(&a.age));
        self.stages = stages;
    }
}

/// Relaxed-clock category observed in a stochastic-mapping sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryWeight {
    /// Diffusion concentration of the category (1/radian² per million years).
    pub lambda: f64,
    /// Number of rows using the category.
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleTree {
    pub name: String,
    /// Nodes by increasing id.
    nodes: Vec<SampleNode>,
    pub categories: BTreeMap<u32, CategoryWeight>,
    pub particles: BTreeSet<ParticleId>,
}

impl SampleTree {
    pub fn new(name: &str) -> Self {
        SampleTree {
            name: name.to_string(),
            nodes: Vec::new(),
            categories: BTreeMap::new(),
            particles: BTreeSet::new(),
        }
    }

    /// Nodes by increasing id.
    pub fn nodes(&self) -> &[SampleNode] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [SampleNode] {
        &mut self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&SampleNode> {
        self.nodes
            .binary_search_by_key(&id, |n| n.id)
            .ok()
            .map(|i| &self.nodes[i])
    }

    pub fn node_or_insert(&mut self, id: NodeId) -> &mut SampleNode {
        let i = match self.nodes.binary_search_by_key(&id, |n| n.id) {
            Ok(i) => i,
            Err(i) => {
                self.nodes.insert(i, SampleNode::new(id));
                i
            }
        };
        &mut self.nodes[i]
    }

    /// Record one row of a relaxed-clock category.
    pub fn add_category(&mut self, category: u32, lambda: f64) {
        self.categories
            .entry(category)
            .and_modify(|c| c.count += 1)
            .or_insert(CategoryWeight { lambda, count: 1 });
    }
}

/// Position of a stage distribution in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageKey {
    pub tree: usize,
    pub node: usize,
    pub stage: usize,
}

/// The sample arena.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleIndex {
    trees: Vec<SampleTree>,
    by_name: FastHashMap<String, usize>,
}

impl SampleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Trees, sorted by name once loading is finished.
    pub fn trees(&self) -> &[SampleTree] {
        &self.trees
    }

    pub fn tree(&self, name: &str) -> Option<&SampleTree> {
        self.by_name.get(name).map(|&i| &self.trees[i])
    }

    /// Tree with a normalized `name`, created if missing.
    pub fn tree_or_insert(&mut self, name: &str) -> &mut SampleTree {
        let i = match self.by_name.get(name) {
            Some(&i) => i,
            None => {
                self.trees.push(SampleTree::new(name));
                self.by_name.insert(name.to_string(), self.trees.len() - 1);
                self.trees.len() - 1
            }
        };
        &mut self.trees[i]
    }

    /// Sort trees by name and rebuild the name index.
    ///
    /// Invalidates previously taken [`StageKey`]s.
    pub fn finish(&mut self) {
        self.trees.sort_by(|a, b| a.name.cmp(&b.name));
        self.by_name = self
            .trees
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
    }

    /// Every stage position, in tree/node/stage order.
    pub fn stage_keys(&self) -> Vec<StageKey> {
        let mut keys = Vec::new();
        for (ti, t) in self.trees.iter().enumerate() {
            for (ni, n) in t.nodes.iter().enumerate() {
                keys.extend((0..n.stages.len()).map(|si| StageKey {
                    tree: ti,
                    node: ni,
                    stage: si,
                }));
            }
        }
        keys
    }

    pub fn stage(&self, key: StageKey) -> Option<&StageSample> {
        self.trees
            .get(key.tree)?
            .nodes
            .get(key.node)?
            .stages
            .get(key.stage)
    }

    pub fn stage_mut(&mut self, key: StageKey) -> Option<&mut StageSample> {
        self.trees
            .get_mut(key.tree)?
            .nodes
            .get_mut(key.node)?
            .stages
            .get_mut(key.stage)
    }

    /// Every stage sample, mutably.
    pub fn stages_mut(&mut self) -> impl Iterator<Item = &mut StageSample> {
        self.trees
            .iter_mut()
            .flat_map(|t| t.nodes.iter_mut())
            .flat_map(|n| n.stages.iter_mut())
    }

    /// Total number of stage samples.
    pub fn stage_count(&self) -> usize {
        self.trees
            .iter()
            .flat_map(|t| t.nodes.iter())
            .map(|n| n.stages.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dist_kind_tags() {
        assert_eq!(DistKind::from_tag("freq"), Some(DistKind::Freq));
        assert_eq!(DistKind::from_tag("Log-Like"), Some(DistKind::LogLike));
        assert_eq!(DistKind::from_tag("kde"), Some(DistKind::Kde));
        assert_eq!(DistKind::from_tag("LIKE"), Some(DistKind::Like));
        assert_eq!(DistKind::from_tag("pdf"), None);
        assert_eq!(DistKind::LogLike.tag(), "log-like");
    }

    #[test]
    fn test_distribution_accumulates() {
        let mut d = StageDistribution::new(DistKind::Freq);
        d.add(3, 1.0);
        d.add(3, 1.0);
        d.add(1, 2.0);
        assert_eq!(d.total(), 4.0);
        assert_eq!(d.get(3), Some(2.0));
        assert_eq!(d.get(9), None);
        assert_eq!(d.sorted(), vec![(1, 2.0), (3, 2.0)]);
        assert_eq!(d.max(), Some(2.0));
    }

    #[test]
    fn test_branch_record_endpoints() {
        let mut b = BranchRecord::new(5, 10, 11, 0.1);
        b.update(9, 7, 10, 0.2);
        b.update(2, 11, 12, 0.3);
        assert_eq!((b.start_age, b.start), (9, 7));
        assert_eq!((b.end_age, b.end), (2, 12));
        assert!((b.distance - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_arena_ordering() {
        let mut idx = SampleIndex::new();
        {
            let t = idx.tree_or_insert("zeta");
            t.node_or_insert(4).stage_or_insert(10, DistKind::Freq);
        }
        {
            let t = idx.tree_or_insert("alpha");
            let n = t.node_or_insert(2);
            n.stage_or_insert(5, DistKind::Freq);
            n.stage_or_insert(20, DistKind::Freq);
            n.stage_or_insert(10, DistKind::Freq).dist.add(1, 1.0);
            t.node_or_insert(1);
        }
        idx.finish();

        let names: Vec<&str> = idx.trees().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);

        let alpha = idx.tree("alpha").unwrap();
        let ids: Vec<NodeId> = alpha.nodes().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2]);
        let ages: Vec<Years> = alpha.node(2).unwrap().stages().iter().map(|s| s.age).collect();
        assert_eq!(ages, vec![20, 10, 5]);

        let keys = idx.stage_keys();
        assert_eq!(keys.len(), idx.stage_count());
        assert_eq!(keys.len(), 4);
        let k = StageKey {
            tree: 0,
            node: 1,
            stage: 1,
        };
        assert_eq!(idx.stage(k).unwrap().dist.get(1), Some(1.0));
        assert!(idx.stage(StageKey { tree: 5, node: 0, stage: 0 }).is_none());
    }
}
