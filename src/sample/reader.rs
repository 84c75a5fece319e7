//! Parsing of sample tables into a [`SampleIndex`].
//!
//! Two producer tables are supported:
//!
//! * **stochastic mapping** – `tree, node, particle, age, equator, from, to [, cat, lambda, trait]`.
//!   Each row is one segment of a particle history: starting at `age`, the particle moved from
//!   pixel `from` to pixel `to`. `to` is counted in the stage distribution at `age`, the move
//!   distance is added to the particle's stage move and [`BranchRecord`].
//! * **frequency / density** – `tree, node, age, type, pixel, value [, equator]`, with `type`
//!   one of `freq`, `log-like`, `like`, `kde`.
//!
//! Rows with an empty tree name are skipped. When a [`TreeLookup`] is given, rows whose tree or
//! node is unknown to it are skipped too. Every other problem is fatal.
use std::fs::File;
use std::io::{BufReader, Read};

use camino::Utf8Path;
use tracing::{debug, info};

use super::{BranchRecord, CategoryKey, DistKind, SampleIndex};
use crate::constants::{normalize_tree_name, NodeId, ParticleId, Years};
use crate::geometry::Pixelation;
use crate::stages::parse_pixel;
use crate::stochmap_errors::StochMapError;
use crate::topology::TreeLookup;
use crate::tsv::{row_number, tsv_reader, HeaderIndex};

/// Rows skipped while reading, by reason.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Skipped {
    empty_tree: u64,
    unknown_tree: u64,
    unknown_node: u64,
}

impl Skipped {
    /// `true` if the row must be kept.
    fn keep(&mut self, trees: Option<&dyn TreeLookup>, name: &str, node: NodeId) -> bool {
        if name.is_empty() {
            self.empty_tree += 1;
            return false;
        }
        let Some(trees) = trees else {
            return true;
        };
        if !trees.has_tree(name) {
            self.unknown_tree += 1;
            return false;
        }
        if !trees.has_node(name, node) {
            self.unknown_node += 1;
            return false;
        }
        true
    }

    fn log(&self, source_name: &str) {
        if self.empty_tree > 0 {
            debug!(source = source_name, rows = self.empty_tree, "rows without tree name skipped");
        }
        if self.unknown_tree > 0 {
            debug!(source = source_name, rows = self.unknown_tree, "rows of unknown trees skipped");
        }
        if self.unknown_node > 0 {
            debug!(source = source_name, rows = self.unknown_node, "rows of unknown nodes skipped");
        }
    }

    fn total(&self) -> u64 {
        self.empty_tree + self.unknown_tree + self.unknown_node
    }
}

fn check_equator<P: Pixelation + ?Sized>(
    head: &HeaderIndex,
    rec: &csv::StringRecord,
    col: usize,
    pix: &P,
) -> Result<(), StochMapError> {
    let eq: usize = head.parse(rec, col, "equator")?;
    if eq != pix.equator() {
        return Err(StochMapError::EquatorMismatch {
            source_name: head.source_name().to_string(),
            row: row_number(rec),
            found: eq,
            expected: pix.equator(),
        });
    }
    Ok(())
}

/// Read a stochastic-mapping table.
///
/// Arguments
/// -----------------
/// * `r` – TSV source.
/// * `source_name` – Name used in errors and logs.
/// * `pix` – Pixelation of the sample; `equator` must match and pixels must be in range.
/// * `trees` – Optional topology used to discard rows of unknown trees or nodes.
///
/// Return
/// ----------
/// * The loaded index (trees sorted by name), or a structural error. A table with no tree left
///   after filtering yields [`StochMapError::EmptySample`].
pub fn read_mapping<R: Read, P: Pixelation + ?Sized>(
    r: R,
    source_name: &str,
    pix: &P,
    trees: Option<&dyn TreeLookup>,
) -> Result<SampleIndex, StochMapError> {
    let mut rdr = tsv_reader(r);
    let head = HeaderIndex::new(&mut rdr, source_name)?;
    let tree_col = head.require("tree")?;
    let node_col = head.require("node")?;
    let particle_col = head.require("particle")?;
    let age_col = head.require("age")?;
    let eq_col = head.require("equator")?;
    let from_col = head.require("from")?;
    let to_col = head.require("to")?;
    let cat_col = head.optional("cat");
    let lambda_col = head.optional("lambda");
    let trait_col = head.optional("trait");

    let mut index = SampleIndex::new();
    let mut skipped = Skipped::default();
    let mut rows = 0u64;
    let mut rec = csv::StringRecord::new();
    while rdr.read_record(&mut rec)? {
        let name = normalize_tree_name(head.cell(&rec, tree_col));
        let node: NodeId = if name.is_empty() {
            0
        } else {
            head.parse(&rec, node_col, "node")?
        };
        if !skipped.keep(trees, &name, node) {
            continue;
        }

        check_equator(&head, &rec, eq_col, pix)?;
        let particle: ParticleId = head.parse(&rec, particle_col, "particle")?;
        let age: Years = head.parse(&rec, age_col, "age")?;
        let from = parse_pixel(&head, &rec, from_col, "from", pix)?;
        let to = parse_pixel(&head, &rec, to_col, "to", pix)?;

        let category = match cat_col {
            Some(c) if !head.cell(&rec, c).is_empty() => {
                let cat: u32 = head.parse(&rec, c, "cat")?;
                let lambda: f64 = match lambda_col {
                    Some(l) => head.parse(&rec, l, "lambda")?,
                    None => f64::NAN,
                };
                Some((cat, lambda))
            }
            _ => None,
        };
        let trait_state = trait_col.map(|c| head.cell(&rec, c).to_string());

        let d = pix.distance(from, to);
        let tree = index.tree_or_insert(&name);
        tree.particles.insert(particle);
        if let Some((cat, lambda)) = category {
            tree.add_category(cat, lambda);
        }

        let sample_node = tree.node_or_insert(node);
        sample_node
            .branch
            .entry(particle)
            .and_modify(|b| b.update(age, from, to, d))
            .or_insert_with(|| BranchRecord::new(age, from, to, d));

        let stage = sample_node.stage_or_insert(age, DistKind::Freq);
        stage.dist.add(to, 1.0);
        *stage.moves.entry(particle).or_insert(0.0) += d;
        if category.is_some() || trait_state.is_some() {
            let key = CategoryKey {
                category: category.map_or(0, |(c, _)| c),
                trait_state: trait_state.unwrap_or_default(),
            };
            stage.categories.entry(key).or_default().add(to, 1.0);
        }
        rows += 1;
    }

    finish(index, source_name, rows, skipped)
}

/// Read a frequency / density table.
///
/// The `type` field tags each row with the [`DistKind`] of its distribution; all rows of a
/// stage must share the same tag. The `equator` field is optional, checked when present.
pub fn read_frequencies<R: Read, P: Pixelation + ?Sized>(
    r: R,
    source_name: &str,
    pix: &P,
    trees: Option<&dyn TreeLookup>,
) -> Result<SampleIndex, StochMapError> {
    let mut rdr = tsv_reader(r);
    let head = HeaderIndex::new(&mut rdr, source_name)?;
    let tree_col = head.require("tree")?;
    let node_col = head.require("node")?;
    let age_col = head.require("age")?;
    let type_col = head.require("type")?;
    let pixel_col = head.require("pixel")?;
    let value_col = head.require("value")?;
    let eq_col = head.optional("equator");

    let mut index = SampleIndex::new();
    let mut skipped = Skipped::default();
    let mut rows = 0u64;
    let mut rec = csv::StringRecord::new();
    while rdr.read_record(&mut rec)? {
        let name = normalize_tree_name(head.cell(&rec, tree_col));
        let node: NodeId = if name.is_empty() {
            0
        } else {
            head.parse(&rec, node_col, "node")?
        };
        if !skipped.keep(trees, &name, node) {
            continue;
        }

        if let Some(c) = eq_col {
            check_equator(&head, &rec, c, pix)?;
        }
        let age: Years = head.parse(&rec, age_col, "age")?;
        let tag = head.cell(&rec, type_col);
        let kind = DistKind::from_tag(tag).ok_or_else(|| StochMapError::UnknownDistributionKind {
            source_name: source_name.to_string(),
            row: row_number(&rec),
            value: tag.to_string(),
        })?;
        let pixel = parse_pixel(&head, &rec, pixel_col, "pixel", pix)?;
        let value: f64 = head.parse(&rec, value_col, "value")?;

        let stage = index
            .tree_or_insert(&name)
            .node_or_insert(node)
            .stage_or_insert(age, kind);
        if stage.dist.kind() != kind {
            return Err(StochMapError::InvalidField {
                source_name: source_name.to_string(),
                row: row_number(&rec),
                field: "type".to_string(),
                value: tag.to_string(),
            });
        }
        stage.dist.add(pixel, value);
        rows += 1;
    }

    finish(index, source_name, rows, skipped)
}

fn finish(
    mut index: SampleIndex,
    source_name: &str,
    rows: u64,
    skipped: Skipped,
) -> Result<SampleIndex, StochMapError> {
    skipped.log(source_name);
    if index.is_empty() {
        return Err(StochMapError::EmptySample {
            source_name: source_name.to_string(),
        });
    }
    index.finish();
    info!(
        source = source_name,
        trees = index.len(),
        nodes = index.trees().iter().map(|t| t.nodes().len()).sum::<usize>(),
        rows,
        skipped = skipped.total(),
        "sample loaded"
    );
    Ok(index)
}

pub fn read_mapping_file<P: Pixelation + ?Sized>(
    path: &Utf8Path,
    pix: &P,
    trees: Option<&dyn TreeLookup>,
) -> Result<SampleIndex, StochMapError> {
    let f = File::open(path)?;
    read_mapping(BufReader::new(f), path.as_str(), pix, trees)
}

pub fn read_frequencies_file<P: Pixelation + ?Sized>(
    path: &Utf8Path,
    pix: &P,
    trees: Option<&dyn TreeLookup>,
) -> Result<SampleIndex, StochMapError> {
    let f = File::open(path)?;
    read_frequencies(BufReader::new(f), path.as_str(), pix, trees)
}
