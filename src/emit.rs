//! # Result Emitter
//!
//! Writes distributions and speed statistics as tab-separated tables, with optional `#` comment
//! lines before the header and CRLF line endings.
//!
//! | Table | Columns |
//! |---|---|
//! | distributions | `tree node age type pixel value equator` |
//! | category distributions | `tree node age cat trait type pixel value` |
//! | branch speed | `tree node distance d-025 d-975 brLen x-005 x-095 slower faster speed geo g-025 g-975` |
//! | time-slice speed | `tree age distance d-025 d-975 brLen speed` |
//!
//! Row order does not depend on how the data was produced: trees by name, nodes by id, stages
//! and slices from oldest to youngest, pixels by id. Distribution values at or below
//! [`ZERO_THRESHOLD`] are omitted, except raw log-likelihoods which are all written. Ages of distributions are written in years, so the table can be
//! read back; report ages are in million years. Report lengths are in kilometres and speeds in
//! km/My, using [`ReconParams::earth_radius_km`].
use std::fs::File;
use std::io::{BufWriter, Write};

use camino::Utf8Path;
use itertools::Itertools;
use tracing::info;

use crate::constants::{years_to_my, ZERO_THRESHOLD};
use crate::geometry::Pixelation;
use crate::params::ReconParams;
use crate::sample::{DistKind, SampleIndex, StageDistribution};
use crate::speed::{BranchStats, TimeSliceStats};
use crate::stochmap_errors::StochMapError;
use crate::tsv::{tsv_writer, write_comments};

fn format_value(kind: DistKind, v: f64) -> String {
    match kind {
        DistKind::Freq => format!("{v:.6}"),
        DistKind::LogLike | DistKind::Like | DistKind::Kde => format!("{v:.15}"),
    }
}

/// `(pixel, value)` pairs to write, by pixel: every log-likelihood, non-negligible other values.
fn kept_values(dist: &StageDistribution) -> impl Iterator<Item = (u32, f64)> + '_ {
    let raw = dist.kind() == DistKind::LogLike;
    dist.values()
        .iter()
        .filter(move |&(_, &v)| raw || v > ZERO_THRESHOLD)
        .map(|(&p, &v)| (p, v))
        .sorted_by_key(|&(p, _)| p)
}

/// Write every stage distribution of the index.
///
/// Arguments
/// -----------------
/// * `w` – Destination.
/// * `index` – Finished sample index.
/// * `pix` – Pixelation of the index, whose `equator` is written on every row.
/// * `comments` – Lines written as `# ...` before the header.
///
/// Return
/// ----------
/// * The number of data rows written.
pub fn write_distributions<W: Write, P: Pixelation + ?Sized>(
    mut w: W,
    index: &SampleIndex,
    pix: &P,
    comments: &[&str],
) -> Result<usize, StochMapError> {
    write_comments(&mut w, comments)?;
    let mut wtr = tsv_writer(w);
    wtr.write_record(["tree", "node", "age", "type", "pixel", "value", "equator"])?;
    let equator = pix.equator().to_string();

    let mut rows = 0;
    for tree in index.trees().iter().sorted_by(|a, b| a.name.cmp(&b.name)) {
        for node in tree.nodes() {
            for stage in node.stages() {
                let kind = stage.dist.kind();
                for (px, v) in kept_values(&stage.dist) {
                    wtr.write_record([
                        tree.name.clone(),
                        node.id.to_string(),
                        stage.age.to_string(),
                        kind.tag().to_string(),
                        px.to_string(),
                        format_value(kind, v),
                        equator.clone(),
                    ])?;
                    rows += 1;
                }
            }
        }
    }
    wtr.flush()?;
    Ok(rows)
}

/// Write the per-category distributions of the index.
pub fn write_category_distributions<W: Write>(
    mut w: W,
    index: &SampleIndex,
    comments: &[&str],
) -> Result<usize, StochMapError> {
    write_comments(&mut w, comments)?;
    let mut wtr = tsv_writer(w);
    wtr.write_record(["tree", "node", "age", "cat", "trait", "type", "pixel", "value"])?;

    let mut rows = 0;
    for tree in index.trees().iter().sorted_by(|a, b| a.name.cmp(&b.name)) {
        for node in tree.nodes() {
            for stage in node.stages() {
                for (key, dist) in &stage.categories {
                    let kind = dist.kind();
                    for (px, v) in kept_values(dist) {
                        wtr.write_record([
                            tree.name.clone(),
                            node.id.to_string(),
                            stage.age.to_string(),
                            key.category.to_string(),
                            key.trait_state.clone(),
                            kind.tag().to_string(),
                            px.to_string(),
                            format_value(kind, v),
                        ])?;
                        rows += 1;
                    }
                }
            }
        }
    }
    wtr.flush()?;
    Ok(rows)
}

/// Write the distributions of the index to a file.
pub fn write_distributions_file<P: Pixelation + ?Sized>(
    path: &Utf8Path,
    index: &SampleIndex,
    pix: &P,
    comments: &[&str],
) -> Result<usize, StochMapError> {
    let rows = write_distributions(BufWriter::new(File::create(path)?), index, pix, comments)?;
    info!(path = path.as_str(), rows, "distributions written");
    Ok(rows)
}

/// Write the branch speed report.
///
/// Fractions and null bounds are `NaN` when no null model was run.
pub fn write_branch_speed<W: Write>(
    mut w: W,
    stats: &[BranchStats],
    params: &ReconParams,
    comments: &[&str],
) -> Result<usize, StochMapError> {
    let km = params.earth_radius_km;
    write_comments(&mut w, comments)?;
    let mut wtr = tsv_writer(w);
    wtr.write_record([
        "tree", "node", "distance", "d-025", "d-975", "brLen", "x-005", "x-095", "slower",
        "faster", "speed", "geo", "g-025", "g-975",
    ])?;

    let sorted = stats
        .iter()
        .sorted_by(|a, b| a.tree.cmp(&b.tree).then(a.node.cmp(&b.node)));
    let mut rows = 0;
    for b in sorted {
        let d = b.distance.scaled(km);
        let g = b.geographic.scaled(km);
        let (x005, x095) = b.null.map_or((f64::NAN, f64::NAN), |e| (e.x005 * km, e.x095 * km));
        wtr.write_record([
            b.tree.clone(),
            b.node.to_string(),
            format!("{:.6}", d.median),
            format!("{:.6}", d.q025),
            format!("{:.6}", d.q975),
            format!("{:.6}", b.branch_length),
            format!("{x005:.6}"),
            format!("{x095:.6}"),
            format!("{:.6}", b.slower),
            format!("{:.6}", b.faster),
            format!("{:.6}", b.speed * km),
            format!("{:.6}", g.median),
            format!("{:.6}", g.q025),
            format!("{:.6}", g.q975),
        ])?;
        rows += 1;
    }
    wtr.flush()?;
    Ok(rows)
}

/// Write the time-slice speed report.
pub fn write_time_slice_speed<W: Write>(
    mut w: W,
    stats: &[TimeSliceStats],
    params: &ReconParams,
    comments: &[&str],
) -> Result<usize, StochMapError> {
    let km = params.earth_radius_km;
    write_comments(&mut w, comments)?;
    let mut wtr = tsv_writer(w);
    wtr.write_record(["tree", "age", "distance", "d-025", "d-975", "brLen", "speed"])?;

    let sorted = stats
        .iter()
        .sorted_by(|a, b| a.tree.cmp(&b.tree).then(b.stage.cmp(&a.stage)));
    let mut rows = 0;
    for s in sorted {
        let d = s.distance.scaled(km);
        wtr.write_record([
            s.tree.clone(),
            format!("{:.3}", years_to_my(s.stage)),
            format!("{:.6}", d.median),
            format!("{:.6}", d.q025),
            format!("{:.6}", d.q975),
            format!("{:.6}", s.branch_length),
            format!("{:.6}", s.speed * km),
        ])?;
        rows += 1;
    }
    wtr.flush()?;
    Ok(rows)
}
