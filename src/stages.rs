//! # Time stages and plate motion
//!
//! The simulation, the landscape, and the plate-motion model are all defined on a discrete set
//! of **time stages**. This module provides:
//!
//! * [`StageTable`] – the ordered stage ages, with nearest-stage snapping and the time interval
//!   covered by each stage,
//! * [`PlateMotion`] – the narrow interface used by the Rotator to move pixels between the
//!   present-day frame and a stage frame,
//! * [`RotationModel`] – an in-memory plate-motion model, loadable from a TSV table.
//!
//! ## Stage snapping
//! -----------------
//! An arbitrary age snaps to the **nearest not-younger stage**: the youngest stage whose age is
//! greater than or equal to the given age. Ages older than the oldest stage snap to the oldest
//! stage. Consequently stage `s` covers the interval `(previous younger stage, s]`, and the
//! oldest stage extends without bound into the past.
//!
//! ## Rotation table format
//! -----------------
//! ```text
//! age         equator  pixel  stage-pixel
//! 100000000   360      1234   1500
//! 100000000   360      1234   1501
//! ```
//! Each row states that the present-day `pixel` was located at `stage-pixel` at `age`. A pixel
//! may have several stage pixels (plate splitting), and several present-day pixels may share the
//! same stage pixel.
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};

use camino::Utf8Path;
use smallvec::SmallVec;
use tracing::info;

use crate::constants::{FastHashMap, PixelId, Years};
use crate::geometry::Pixelation;
use crate::stochmap_errors::StochMapError;
use crate::tsv::{row_number, tsv_reader, HeaderIndex};

/// Ordered set of stage ages (years).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageTable {
    ages: Vec<Years>,
}

impl StageTable {
    pub fn new<I: IntoIterator<Item = Years>>(ages: I) -> Self {
        let mut ages: Vec<Years> = ages.into_iter().collect();
        ages.sort_unstable();
        ages.dedup();
        StageTable { ages }
    }

    /// Stage ages, youngest first.
    pub fn ages(&self) -> &[Years] {
        &self.ages
    }

    pub fn len(&self) -> usize {
        self.ages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ages.is_empty()
    }

    /// Nearest not-younger stage of `age`.
    ///
    /// An empty table returns `age` unchanged.
    pub fn closest_stage_age(&self, age: Years) -> Years {
        let i = self.ages.partition_point(|&s| s < age);
        match self.ages.get(i) {
            Some(&s) => s,
            None => self.ages.last().copied().unwrap_or(age),
        }
    }

    /// Time interval covered by a stage: `(lower, upper]`, `None` meaning unbounded.
    pub fn interval(&self, stage: Years) -> (Option<Years>, Option<Years>) {
        let i = self.ages.partition_point(|&s| s < stage);
        let lower = if i == 0 { None } else { Some(self.ages[i - 1]) };
        let upper = if i + 1 >= self.ages.len() {
            None
        } else {
            Some(stage)
        };
        (lower, upper)
    }

    /// Length of the intersection between the stage interval and `[young, old]`.
    pub fn overlap(&self, stage: Years, young: Years, old: Years) -> Years {
        let (lower, upper) = self.interval(stage);
        let lo = lower.map_or(young, |l| l.max(young));
        let hi = upper.map_or(old, |u| u.min(old));
        (hi - lo).max(0)
    }
}

/// Pixel remapping between the present-day frame and stage frames.
pub trait PlateMotion: Send + Sync {
    /// Stage used for an arbitrary age.
    fn closest_stage_age(&self, age: Years) -> Years;

    /// Stage pixels occupied at `stage` by a present-day pixel.
    fn stage_pixels(&self, stage: Years, present: PixelId) -> Option<&[PixelId]>;

    /// Present-day pixels that were located at a stage pixel.
    fn present_pixels(&self, stage: Years, pixel: PixelId) -> Option<&[PixelId]>;
}

type PixelSet = SmallVec<[PixelId; 4]>;

#[derive(Debug, Clone, Default)]
struct StageMap {
    forward: FastHashMap<PixelId, PixelSet>,
    backward: FastHashMap<PixelId, PixelSet>,
}

/// In-memory plate-motion model.
#[derive(Debug, Clone)]
pub struct RotationModel {
    equator: usize,
    stages: StageTable,
    maps: BTreeMap<Years, StageMap>,
}

impl RotationModel {
    pub fn new(equator: usize) -> Self {
        RotationModel {
            equator,
            stages: StageTable::default(),
            maps: BTreeMap::new(),
        }
    }

    pub fn equator(&self) -> usize {
        self.equator
    }

    pub fn stages(&self) -> &StageTable {
        &self.stages
    }

    /// Record that `present` was located at `stage_pixel` at `age`.
    pub fn add(&mut self, age: Years, present: PixelId, stage_pixel: PixelId) {
        self.insert(age, present, stage_pixel);
        if self.stages.ages.binary_search(&age).is_err() {
            self.stages = StageTable::new(self.maps.keys().copied());
        }
    }

    fn insert(&mut self, age: Years, present: PixelId, stage_pixel: PixelId) {
        let map = self.maps.entry(age).or_default();
        let fwd = map.forward.entry(present).or_default();
        if !fwd.contains(&stage_pixel) {
            fwd.push(stage_pixel);
        }
        let bwd = map.backward.entry(stage_pixel).or_default();
        if !bwd.contains(&present) {
            bwd.push(present);
        }
    }

    /// Read a rotation table.
    ///
    /// Arguments
    /// -----------------
    /// * `r` – TSV source with fields `age`, `equator`, `pixel`, `stage-pixel`.
    /// * `source_name` – Name used in error messages.
    /// * `pix` – Pixelation the pixel ids refer to.
    ///
    /// Return
    /// ----------
    /// * The model, or a structural error (missing field, unparseable cell, pixel out of range,
    ///   equator mismatch).
    pub fn from_reader<R: Read, P: Pixelation + ?Sized>(
        r: R,
        source_name: &str,
        pix: &P,
    ) -> Result<Self, StochMapError> {
        let mut rdr = tsv_reader(r);
        let head = HeaderIndex::new(&mut rdr, source_name)?;
        let age_col = head.require("age")?;
        let eq_col = head.require("equator")?;
        let px_col = head.require("pixel")?;
        let st_col = head.require("stage-pixel")?;

        let mut model = RotationModel::new(pix.equator());
        let mut rec = csv::StringRecord::new();
        while rdr.read_record(&mut rec)? {
            let eq: usize = head.parse(&rec, eq_col, "equator")?;
            if eq != pix.equator() {
                return Err(StochMapError::EquatorMismatch {
                    source_name: source_name.to_string(),
                    row: row_number(&rec),
                    found: eq,
                    expected: pix.equator(),
                });
            }
            let age: Years = head.parse(&rec, age_col, "age")?;
            let present = parse_pixel(&head, &rec, px_col, "pixel", pix)?;
            let stage_pixel = parse_pixel(&head, &rec, st_col, "stage-pixel", pix)?;

            model.insert(age, present, stage_pixel);
        }
        model.stages = StageTable::new(model.maps.keys().copied());

        info!(
            source = source_name,
            stages = model.stages.len(),
            "rotation model loaded"
        );
        Ok(model)
    }

    pub fn from_file<P: Pixelation + ?Sized>(
        path: &Utf8Path,
        pix: &P,
    ) -> Result<Self, StochMapError> {
        let f = File::open(path)?;
        Self::from_reader(BufReader::new(f), path.as_str(), pix)
    }
}

impl PlateMotion for RotationModel {
    fn closest_stage_age(&self, age: Years) -> Years {
        self.stages.closest_stage_age(age)
    }

    fn stage_pixels(&self, stage: Years, present: PixelId) -> Option<&[PixelId]> {
        self.maps
            .get(&stage)
            .and_then(|m| m.forward.get(&present))
            .map(|s| s.as_slice())
    }

    fn present_pixels(&self, stage: Years, pixel: PixelId) -> Option<&[PixelId]> {
        self.maps
            .get(&stage)
            .and_then(|m| m.backward.get(&pixel))
            .map(|s| s.as_slice())
    }
}

/// Parse a pixel id and check it against the pixelation size.
pub(crate) fn parse_pixel<P: Pixelation + ?Sized>(
    head: &HeaderIndex,
    rec: &csv::StringRecord,
    col: usize,
    field: &str,
    pix: &P,
) -> Result<PixelId, StochMapError> {
    let px: PixelId = head.parse(rec, col, field)?;
    if px as usize >= pix.len() {
        return Err(StochMapError::PixelOutOfRange {
            source_name: head.source_name().to_string(),
            row: row_number(rec),
            pixel: px,
            size: pix.len(),
        });
    }
    Ok(px)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::pixelation::IsoPixelation;

    #[test]
    fn test_closest_stage_age() {
        let st = StageTable::new([10_000_000, 0, 5_000_000, 5_000_000]);
        assert_eq!(st.ages(), &[0, 5_000_000, 10_000_000]);
        assert_eq!(st.closest_stage_age(0), 0);
        assert_eq!(st.closest_stage_age(1), 5_000_000);
        assert_eq!(st.closest_stage_age(5_000_000), 5_000_000);
        assert_eq!(st.closest_stage_age(7_000_000), 10_000_000);
        assert_eq!(st.closest_stage_age(50_000_000), 10_000_000);
        assert_eq!(StageTable::default().closest_stage_age(42), 42);
    }

    #[test]
    fn test_overlap() {
        let st = StageTable::new([0, 5, 10]);
        // stage 5 covers (0, 5]
        assert_eq!(st.overlap(5, 0, 10), 5);
        assert_eq!(st.overlap(5, 3, 10), 2);
        // stage 10 is the oldest: (5, ∞)
        assert_eq!(st.overlap(10, 0, 30), 25);
        assert_eq!(st.overlap(10, 0, 4), 0);
        // stage 0 has no width
        assert_eq!(st.overlap(0, 0, 10), 0);
    }

    #[test]
    fn test_rotation_model_reader() {
        let pix = IsoPixelation::new(36).unwrap();
        let data = "# test model\r\n\
            Age\tEquator\tPixel\tStage-Pixel\r\n\
            5000000\t36\t10\t12\r\n\
            5000000\t36\t10\t13\r\n\
            5000000\t36\t11\t13\r\n\
            10000000\t36\t10\t20\r\n";
        let model = RotationModel::from_reader(data.as_bytes(), "rot.tab", &pix).unwrap();
        assert_eq!(model.stages().ages(), &[5_000_000, 10_000_000]);
        assert_eq!(model.stage_pixels(5_000_000, 10), Some(&[12, 13][..]));
        assert_eq!(model.present_pixels(5_000_000, 13), Some(&[10, 11][..]));
        assert_eq!(model.stage_pixels(10_000_000, 11), None);
        assert_eq!(model.closest_stage_age(6_000_000), 10_000_000);
    }

    #[test]
    fn test_rotation_model_errors() {
        let pix = IsoPixelation::new(36).unwrap();

        let bad_eq = "age\tequator\tpixel\tstage-pixel\n5\t360\t1\t1\n";
        assert!(matches!(
            RotationModel::from_reader(bad_eq.as_bytes(), "rot", &pix),
            Err(StochMapError::EquatorMismatch {
                found: 360,
                expected: 36,
                ..
            })
        ));

        let out = format!("age\tequator\tpixel\tstage-pixel\n5\t36\t{}\t1\n", pix.len());
        assert!(matches!(
            RotationModel::from_reader(out.as_bytes(), "rot", &pix),
            Err(StochMapError::PixelOutOfRange { .. })
        ));

        let missing = "age\tequator\tpixel\n5\t36\t1\n";
        assert_eq!(
            RotationModel::from_reader(missing.as_bytes(), "rot", &pix).unwrap_err(),
            StochMapError::MissingField {
                source_name: "rot".into(),
                field: "stage-pixel".into()
            }
        );
    }

    #[test]
    fn test_add() {
        let mut model = RotationModel::new(36);
        model.add(3, 1, 2);
        model.add(3, 1, 2);
        model.add(7, 1, 4);
        assert_eq!(model.stages().ages(), &[3, 7]);
        assert_eq!(model.stage_pixels(3, 1), Some(&[2][..]));
        assert_eq!(model.present_pixels(7, 4), Some(&[1][..]));
    }
}
