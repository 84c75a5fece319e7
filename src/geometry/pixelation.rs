//! Equal-area ring pixelation.
//!
//! The sphere is cut into `equator / 2 + 1` rings of constant latitude, separated by
//! `360 / equator` degrees, from the north pole (ring 0) to the south pole. A ring at latitude
//! φ holds `round(equator · cos φ)` pixels (at least one, so each pole is a single pixel).
//! Pixel ids run from the north pole southward, and from west (-180°) to east inside a ring.
use nalgebra::Vector3;

use super::{GeoPoint, Pixelation};
use crate::constants::{Degree, PixelId};
use crate::stochmap_errors::StochMapError;

#[derive(Debug, Clone)]
pub struct IsoPixelation {
    equator: usize,
    step: Degree,
    /// First pixel id of each ring, plus a final sentinel equal to the pixel count.
    ring_start: Vec<usize>,
    centers: Vec<Vector3<f64>>,
}

impl IsoPixelation {
    /// Build a pixelation with `equator` pixels on the equator.
    ///
    /// Return
    /// ----------
    /// * `Err(StochMapError::InvalidPixelation)` if `equator` is odd or smaller than 4.
    pub fn new(equator: usize) -> Result<Self, StochMapError> {
        if equator < 4 || equator % 2 != 0 {
            return Err(StochMapError::InvalidPixelation(equator));
        }

        let rings = equator / 2 + 1;
        let step = 360.0 / equator as f64;

        let mut ring_start = Vec::with_capacity(rings + 1);
        let mut centers = Vec::new();
        for r in 0..rings {
            ring_start.push(centers.len());
            let lat = 90.0 - r as f64 * step;
            let n = ring_size(equator, lat);
            for j in 0..n {
                let lon = pixel_lon(n, j);
                centers.push(GeoPoint::new(lat, lon).to_vector());
            }
        }
        ring_start.push(centers.len());

        Ok(IsoPixelation {
            equator,
            step,
            ring_start,
            centers,
        })
    }

    /// Number of rings (both poles included).
    pub fn rings(&self) -> usize {
        self.ring_start.len() - 1
    }

    /// Ring that holds the pixel.
    fn ring_of(&self, id: PixelId) -> usize {
        self.ring_start.partition_point(|&s| s <= id as usize) - 1
    }

    /// Geographic center of the pixel.
    pub fn point(&self, id: PixelId) -> GeoPoint {
        let r = self.ring_of(id);
        let n = self.ring_start[r + 1] - self.ring_start[r];
        let j = id as usize - self.ring_start[r];
        GeoPoint::new(90.0 - r as f64 * self.step, pixel_lon(n, j))
    }

    /// Pixel that contains a geographic point.
    pub fn pixel_from_point(&self, p: GeoPoint) -> PixelId {
        let r = (((90.0 - p.lat) / self.step).round() as isize).clamp(0, self.rings() as isize - 1)
            as usize;
        let n = self.ring_start[r + 1] - self.ring_start[r];
        let width = 360.0 / n as f64;
        let lon = (p.lon + 180.0).rem_euclid(360.0);
        let j = ((lon / width).floor() as usize).min(n - 1);
        (self.ring_start[r] + j) as PixelId
    }
}

impl Pixelation for IsoPixelation {
    fn len(&self) -> usize {
        self.centers.len()
    }

    fn equator(&self) -> usize {
        self.equator
    }

    fn vector(&self, id: PixelId) -> Vector3<f64> {
        self.centers[id as usize]
    }

    fn pixel_at(&self, v: &Vector3<f64>) -> PixelId {
        self.pixel_from_point(GeoPoint::from_vector(v))
    }
}

fn ring_size(equator: usize, lat: Degree) -> usize {
    ((equator as f64 * lat.to_radians().cos()).round() as usize).max(1)
}

fn pixel_lon(n: usize, j: usize) -> Degree {
    if n == 1 {
        return 0.0;
    }
    -180.0 + (j as f64 + 0.5) * 360.0 / n as f64
}
