//! # Spherical geometry primitives
//!
//! The reconstruction engine never works with raw coordinates: every location is a **pixel** of
//! an immutable [`Pixelation`] of the unit sphere. This module defines that narrow interface and
//! the few vector helpers shared by its implementations.
//!
//! ## Components
//! -----------------
//! * [`Pixelation`] – Read-only pixel ↔ position mapping and great-circle distance.
//! * [`pixelation::IsoPixelation`] – Equal-area ring pixelation parameterized by the number of
//!   pixels on the equator.
//! * [`spherical_normal::SphericalNormal`] – Isotropic spherical normal kernel used both as the
//!   KDE kernel and as the null-model step distribution.
//!
//! ## Conventions
//! -----------------
//! * Positions are **unit vectors** (`nalgebra::Vector3<f64>`), latitude/longitude in degrees only
//!   at the API boundary ([`GeoPoint`]).
//! * Distances are **radians** on the unit sphere; multiply by a radius to obtain lengths.
pub mod pixelation;
pub mod spherical_normal;

use nalgebra::Vector3;

use crate::constants::{Degree, PixelId, Radian};

/// Geographic point in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: Degree,
    pub lon: Degree,
}

impl GeoPoint {
    pub fn new(lat: Degree, lon: Degree) -> Self {
        GeoPoint { lat, lon }
    }

    /// Unit vector of the point (x toward lon 0 on the equator, z toward the north pole).
    pub fn to_vector(self) -> Vector3<f64> {
        let (lat, lon) = (self.lat.to_radians(), self.lon.to_radians());
        Vector3::new(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin())
    }

    pub fn from_vector(v: &Vector3<f64>) -> Self {
        let v = v.normalize();
        GeoPoint {
            lat: v.z.clamp(-1.0, 1.0).asin().to_degrees(),
            lon: v.y.atan2(v.x).to_degrees(),
        }
    }
}

/// Discretization of the sphere into pixels, indexed `0..len()`.
///
/// Implementations must be immutable once built: the KDE worker pool shares a single
/// instance across threads.
pub trait Pixelation: Send + Sync {
    /// Number of pixels.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of pixels on the equator, the parameter that identifies a pixelation in tables.
    fn equator(&self) -> usize;

    /// Unit vector of the pixel center.
    fn vector(&self, id: PixelId) -> Vector3<f64>;

    /// Pixel that contains the given (not necessarily normalized) direction.
    fn pixel_at(&self, v: &Vector3<f64>) -> PixelId;

    /// Great-circle distance between two pixel centers.
    fn distance(&self, a: PixelId, b: PixelId) -> Radian {
        great_circle(&self.vector(a), &self.vector(b))
    }
}

/// Great-circle angle between two unit vectors.
///
/// Uses `atan2(|a×b|, a·b)`, which stays accurate for both tiny and near-antipodal angles.
#[inline]
pub fn great_circle(a: &Vector3<f64>, b: &Vector3<f64>) -> Radian {
    let s = a.cross(b).norm();
    let c = a.dot(b).clamp(-1.0, 1.0);
    s.atan2(c).abs()
}

/// Local tangent basis at unit position `u`: (east, north).
#[inline]
pub fn local_basis(u: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let mut e = Vector3::z().cross(u);
    if e.norm() < 1e-12 {
        e = Vector3::y().cross(u);
    }
    let east = e.normalize();
    let north = u.cross(&east).normalize();
    (east, north)
}

/// Point reached from `u` after travelling `theta` radians along azimuth `phi`.
#[inline]
pub fn destination(u: &Vector3<f64>, theta: Radian, phi: Radian) -> Vector3<f64> {
    let (east, north) = local_basis(u);
    let dir = east * phi.cos() + north * phi.sin();
    (u * theta.cos() + dir * theta.sin()).normalize()
}
