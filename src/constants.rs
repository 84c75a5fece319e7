//! # Constants and type definitions for stochmap
//!
//! This module centralizes the **physical constants**, **unit conversions**, and **common type
//! aliases** shared by every stage of the reconstruction pipeline.
//!
//! ## Overview
//!
//! - Earth radius and time-unit conversions (years ↔ million years)
//! - Sparsity threshold used when emitting distributions
//! - Identifier aliases (trees, nodes, particles, pixels)
//! - The fast hash map alias used by the sparse index

use std::collections::HashMap;

use ahash::RandomState;

// -------------------------------------------------------------------------------------------------
// Physical constants and unit conversions
// -------------------------------------------------------------------------------------------------

/// 2π, useful for trigonometric conversions
pub const DPI: f64 = 2. * std::f64::consts::PI;

/// Mean Earth radius in kilometers (IUGG)
pub const EARTH_RADIUS_KM: Kilometer = 6_371.0088;

/// Number of years in a million years
pub const YEARS_PER_MY: f64 = 1_000_000.0;

/// Values at or below this threshold are treated as zero when emitting tables
pub const ZERO_THRESHOLD: f64 = 1e-15;

/// Age of the present-day reference frame
pub const PRESENT: Years = 0;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Angle in radians
pub type Radian = f64;
/// Distance in kilometers
pub type Kilometer = f64;
/// Age in whole years before present
pub type Years = i64;
/// Duration or age in millions of years
pub type MillionYears = f64;

/// Identifier of a pixel in a [`Pixelation`](crate::geometry::Pixelation)
pub type PixelId = u32;
/// Tree-local node identifier
pub type NodeId = u32;
/// Identifier of a stochastic-mapping particle
pub type ParticleId = u32;

/// `HashMap` using the `ahash` hasher, used by every sparse map of the crate.
pub type FastHashMap<K, V> = HashMap<K, V, RandomState>;

/// Convert an age in years into millions of years.
#[inline]
pub fn years_to_my(years: Years) -> MillionYears {
    years as f64 / YEARS_PER_MY
}

/// Normalize a tree name: trim, collapse internal whitespace, lowercase.
///
/// Every lookup keyed by tree name goes through this function, so
/// `"  Tree  One "` and `"tree one"` address the same tree.
pub fn normalize_tree_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_tree_name() {
        assert_eq!(normalize_tree_name("  Tree   One\t"), "tree one");
        assert_eq!(normalize_tree_name("VERTEBRATES"), "vertebrates");
        assert_eq!(normalize_tree_name("   "), "");
    }

    #[test]
    fn test_years_to_my() {
        assert_eq!(years_to_my(10_000_000), 10.0);
        assert_eq!(years_to_my(0), 0.0);
    }
}
