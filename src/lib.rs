pub mod aggregate;
pub mod constants;
pub mod emit;
pub mod geometry;
pub mod kde;
pub mod null_model;
pub mod params;
pub mod progress;
pub mod rotation;
pub mod sample;
pub mod speed;
pub mod stages;
pub mod stats;
pub mod stochmap_errors;
pub mod topology;
mod tsv;
