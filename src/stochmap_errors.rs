use thiserror::Error;

use crate::constants::PixelId;

#[derive(Error, Debug)]
pub enum StochMapError {
    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TSV reading or writing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("{source_name}: expecting field \"{field}\" in the header")]
    MissingField { source_name: String, field: String },

    #[error("{source_name}: on row {row}: field \"{field}\": invalid value \"{value}\"")]
    InvalidField {
        source_name: String,
        row: u64,
        field: String,
        value: String,
    },

    #[error("{source_name}: on row {row}: pixel {pixel} is out of range (pixelation has {size} pixels)")]
    PixelOutOfRange {
        source_name: String,
        row: u64,
        pixel: PixelId,
        size: usize,
    },

    #[error("{source_name}: on row {row}: equator with {found} pixels, want {expected}")]
    EquatorMismatch {
        source_name: String,
        row: u64,
        found: usize,
        expected: usize,
    },

    #[error("{source_name}: no trees left after filtering")]
    EmptySample { source_name: String },

    #[error("{source_name}: on row {row}: unknown distribution type \"{value}\"")]
    UnknownDistributionKind {
        source_name: String,
        row: u64,
        value: String,
    },

    #[error("Invalid pixelation: {0} pixels on the equator (expecting an even value >= 4)")]
    InvalidPixelation(usize),

    #[error("Invalid tree topology: {0}")]
    InvalidTopology(String),

    #[error("Invalid reconstruction parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid category weights for the null model: {0}")]
    InvalidCategoryWeights(String),

    #[error("KDE worker pool disconnected with {0} jobs still pending")]
    KdePoolDisconnected(usize),
}

impl PartialEq for StochMapError {
    fn eq(&self, other: &Self) -> bool {
        use StochMapError::*;
        match (self, other) {
            // Not comparable: same variant is enough
            (IoError(_), IoError(_)) => true,
            (CsvError(_), CsvError(_)) => true,

            (
                MissingField {
                    source_name: a,
                    field: fa,
                },
                MissingField {
                    source_name: b,
                    field: fb,
                },
            ) => a == b && fa == fb,
            (
                InvalidField {
                    source_name: a,
                    row: ra,
                    field: fa,
                    value: va,
                },
                InvalidField {
                    source_name: b,
                    row: rb,
                    field: fb,
                    value: vb,
                },
            ) => a == b && ra == rb && fa == fb && va == vb,
            (
                PixelOutOfRange {
                    source_name: a,
                    row: ra,
                    pixel: pa,
                    size: sa,
                },
                PixelOutOfRange {
                    source_name: b,
                    row: rb,
                    pixel: pb,
                    size: sb,
                },
            ) => a == b && ra == rb && pa == pb && sa == sb,
            (
                EquatorMismatch {
                    source_name: a,
                    row: ra,
                    found: fa,
                    expected: ea,
                },
                EquatorMismatch {
                    source_name: b,
                    row: rb,
                    found: fb,
                    expected: eb,
                },
            ) => a == b && ra == rb && fa == fb && ea == eb,
            (EmptySample { source_name: a }, EmptySample { source_name: b }) => a == b,
            (
                UnknownDistributionKind {
                    source_name: a,
                    row: ra,
                    value: va,
                },
                UnknownDistributionKind {
                    source_name: b,
                    row: rb,
                    value: vb,
                },
            ) => a == b && ra == rb && va == vb,
            (InvalidPixelation(a), InvalidPixelation(b)) => a == b,
            (InvalidTopology(a), InvalidTopology(b)) => a == b,
            (InvalidParameter(a), InvalidParameter(b)) => a == b,
            (InvalidCategoryWeights(a), InvalidCategoryWeights(b)) => a == b,
            (KdePoolDisconnected(a), KdePoolDisconnected(b)) => a == b,

            _ => false,
        }
    }
}
