//! Error type shared by the table loader, the lookup table, and the raster I/O layer.
//!
//! Every variant here is a setup or output failure. Per-pixel data quality is never
//! an error: invalid pixels resolve to the no-data output vector instead.

use thiserror::Error;

/// Errors raised while loading tables, validating the lookup table, or
/// reading and writing rasters.
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying file system failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The delimited-text reader failed before a row could be inspected.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A table row is malformed: wrong column count or a non-numeric cell.
    ///
    /// `line` is 1-based and counts every physical line in the file,
    /// including the header and skipped comment lines.
    #[error("parse error on line {line}: {reason}")]
    Parse { line: u64, reason: String },

    /// Observation and parameter tables describe a different number of states.
    #[error(
        "LUT and simulations have different number of rows ({parameters} vs {observations})"
    )]
    SchemaMismatch {
        observations: usize,
        parameters: usize,
    },

    /// The raster band count differs from the number of simulated bands.
    #[error("number of bands ({raster}) does not match number of simulations ({table})")]
    BandMismatch { raster: usize, table: usize },

    /// Images or buffers that must share a shape do not.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Raster sample type that cannot be represented as 16-bit signed integers.
    #[error("datatype needs to be Int16 (is: {0})")]
    UnsupportedSampleType(String),

    /// TIFF decoding or encoding failure.
    #[cfg(feature = "tiff")]
    #[error("raster error: {0}")]
    Raster(#[from] tiff::TiffError),

    /// A cached lookup table was built with settings that differ from the current run.
    #[error("LUT cache does not match this run: {0}")]
    StaleCache(String),

    /// rkyv serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;
