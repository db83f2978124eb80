//! Per-pixel search for the lookup-table row that best reproduces an
//! observed band vector.
//!
//! The match error is the mean absolute error over all bands:
//!
//! ```text
//! MAE(v, row) = (1 / nband) * Σ_b |v[b] − M[row][b]|
//! ```
//!
//! Two search policies are available:
//!
//! - **Exhaustive**: every row is scanned in order and the global minimum is
//!   returned. Deterministic. Cost O(nrow · nband) per pixel.
//! - **Stochastic early-stop**: rows are drawn uniformly at random, with
//!   replacement, until a row's error is within the accuracy bound or the
//!   draw budget is spent. Returns the best row seen, which need not be the
//!   global optimum.
//!
//! In both cases the best row is replaced only by a strictly smaller error,
//! so on exact ties the row found first is kept.
//!
//! Pixels holding an input sentinel in any band are rejected before any row
//! is examined.

pub mod search;

pub use search::{is_valid_pixel, mae};

/// Smallest representable sample; marks missing input data.
pub const INPUT_NODATA_MIN: i16 = i16::MIN;
/// Largest representable sample; marks saturated input data.
pub const INPUT_NODATA_MAX: i16 = i16::MAX;

/// Search policy, chosen once per run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchPolicy {
    /// Scan every row; exact global minimum.
    Exhaustive,
    /// Random draws with replacement until `best_mae <= accuracy`
    /// or `max_iterations` rows have been drawn.
    StochasticEarlyStop { accuracy: f32, max_iterations: u32 },
}

impl SearchPolicy {
    /// Select the policy from an accuracy threshold.
    ///
    /// Any accuracy at or below `f32::EPSILON` disables early stopping and
    /// forces the exhaustive scan, regardless of `max_iterations`.
    pub fn from_accuracy(accuracy: f32, max_iterations: u32) -> Self {
        if accuracy <= f32::EPSILON {
            SearchPolicy::Exhaustive
        } else {
            SearchPolicy::StochasticEarlyStop {
                accuracy,
                max_iterations,
            }
        }
    }

    pub fn is_exhaustive(&self) -> bool {
        matches!(self, SearchPolicy::Exhaustive)
    }
}

/// Outcome of matching one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchResult {
    /// Best row index and its mean absolute error (always `>= 0`).
    Matched { row: usize, mae: f32 },
    /// The pixel was invalid, the table was empty, or no draw was made.
    NoMatch,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Matched { .. })
    }
}

/// Match result together with the number of rows whose error was computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOutcome {
    pub result: MatchResult,
    /// Rows scanned (exhaustive) or drawn (stochastic). Zero for invalid pixels.
    pub evaluated: u32,
}
