//! Whole-image inversion: match every pixel of a block against the lookup
//! table and assemble the output bands.
//!
//! Setup checks (band count) happen once before the pixel loop. Inside the
//! loop nothing fails: each pixel resolves to either a parameter vector or
//! the no-data vector.

use std::time::Instant;

use rand::RngExt;
use tracing::{debug, info};

use crate::error::Result;
use crate::lut::build::DEFAULT_SCALE_FACTOR;
use crate::matcher::{MatchResult, SearchPolicy};
use crate::pixels::PixelBlock;
use crate::LookupTable;

/// Parameters controlling an inversion run.
#[derive(Debug, Clone)]
pub struct InversionConfig {
    /// Early-stop threshold on the mean absolute error, in pixel units.
    /// At or below `f32::EPSILON` the exhaustive search is used.
    /// Default: 0.01
    pub accuracy: f32,
    /// Maximum rows drawn per pixel by the stochastic search.
    /// Ignored by the exhaustive search.
    /// Default: 100
    pub max_iterations: u32,
    /// Multiplier applied to the simulated observations after loading.
    /// Default: 10000
    pub scale_factor: f64,
}

impl Default for InversionConfig {
    fn default() -> Self {
        Self {
            accuracy: 0.01,
            max_iterations: 100,
            scale_factor: DEFAULT_SCALE_FACTOR,
        }
    }
}

impl InversionConfig {
    /// Search policy implied by `accuracy` and `max_iterations`.
    pub fn policy(&self) -> SearchPolicy {
        SearchPolicy::from_accuracy(self.accuracy, self.max_iterations)
    }
}

/// Counters collected over one inversion run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InversionStats {
    /// Pixels processed.
    pub pixels: u64,
    /// Pixels that produced a match.
    pub matched: u64,
    /// Pixels that produced the no-data vector.
    pub no_data: u64,
    /// Total rows evaluated across all pixels.
    pub rows_evaluated: u64,
    /// Wall-clock time spent in the pixel loop, in milliseconds.
    pub elapsed_ms: f32,
}

impl InversionStats {
    /// Average rows evaluated per matched pixel.
    pub fn mean_rows_per_match(&self) -> f64 {
        if self.matched == 0 {
            0.0
        } else {
            self.rows_evaluated as f64 / self.matched as f64
        }
    }
}

/// Result of inverting a pixel block: `nparam + 1` float planes.
#[derive(Debug, Clone)]
pub struct Inversion {
    pub width: usize,
    pub height: usize,
    /// One plane per parameter, followed by the match-error plane.
    pub bands: Vec<Vec<f32>>,
    pub stats: InversionStats,
}

impl Inversion {
    /// Output vector of `cell` across all bands, or `None` if out of range.
    pub fn pixel(&self, cell: usize) -> Option<Vec<f32>> {
        (cell < self.width * self.height)
            .then(|| self.bands.iter().map(|plane| plane[cell]).collect())
    }
}

impl LookupTable {
    /// Invert every pixel of `block`.
    ///
    /// Fails with `BandMismatch` before any pixel is processed if the block's
    /// band count differs from the table's. The generator is shared by all
    /// pixels and advanced sequentially.
    pub fn invert<R: RngExt + ?Sized>(
        &self,
        block: &PixelBlock,
        policy: &SearchPolicy,
        rng: &mut R,
    ) -> Result<Inversion> {
        self.check_band_count(block.nband())?;

        let ncell = block.ncell();
        let nout = self.output_len();
        info!(
            "Inverting {} pixels ({} x {}) against {} states, policy {:?}",
            ncell,
            block.width(),
            block.height(),
            self.nrow(),
            policy
        );

        let t0 = Instant::now();
        let mut bands = vec![Vec::with_capacity(ncell); nout];
        let mut pixel = vec![0i16; block.nband()];
        let mut out = vec![0.0f32; nout];
        let mut stats = InversionStats::default();

        for cell in 0..ncell {
            block.gather(cell, &mut pixel);
            let outcome = self.match_pixel(&pixel, policy, rng);
            self.assemble_into(&outcome.result, &mut out);
            for (plane, &v) in bands.iter_mut().zip(&out) {
                plane.push(v);
            }

            stats.pixels += 1;
            stats.rows_evaluated += outcome.evaluated as u64;
            match outcome.result {
                MatchResult::Matched { .. } => stats.matched += 1,
                MatchResult::NoMatch => stats.no_data += 1,
            }
        }
        stats.elapsed_ms = t0.elapsed().as_secs_f32() * 1000.0;

        info!(
            "Inversion done: {} matched, {} no-data in {:.1} ms",
            stats.matched, stats.no_data, stats.elapsed_ms
        );
        debug!(
            "Rows evaluated: {} total, {:.1} per matched pixel",
            stats.rows_evaluated,
            stats.mean_rows_per_match()
        );

        Ok(Inversion {
            width: block.width(),
            height: block.height(),
            bands,
            stats,
        })
    }
}
