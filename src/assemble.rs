//! Turn match results into fixed-length output vectors.
//!
//! Every pixel produces `nparam + 1` values: the parameters of the matched
//! row followed by the match error. Pixels without a match get the same
//! number of `OUTPUT_NODATA` values, so all output bands stay aligned.

use crate::matcher::MatchResult;
use crate::LookupTable;

/// No-data value written to every output band.
pub const OUTPUT_NODATA: f32 = -1.0;

impl LookupTable {
    /// Length of every assembled output vector.
    pub fn output_len(&self) -> usize {
        self.nparam() + 1
    }

    /// Write the output vector for `result` into `out`.
    ///
    /// `out` must have length [`output_len`](Self::output_len).
    pub fn assemble_into(&self, result: &MatchResult, out: &mut [f32]) {
        debug_assert_eq!(out.len(), self.output_len());
        let nparam = self.nparam();
        match *result {
            MatchResult::Matched { row, mae } => match self.parameter_row(row) {
                Some(params) => {
                    out[..nparam].copy_from_slice(params);
                    out[nparam] = mae;
                }
                None => out.fill(OUTPUT_NODATA),
            },
            MatchResult::NoMatch => out.fill(OUTPUT_NODATA),
        }
    }

    /// Output vector for `result`: parameters then error, or all no-data.
    pub fn assemble(&self, result: &MatchResult) -> Vec<f32> {
        let mut out = vec![OUTPUT_NODATA; self.output_len()];
        self.assemble_into(result, &mut out);
        out
    }
}
