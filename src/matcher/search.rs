//! Exhaustive and stochastic row search over a lookup table.

use rand::RngExt;

use crate::LookupTable;

use super::{MatchOutcome, MatchResult, SearchPolicy, INPUT_NODATA_MAX, INPUT_NODATA_MIN};

/// True unless any band holds an input sentinel.
#[inline]
pub fn is_valid_pixel(pixel: &[i16]) -> bool {
    !pixel
        .iter()
        .any(|&v| v == INPUT_NODATA_MIN || v == INPUT_NODATA_MAX)
}

/// Mean absolute error between a pixel and one simulated observation.
#[inline]
pub fn mae(pixel: &[i16], row: &[f32]) -> f32 {
    debug_assert_eq!(pixel.len(), row.len());
    let sum: f32 = pixel
        .iter()
        .zip(row)
        .map(|(&v, &m)| (v as f32 - m).abs())
        .sum();
    sum / pixel.len() as f32
}

/// Running minimum; replaced only on a strictly smaller error.
struct Best {
    row: Option<usize>,
    mae: f32,
}

impl Best {
    fn new() -> Self {
        Self {
            row: None,
            mae: f32::INFINITY,
        }
    }

    #[inline]
    fn offer(&mut self, row: usize, mae: f32) {
        if mae < self.mae {
            self.mae = mae;
            self.row = Some(row);
        }
    }

    fn into_result(self) -> MatchResult {
        match self.row {
            Some(row) => MatchResult::Matched { row, mae: self.mae },
            None => MatchResult::NoMatch,
        }
    }
}

impl LookupTable {
    /// Find the row whose simulated observation best matches `pixel`.
    ///
    /// `pixel` must have `nband()` samples; check that once per image with
    /// [`LookupTable::check_band_count`]. The generator is only advanced by
    /// the stochastic policy.
    pub fn match_pixel<R: RngExt + ?Sized>(
        &self,
        pixel: &[i16],
        policy: &SearchPolicy,
        rng: &mut R,
    ) -> MatchOutcome {
        debug_assert_eq!(pixel.len(), self.nband());

        if !is_valid_pixel(pixel) || self.is_empty() {
            return MatchOutcome {
                result: MatchResult::NoMatch,
                evaluated: 0,
            };
        }

        match *policy {
            SearchPolicy::Exhaustive => self.search_exhaustive(pixel),
            SearchPolicy::StochasticEarlyStop {
                accuracy,
                max_iterations,
            } => self.search_stochastic(pixel, accuracy, max_iterations, rng),
        }
    }

    fn search_exhaustive(&self, pixel: &[i16]) -> MatchOutcome {
        let mut best = Best::new();
        let mut evaluated = 0u32;
        for (i, row) in self.observations.chunks_exact(self.nband()).enumerate() {
            best.offer(i, mae(pixel, row));
            evaluated += 1;
        }
        MatchOutcome {
            result: best.into_result(),
            evaluated,
        }
    }

    fn search_stochastic<R: RngExt + ?Sized>(
        &self,
        pixel: &[i16],
        accuracy: f32,
        max_iterations: u32,
        rng: &mut R,
    ) -> MatchOutcome {
        let nrow = self.nrow();
        let nband = self.nband();
        let mut best = Best::new();
        let mut evaluated = 0u32;

        while best.mae > accuracy && evaluated < max_iterations {
            let i = rng.random_range(0..nrow);
            let row = &self.observations[i * nband..(i + 1) * nband];
            best.offer(i, mae(pixel, row));
            evaluated += 1;
        }

        MatchOutcome {
            result: best.into_result(),
            evaluated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn lut(observations: &[f32], nband: usize, parameters: &[f32], nparam: usize) -> LookupTable {
        LookupTable::new(observations.to_vec(), nband, parameters.to_vec(), nparam).unwrap()
    }

    #[test]
    fn test_mae() {
        assert_eq!(mae(&[100, 200], &[110.0, 180.0]), 15.0);
        assert_eq!(mae(&[-5], &[5.0]), 10.0);
    }

    #[test]
    fn test_sentinels() {
        assert!(is_valid_pixel(&[0, 1, -32767, 32766]));
        assert!(!is_valid_pixel(&[0, i16::MIN]));
        assert!(!is_valid_pixel(&[i16::MAX, 0]));
    }

    #[test]
    fn test_policy_selection() {
        assert_eq!(SearchPolicy::from_accuracy(0.0, 1), SearchPolicy::Exhaustive);
        assert_eq!(
            SearchPolicy::from_accuracy(f32::EPSILON, 100),
            SearchPolicy::Exhaustive
        );
        assert_eq!(
            SearchPolicy::from_accuracy(0.01, 100),
            SearchPolicy::StochasticEarlyStop {
                accuracy: 0.01,
                max_iterations: 100
            }
        );
    }

    #[test]
    fn test_exhaustive_single_band() {
        let lut = lut(&[100.0, 900.0], 1, &[0.1, 0.9], 1);
        let mut rng = StdRng::seed_from_u64(0);
        let out = lut.match_pixel(&[150], &SearchPolicy::Exhaustive, &mut rng);
        assert_eq!(out.result, MatchResult::Matched { row: 0, mae: 50.0 });
        assert_eq!(out.evaluated, 2);
    }

    #[test]
    fn test_exhaustive_tie_keeps_first_row() {
        // rows 1 and 3 are equally distant from the pixel
        let lut = lut(&[0.0, 90.0, 500.0, 110.0], 1, &[0.0, 1.0, 2.0, 3.0], 1);
        let mut rng = StdRng::seed_from_u64(0);
        let out = lut.match_pixel(&[100], &SearchPolicy::Exhaustive, &mut rng);
        assert_eq!(out.result, MatchResult::Matched { row: 1, mae: 10.0 });
    }

    #[test]
    fn test_invalid_pixel_scans_nothing() {
        let lut = lut(&[0.0, 0.0, 1.0, 1.0], 2, &[0.0, 1.0], 1);
        let mut rng = StdRng::seed_from_u64(0);
        for policy in [
            SearchPolicy::Exhaustive,
            SearchPolicy::from_accuracy(1.0, 10),
        ] {
            let out = lut.match_pixel(&[i16::MIN, 500], &policy, &mut rng);
            assert_eq!(out.result, MatchResult::NoMatch);
            assert_eq!(out.evaluated, 0);
        }
    }

    #[test]
    fn test_empty_table_no_match() {
        let lut = lut(&[], 2, &[], 1);
        let mut rng = StdRng::seed_from_u64(0);
        let out = lut.match_pixel(&[1, 2], &SearchPolicy::from_accuracy(1.0, 10), &mut rng);
        assert_eq!(out.result, MatchResult::NoMatch);
        let out = lut.match_pixel(&[1, 2], &SearchPolicy::Exhaustive, &mut rng);
        assert_eq!(out.result, MatchResult::NoMatch);
    }

    #[test]
    fn test_stochastic_zero_budget() {
        let lut = lut(&[1.0], 1, &[1.0], 1);
        let mut rng = StdRng::seed_from_u64(0);
        let policy = SearchPolicy::StochasticEarlyStop {
            accuracy: 1.0,
            max_iterations: 0,
        };
        let out = lut.match_pixel(&[1], &policy, &mut rng);
        assert_eq!(out.result, MatchResult::NoMatch);
        assert_eq!(out.evaluated, 0);
    }

    #[test]
    fn test_stochastic_single_draw() {
        let lut = lut(&[0.0, 1000.0, 2000.0, 3000.0], 1, &[0.0, 1.0, 2.0, 3.0], 1);
        let policy = SearchPolicy::from_accuracy(1e6, 1);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let out = lut.match_pixel(&[2900], &policy, &mut rng);
            assert_eq!(out.evaluated, 1);
            match out.result {
                MatchResult::Matched { row, mae: err } => {
                    let expected = (2900.0 - lut.observation_row(row).unwrap()[0]).abs();
                    assert_eq!(err, expected);
                }
                MatchResult::NoMatch => panic!("one draw must produce a match"),
            }
        }
    }

    #[test]
    fn test_stochastic_stops_at_accuracy() {
        // every row satisfies the bound, so the first draw ends the search
        let lut = lut(&[10.0, 11.0, 12.0], 1, &[0.0, 1.0, 2.0], 1);
        let policy = SearchPolicy::from_accuracy(5.0, 100);
        let mut rng = StdRng::seed_from_u64(3);
        let out = lut.match_pixel(&[10], &policy, &mut rng);
        assert_eq!(out.evaluated, 1);
        assert!(out.result.is_match());
    }

    #[test]
    fn test_stochastic_respects_budget() {
        // nothing ever reaches the bound
        let lut = lut(&[1000.0, 2000.0, 3000.0], 1, &[0.0, 1.0, 2.0], 1);
        let policy = SearchPolicy::from_accuracy(0.5, 17);
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let out = lut.match_pixel(&[0], &policy, &mut rng);
            assert_eq!(out.evaluated, 17);
            match out.result {
                MatchResult::Matched { mae: err, .. } => assert!(err >= 1000.0),
                MatchResult::NoMatch => panic!("expected a match"),
            }
        }
    }
}
