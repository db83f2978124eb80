//! The lookup table: simulated observations paired row-by-row with the
//! physical parameters that produced them.
//!
//! Row `i` of the observation matrix and row `i` of the parameter matrix
//! describe the same simulated state. Both matrices are stored row-major in
//! flat buffers so that a candidate row is one contiguous slice during the
//! per-pixel search.
//!
//! Observations are kept in the integer encoding of the pixel data, i.e. the
//! configured scale factor (reflectance × 10000 by default) has already been
//! applied when the table was built.

pub mod build;

use rkyv::{Archive, Deserialize, Serialize};

pub use build::validate;

/// Metadata describing how a lookup table was built.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct LutProperties {
    /// Number of simulated states (rows of both matrices).
    pub num_rows: u32,
    /// Number of spectral bands per simulated observation.
    pub num_bands: u32,
    /// Number of retrieved parameters per state.
    pub num_params: u32,
    /// Factor already applied to the observation values.
    pub scale_factor: f64,
    /// Band names from the observation table header, if any.
    pub band_names: Option<Vec<String>>,
    /// Parameter names from the parameter table header, if any.
    pub param_names: Option<Vec<String>>,
}

/// Validated pair of row-aligned observation and parameter matrices,
/// serializable with rkyv.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct LookupTable {
    /// Scaled simulated observations, `num_rows × num_bands`, row-major.
    pub observations: Vec<f32>,
    /// Parameters, `num_rows × num_params`, row-major.
    pub parameters: Vec<f32>,
    /// Build metadata.
    pub props: LutProperties,
}

impl LookupTable {
    /// Number of simulated states.
    pub fn nrow(&self) -> usize {
        self.props.num_rows as usize
    }

    /// Number of bands in each simulated observation.
    pub fn nband(&self) -> usize {
        self.props.num_bands as usize
    }

    /// Number of parameters in each state.
    pub fn nparam(&self) -> usize {
        self.props.num_params as usize
    }

    pub fn is_empty(&self) -> bool {
        self.props.num_rows == 0
    }

    /// Simulated observation for row `i`, or `None` if out of range.
    pub fn observation_row(&self, i: usize) -> Option<&[f32]> {
        let n = self.nband();
        self.observations.get(i * n..(i + 1) * n)
    }

    /// Parameters for row `i`, or `None` if out of range.
    pub fn parameter_row(&self, i: usize) -> Option<&[f32]> {
        let n = self.nparam();
        self.parameters.get(i * n..(i + 1) * n)
    }

    /// Names of the output bands: one per parameter, then the match error.
    ///
    /// Parameters without a header name are called `param1`, `param2`, ...
    pub fn output_band_names(&self) -> Vec<String> {
        let mut names: Vec<String> = match &self.props.param_names {
            Some(names) => names.clone(),
            None => (1..=self.nparam()).map(|i| format!("param{}", i)).collect(),
        };
        names.push("mae".to_string());
        names
    }
}
