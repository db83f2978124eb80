//! Lookup-table construction: validate the two loaded tables, scale the
//! simulated observations once, and pack both into flat row-major buffers.
//! Also handles rkyv serialization of a finished table.

use std::path::Path;

use tracing::info;

use crate::error::{Error, Result};
use crate::table::{Table, TableOptions};

use super::{LookupTable, LutProperties};

/// Default multiplier applied to simulated reflectances so they match
/// pixel values stored as reflectance × 10000.
pub const DEFAULT_SCALE_FACTOR: f64 = 10000.0;

/// Check that the observation and parameter tables are row-aligned.
pub fn validate(observations: &Table, parameters: &Table) -> Result<()> {
    if observations.nrow() != parameters.nrow() {
        return Err(Error::SchemaMismatch {
            observations: observations.nrow(),
            parameters: parameters.nrow(),
        });
    }
    Ok(())
}

impl LookupTable {
    /// Build a lookup table from flat row-major buffers.
    ///
    /// `observations` must already be in pixel units. Both buffers must hold
    /// the same number of rows, and both widths must be non-zero.
    pub fn new(
        observations: Vec<f32>,
        num_bands: usize,
        parameters: Vec<f32>,
        num_params: usize,
    ) -> Result<Self> {
        let num_rows = Self::check_layout(&observations, num_bands, &parameters, num_params)?;
        Ok(Self {
            observations,
            parameters,
            props: LutProperties {
                num_rows: num_rows as u32,
                num_bands: num_bands as u32,
                num_params: num_params as u32,
                scale_factor: 1.0,
                band_names: None,
                param_names: None,
            },
        })
    }

    /// Build a lookup table from loaded tables.
    ///
    /// Fails with `SchemaMismatch` if the row counts differ. The observation
    /// values are multiplied by `scale_factor` once here, never per comparison.
    pub fn from_tables(
        observations: &Table,
        parameters: &Table,
        scale_factor: f64,
    ) -> Result<Self> {
        validate(observations, parameters)?;

        let mut scaled = observations.clone();
        scaled.scale(scale_factor);

        let mut lut = Self::new(
            scaled.to_row_major_f32(),
            observations.ncol(),
            parameters.to_row_major_f32(),
            parameters.ncol(),
        )?;
        lut.props.scale_factor = scale_factor;
        lut.props.band_names = observations.col_names().map(<[String]>::to_vec);
        lut.props.param_names = parameters.col_names().map(<[String]>::to_vec);

        info!(
            "Built lookup table: {} states, {} bands, {} parameters (scale {})",
            lut.nrow(),
            lut.nband(),
            lut.nparam(),
            scale_factor
        );
        Ok(lut)
    }

    /// Load both tables from delimited text files and build the lookup table.
    ///
    /// `parameter_path` holds the retrieval targets (the "LUT" file),
    /// `observation_path` the simulated spectra.
    pub fn load_tables<P: AsRef<Path>, Q: AsRef<Path>>(
        parameter_path: P,
        parameter_options: &TableOptions,
        observation_path: Q,
        observation_options: &TableOptions,
        scale_factor: f64,
    ) -> Result<Self> {
        let parameters = Table::load(parameter_path, parameter_options)?;
        let observations = Table::load(observation_path, observation_options)?;
        parameters.log_summary("parameters");
        observations.log_summary("simulations");
        Self::from_tables(&observations, &parameters, scale_factor)
    }

    /// Fail with `BandMismatch` unless pixels have exactly `nband()` bands.
    pub fn check_band_count(&self, raster_bands: usize) -> Result<()> {
        if raster_bands != self.nband() {
            return Err(Error::BandMismatch {
                raster: raster_bands,
                table: self.nband(),
            });
        }
        Ok(())
    }

    /// Returns the row count implied by the buffers.
    fn check_layout(
        observations: &[f32],
        num_bands: usize,
        parameters: &[f32],
        num_params: usize,
    ) -> Result<usize> {
        if num_bands == 0 || num_params == 0 {
            return Err(Error::ShapeMismatch(format!(
                "lookup table needs at least one band and one parameter (got {} and {})",
                num_bands, num_params
            )));
        }
        if observations.len() % num_bands != 0 || parameters.len() % num_params != 0 {
            return Err(Error::ShapeMismatch(format!(
                "buffer lengths {} and {} are not multiples of {} bands and {} parameters",
                observations.len(),
                parameters.len(),
                num_bands,
                num_params
            )));
        }
        let obs_rows = observations.len() / num_bands;
        let param_rows = parameters.len() / num_params;
        if obs_rows != param_rows {
            return Err(Error::SchemaMismatch {
                observations: obs_rows,
                parameters: param_rows,
            });
        }
        if obs_rows > u32::MAX as usize {
            return Err(Error::ShapeMismatch(format!("{} rows exceed u32", obs_rows)));
        }
        Ok(obs_rows)
    }
}

// ── Serialization ───────────────────────────────────────────────────────────

impl LookupTable {
    /// Serialize the lookup table to bytes using rkyv.
    pub fn to_rkyv_bytes(&self) -> Result<Vec<u8>> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|bytes| bytes.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a lookup table from rkyv bytes, re-checking its layout.
    pub fn from_rkyv_bytes(bytes: &[u8]) -> Result<Self> {
        let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        let lut = rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let num_rows = Self::check_layout(
            &lut.observations,
            lut.nband(),
            &lut.parameters,
            lut.nparam(),
        )?;
        if num_rows != lut.nrow() {
            return Err(Error::Serialization(format!(
                "header claims {} rows, buffers hold {}",
                lut.nrow(),
                num_rows
            )));
        }
        Ok(lut)
    }

    /// Save the lookup table to a file using rkyv.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_rkyv_bytes()?;
        std::fs::write(path.as_ref(), &bytes)?;
        info!(
            "Saved lookup table to {} ({} bytes)",
            path.as_ref().display(),
            bytes.len()
        );
        Ok(())
    }

    /// Load a cached lookup table unless one of its source tables changed since.
    ///
    /// Returns `Ok(None)` when `cache` does not exist or is older than any of
    /// `sources`, so the caller rebuilds it. Fails with `StaleCache` when the
    /// cache was built with a different scale factor.
    pub fn load_cache<P: AsRef<Path>>(
        cache: P,
        sources: &[&Path],
        scale_factor: f64,
    ) -> Result<Option<Self>> {
        let cache = cache.as_ref();
        let cached_at = match std::fs::metadata(cache) {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        for source in sources {
            if std::fs::metadata(source)?.modified()? > cached_at {
                info!(
                    "{} is newer than {}, rebuilding lookup table",
                    source.display(),
                    cache.display()
                );
                return Ok(None);
            }
        }

        let lut = Self::load_from_file(cache)?;
        lut.check_scale_factor(scale_factor)?;
        Ok(Some(lut))
    }

    /// Fail with `StaleCache` unless the observations were scaled by `scale_factor`.
    pub fn check_scale_factor(&self, scale_factor: f64) -> Result<()> {
        let built = self.props.scale_factor;
        if (built - scale_factor).abs() > f64::EPSILON * built.abs().max(1.0) {
            return Err(Error::StaleCache(format!(
                "built with scale factor {}, requested {}",
                built, scale_factor
            )));
        }
        Ok(())
    }

    /// Load a lookup table from an rkyv file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let lut = Self::from_rkyv_bytes(&bytes)?;
        info!(
            "Loaded lookup table: {} states, {} bands, {} parameters",
            lut.nrow(),
            lut.nband(),
            lut.nparam()
        );
        Ok(lut)
    }
}
