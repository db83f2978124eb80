//! Band-major integer images.
//!
//! A `PixelBlock` holds `nband` planes of `width × height` samples, the
//! layout rasters are read in. The pixel vector of cell `c` is the `c`-th
//! sample of every plane.

use crate::error::{Error, Result};

/// Multi-band image of 16-bit signed samples, stored one plane per band.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBlock {
    width: usize,
    height: usize,
    bands: Vec<Vec<i16>>,
}

impl PixelBlock {
    /// Build a block from band planes. Every plane must hold `width * height` samples.
    pub fn new(width: usize, height: usize, bands: Vec<Vec<i16>>) -> Result<Self> {
        let ncell = width * height;
        if let Some((b, plane)) = bands.iter().enumerate().find(|(_, p)| p.len() != ncell) {
            return Err(Error::ShapeMismatch(format!(
                "band {} has {} samples, expected {} ({} x {})",
                b + 1,
                plane.len(),
                ncell,
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            bands,
        })
    }

    /// Build a block from pixel-interleaved samples (`[p0b0, p0b1, ..., p1b0, ...]`).
    pub fn from_interleaved(
        width: usize,
        height: usize,
        nband: usize,
        samples: &[i16],
    ) -> Result<Self> {
        let ncell = width * height;
        if samples.len() != ncell * nband {
            return Err(Error::ShapeMismatch(format!(
                "{} interleaved samples for {} pixels x {} bands",
                samples.len(),
                ncell,
                nband
            )));
        }
        Self::new(width, height, deinterleave(samples, nband))
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of pixels.
    pub fn ncell(&self) -> usize {
        self.width * self.height
    }

    pub fn nband(&self) -> usize {
        self.bands.len()
    }

    /// Plane of band `b`, or `None` if out of range.
    pub fn band(&self, b: usize) -> Option<&[i16]> {
        self.bands.get(b).map(Vec::as_slice)
    }

    pub fn bands(&self) -> &[Vec<i16>] {
        &self.bands
    }

    pub fn into_bands(self) -> Vec<Vec<i16>> {
        self.bands
    }

    /// Copy the pixel vector of `cell` into `out` (length `nband()`).
    ///
    /// # Panics
    ///
    /// Panics if `cell >= ncell()`.
    #[inline]
    pub fn gather(&self, cell: usize, out: &mut [i16]) {
        for (v, plane) in out.iter_mut().zip(&self.bands) {
            *v = plane[cell];
        }
    }

    /// Pixel vector of `cell`, or `None` if out of range.
    pub fn pixel(&self, cell: usize) -> Option<Vec<i16>> {
        (cell < self.ncell()).then(|| self.bands.iter().map(|plane| plane[cell]).collect())
    }
}

/// Split pixel-interleaved samples into `nband` planes.
pub(crate) fn deinterleave<T: Copy>(samples: &[T], nband: usize) -> Vec<Vec<T>> {
    let mut bands = vec![Vec::with_capacity(samples.len() / nband.max(1)); nband];
    for pixel in samples.chunks_exact(nband.max(1)) {
        for (plane, &v) in bands.iter_mut().zip(pixel) {
            plane.push(v);
        }
    }
    bands
}
