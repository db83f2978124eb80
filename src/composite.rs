//! Maximum-value compositing across equally shaped images.
//!
//! The last band of every input is the ranking criterion (typically a
//! vegetation index). For each pixel, the input with the largest ranking
//! value is selected and all of its bands are copied to the output. An input
//! takes part only if its ranking value is neither zero nor a sentinel and
//! none of its other bands holds a sentinel. When nothing qualifies, every
//! output band gets [`COMPOSITE_NODATA`].

use tracing::info;

use crate::error::{Error, Result};
use crate::matcher::{is_valid_pixel, INPUT_NODATA_MAX, INPUT_NODATA_MIN};
use crate::pixels::PixelBlock;

/// No-data value of composite bands.
pub const COMPOSITE_NODATA: i16 = INPUT_NODATA_MIN;

/// Index of the input selected for `cell`, or `None` if no input qualifies.
///
/// The first input wins ties.
pub fn select_input(images: &[PixelBlock], cell: usize) -> Option<usize> {
    let mut best: Option<(usize, i16)> = None;
    for (i, image) in images.iter().enumerate() {
        let bands = image.bands();
        let Some((ranking, other)) = bands.split_last() else {
            continue;
        };
        let rank = ranking[cell];
        if rank == 0 || rank == INPUT_NODATA_MIN || rank == INPUT_NODATA_MAX {
            continue;
        }
        if other.iter().any(|plane| !is_valid_pixel(&plane[cell..=cell])) {
            continue;
        }
        if best.map_or(true, |(_, r)| rank > r) {
            best = Some((i, rank));
        }
    }
    best.map(|(i, _)| i)
}

/// Build the maximum-value composite of `images`.
///
/// All inputs must share width, height and band count, with at least one
/// band. The result has the same band count as the inputs, ranking band
/// included.
pub fn max_composite(images: &[PixelBlock]) -> Result<PixelBlock> {
    let first = images
        .first()
        .ok_or_else(|| Error::ShapeMismatch("no input images".to_string()))?;
    if first.nband() == 0 {
        return Err(Error::ShapeMismatch("input images have no bands".to_string()));
    }
    for (i, image) in images.iter().enumerate().skip(1) {
        if image.width() != first.width()
            || image.height() != first.height()
            || image.nband() != first.nband()
        {
            return Err(Error::ShapeMismatch(format!(
                "input {} is {} x {} x {}, expected {} x {} x {}",
                i + 1,
                image.width(),
                image.height(),
                image.nband(),
                first.width(),
                first.height(),
                first.nband()
            )));
        }
    }

    let ncell = first.ncell();
    let nband = first.nband();
    let mut bands = vec![Vec::with_capacity(ncell); nband];
    let mut filled = 0usize;

    for cell in 0..ncell {
        match select_input(images, cell) {
            Some(i) => {
                filled += 1;
                for (plane, src) in bands.iter_mut().zip(images[i].bands()) {
                    plane.push(src[cell]);
                }
            }
            None => {
                for plane in bands.iter_mut() {
                    plane.push(COMPOSITE_NODATA);
                }
            }
        }
    }

    info!(
        "Composited {} inputs: {} of {} pixels filled",
        images.len(),
        filled,
        ncell
    );
    PixelBlock::new(first.width(), first.height(), bands)
}
