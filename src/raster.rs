//! GeoTIFF input and output.
//!
//! Requires the `tiff` feature (enabled by default).
//!
//! Input rasters hold 16-bit signed samples, either one band per page or
//! several samples per pixel. 8-bit and unsigned 16-bit rasters are widened;
//! unsigned values that do not fit saturate to `i16::MAX`, which the matcher
//! treats as invalid. Reduced-resolution pages (overviews) are skipped.
//!
//! Output rasters hold a single pixel-interleaved, Deflate-compressed image
//! with one sample per band. The image carries the band names (as GDAL band
//! descriptions in `GDAL_METADATA`), the no-data value (`GDAL_NODATA`) and
//! the georeferencing tags copied from the input.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::compression::{CompressionAlgorithm, Deflate};
use tiff::encoder::{DeflateLevel, DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::{CompressionMethod, PhotometricInterpretation, PlanarConfiguration, SampleFormat, Tag};
use tiff::TiffError;
use tracing::{debug, info};

use crate::assemble::OUTPUT_NODATA;
use crate::composite::COMPOSITE_NODATA;
use crate::error::{Error, Result};
use crate::invert::Inversion;
use crate::matcher::INPUT_NODATA_MAX;
use crate::pixels::{deinterleave, PixelBlock};

// GeoTIFF and GDAL private tags.
const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_MODEL_TRANSFORMATION: u16 = 34264;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GEO_DOUBLE_PARAMS: u16 = 34736;
const TAG_GEO_ASCII_PARAMS: u16 = 34737;
const TAG_GDAL_METADATA: u16 = 42112;
const TAG_GDAL_NODATA: u16 = 42113;

/// Uncompressed bytes per output strip.
const STRIP_BYTES: usize = 1 << 20;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Georeferencing tags of a GeoTIFF, copied verbatim from input to output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoReference {
    pub pixel_scale: Option<Vec<f64>>,
    pub tiepoints: Option<Vec<f64>>,
    pub transformation: Option<Vec<f64>>,
    pub geo_key_directory: Option<Vec<u16>>,
    pub geo_double_params: Option<Vec<f64>>,
    pub geo_ascii_params: Option<String>,
}

impl GeoReference {
    fn read<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Self> {
        Ok(Self {
            pixel_scale: read_f64s(decoder, TAG_MODEL_PIXEL_SCALE)?,
            tiepoints: read_f64s(decoder, TAG_MODEL_TIEPOINT)?,
            transformation: read_f64s(decoder, TAG_MODEL_TRANSFORMATION)?,
            geo_key_directory: decoder
                .find_tag(tag(TAG_GEO_KEY_DIRECTORY))?
                .map(|v| v.into_u16_vec())
                .transpose()?,
            geo_double_params: read_f64s(decoder, TAG_GEO_DOUBLE_PARAMS)?,
            geo_ascii_params: decoder
                .find_tag(tag(TAG_GEO_ASCII_PARAMS))?
                .map(|v| v.into_string())
                .transpose()?,
        })
    }

    /// Origin (upper-left corner) and resolution, when a tiepoint and pixel scale are present.
    pub fn origin_and_resolution(&self) -> Option<([f64; 2], [f64; 2])> {
        let tp = self.tiepoints.as_ref()?;
        let ps = self.pixel_scale.as_ref()?;
        if tp.len() < 6 || ps.len() < 2 {
            return None;
        }
        Some(([tp[3], tp[4]], [ps[0], -ps[1]]))
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn write<W: Write + Seek, K: TiffKind>(&self, dir: &mut DirectoryEncoder<'_, W, K>) -> Result<()> {
        if let Some(v) = &self.pixel_scale {
            dir.write_tag(tag(TAG_MODEL_PIXEL_SCALE), &v[..])?;
        }
        if let Some(v) = &self.tiepoints {
            dir.write_tag(tag(TAG_MODEL_TIEPOINT), &v[..])?;
        }
        if let Some(v) = &self.transformation {
            dir.write_tag(tag(TAG_MODEL_TRANSFORMATION), &v[..])?;
        }
        if let Some(v) = &self.geo_key_directory {
            dir.write_tag(tag(TAG_GEO_KEY_DIRECTORY), &v[..])?;
        }
        if let Some(v) = &self.geo_double_params {
            dir.write_tag(tag(TAG_GEO_DOUBLE_PARAMS), &v[..])?;
        }
        if let Some(s) = &self.geo_ascii_params {
            dir.write_tag(tag(TAG_GEO_ASCII_PARAMS), s.as_str())?;
        }
        Ok(())
    }
}

fn read_f64s<R: Read + Seek>(decoder: &mut Decoder<R>, code: u16) -> Result<Option<Vec<f64>>> {
    Ok(decoder
        .find_tag(tag(code))?
        .map(|v| v.into_f64_vec())
        .transpose()?)
}

fn read_ascii<P: AsRef<Path>>(path: P, code: u16) -> Result<Option<String>> {
    let file = BufReader::new(File::open(path.as_ref())?);
    let mut decoder = Decoder::new(file)?;
    Ok(decoder
        .find_tag(tag(code))?
        .map(|v| v.into_string())
        .transpose()?)
}

/// Band planes of every full-resolution page, in file order.
struct Planes<T> {
    width: u32,
    height: u32,
    bands: Vec<Vec<T>>,
    sample_type: &'static str,
}

fn read_planes<R, T, F>(decoder: &mut Decoder<R>, convert: F) -> Result<Planes<T>>
where
    R: Read + Seek,
    T: Copy,
    F: Fn(DecodingResult) -> Result<Vec<T>>,
{
    let (width, height) = decoder.dimensions()?;
    let ncell = width as usize * height as usize;
    let mut bands: Vec<Vec<T>> = Vec::new();
    let mut sample_type = "unknown";

    loop {
        let subfile_type = decoder
            .find_tag(Tag::NewSubfileType)?
            .map(|v| v.into_u32())
            .transpose()?
            .unwrap_or(0);

        if subfile_type & 1 == 0 {
            let dims = decoder.dimensions()?;
            if dims != (width, height) {
                return Err(Error::ShapeMismatch(format!(
                    "page {} is {} x {}, first page is {} x {}",
                    bands.len() + 1,
                    dims.0,
                    dims.1,
                    width,
                    height
                )));
            }
            let samples_per_pixel = decoder
                .find_tag(Tag::SamplesPerPixel)?
                .map(|v| v.into_u16())
                .transpose()?
                .unwrap_or(1) as usize;

            let data = decoder.read_image()?;
            sample_type = sample_type_name(&data);
            let samples = convert(data)?;
            if samples.len() != ncell * samples_per_pixel {
                return Err(Error::ShapeMismatch(format!(
                    "{} samples for {} pixels x {} bands",
                    samples.len(),
                    ncell,
                    samples_per_pixel
                )));
            }
            if samples_per_pixel == 1 {
                bands.push(samples);
            } else {
                bands.extend(deinterleave(&samples, samples_per_pixel));
            }
        } else {
            debug!("Skipping reduced-resolution page");
        }

        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }

    Ok(Planes {
        width,
        height,
        bands,
        sample_type,
    })
}

/// A decoded input raster.
#[derive(Debug, Clone)]
pub struct Raster {
    pub block: PixelBlock,
    pub georef: GeoReference,
}

/// Read a multi-band raster as 16-bit signed samples.
pub fn read_raster<P: AsRef<Path>>(path: P) -> Result<Raster> {
    let path = path.as_ref();
    let file = BufReader::new(File::open(path)?);
    let mut decoder = Decoder::new(file)?.with_limits(Limits::unlimited());

    let georef = GeoReference::read(&mut decoder)?;
    let planes = read_planes(&mut decoder, to_i16)?;
    let block = PixelBlock::new(planes.width as usize, planes.height as usize, planes.bands)?;

    info!("file: {}", path.display());
    if let Some(projection) = &georef.geo_ascii_params {
        info!("projection: {}", projection.trim_end_matches(['|', '\0']));
    }
    if let Some(([x, y], [rx, ry])) = georef.origin_and_resolution() {
        info!("origin: {:.6} {:.6}", x, y);
        info!("resolution: {:.6} {:.6}", rx, ry);
    }
    info!(
        "dimensions: {} x {} = {} pixels, {} bands, datatype {}",
        block.height(),
        block.width(),
        block.ncell(),
        block.nband(),
        planes.sample_type
    );

    Ok(Raster { block, georef })
}

fn to_i16(data: DecodingResult) -> Result<Vec<i16>> {
    match data {
        DecodingResult::I16(v) => Ok(v),
        DecodingResult::U8(v) => Ok(v.into_iter().map(i16::from).collect()),
        DecodingResult::I8(v) => Ok(v.into_iter().map(i16::from).collect()),
        DecodingResult::U16(v) => Ok(v
            .into_iter()
            .map(|x| i16::try_from(x).unwrap_or(INPUT_NODATA_MAX))
            .collect()),
        other => Err(Error::UnsupportedSampleType(sample_type_name(&other).to_string())),
    }
}

fn sample_type_name(data: &DecodingResult) -> &'static str {
    match data {
        DecodingResult::U8(_) => "Byte",
        DecodingResult::I8(_) => "Int8",
        DecodingResult::U16(_) => "UInt16",
        DecodingResult::I16(_) => "Int16",
        DecodingResult::U32(_) => "UInt32",
        DecodingResult::U64(_) => "UInt64",
        DecodingResult::I32(_) => "Int32",
        DecodingResult::I64(_) => "Int64",
        DecodingResult::F32(_) => "Float32",
        DecodingResult::F64(_) => "Float64",
        _ => "unsupported",
    }
}

/// Sample types the writer stores.
trait Sample: Copy {
    const BITS: u16;
    const FORMAT: SampleFormat;

    fn put(self, out: &mut Vec<u8>);
}

impl Sample for f32 {
    const BITS: u16 = 32;
    const FORMAT: SampleFormat = SampleFormat::IEEEFP;

    fn put(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_ne_bytes());
    }
}

impl Sample for i16 {
    const BITS: u16 = 16;
    const FORMAT: SampleFormat = SampleFormat::Int;

    fn put(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_ne_bytes());
    }
}

/// GDAL band descriptions, `sample` being the zero-based band index.
fn band_metadata(names: &[String]) -> String {
    let mut xml = String::from("<GDALMetadata>");
    for (b, name) in names.iter().enumerate() {
        let name = name
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;");
        xml.push_str(&format!(
            "<Item name=\"DESCRIPTION\" sample=\"{b}\" role=\"description\">{name}</Item>"
        ));
    }
    xml.push_str("</GDALMetadata>");
    xml
}

/// Write band planes as one pixel-interleaved image with `bands.len()` samples per pixel.
fn write_bands<T: Sample>(
    path: &Path,
    width: usize,
    height: usize,
    bands: &[Vec<T>],
    names: &[String],
    nodata: &str,
    georef: &GeoReference,
) -> Result<()> {
    let ncell = width * height;
    if bands.is_empty() || ncell == 0 {
        return Err(Error::ShapeMismatch(format!(
            "cannot write {} bands of {} x {}",
            bands.len(),
            width,
            height
        )));
    }
    if let Some((b, plane)) = bands.iter().enumerate().find(|(_, p)| p.len() != ncell) {
        return Err(Error::ShapeMismatch(format!(
            "band {} has {} samples, expected {}",
            b + 1,
            plane.len(),
            ncell
        )));
    }
    let nband = bands.len();
    let samples_per_pixel = u16::try_from(nband).map_err(TiffError::from)?;
    let row_bytes = width * nband * usize::from(T::BITS / 8);
    let rows_per_strip = (STRIP_BYTES / row_bytes).clamp(1, height);

    let mut file = BufWriter::new(File::create(path)?);
    {
        let mut tiff = TiffEncoder::new(&mut file)?;
        let mut dir = tiff.image_directory()?;
        let mut deflate = Deflate::with_level(DeflateLevel::Best);
        let mut raw = Vec::with_capacity(rows_per_strip * row_bytes);
        let mut packed = Vec::new();
        let mut offsets: Vec<u32> = Vec::new();
        let mut byte_counts: Vec<u32> = Vec::new();

        for first_row in (0..height).step_by(rows_per_strip) {
            let last_row = (first_row + rows_per_strip).min(height);
            raw.clear();
            for cell in first_row * width..last_row * width {
                for plane in bands {
                    plane[cell].put(&mut raw);
                }
            }
            packed.clear();
            deflate.write_to(&mut packed, &raw)?;
            let offset = dir.write_data(&packed[..])?;
            offsets.push(u32::try_from(offset).map_err(TiffError::from)?);
            byte_counts.push(u32::try_from(packed.len()).map_err(TiffError::from)?);
        }

        dir.write_tag(Tag::ImageWidth, u32::try_from(width).map_err(TiffError::from)?)?;
        dir.write_tag(Tag::ImageLength, u32::try_from(height).map_err(TiffError::from)?)?;
        dir.write_tag(Tag::BitsPerSample, &vec![T::BITS; nband][..])?;
        dir.write_tag(Tag::Compression, CompressionMethod::Deflate.to_u16())?;
        dir.write_tag(
            Tag::PhotometricInterpretation,
            PhotometricInterpretation::BlackIsZero.to_u16(),
        )?;
        dir.write_tag(Tag::StripOffsets, &offsets[..])?;
        dir.write_tag(Tag::SamplesPerPixel, samples_per_pixel)?;
        dir.write_tag(Tag::RowsPerStrip, u32::try_from(rows_per_strip).map_err(TiffError::from)?)?;
        dir.write_tag(Tag::StripByteCounts, &byte_counts[..])?;
        dir.write_tag(Tag::PlanarConfiguration, PlanarConfiguration::Chunky.to_u16())?;
        if nband > 1 {
            // unspecified extra samples
            dir.write_tag(Tag::ExtraSamples, &vec![0u16; nband - 1][..])?;
        }
        dir.write_tag(Tag::SampleFormat, &vec![T::FORMAT.to_u16(); nband][..])?;
        if !names.is_empty() {
            dir.write_tag(tag(TAG_GDAL_METADATA), band_metadata(names).as_str())?;
        }
        dir.write_tag(tag(TAG_GDAL_NODATA), nodata)?;
        georef.write(&mut dir)?;
        dir.finish()?;
    }
    file.flush()?;
    Ok(())
}

/// Write an inversion result: one Float32 band per parameter plus the error band,
/// with no-data `-1`.
pub fn write_inversion<P: AsRef<Path>>(
    path: P,
    inversion: &Inversion,
    band_names: &[String],
    georef: &GeoReference,
) -> Result<()> {
    let path = path.as_ref();
    write_bands(
        path,
        inversion.width,
        inversion.height,
        &inversion.bands,
        band_names,
        &OUTPUT_NODATA.to_string(),
        georef,
    )?;
    info!(
        "Wrote {} bands to {}",
        inversion.bands.len(),
        path.display()
    );
    Ok(())
}

/// Write a 16-bit signed image with no-data `i16::MIN`.
pub fn write_pixel_block<P: AsRef<Path>>(
    path: P,
    block: &PixelBlock,
    georef: &GeoReference,
) -> Result<()> {
    let path = path.as_ref();
    write_bands(
        path,
        block.width(),
        block.height(),
        block.bands(),
        &[],
        &COMPOSITE_NODATA.to_string(),
        georef,
    )?;
    info!("Wrote {} bands to {}", block.nband(), path.display());
    Ok(())
}

/// Read the bands of a Float32 raster, e.g. an inversion output.
///
/// Returns width, height and one plane per band. Reduced-resolution pages are skipped.
pub fn read_f32_bands<P: AsRef<Path>>(path: P) -> Result<(usize, usize, Vec<Vec<f32>>)> {
    let file = BufReader::new(File::open(path.as_ref())?);
    let mut decoder = Decoder::new(file)?.with_limits(Limits::unlimited());
    let planes = read_planes(&mut decoder, |data| match data {
        DecodingResult::F32(v) => Ok(v),
        other => Err(Error::UnsupportedSampleType(
            sample_type_name(&other).to_string(),
        )),
    })?;
    Ok((planes.width as usize, planes.height as usize, planes.bands))
}

/// GDAL no-data string, if present.
pub fn read_nodata<P: AsRef<Path>>(path: P) -> Result<Option<String>> {
    read_ascii(path, TAG_GDAL_NODATA)
}

/// GDAL metadata XML (band descriptions), if present.
pub fn read_gdal_metadata<P: AsRef<Path>>(path: P) -> Result<Option<String>> {
    read_ascii(path, TAG_GDAL_METADATA)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiff::encoder::colortype;

    fn georef() -> GeoReference {
        GeoReference {
            pixel_scale: Some(vec![30.0, 30.0, 0.0]),
            tiepoints: Some(vec![0.0, 0.0, 0.0, 500000.0, 4600000.0, 0.0]),
            transformation: None,
            geo_key_directory: Some(vec![1, 1, 0, 2, 1024, 0, 1, 1, 3072, 0, 1, 32633]),
            geo_double_params: None,
            geo_ascii_params: Some("WGS 84 / UTM zone 33N|".to_string()),
        }
    }

    #[test]
    fn test_pixel_block_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.tif");
        let block = PixelBlock::new(
            3,
            2,
            vec![vec![1, 2, 3, 4, 5, i16::MIN], vec![-7, 8, 9, 10, 11, i16::MAX]],
        )
        .unwrap();
        write_pixel_block(&path, &block, &georef()).unwrap();

        let raster = read_raster(&path).unwrap();
        assert_eq!(raster.block, block);
        assert_eq!(raster.georef, georef());
        assert_eq!(
            raster.georef.origin_and_resolution(),
            Some(([500000.0, 4600000.0], [30.0, -30.0]))
        );
        assert_eq!(read_nodata(&path).unwrap().as_deref(), Some("-32768"));
    }

    #[test]
    fn test_inversion_output_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.tif");
        let inversion = Inversion {
            width: 2,
            height: 1,
            bands: vec![vec![0.5, -1.0], vec![12.0, -1.0]],
            stats: Default::default(),
        };
        let names = vec!["lai".to_string(), "mae".to_string()];
        write_inversion(&path, &inversion, &names, &GeoReference::default()).unwrap();

        let (w, h, bands) = read_f32_bands(&path).unwrap();
        assert_eq!((w, h), (2, 1));
        assert_eq!(bands, inversion.bands);
        assert_eq!(read_nodata(&path).unwrap().as_deref(), Some("-1"));
    }

    #[test]
    fn test_output_is_one_multiband_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.tif");
        let inversion = Inversion {
            width: 3,
            height: 2,
            bands: vec![vec![0.1; 6], vec![40.0; 6], vec![12.5; 6]],
            stats: Default::default(),
        };
        let names = vec!["lai".to_string(), "cab".to_string(), "mae".to_string()];
        write_inversion(&path, &inversion, &names, &georef()).unwrap();

        let mut decoder = Decoder::new(BufReader::new(File::open(&path).unwrap())).unwrap();
        assert_eq!(decoder.dimensions().unwrap(), (3, 2));
        let spp = decoder.find_tag(Tag::SamplesPerPixel).unwrap().unwrap();
        assert_eq!(spp.into_u16().unwrap(), 3);
        assert!(!decoder.more_images());

        let metadata = read_gdal_metadata(&path).unwrap().unwrap();
        assert!(metadata.contains(r#"sample="0" role="description">lai<"#), "{metadata}");
        assert!(metadata.contains(r#"sample="2" role="description">mae<"#), "{metadata}");

        let (_, _, bands) = read_f32_bands(&path).unwrap();
        assert_eq!(bands, inversion.bands);
    }

    #[test]
    fn test_tall_image_spans_several_strips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tall.tif");
        // 8 KiB rows of two bands, more than one strip
        let (width, height) = (2048, 300);
        let bands: Vec<Vec<i16>> = (0..2)
            .map(|b| (0..width * height).map(|i| ((i * 7 + b) % 3000) as i16).collect())
            .collect();
        let block = PixelBlock::new(width, height, bands).unwrap();
        write_pixel_block(&path, &block, &GeoReference::default()).unwrap();

        let raster = read_raster(&path).unwrap();
        assert_eq!(raster.block, block);
        assert!(raster.georef.is_empty());
    }

    #[test]
    fn test_reduced_resolution_pages_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overview.tif");
        {
            let mut file = BufWriter::new(File::create(&path).unwrap());
            let mut tiff = TiffEncoder::new(&mut file).unwrap();
            tiff.write_image::<colortype::Gray32Float>(2, 2, &[1.0, 2.0, 3.0, 4.0])
                .unwrap();
            let mut overview = tiff.new_image::<colortype::Gray32Float>(1, 1).unwrap();
            overview
                .encoder()
                .write_tag(Tag::NewSubfileType, 1u32)
                .unwrap();
            overview.write_data(&[2.5]).unwrap();
        }

        let (w, h, bands) = read_f32_bands(&path).unwrap();
        assert_eq!((w, h), (2, 2));
        assert_eq!(bands, vec![vec![1.0, 2.0, 3.0, 4.0]]);
    }

    #[test]
    fn test_band_metadata_escapes_names() {
        let xml = band_metadata(&["a<b".to_string(), "c&d".to_string()]);
        assert!(xml.starts_with("<GDALMetadata>"));
        assert!(xml.contains(">a&lt;b</Item>"));
        assert!(xml.contains(r#"sample="1" role="description">c&amp;d<"#));
    }

    #[test]
    fn test_widening_conversions() {
        assert_eq!(to_i16(DecodingResult::U8(vec![0, 255])).unwrap(), vec![0, 255]);
        assert_eq!(
            to_i16(DecodingResult::U16(vec![5, 40000])).unwrap(),
            vec![5, i16::MAX]
        );
        assert!(matches!(
            to_i16(DecodingResult::F32(vec![1.0])),
            Err(Error::UnsupportedSampleType(_))
        ));
        assert_eq!(sample_type_name(&DecodingResult::I16(vec![])), "Int16");
        assert_eq!(sample_type_name(&DecodingResult::U8(vec![])), "Byte");
    }
}
