//! Maximum-value composite of several equally shaped Int16 rasters.
//!
//! The last band of every input ranks the candidates (e.g. NDVI); per pixel
//! the input with the largest valid ranking value is copied to the output.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use rtm_inversion::raster::{read_raster, write_pixel_block};
use rtm_inversion::{max_composite, PixelBlock};

#[derive(Parser)]
#[command(
    name = "max-composite",
    about = "Per-pixel maximum-value composite selected by the last band"
)]
struct Args {
    /// Output raster
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Also write the ranking band
    #[arg(long)]
    keep_ranking_band: bool,

    /// Input rasters
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();

    let mut images = Vec::with_capacity(args.inputs.len());
    let mut georef = None;
    for path in &args.inputs {
        let raster =
            read_raster(path).with_context(|| format!("could not open {}", path.display()))?;
        georef.get_or_insert(raster.georef);
        images.push(raster.block);
    }

    let composite = max_composite(&images).context("input files have different dimensions")?;

    let composite = if args.keep_ranking_band {
        composite
    } else {
        anyhow::ensure!(
            composite.nband() > 1,
            "inputs have a single band; use --keep-ranking-band to write it"
        );
        let (width, height) = (composite.width(), composite.height());
        let mut bands = composite.into_bands();
        bands.pop();
        PixelBlock::new(width, height, bands)?
    };

    write_pixel_block(&args.output, &composite, &georef.unwrap_or_default())
        .with_context(|| format!("unable to write {}", args.output.display()))?;
    Ok(())
}
