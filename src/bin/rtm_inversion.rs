//! Invert a multi-band raster against a simulated lookup table.
//!
//! Usage: rtm-inversion -l LUT.csv -s simulations.csv -i input.tif -o output.tif [-a 0.01] [-n 100]
//!
//! Use `-a 0` to disable the accuracy check; this brute-forces the inversion.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rtm_inversion::raster::{read_raster, write_inversion};
use rtm_inversion::{InversionConfig, LookupTable, TableOptions, DEFAULT_SCALE_FACTOR};

#[derive(Parser)]
#[command(
    name = "rtm-inversion",
    about = "Per-pixel lookup-table inversion of a multi-band raster",
    after_help = "Use -a 0 to disable the accuracy check; this brute-forces the inversion."
)]
struct Args {
    /// Parameter table (one row per simulated state)
    #[arg(short = 'l', long = "lut")]
    lut: PathBuf,

    /// Simulated observations (one row per state, one column per band)
    #[arg(short = 's', long = "simulations")]
    simulations: PathBuf,

    /// Input raster (Int16)
    #[arg(short = 'i', long)]
    input: PathBuf,

    /// Output raster (Float32, parameters + MAE)
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Inversion stops when this MAE is reached
    #[arg(short = 'a', long, default_value_t = 0.01)]
    accuracy: f32,

    /// Inversion stops when this many rows have been drawn
    #[arg(short = 'n', long = "max-iterations", default_value_t = 100)]
    max_iterations: u32,

    /// Factor applied to the simulated observations
    #[arg(long, default_value_t = DEFAULT_SCALE_FACTOR)]
    scale: f64,

    /// Seed for the random row draws (default: system clock)
    #[arg(long)]
    seed: Option<u64>,

    /// The parameter table has a header row
    #[arg(long)]
    lut_header: bool,

    /// The simulation table has a header row
    #[arg(long)]
    simulations_header: bool,

    /// Field delimiter of both tables
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Binary lookup-table cache; loaded if present and newer than both tables,
    /// (re)written otherwise
    #[arg(long)]
    lut_cache: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    anyhow::ensure!(
        args.delimiter.is_ascii(),
        "delimiter must be a single ASCII character"
    );

    let config = InversionConfig {
        accuracy: args.accuracy,
        max_iterations: args.max_iterations,
        scale_factor: args.scale,
    };
    let policy = config.policy();

    let lut = load_lut(&args, &config)?;

    let raster = read_raster(&args.input)
        .with_context(|| format!("could not read {}", args.input.display()))?;
    lut.check_band_count(raster.block.nband())
        .context("input raster does not match the simulations")?;

    let seed = args.seed.unwrap_or_else(clock_seed);
    info!("Search policy: {:?}, seed {}", policy, seed);
    let mut rng = StdRng::seed_from_u64(seed);

    let inversion = lut.invert(&raster.block, &policy, &mut rng)?;

    if raster.georef.is_empty() {
        warn!("{} carries no georeferencing", args.input.display());
    }
    write_inversion(
        &args.output,
        &inversion,
        &lut.output_band_names(),
        &raster.georef,
    )
    .with_context(|| format!("unable to write {}", args.output.display()))?;

    Ok(())
}

fn load_lut(args: &Args, config: &InversionConfig) -> Result<LookupTable> {
    if let Some(cache) = &args.lut_cache {
        let sources = [args.lut.as_path(), args.simulations.as_path()];
        let cached = LookupTable::load_cache(cache, &sources, config.scale_factor)
            .with_context(|| format!("could not use LUT cache {}", cache.display()))?;
        if let Some(lut) = cached {
            return Ok(lut);
        }
    }

    let delimiter = args.delimiter as u8;
    let lut_options = TableOptions {
        delimiter,
        has_col_names: args.lut_header,
        ..Default::default()
    };
    let sim_options = TableOptions {
        delimiter,
        has_col_names: args.simulations_header,
        ..Default::default()
    };
    let lut = LookupTable::load_tables(
        &args.lut,
        &lut_options,
        &args.simulations,
        &sim_options,
        config.scale_factor,
    )
    .with_context(|| {
        format!(
            "could not build LUT from {} and {}",
            args.lut.display(),
            args.simulations.display()
        )
    })?;

    if let Some(cache) = &args.lut_cache {
        lut.save_to_file(cache)
            .with_context(|| format!("could not write LUT cache {}", cache.display()))?;
    }
    Ok(lut)
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
