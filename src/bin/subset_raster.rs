//! Clip a multi-band raster to KML field polygons.

use agrisat::core::subset;
use agrisat::io::aoi;
use agrisat::logging;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "subset_raster", version, about = "Subset raster by KML polygon")]
struct Args {
    /// Path to config file (accepted for pipeline compatibility)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to input raster
    #[arg(long)]
    input: PathBuf,

    /// KML file, or with --per_aoi a directory of KML files
    #[arg(long)]
    kml: PathBuf,

    /// Output GeoTIFF, or with --per_aoi the output directory
    #[arg(long)]
    output: PathBuf,

    /// Write one subset per AOI
    #[arg(long = "per_aoi")]
    per_aoi: bool,

    /// Log file (appended)
    #[arg(long)]
    log: Option<PathBuf>,
}

fn run(args: &Args) -> Result<()> {
    if let Some(config) = &args.config {
        log::debug!("Config: {}", config.display());
    }

    if args.per_aoi {
        let aois = aoi::load_per_aoi(&args.kml)
            .with_context(|| format!("Cannot read AOIs from {}", args.kml.display()))?;
        log::info!("{} AOIs loaded from {}", aois.len(), args.kml.display());
        subset::subset_per_aoi(&args.input, &aois, &args.output)?;
    } else {
        let polygons = aoi::load_multipolygon(&args.kml)
            .with_context(|| format!("Cannot read KML {}", args.kml.display()))?;
        subset::subset_raster(&args.input, &polygons, &args.output)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init_or_console("SUBSET", args.log.as_deref(), None);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}
