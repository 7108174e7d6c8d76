//! Report the IW sub-swaths and bursts of a Sentinel-1 scene that intersect the AOI.
//!
//! Prints one `IWn <burst>` line per intersecting burst.

use agrisat::core::BurstAnalyzer;
use agrisat::io::{aoi, SafeReader};
use agrisat::{logging, Config};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "s1_burst_intersect", version, about = "Find bursts intersecting the AOI")]
struct Args {
    /// Path to YAML config file
    #[arg(long)]
    config: PathBuf,

    /// Path to the zipped SAFE product
    #[arg(long)]
    zip: PathBuf,

    /// Log file (appended); errors also go to `error_scenes.log` beside it
    #[arg(long)]
    log: Option<PathBuf>,
}

fn run(args: &Args) -> Result<Vec<(String, usize)>> {
    let config = Config::load(&args.config)?;
    config.require_sections(&["input", "sentinel1", "pre-processing"])?;

    let aoi_path = config.aoi_path_total()?;
    if !aoi_path.exists() {
        bail!("AOI file not found: {}", aoi_path.display());
    }
    let aoi = aoi::load_multipolygon(&aoi_path)
        .with_context(|| format!("Cannot read AOI {}", aoi_path.display()))?;

    log::info!("Processing scene {}", args.zip.display());
    let mut reader = SafeReader::new(&args.zip)?;
    let bursts = BurstAnalyzer::standard().intersecting_bursts(&mut reader, &aoi)?;

    if bursts.is_empty() {
        bail!("No intersecting bursts found for {}", args.zip.display());
    }
    Ok(bursts)
}

fn main() -> ExitCode {
    let args = Args::parse();
    let error_log = args
        .log
        .as_ref()
        .map(|log| log.with_file_name("error_scenes.log"));
    logging::init_or_console("PREPROCESS", args.log.as_deref(), error_log.as_deref());

    match run(&args) {
        Ok(bursts) => {
            for (swath, burst) in bursts {
                println!("{} {}", swath, burst);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}: {:#}", args.zip.display(), e);
            ExitCode::from(1)
        }
    }
}
