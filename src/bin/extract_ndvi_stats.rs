//! Extract NDVI statistics from a directory of daily NDVI GeoTIFFs.

use agrisat::core::stats;
use agrisat::io::append_records;
use agrisat::{logging, Config};
use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "extract_ndvi_stats", version, about = "Extract NDVI statistics from Sentinel-2 GeoTIFF files")]
struct Args {
    /// Path to config file
    #[arg(long)]
    config: PathBuf,

    /// Directory containing NDVI_<date>_<scene>.tif files
    #[arg(long = "input_dir")]
    input_dir: PathBuf,

    /// Output CSV file or directory (default: output.base_dir)
    #[arg(long = "output_csv")]
    output_csv: Option<PathBuf>,

    /// Field identifier added as a column
    #[arg(long = "field_id")]
    field_id: Option<String>,

    /// Log file (appended)
    #[arg(long)]
    log: Option<PathBuf>,
}

fn run(args: &Args) -> Result<()> {
    let config = Config::load(&args.config)?;
    let default_name = || -> Result<String> {
        let (start, end) = config.compact_dates()?;
        Ok(stats::ndvi_csv_name(&start, &end))
    };

    let records = stats::extract_ndvi_directory(&args.input_dir, args.field_id.as_deref())?;
    if records.is_empty() {
        bail!("No valid statistics extracted");
    }

    let output_csv = match &args.output_csv {
        Some(path) if path.is_dir() => path.join(default_name()?),
        Some(path) => path.clone(),
        None => config.output_dir()?.join(default_name()?),
    };
    log::info!("Saving NDVI statistics to: {}", output_csv.display());
    append_records(&output_csv, &records)?;
    log::info!("Successfully processed {} scenes", records.len());
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init_or_console("NDVI_STATS", args.log.as_deref(), None);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Failed to process NDVI statistics: {:#}", e);
            ExitCode::from(1)
        }
    }
}
