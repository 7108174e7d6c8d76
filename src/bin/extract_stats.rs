//! Extract backscatter or polarimetric-decomposition statistics from a field
//! subset and append them to the statistics table.

use agrisat::config::FALLBACK_DESCENDING_HOUR;
use agrisat::core::stats::{self, S1StatsRequest};
use agrisat::io::append_records;
use agrisat::{logging, Config};
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "extract_stats", version, about = "Extract statistics from subset raster")]
struct Args {
    /// Path to input raster file
    #[arg(long)]
    input: PathBuf,

    /// Scene identifier
    #[arg(long = "scene_id")]
    scene_id: String,

    /// Field identifier
    #[arg(long = "field_id")]
    field_id: String,

    /// Acquisition time (ISO 8601 or YYYYMMDDTHHMMSS)
    #[arg(long = "acquisition_time")]
    acquisition_time: String,

    /// Base path for the output CSV (without suffix)
    #[arg(long = "output_csv")]
    output_csv: PathBuf,

    /// Config file providing sentinel1.descending_hour
    #[arg(long)]
    config: Option<PathBuf>,

    /// UTC hour of descending passes (overrides the config)
    #[arg(long = "descending_hour", value_parser = clap::value_parser!(u32).range(0..24))]
    descending_hour: Option<u32>,

    /// Log file (appended)
    #[arg(long)]
    log: Option<PathBuf>,
}

fn descending_hour(args: &Args) -> Result<u32> {
    if let Some(hour) = args.descending_hour {
        return Ok(hour);
    }
    match &args.config {
        Some(path) => Ok(Config::load(path)?.descending_hour()?),
        None => {
            log::warn!(
                "No descending hour configured; assuming {} UTC",
                FALLBACK_DESCENDING_HOUR
            );
            Ok(FALLBACK_DESCENDING_HOUR)
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let request = S1StatsRequest {
        raster: args.input.clone(),
        scene_id: args.scene_id.clone(),
        field_id: args.field_id.clone(),
        acquisition_time: args.acquisition_time.clone(),
        descending_hour: descending_hour(args)?,
    };

    let record = stats::extract_s1_stats(&request)?;
    let output_csv = stats::s1_csv_path(&args.output_csv, record.kind);
    log::info!("Saving {} statistics to: {}", record.kind, output_csv.display());
    append_records(&output_csv, &[record])?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init_or_console("STATS", args.log.as_deref(), None);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Failed to extract statistics: {:#}", e);
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: [&str; 11] = [
        "extract_stats",
        "--input",
        "field.tif",
        "--scene_id",
        "S1A_X",
        "--field_id",
        "7",
        "--acquisition_time",
        "2023-05-01T05:40:12Z",
        "--output_csv",
        "stats",
    ];

    fn parse(hour: &str) -> Result<Args, clap::Error> {
        let mut argv = BASE.to_vec();
        argv.extend(["--descending_hour", hour]);
        Args::try_parse_from(argv)
    }

    #[test]
    fn test_descending_hour_range() {
        assert_eq!(parse("0").unwrap().descending_hour, Some(0));
        assert_eq!(parse("23").unwrap().descending_hour, Some(23));
        assert!(parse("24").is_err());
        assert_eq!(descending_hour(&parse("5").unwrap()).unwrap(), 5);
    }
}
