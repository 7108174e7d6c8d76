//! Query the Copernicus catalog for Sentinel-1 scenes over the AOI and write
//! their ids to CSV.

use agrisat::io::{aoi, catalog};
use agrisat::{logging, Config};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "s1_find_ids", version, about = "Find Sentinel-1 scenes intersecting the AOI")]
struct Args {
    /// Path to YAML config file
    #[arg(long)]
    config: PathBuf,

    /// Log file (appended)
    #[arg(long)]
    log: Option<PathBuf>,
}

fn run(args: &Args) -> Result<()> {
    let config = Config::load(&args.config)?;
    let s1 = config.sentinel1();

    let aoi_path = aoi::resolve_kml_path(&config.aoi_path_total()?)?;
    let output_dir = config.output_dir()?;
    log::info!("AOI: {}", aoi_path.display());

    let wkt = aoi::load_multipolygon(&aoi_path)?.to_wkt();
    if wkt.ends_with("EMPTY") {
        log::warn!("No polygon found in {}", aoi_path.display());
    }

    let client = catalog::CatalogClient::new(&s1.odata.base_url)?;
    let products = client
        .search(&s1, &wkt, config.start_date()?, config.end_date()?)
        .context("Catalog search failed")?;
    let products = catalog::filter_products(catalog::enrich(products, config.descending_hour()?), &s1);

    if products.is_empty() {
        log::warn!("No matching Sentinel-1 scenes found.");
        return Ok(());
    }

    let (start, end) = config.compact_dates()?;
    let csv_name = match config.output.s1_csv_pattern.as_deref() {
        Some(pattern) => catalog::format_csv_name(
            pattern,
            &[
                ("satellite", s1.satellite.clone()),
                ("mode", s1.mode.clone()),
                ("level", s1.level.clone()),
                ("polarisation", s1.polarisation.clone().unwrap_or_default().replace('+', "")),
                ("start", start),
                ("end", end),
                ("rel_orbit", s1.rel_orbit.map_or_else(|| "ALL".to_string(), |r| r.to_string())),
            ],
        ),
        None => config
            .output
            .s1_csv
            .clone()
            .unwrap_or_else(|| "s1_ids.csv".to_string()),
    };

    let output_csv = output_dir.join(csv_name);
    catalog::write_scene_csv(&output_csv, &products)?;
    log::info!("Saved {} scene UUIDs to {}", products.len(), output_csv.display());
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init_or_console("FIND_IDS", args.log.as_deref(), None);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}
