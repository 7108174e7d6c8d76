//! Export daily-averaged, cloud-filtered Sentinel-2 NDVI GeoTIFFs for the AOI.

use agrisat::config::DEFAULT_EE_URL;
use agrisat::core::{NdviExportParams, NdviExporter};
use agrisat::io::{aoi, earth_engine, EarthEngineClient};
use agrisat::{logging, AgriError, Config};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "ndvi_export", version, about = "Export daily NDVI GeoTIFFs via Earth Engine")]
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
    let s2 = config.sentinel2();

    let aoi_path = config.aoi_path()?;
    let layer = config.input.aoi_layer.as_deref();
    let polygon = aoi::first_polygon(&aoi_path, layer)
        .with_context(|| format!("Cannot read AOI {}", aoi_path.display()))?;
    let raw_name = match layer {
        Some(layer) => layer.to_string(),
        None => aoi_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "aoi".to_string()),
    };
    let aoi_name = aoi::sanitize_name(&raw_name);

    let project = s2.earth_engine.project.as_deref().ok_or_else(|| {
        AgriError::Config("Missing key 'sentinel2.earth_engine.project'".to_string())
    })?;
    let token = earth_engine::resolve_token(s2.earth_engine.access_token.as_deref())?;
    let base_url = s2.earth_engine.base_url.as_deref().unwrap_or(DEFAULT_EE_URL);
    let client = EarthEngineClient::new(base_url, project, token)?;

    let params = NdviExportParams {
        sr_collection: s2.sr_collection.clone(),
        cloud_collection: s2.cloud_probability_collection.clone(),
        cloud_threshold: config.cloud_threshold()?,
        scale: s2.scale,
        start: config.start_date()?,
        end: config.end_date()?,
        output_dir: config.output_dir()?,
    };

    let written = NdviExporter::new(&client, params).run(&aoi_name, &polygon.exterior)?;
    log::info!("NDVI export completed: {} file(s) for AOI {}", written.len(), aoi_name);
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init_or_console("NDVI_EXPORT", args.log.as_deref(), None);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Error during NDVI export: {:#}", e);
            ExitCode::from(1)
        }
    }
}
