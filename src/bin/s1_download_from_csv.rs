//! Download Sentinel-1 products from the Copernicus Data Space and repackage
//! them around their `.SAFE` folder.

use agrisat::config::{DEFAULT_DOWNLOAD_URL, DEFAULT_TOKEN_URL};
use agrisat::io::{catalog, download, ProductDownloader};
use agrisat::{logging, Config};
use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "s1_download_from_csv", version, about = "Download Sentinel-1 products")]
#[command(group(ArgGroup::new("source").required(true).args(["product_id", "csv"])))]
struct Args {
    /// Path to YAML config file
    #[arg(long)]
    config: PathBuf,

    /// Product id (UUID) to download
    #[arg(long = "product_id")]
    product_id: Option<String>,

    /// Scene table with an `Id` column; every id is downloaded
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Output directory (default: sentinel1.download_dir, else `.`)
    #[arg(long = "output_dir")]
    output_dir: Option<PathBuf>,

    /// Log file (appended)
    #[arg(long)]
    log: Option<PathBuf>,
}

fn run(args: &Args) -> Result<()> {
    let config = Config::load(&args.config)?;
    let credentials = config.copernicus_credentials.clone().unwrap_or_default();
    let (Some(username), Some(password)) = (credentials.username, credentials.password) else {
        bail!("Missing copernicus_credentials.username or copernicus_credentials.password in config");
    };

    let ids = match (&args.product_id, &args.csv) {
        (Some(id), _) => vec![id.clone()],
        (None, Some(csv)) => catalog::read_scene_ids(csv)
            .with_context(|| format!("Cannot read scene ids from {}", csv.display()))?,
        (None, None) => bail!("One of --product_id or --csv is required"),
    };

    let s1 = config.sentinel1();
    let output_dir = match (&args.output_dir, &s1.download_dir) {
        (Some(dir), _) => dir.clone(),
        (None, Some(dir)) => config.resolve(dir),
        (None, None) => PathBuf::from("."),
    };

    let token_url = credentials.token_url.as_deref().unwrap_or(DEFAULT_TOKEN_URL);
    let token = download::get_access_token(token_url, &username, &password)
        .context("Authentication failed")?;

    let url_template = s1.download_url.as_deref().unwrap_or(DEFAULT_DOWNLOAD_URL);
    let downloader = ProductDownloader::new(url_template, token)?;

    let mut failures = 0;
    for id in &ids {
        match downloader.download(id, &output_dir) {
            Ok(path) => log::info!("Product {} saved to {}", id, path.display()),
            Err(e) => {
                log::error!("Product {}: {}", id, e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} downloads failed", failures, ids.len());
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init_or_console("DOWNLOAD", args.log.as_deref(), None);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}
