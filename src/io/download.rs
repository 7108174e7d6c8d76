//! Authenticated product download from the Copernicus Data Space and
//! repackaging of the archive around its `.SAFE` folder.

use crate::types::{AgriError, AgriResult};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const TOKEN_TIMEOUT: Duration = Duration::from_secs(10);
const CLIENT_ID: &str = "cdse-public";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Exchange username/password for a bearer token
pub fn get_access_token(token_url: &str, username: &str, password: &str) -> AgriResult<String> {
    log::info!("Requesting access token");

    let client = reqwest::blocking::Client::builder()
        .connect_timeout(TOKEN_TIMEOUT)
        .timeout(None)
        .build()
        .map_err(|e| AgriError::Http(format!("Failed to create HTTP client: {}", e)))?;

    let response = client
        .post(token_url)
        .form(&[
            ("client_id", CLIENT_ID),
            ("username", username),
            ("password", password),
            ("grant_type", "password"),
        ])
        .send()
        .map_err(|e| AgriError::Http(format!("Token request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(AgriError::Http(format!(
            "Token request failed with status: {}",
            response.status()
        )));
    }

    let token: TokenResponse = response
        .json()
        .map_err(|e| AgriError::Http(format!("Invalid token response: {}", e)))?;
    Ok(token.access_token)
}

/// Product download URL from a `{}` template
pub fn product_url(template: &str, product_id: &str) -> String {
    template.replacen("{}", product_id, 1)
}

/// Sentinel-1 product downloader
pub struct ProductDownloader {
    client: reqwest::blocking::Client,
    url_template: String,
    access_token: String,
}

impl ProductDownloader {
    pub fn new(url_template: &str, access_token: String) -> AgriResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(None)
            .build()
            .map_err(|e| AgriError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url_template: url_template.to_string(),
            access_token,
        })
    }

    /// Download one product and repackage it into `output_dir/<SAFE>.zip`
    pub fn download(&self, product_id: &str, output_dir: &Path) -> AgriResult<PathBuf> {
        std::fs::create_dir_all(output_dir)?;
        let url = product_url(&self.url_template, product_id);

        log::info!("Starting download for product {}", product_id);
        let mut response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .map_err(|e| AgriError::Http(format!("Download request failed: {}", e)))?;

        if response.status() != reqwest::StatusCode::OK {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            log::error!(
                "Failed to download product {}. Status code: {}",
                product_id,
                status.as_u16()
            );
            log::error!("Response content: {}", body);
            return Err(AgriError::Http(format!(
                "Download of {} failed with status {}",
                product_id, status
            )));
        }

        let total_size = response.content_length().unwrap_or(0);
        let progress = ProgressBar::new(total_size);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner} [{elapsed_precise}] [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec})")
                .map_err(|e| AgriError::Processing(format!("Bad progress template: {}", e)))?,
        );

        // Removed on drop, whatever happens below
        let mut temp_file = tempfile::NamedTempFile::new()?;
        {
            let mut writer = progress.wrap_write(temp_file.as_file_mut());
            std::io::copy(&mut response, &mut writer)?;
            writer.flush()?;
        }
        progress.finish_and_clear();
        log::info!("Download complete. Processing archive...");

        repackage_archive(temp_file.path(), product_id, output_dir)
    }
}

/// First path component ending in `.SAFE` across all archive entries
pub fn find_safe_folder(entry_names: &[String]) -> Option<String> {
    entry_names
        .iter()
        .flat_map(|name| name.split('/'))
        .find(|part| part.ends_with(".SAFE"))
        .map(str::to_string)
}

/// Entry name re-rooted at `safe_folder`, or `None` if the entry lies outside it
fn reroot(name: &str, safe_folder: &str) -> Option<String> {
    let parts: Vec<&str> = name.split('/').collect();
    let index = parts.iter().position(|p| *p == safe_folder)?;
    Some(parts[index..].join("/"))
}

/// Rewrite an archive so that every entry starts at the `.SAFE` folder.
///
/// Without a `.SAFE` folder the product id is used as the archive name and no
/// entry is carried over.
pub fn repackage_archive(source: &Path, product_id: &str, output_dir: &Path) -> AgriResult<PathBuf> {
    let file = File::open(source)?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| AgriError::InvalidFormat(format!("Failed to open ZIP: {}", e)))?;

    let names: Vec<String> = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
        .collect();

    let safe_folder = match find_safe_folder(&names) {
        Some(folder) => {
            log::info!(".SAFE folder detected: {}", folder);
            folder
        }
        None => {
            log::warn!("No .SAFE folder found in archive, using product id as folder name");
            product_id.to_string()
        }
    };

    std::fs::create_dir_all(output_dir)?;
    let output_path = output_dir.join(format!("{}.zip", safe_folder));
    let mut writer = ZipWriter::new(File::create(&output_path)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| AgriError::InvalidFormat(format!("Failed to access entry {}: {}", i, e)))?;
        let Some(new_name) = reroot(entry.name(), &safe_folder) else {
            continue;
        };

        if entry.is_dir() {
            writer
                .add_directory(new_name.trim_end_matches('/'), options)
                .map_err(|e| AgriError::Processing(format!("Failed to add directory: {}", e)))?;
        } else {
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            writer
                .start_file(new_name, options)
                .map_err(|e| AgriError::Processing(format!("Failed to add file: {}", e)))?;
            writer.write_all(&data)?;
        }
    }

    writer
        .finish()
        .map_err(|e| AgriError::Processing(format!("Failed to finalise ZIP: {}", e)))?;
    log::info!("Saved filtered zip to {}", output_path.display());
    Ok(output_path)
}
