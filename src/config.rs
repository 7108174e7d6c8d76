//! YAML configuration shared by every tool.
//!
//! One file carries the sections for all stages; each binary reads the parts
//! it needs and reports missing keys as [`AgriError::Config`].

use crate::types::{AgriError, AgriResult};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_ODATA_URL: &str = "https://catalogue.dataspace.copernicus.eu/odata/v1/Products";
pub const DEFAULT_DOWNLOAD_URL: &str =
    "https://zipper.dataspace.copernicus.eu/odata/v1/Products({})/$value";
pub const DEFAULT_TOKEN_URL: &str =
    "https://identity.dataspace.copernicus.eu/auth/realms/CDSE/protocol/openid-connect/token";
pub const DEFAULT_EE_URL: &str = "https://earthengine.googleapis.com";
pub const DEFAULT_S2_SR_COLLECTION: &str = "COPERNICUS/S2_SR_HARMONIZED";
pub const DEFAULT_S2_CLOUD_COLLECTION: &str = "COPERNICUS/S2_CLOUD_PROBABILITY";

/// Hour (UTC) used when `sentinel1.descending_hour` is absent.
///
/// Scene discovery historically tested hour 6 and the statistics step hour 5.
pub const FALLBACK_DESCENDING_HOUR: u32 = 6;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    pub sentinel1: Option<Sentinel1Config>,
    pub sentinel2: Option<Sentinel2Config>,
    pub copernicus_credentials: Option<Credentials>,
    #[serde(rename = "pre-processing")]
    pub pre_processing: Option<serde_yaml::Value>,

    /// Directory of the config file; relative paths are resolved against it
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputConfig {
    pub aoi_path_total: Option<PathBuf>,
    pub aoi_path: Option<PathBuf>,
    pub aoi_layer: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub cloud_threshold: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    pub base_dir: Option<PathBuf>,
    pub s1_csv_pattern: Option<String>,
    pub s1_csv: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sentinel1Config {
    #[serde(default = "default_satellite")]
    pub satellite: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    pub polarisation: Option<String>,
    pub rel_orbit: Option<u32>,
    pub descending_hour: Option<u32>,
    #[serde(default)]
    pub odata: ODataConfig,
    pub download_url: Option<String>,
    pub download_dir: Option<PathBuf>,
}

impl Default for Sentinel1Config {
    fn default() -> Self {
        Self {
            satellite: default_satellite(),
            mode: default_mode(),
            level: default_level(),
            collection: default_collection(),
            polarisation: None,
            rel_orbit: None,
            descending_hour: None,
            odata: ODataConfig::default(),
            download_url: None,
            download_dir: None,
        }
    }
}

fn default_satellite() -> String {
    "BOTH".to_string()
}

fn default_mode() -> String {
    "IW".to_string()
}

fn default_level() -> String {
    "SLC".to_string()
}

fn default_collection() -> String {
    "SENTINEL-1".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ODataConfig {
    #[serde(default = "default_odata_url")]
    pub base_url: String,
    #[serde(default = "default_orderby")]
    pub orderby: String,
    #[serde(default = "default_top")]
    pub top: u32,
}

impl Default for ODataConfig {
    fn default() -> Self {
        Self {
            base_url: default_odata_url(),
            orderby: default_orderby(),
            top: default_top(),
        }
    }
}

fn default_odata_url() -> String {
    DEFAULT_ODATA_URL.to_string()
}

fn default_orderby() -> String {
    "ContentDate/Start".to_string()
}

fn default_top() -> u32 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sentinel2Config {
    #[serde(default = "default_sr_collection")]
    pub sr_collection: String,
    #[serde(default = "default_cloud_collection")]
    pub cloud_probability_collection: String,
    pub cloud_threshold: Option<f64>,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub earth_engine: EarthEngineConfig,
}

impl Default for Sentinel2Config {
    fn default() -> Self {
        Self {
            sr_collection: default_sr_collection(),
            cloud_probability_collection: default_cloud_collection(),
            cloud_threshold: None,
            scale: default_scale(),
            earth_engine: EarthEngineConfig::default(),
        }
    }
}

fn default_sr_collection() -> String {
    DEFAULT_S2_SR_COLLECTION.to_string()
}

fn default_cloud_collection() -> String {
    DEFAULT_S2_CLOUD_COLLECTION.to_string()
}

fn default_scale() -> f64 {
    10.0
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EarthEngineConfig {
    pub project: Option<String>,
    pub base_url: Option<String>,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub token_url: Option<String>,
}

impl Config {
    /// Load and parse a config file
    pub fn load<P: AsRef<Path>>(path: P) -> AgriResult<Self> {
        let path = path.as_ref();
        log::info!("Loading config: {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            AgriError::Config(format!("Cannot read config {}: {}", path.display(), e))
        })?;

        let mut config = Self::from_yaml(&content)?;
        let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        config.base_dir = absolute
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(config)
    }

    /// Parse config content; relative paths resolve against the working directory
    pub fn from_yaml(content: &str) -> AgriResult<Self> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.base_dir = PathBuf::from(".");
        Ok(config)
    }

    /// Fail unless every named top-level section is present
    pub fn require_sections(&self, sections: &[&str]) -> AgriResult<()> {
        for section in sections {
            let present = match *section {
                "input" | "output" => true,
                "sentinel1" => self.sentinel1.is_some(),
                "sentinel2" => self.sentinel2.is_some(),
                "copernicus_credentials" => self.copernicus_credentials.is_some(),
                "pre-processing" => self.pre_processing.is_some(),
                other => {
                    return Err(AgriError::Config(format!("Unknown config section '{}'", other)))
                }
            };
            if !present {
                return Err(AgriError::Config(format!(
                    "Missing required section '{}' in config file",
                    section
                )));
            }
        }
        Ok(())
    }

    /// Resolve a path from the config against the config directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn sentinel1(&self) -> Sentinel1Config {
        self.sentinel1.clone().unwrap_or_default()
    }

    pub fn sentinel2(&self) -> Sentinel2Config {
        self.sentinel2.clone().unwrap_or_default()
    }

    /// Resolved `input.aoi_path_total`
    pub fn aoi_path_total(&self) -> AgriResult<PathBuf> {
        self.input
            .aoi_path_total
            .as_deref()
            .map(|p| self.resolve(p))
            .ok_or_else(|| AgriError::Config("Missing key 'input.aoi_path_total'".to_string()))
    }

    /// Resolved `input.aoi_path`
    pub fn aoi_path(&self) -> AgriResult<PathBuf> {
        self.input
            .aoi_path
            .as_deref()
            .map(|p| self.resolve(p))
            .ok_or_else(|| AgriError::Config("Missing key 'input.aoi_path'".to_string()))
    }

    /// Resolved `output.base_dir`
    pub fn output_dir(&self) -> AgriResult<PathBuf> {
        self.output
            .base_dir
            .as_deref()
            .map(|p| self.resolve(p))
            .ok_or_else(|| AgriError::Config("Missing key 'output.base_dir'".to_string()))
    }

    /// Cloud threshold from `input`, falling back to `sentinel2`
    pub fn cloud_threshold(&self) -> AgriResult<f64> {
        self.input
            .cloud_threshold
            .or_else(|| self.sentinel2.as_ref().and_then(|s2| s2.cloud_threshold))
            .ok_or_else(|| AgriError::Config("Missing key 'input.cloud_threshold'".to_string()))
    }

    /// `input.start_date`
    pub fn start_date(&self) -> AgriResult<NaiveDate> {
        self.input
            .start_date
            .ok_or_else(|| AgriError::Config("Missing key 'input.start_date'".to_string()))
    }

    /// `input.end_date`
    pub fn end_date(&self) -> AgriResult<NaiveDate> {
        self.input
            .end_date
            .ok_or_else(|| AgriError::Config("Missing key 'input.end_date'".to_string()))
    }

    /// Configured descending-pass hour, or the fallback with a warning
    pub fn descending_hour(&self) -> AgriResult<u32> {
        match self.sentinel1.as_ref().and_then(|s1| s1.descending_hour) {
            Some(hour) => validate_hour(hour),
            None => {
                log::warn!(
                    "sentinel1.descending_hour not set; assuming {} UTC (earlier scripts disagreed between 5 and 6)",
                    FALLBACK_DESCENDING_HOUR
                );
                Ok(FALLBACK_DESCENDING_HOUR)
            }
        }
    }

    /// Start and end dates as `YYYYMMDD`
    pub fn compact_dates(&self) -> AgriResult<(String, String)> {
        Ok((
            self.start_date()?.format("%Y%m%d").to_string(),
            self.end_date()?.format("%Y%m%d").to_string(),
        ))
    }
}

/// Reject hours outside `0..=23`
pub fn validate_hour(hour: u32) -> AgriResult<u32> {
    if hour > 23 {
        return Err(AgriError::Config(format!(
            "sentinel1.descending_hour must be within 0..=23, got {}",
            hour
        )));
    }
    Ok(hour)
}
