use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel-1 platform as it appears in product names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Satellite {
    S1A,
    S1B,
    /// Any other platform prefix (S1C, S1D, ...)
    Other,
}

impl Satellite {
    /// Parse the three-letter prefix of a product name
    pub fn from_prefix(prefix: &str) -> Self {
        match prefix {
            "S1A" => Satellite::S1A,
            "S1B" => Satellite::S1B,
            _ => Satellite::Other,
        }
    }

    /// Offset subtracted from the absolute orbit before folding into the repeat cycle
    pub fn orbit_offset(&self) -> Option<i64> {
        match self {
            Satellite::S1A => Some(73),
            Satellite::S1B => Some(27),
            Satellite::Other => None,
        }
    }
}

impl std::fmt::Display for Satellite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Satellite::S1A => write!(f, "S1A"),
            Satellite::S1B => write!(f, "S1B"),
            Satellite::Other => write!(f, "OTHER"),
        }
    }
}

/// Polarization channels for Sentinel-1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    VV,
    VH,
    HV,
    HH,
}

impl Polarization {
    /// Lowercase tag used in SAFE file names (`-vh-`)
    pub fn file_tag(&self) -> &'static str {
        match self {
            Polarization::VV => "vv",
            Polarization::VH => "vh",
            Polarization::HV => "hv",
            Polarization::HH => "hh",
        }
    }
}

impl std::fmt::Display for Polarization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Polarization::VV => write!(f, "VV"),
            Polarization::VH => write!(f, "VH"),
            Polarization::HV => write!(f, "HV"),
            Polarization::HH => write!(f, "HH"),
        }
    }
}

impl std::str::FromStr for Polarization {
    type Err = AgriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "VV" => Ok(Polarization::VV),
            "VH" => Ok(Polarization::VH),
            "HV" => Ok(Polarization::HV),
            "HH" => Ok(Polarization::HH),
            _ => Err(AgriError::InvalidFormat(format!("Invalid polarization: {}", s))),
        }
    }
}

/// Pass direction derived from the acquisition hour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrbitDirection {
    Ascending,
    Descending,
}

impl std::fmt::Display for OrbitDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrbitDirection::Ascending => write!(f, "Ascending"),
            OrbitDirection::Descending => write!(f, "Descending"),
        }
    }
}

/// Kind of Sentinel-1 subset raster handed to the statistics step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatsKind {
    /// Calibrated backscatter in dB: VV, VH, epsIA
    Backscatter,
    /// Polarimetric decomposition: entropy, anisotropy, alpha, epsIA
    Poldecomp,
}

impl StatsKind {
    /// Detect the kind from a raster file name
    pub fn from_file_name(name: &str) -> Self {
        if name.contains("_poldecomp_") {
            StatsKind::Poldecomp
        } else {
            StatsKind::Backscatter
        }
    }

    /// Band names in raster band order (band 1 first)
    pub fn band_names(&self) -> &'static [&'static str] {
        match self {
            StatsKind::Backscatter => &["VV", "VH", "epsIA"],
            StatsKind::Poldecomp => &["entropy", "anisotropy", "alpha", "epsIA"],
        }
    }

    /// Suffix appended to the output CSV base path
    pub fn csv_suffix(&self) -> &'static str {
        match self {
            StatsKind::Backscatter => "_backscatter.csv",
            StatsKind::Poldecomp => "_poldecomp.csv",
        }
    }
}

impl std::fmt::Display for StatsKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatsKind::Backscatter => write!(f, "backscatter"),
            StatsKind::Poldecomp => write!(f, "poldecomp"),
        }
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }
}

/// Geospatial transformation parameters (GDAL order)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    pub fn is_north_up(&self) -> bool {
        self.rotation_x == 0.0 && self.rotation_y == 0.0
    }

    /// Georeferenced coordinate of a (fractional) pixel position
    pub fn pixel_to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.top_left_x + col * self.pixel_width + row * self.rotation_x,
            self.top_left_y + col * self.rotation_y + row * self.pixel_height,
        )
    }

    /// Fractional pixel position of a coordinate; only valid for north-up rasters
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.top_left_x) / self.pixel_width,
            (y - self.top_left_y) / self.pixel_height,
        )
    }

    /// Transform of a window starting at (col_off, row_off)
    pub fn window(&self, col_off: usize, row_off: usize) -> Self {
        let (x, y) = self.pixel_to_geo(col_off as f64, row_off as f64);
        Self {
            top_left_x: x,
            top_left_y: y,
            ..*self
        }
    }
}

/// Parse an acquisition timestamp in any of the formats the pipeline hands around
pub fn parse_acquisition_time(value: &str) -> AgriResult<NaiveDateTime> {
    let value = value.trim();

    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Ok(time.with_timezone(&Utc).naive_utc());
    }

    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.fZ",
        "%Y%m%dT%H%M%S",
    ] {
        if let Ok(time) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(time);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(time) = date.and_hms_opt(0, 0, 0) {
            return Ok(time);
        }
    }

    Err(AgriError::InvalidFormat(format!(
        "Unrecognised acquisition time: {}",
        value
    )))
}

/// Error types for the acquisition and statistics tools
#[derive(Debug, thiserror::Error)]
pub enum AgriError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("XML parsing error: {0}")]
    XmlParsing(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Input shapes do not overlap raster: {0}")]
    NoOverlap(String),

    #[error("Empty result: {0}")]
    EmptyResult(String),

    #[error("Rejected: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for AgriError {
    fn from(err: reqwest::Error) -> Self {
        AgriError::Http(err.to_string())
    }
}

/// Result type for toolkit operations
pub type AgriResult<T> = Result<T, AgriError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_stats_kind_from_file_name() {
        assert_eq!(
            StatsKind::from_file_name("S1A_20230501_poldecomp_field12.tif"),
            StatsKind::Poldecomp
        );
        assert_eq!(
            StatsKind::from_file_name("S1A_20230501_dB_field12.tif"),
            StatsKind::Backscatter
        );
        assert_eq!(StatsKind::Poldecomp.band_names().len(), 4);
    }

    #[test]
    fn test_acquisition_time_formats() {
        let t = parse_acquisition_time("2023-05-01T05:45:12Z").unwrap();
        assert_eq!(t.hour(), 5);
        let t = parse_acquisition_time("20230501T174512").unwrap();
        assert_eq!(t.hour(), 17);
        let t = parse_acquisition_time("2023-05-01").unwrap();
        assert_eq!(t.hour(), 0);
        assert!(parse_acquisition_time("yesterday").is_err());
    }

    #[test]
    fn test_geo_transform_window() {
        let gt = GeoTransform::from_gdal([100.0, 10.0, 0.0, 500.0, 0.0, -10.0]);
        let w = gt.window(2, 3);
        assert_eq!(w.top_left_x, 120.0);
        assert_eq!(w.top_left_y, 470.0);
        assert_eq!(gt.geo_to_pixel(125.0, 465.0), (2.5, 3.5));
    }
}
