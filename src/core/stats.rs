//! Per-field band statistics for Sentinel-1 subsets and Sentinel-2 NDVI rasters.

use crate::core::scene::{orbit_direction, SceneName};
use crate::io::csv_table::StatsRecord;
use crate::io::raster::RasterSource;
use crate::types::{parse_acquisition_time, AgriError, AgriResult, OrbitDirection, StatsKind};
use chrono::{NaiveDate, NaiveDateTime};
use ndarray::Array2;
use regex::Regex;
use std::path::{Path, PathBuf};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Summary statistics of one band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandStats {
    pub mean: f64,
    /// Population variance
    pub variance: f64,
    pub min: f64,
    pub max: f64,
}

impl BandStats {
    /// `None` for an empty slice
    pub fn compute(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        Some(Self {
            mean,
            variance,
            min,
            max,
        })
    }
}

/// Finite pixels that are not the nodata value
pub fn valid_pixels(band: &Array2<f64>, no_data: Option<f64>) -> Vec<f64> {
    band.iter()
        .copied()
        .filter(|v| v.is_finite())
        .filter(|v| no_data.map_or(true, |nd| nd.is_nan() || *v != nd))
        .collect()
}

/// Statistics of a 1-based band with nodata and non-finite pixels removed
pub fn band_stats(source: &RasterSource, band: usize) -> AgriResult<Option<BandStats>> {
    let data = source.read_band(band)?;
    let no_data = source.no_data(band)?;
    if let Some(nd) = no_data {
        log::debug!("Band {} nodata value: {}", band, nd);
    }
    Ok(BandStats::compute(&valid_pixels(&data, no_data)))
}

/// One row of the Sentinel-1 statistics table
#[derive(Debug, Clone)]
pub struct S1StatsRecord {
    pub kind: StatsKind,
    /// Statistics in band order, paired with the band name
    pub bands: Vec<(&'static str, BandStats)>,
    pub scene_id: String,
    pub field_id: String,
    pub acquisition_time: NaiveDateTime,
    pub orbit_direction: OrbitDirection,
    pub relative_orbit: Option<u32>,
}

impl StatsRecord for S1StatsRecord {
    fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self
            .bands
            .iter()
            .flat_map(|(name, _)| {
                ["mean", "variance", "min", "max"]
                    .into_iter()
                    .map(move |stat| format!("{}_{}", stat, name))
            })
            .collect();
        columns.extend(
            [
                "scene_id",
                "field_id",
                "acquisition_time",
                "data_type",
                "orbit_direction",
                "relative_orbit",
            ]
            .map(str::to_string),
        );
        columns
    }

    fn values(&self) -> Vec<String> {
        let mut values: Vec<String> = self
            .bands
            .iter()
            .flat_map(|(_, s)| [s.mean, s.variance, s.min, s.max].map(|v| v.to_string()))
            .collect();
        values.push(self.scene_id.clone());
        values.push(self.field_id.clone());
        values.push(self.acquisition_time.format(TIME_FORMAT).to_string());
        values.push(self.kind.to_string());
        values.push(self.orbit_direction.to_string());
        values.push(self.relative_orbit.map(|r| r.to_string()).unwrap_or_default());
        values
    }
}

/// Inputs of one Sentinel-1 extraction
#[derive(Debug, Clone)]
pub struct S1StatsRequest {
    pub raster: PathBuf,
    pub scene_id: String,
    pub field_id: String,
    pub acquisition_time: String,
    pub descending_hour: u32,
}

/// Reject a row when any band mean is exactly zero
pub fn check_zero_means(scene_id: &str, field_id: &str, bands: &[(&'static str, BandStats)]) -> AgriResult<()> {
    if !bands.iter().any(|(_, s)| s.mean == 0.0) {
        return Ok(());
    }
    let means: Vec<String> = bands
        .iter()
        .map(|(name, s)| format!("mean_{} = {}", name, s.mean))
        .collect();
    let message = format!(
        "Scene {}, field {}: {}. At least one band mean is 0, possible edge case",
        scene_id,
        field_id,
        means.join(", ")
    );
    log::error!("{}", message);
    Err(AgriError::Rejected(message))
}

/// Compute the statistics row of a backscatter or poldecomp subset
pub fn extract_s1_stats(request: &S1StatsRequest) -> AgriResult<S1StatsRecord> {
    let file_name = request
        .raster
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let kind = StatsKind::from_file_name(&file_name);
    log::info!("Input file: {} ({})", request.raster.display(), kind);

    let source = RasterSource::open(&request.raster)?;
    let names = kind.band_names();
    if source.band_count < names.len() {
        return Err(AgriError::InvalidFormat(format!(
            "{} raster needs {} bands, {} has {}",
            kind,
            names.len(),
            file_name,
            source.band_count
        )));
    }

    let mut bands = Vec::with_capacity(names.len());
    for (index, name) in names.iter().enumerate() {
        let stats = band_stats(&source, index + 1)?.ok_or_else(|| {
            AgriError::EmptyResult(format!("band {} of {} has no valid pixels", name, file_name))
        })?;
        log::info!("{} range: {} to {}", name, stats.min, stats.max);
        bands.push((*name, stats));
    }

    check_zero_means(&request.scene_id, &request.field_id, &bands)?;

    let acquisition_time = parse_acquisition_time(&request.acquisition_time)?;
    let relative_orbit = SceneName::parse(&request.scene_id)
        .ok()
        .and_then(|scene| scene.relative_orbit());
    if relative_orbit.is_none() {
        log::warn!("No relative orbit derivable from scene id {}", request.scene_id);
    }

    log::info!("Statistics computed successfully for {}", request.scene_id);
    Ok(S1StatsRecord {
        kind,
        bands,
        scene_id: request.scene_id.clone(),
        field_id: request.field_id.clone(),
        orbit_direction: orbit_direction(&acquisition_time, request.descending_hour),
        acquisition_time,
        relative_orbit,
    })
}

/// Output table of one kind: `<base>_backscatter.csv` / `<base>_poldecomp.csv`.
/// A directory base gets `stats_s1` appended first.
pub fn s1_csv_path(base: &Path, kind: StatsKind) -> PathBuf {
    let base = if base.is_dir() {
        base.join("stats_s1")
    } else {
        base.to_path_buf()
    };
    let mut path = base.into_os_string();
    path.push(kind.csv_suffix());
    PathBuf::from(path)
}

/// One row of the NDVI statistics table
#[derive(Debug, Clone)]
pub struct NdviStatsRecord {
    pub stats: BandStats,
    pub scene_name: String,
    pub acquisition_date: NaiveDate,
    pub field_id: Option<String>,
}

impl StatsRecord for NdviStatsRecord {
    fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = [
            "ndvi_mean",
            "ndvi_variance",
            "ndvi_min",
            "ndvi_max",
            "scene_name",
            "acquisition_date",
        ]
        .map(str::to_string)
        .to_vec();
        if self.field_id.is_some() {
            columns.push("field_id".to_string());
        }
        columns
    }

    fn values(&self) -> Vec<String> {
        let s = &self.stats;
        let mut values: Vec<String> = [s.mean, s.variance, s.min, s.max]
            .map(|v| v.to_string())
            .to_vec();
        values.push(self.scene_name.clone());
        values.push(self.acquisition_date.format("%Y-%m-%d").to_string());
        if let Some(field_id) = &self.field_id {
            values.push(field_id.clone());
        }
        values
    }
}

/// `NDVI_<YYYY-MM-DD>_<scene>` → `(date, scene)`
pub fn parse_ndvi_file_stem(stem: &str) -> Option<(NaiveDate, String)> {
    let pattern = Regex::new(r"^NDVI_(\d{4}-\d{2}-\d{2})_(.+)$").expect("static regex");
    let captures = pattern.captures(stem)?;
    let date = NaiveDate::parse_from_str(&captures[1], "%Y-%m-%d").ok()?;
    Some((date, captures[2].to_string()))
}

/// NDVI statistics of band 1, rejected when values fall outside [-1, 1]
pub fn ndvi_stats(source: &RasterSource, scene_name: &str) -> AgriResult<BandStats> {
    let stats = band_stats(source, 1)?.ok_or_else(|| {
        AgriError::EmptyResult(format!("Scene {}: no valid NDVI data found", scene_name))
    })?;

    if stats.min < -1.0 || stats.max > 1.0 {
        return Err(AgriError::Rejected(format!(
            "Scene {}: NDVI values out of expected range [-1, 1]: min={}, max={}",
            scene_name, stats.min, stats.max
        )));
    }
    Ok(stats)
}

/// Statistics of every `NDVI_*.tif` in a directory; bad files are logged and skipped
pub fn extract_ndvi_directory(input_dir: &Path, field_id: Option<&str>) -> AgriResult<Vec<NdviStatsRecord>> {
    let mut tiffs: Vec<PathBuf> = std::fs::read_dir(input_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("tif"))
        .collect();
    tiffs.sort();

    if tiffs.is_empty() {
        log::error!("No GeoTIFF files found in {}", input_dir.display());
        return Ok(Vec::new());
    }
    log::info!("Found {} GeoTIFF files to process", tiffs.len());

    let mut records = Vec::new();
    for tiff in tiffs {
        let stem = tiff
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let Some((acquisition_date, scene_name)) = parse_ndvi_file_stem(&stem) else {
            log::error!("Could not parse filename: {}", stem);
            continue;
        };

        log::info!("Processing: {}", stem);
        let stats = RasterSource::open(&tiff).and_then(|source| ndvi_stats(&source, &scene_name));
        match stats {
            Ok(stats) => records.push(NdviStatsRecord {
                stats,
                scene_name,
                acquisition_date,
                field_id: field_id.map(str::to_string),
            }),
            Err(e) => log::error!("{}: {}", tiff.display(), e),
        }
    }
    Ok(records)
}

/// Default NDVI table name for a date range (`YYYYMMDD`)
pub fn ndvi_csv_name(start: &str, end: &str) -> String {
    format!("stats_ndvi_S2_{}_{}.csv", start, end)
}
