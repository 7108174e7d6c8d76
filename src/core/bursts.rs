//! Burst footprints of IW sub-swaths and their intersection with an AOI.

use crate::core::geometry::{MultiPolygon, Polygon};
use crate::io::annotation::{AnnotationParser, GeolocationGridPoint, SwathAnnotation};
use crate::io::safe_reader::SafeReader;
use crate::types::{AgriError, AgriResult, Polarization};

/// Ground footprint of a single burst
#[derive(Debug, Clone)]
pub struct BurstFootprint {
    /// Sub-swath name, `IW1`..`IW3`
    pub swath: String,
    /// 1-based burst index within the sub-swath
    pub burst: usize,
    pub polygon: Polygon,
}

/// Parameters of the burst/sub-swath analysis
#[derive(Debug, Clone)]
pub struct BurstAnalysisParams {
    pub target_subswaths: Vec<String>,
    /// Any polarization present in the scene gives the same geometry
    pub polarization: Polarization,
}

impl Default for BurstAnalysisParams {
    fn default() -> Self {
        Self {
            target_subswaths: vec!["IW1".to_string(), "IW2".to_string(), "IW3".to_string()],
            polarization: Polarization::VH,
        }
    }
}

/// Finds which bursts of a SAFE product cover an AOI
pub struct BurstAnalyzer {
    params: BurstAnalysisParams,
}

impl BurstAnalyzer {
    pub fn new(params: BurstAnalysisParams) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(BurstAnalysisParams::default())
    }

    /// Footprints of every burst in the target sub-swaths
    pub fn footprints(&self, reader: &mut SafeReader) -> AgriResult<Vec<BurstFootprint>> {
        let mut footprints = Vec::new();
        for swath in &self.params.target_subswaths {
            match reader.read_annotation(swath, self.params.polarization) {
                Ok(annotation) => {
                    let swath_footprints = swath_footprints(swath, &annotation)?;
                    log::debug!("{}: {} bursts", swath, swath_footprints.len());
                    footprints.extend(swath_footprints);
                }
                Err(e) => log::warn!("Skipping sub-swath {}: {}", swath, e),
            }
        }

        if footprints.is_empty() {
            return Err(AgriError::InvalidFormat(format!(
                "No burst geometry found in {}",
                reader.path().display()
            )));
        }
        Ok(footprints)
    }

    /// `(swath, burst)` pairs whose footprint intersects the AOI
    pub fn intersecting_bursts(
        &self,
        reader: &mut SafeReader,
        aoi: &MultiPolygon,
    ) -> AgriResult<Vec<(String, usize)>> {
        validate_aoi(aoi)?;
        let footprints = self.footprints(reader)?;
        Ok(intersecting(&footprints, aoi))
    }
}

/// Reject empty AOIs and AOIs with degenerate polygons
pub fn validate_aoi(aoi: &MultiPolygon) -> AgriResult<()> {
    if aoi.is_empty() {
        return Err(AgriError::InvalidFormat(
            "AOI file is empty - no geometries found".to_string(),
        ));
    }
    if !aoi.0.iter().all(Polygon::is_valid) {
        return Err(AgriError::InvalidFormat(
            "AOI contains invalid geometries".to_string(),
        ));
    }
    Ok(())
}

/// Footprints that intersect any AOI polygon
pub fn intersecting(footprints: &[BurstFootprint], aoi: &MultiPolygon) -> Vec<(String, usize)> {
    footprints
        .iter()
        .filter(|f| aoi.intersects(&f.polygon))
        .map(|f| (f.swath.clone(), f.burst))
        .collect()
}

/// Grid row whose line is nearest the target line
fn nearest_row(rows: &[(u32, Vec<GeolocationGridPoint>)], target: u64) -> &[GeolocationGridPoint] {
    rows.iter()
        .min_by_key(|(line, _)| (*line as i64 - target as i64).unsigned_abs())
        .map(|(_, row)| row.as_slice())
        .unwrap_or(&[])
}

/// Burst polygons of one sub-swath from its geolocation grid.
///
/// Burst `i` spans lines `(i-1)*lpb .. i*lpb`; its outline runs along the grid
/// row nearest the first line and back along the row nearest the last line.
pub fn swath_footprints(swath: &str, annotation: &SwathAnnotation) -> AgriResult<Vec<BurstFootprint>> {
    let rows = AnnotationParser::grid_rows(annotation)?;
    let lines_per_burst = annotation.swath_timing.lines_per_burst as u64;
    let burst_count = AnnotationParser::burst_count(annotation);

    if lines_per_burst == 0 || burst_count == 0 {
        return Err(AgriError::InvalidFormat(format!(
            "Sub-swath {} has no bursts",
            swath
        )));
    }

    let mut footprints = Vec::with_capacity(burst_count);
    for burst in 1..=burst_count {
        let upper = nearest_row(&rows, (burst as u64 - 1) * lines_per_burst);
        let lower = nearest_row(&rows, burst as u64 * lines_per_burst);

        let mut ring: Vec<(f64, f64)> = upper.iter().map(|p| (p.longitude, p.latitude)).collect();
        ring.extend(lower.iter().rev().map(|p| (p.longitude, p.latitude)));

        footprints.push(BurstFootprint {
            swath: swath.to_uppercase(),
            burst,
            polygon: Polygon::new(ring, Vec::new()),
        });
    }
    Ok(footprints)
}
