//! Mask-and-crop of multi-band rasters to field polygons.

use crate::core::geometry::{MultiPolygon, Polygon};
use crate::io::aoi::{self, Aoi};
use crate::io::raster::{write_geotiff, RasterSource};
use crate::types::{AgriError, AgriResult, GeoTransform};
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use ndarray::Array2;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Pixel window `(col_off, row_off, width, height)`
pub type Window = (usize, usize, usize, usize);

/// Result of one successful subset
#[derive(Debug, Clone)]
pub struct SubsetOutcome {
    pub output: PathBuf,
    pub window: Window,
    pub valid_pixels: usize,
}

/// Reproject lon/lat polygons into the raster CRS
pub fn reproject_aoi(aoi: &MultiPolygon, target: &SpatialRef) -> AgriResult<MultiPolygon> {
    let source = SpatialRef::from_epsg(4326)?;
    transform_polygons(aoi, &source, target)
}

/// Transform polygons between two CRSs, both taken in `(x, y)` / lon-lat order
pub fn transform_polygons(
    aoi: &MultiPolygon,
    source: &SpatialRef,
    target: &SpatialRef,
) -> AgriResult<MultiPolygon> {
    source.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
    target.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
    let transform = CoordTransform::new(source, target)?;

    let reproject_ring = |ring: &[(f64, f64)]| -> AgriResult<Vec<(f64, f64)>> {
        let mut xs: Vec<f64> = ring.iter().map(|c| c.0).collect();
        let mut ys: Vec<f64> = ring.iter().map(|c| c.1).collect();
        let mut zs = vec![0.0; ring.len()];
        transform.transform_coords(&mut xs, &mut ys, &mut zs)?;
        Ok(xs.into_iter().zip(ys).collect())
    };

    let mut polygons = Vec::with_capacity(aoi.0.len());
    for polygon in &aoi.0 {
        let exterior = reproject_ring(&polygon.exterior)?;
        let interiors = polygon
            .interiors
            .iter()
            .map(|r| reproject_ring(r))
            .collect::<AgriResult<Vec<_>>>()?;
        polygons.push(Polygon::new(exterior, interiors));
    }
    Ok(MultiPolygon(polygons))
}

/// Pixel window covering the AOI bounds, clipped to the raster; `None` if empty
pub fn crop_window(aoi: &MultiPolygon, transform: &GeoTransform, width: usize, height: usize) -> Option<Window> {
    let bounds = aoi.bounds()?;
    let (c0, r0) = transform.geo_to_pixel(bounds.min_lon, bounds.max_lat);
    let (c1, r1) = transform.geo_to_pixel(bounds.max_lon, bounds.min_lat);

    let clamp = |v: f64, max: usize| -> usize {
        if v.is_nan() {
            0
        } else {
            v.max(0.0).min(max as f64) as usize
        }
    };
    let col_start = clamp(c0.min(c1).floor(), width);
    let col_end = clamp(c0.max(c1).ceil(), width);
    let row_start = clamp(r0.min(r1).floor(), height);
    let row_end = clamp(r0.max(r1).ceil(), height);

    if col_start >= col_end || row_start >= row_end {
        return None;
    }
    Some((col_start, row_start, col_end - col_start, row_end - row_start))
}

fn row_mask(aoi: &MultiPolygon, transform: &GeoTransform, row: usize, width: usize) -> Vec<bool> {
    (0..width)
        .map(|col| aoi.contains_point(transform.pixel_to_geo(col as f64 + 0.5, row as f64 + 0.5)))
        .collect()
}

/// `true` where the pixel centre lies inside any AOI polygon
pub fn build_mask(aoi: &MultiPolygon, transform: &GeoTransform, width: usize, height: usize) -> AgriResult<Array2<bool>> {
    #[cfg(feature = "parallel")]
    let rows: Vec<Vec<bool>> = {
        use rayon::prelude::*;
        (0..height)
            .into_par_iter()
            .map(|row| row_mask(aoi, transform, row, width))
            .collect()
    };
    #[cfg(not(feature = "parallel"))]
    let rows: Vec<Vec<bool>> = (0..height)
        .map(|row| row_mask(aoi, transform, row, width))
        .collect();

    Array2::from_shape_vec((height, width), rows.into_iter().flatten().collect())
        .map_err(|e| AgriError::Processing(format!("Mask shape error: {}", e)))
}

/// Clip a raster to the AOI polygons and write the masked crop as float32 GeoTIFF
pub fn subset_raster(input: &Path, aoi: &MultiPolygon, output: &Path) -> AgriResult<SubsetOutcome> {
    if aoi.is_empty() {
        return Err(AgriError::InvalidFormat("AOI contains no geometries".to_string()));
    }

    let source = RasterSource::open(input)?;
    log::info!(
        "Raster {}: {}x{} pixels, {} bands",
        input.display(),
        source.width,
        source.height,
        source.band_count
    );
    log::info!("Geotransform: {:?}", source.geo_transform.to_gdal());
    if !source.geo_transform.is_north_up() {
        return Err(AgriError::Processing(
            "Rotated geotransforms are not supported".to_string(),
        ));
    }

    let native_aoi = match source.spatial_ref() {
        Some(srs) => {
            log::info!("Raster CRS: {}", srs.to_proj4().unwrap_or_else(|_| "unknown".to_string()));
            reproject_aoi(aoi, &srs)?
        }
        None => {
            log::warn!("Raster has no CRS; using AOI coordinates as-is");
            aoi.clone()
        }
    };

    let window = crop_window(&native_aoi, &source.geo_transform, source.width, source.height)
        .ok_or_else(|| AgriError::NoOverlap(input.display().to_string()))?;
    let (col_off, row_off, width, height) = window;
    let transform = source.geo_transform.window(col_off, row_off);

    let mask = build_mask(&native_aoi, &transform, width, height)?;
    let valid_pixels = mask.iter().filter(|m| **m).count();
    if valid_pixels == 0 {
        return Err(AgriError::EmptyResult(format!(
            "no pixel centre of {} falls inside the AOI",
            input.display()
        )));
    }
    log::debug!("Window {:?}, {} pixels inside AOI", window, valid_pixels);

    let no_data = source.no_data(1)?.unwrap_or(f64::NAN);
    let mut bands = Vec::with_capacity(source.band_count);
    for band in 1..=source.band_count {
        let data = source.read_window(band, (col_off, row_off), (width, height))?;
        let mut clipped = data.mapv(|v| v as f32);
        ndarray::Zip::from(&mut clipped)
            .and(&mask)
            .for_each(|value, &inside| {
                if !inside {
                    *value = no_data as f32;
                }
            });
        bands.push(clipped);
    }

    write_geotiff(output, &bands, &transform, &source.projection, no_data)?;
    log::info!("Subset saved to {}", output.display());

    Ok(SubsetOutcome {
        output: output.to_path_buf(),
        window,
        valid_pixels,
    })
}

/// Output path of one AOI in multi-AOI mode
pub fn per_aoi_output(output_dir: &Path, raster: &Path, aoi_name: &str) -> PathBuf {
    let stem = raster
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "subset".to_string());
    output_dir.join(format!("{}_{}.tif", stem, aoi::sanitize_name(aoi_name)))
}

/// Sanitized AOI names, with `_2`, `_3`, ... appended until each is unique
pub fn unique_output_names(aois: &[Aoi]) -> Vec<String> {
    let mut used = HashSet::new();
    aois.iter()
        .map(|aoi| {
            let base = aoi::sanitize_name(&aoi.name);
            let mut name = base.clone();
            let mut n = 1;
            while !used.insert(name.clone()) {
                n += 1;
                name = format!("{}_{}", base, n);
            }
            if n > 1 {
                log::warn!("AOI name '{}' repeats; writing it as '{}'", aoi.name, name);
            }
            name
        })
        .collect()
}

/// Subset the raster once per AOI; individual failures are logged and skipped
pub fn subset_per_aoi(input: &Path, aois: &[Aoi], output_dir: &Path) -> AgriResult<Vec<SubsetOutcome>> {
    std::fs::create_dir_all(output_dir)?;

    let mut outcomes = Vec::new();
    for (aoi, name) in aois.iter().zip(unique_output_names(aois)) {
        let output = per_aoi_output(output_dir, input, &name);
        match subset_raster(input, &aoi.polygons, &output) {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => log::error!("AOI {}: {}", aoi.name, e),
        }
    }

    if outcomes.is_empty() {
        return Err(AgriError::EmptyResult(format!(
            "no AOI produced a subset of {}",
            input.display()
        )));
    }
    log::info!("{} of {} AOIs written", outcomes.len(), aois.len());
    Ok(outcomes)
}
