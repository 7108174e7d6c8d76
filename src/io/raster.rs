//! GDAL raster access shared by the subset and statistics steps.

use crate::types::{AgriError, AgriResult, GeoTransform};
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use std::path::Path;

/// Raster opened for reading
pub struct RasterSource {
    dataset: Dataset,
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    pub geo_transform: GeoTransform,
    /// Projection WKT; empty when the raster has no CRS
    pub projection: String,
}

impl RasterSource {
    pub fn open<P: AsRef<Path>>(path: P) -> AgriResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AgriError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Raster not found: {}", path.display()),
            )));
        }

        let dataset = Dataset::open(path)?;
        let (width, height) = dataset.raster_size();
        let band_count = dataset.raster_count().max(0) as usize;
        let geo_transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let projection = dataset.projection();

        Ok(Self {
            dataset,
            width,
            height,
            band_count,
            geo_transform,
            projection,
        })
    }

    /// Spatial reference of the raster, if any
    pub fn spatial_ref(&self) -> Option<SpatialRef> {
        if self.projection.trim().is_empty() {
            return None;
        }
        self.dataset.spatial_ref().ok()
    }

    /// Nodata value of a 1-based band
    pub fn no_data(&self, band: usize) -> AgriResult<Option<f64>> {
        let rasterband = self.dataset.rasterband(band as isize)?;
        Ok(rasterband.no_data_value())
    }

    /// Read a full 1-based band as `(rows, cols)`
    pub fn read_band(&self, band: usize) -> AgriResult<Array2<f64>> {
        self.read_window(band, (0, 0), (self.width, self.height))
    }

    /// Read a window of a 1-based band; `offset` and `size` are `(col, row)`
    pub fn read_window(
        &self,
        band: usize,
        offset: (usize, usize),
        size: (usize, usize),
    ) -> AgriResult<Array2<f64>> {
        if band == 0 || band > self.band_count {
            return Err(AgriError::InvalidFormat(format!(
                "Band {} out of range (raster has {} bands)",
                band, self.band_count
            )));
        }

        let rasterband = self.dataset.rasterband(band as isize)?;
        let buffer = rasterband.read_as::<f64>(
            (offset.0 as isize, offset.1 as isize),
            size,
            size,
            None,
        )?;

        Array2::from_shape_vec((size.1, size.0), buffer.data)
            .map_err(|e| AgriError::Processing(format!("Failed to reshape band {}: {}", band, e)))
    }
}

/// Write bands as a float32 GeoTIFF with the given georeferencing
pub fn write_geotiff<P: AsRef<Path>>(
    output_path: P,
    bands: &[Array2<f32>],
    transform: &GeoTransform,
    projection: &str,
    no_data: f64,
) -> AgriResult<()> {
    let output_path = output_path.as_ref();
    let first = bands
        .first()
        .ok_or_else(|| AgriError::Processing("No bands to write".to_string()))?;
    let (height, width) = first.dim();
    if bands.iter().any(|b| b.dim() != (height, width)) {
        return Err(AgriError::Processing(
            "All bands must share the same shape".to_string(),
        ));
    }

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    log::info!(
        "Writing GeoTIFF {} ({}x{}, {} bands)",
        output_path.display(),
        width,
        height,
        bands.len()
    );

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset = driver.create_with_band_type::<f32, _>(
        output_path,
        width as isize,
        height as isize,
        bands.len() as isize,
    )?;

    dataset.set_geo_transform(&transform.to_gdal())?;
    if !projection.trim().is_empty() {
        dataset.set_projection(projection)?;
    }

    for (index, band) in bands.iter().enumerate() {
        let mut rasterband = dataset.rasterband(index as isize + 1)?;
        let data: Vec<f32> = band.iter().cloned().collect();
        let buffer = Buffer::new((width, height), data);
        rasterband.write((0, 0), (width, height), &buffer)?;
        rasterband.set_no_data_value(Some(no_data))?;
    }

    Ok(())
}
