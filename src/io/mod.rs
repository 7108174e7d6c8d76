//! Input/output: AOI files, remote catalogs, archives, rasters and tables

pub mod annotation;
pub mod aoi;
pub mod catalog;
pub mod csv_table;
pub mod download;
pub mod earth_engine;
pub mod raster;
pub mod safe_reader;

pub use annotation::AnnotationParser;
pub use aoi::Aoi;
pub use catalog::{CatalogClient, CatalogProduct};
pub use csv_table::{append_records, StatsRecord};
pub use download::ProductDownloader;
pub use earth_engine::{EarthEngineClient, ExprGraph};
pub use raster::{write_geotiff, RasterSource};
pub use safe_reader::SafeReader;
