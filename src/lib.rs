//! agrisat: Sentinel-1 and Sentinel-2 acquisition and field statistics tools
//!
//! The library backs a set of standalone command-line tools: scene discovery
//! and download from the Copernicus Data Space, burst/AOI intersection,
//! raster subsetting to field polygons, statistics extraction to CSV, and
//! daily NDVI export through Earth Engine.

pub mod config;
pub mod core;
pub mod io;
pub mod logging;
pub mod types;

// Re-export main types and functions for easier access
pub use config::Config;
pub use types::{
    AgriError, AgriResult, BoundingBox, GeoTransform, OrbitDirection, Polarization, Satellite,
    StatsKind,
};
