//! Core processing: geometry, scene naming, bursts, subsets and statistics

pub mod bursts;
pub mod geometry;
pub mod ndvi;
pub mod scene;
pub mod stats;
pub mod subset;

// Re-export main types
pub use bursts::{BurstAnalysisParams, BurstAnalyzer, BurstFootprint};
pub use geometry::{MultiPolygon, Polygon};
pub use ndvi::{NdviExportParams, NdviExporter};
pub use scene::SceneName;
pub use stats::{BandStats, NdviStatsRecord, S1StatsRecord, S1StatsRequest};
pub use subset::{subset_per_aoi, subset_raster, SubsetOutcome};
