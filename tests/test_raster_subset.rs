use agrisat::core::subset;
use agrisat::io::{aoi, write_geotiff, RasterSource};
use agrisat::{AgriError, GeoTransform};
use gdal::spatial_ref::SpatialRef;
use ndarray::Array2;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn kml(placemarks: &[(&str, &str)]) -> String {
    let body: String = placemarks
        .iter()
        .map(|(name, coords)| {
            format!(
                "<Placemark><name>{}</name><Polygon><outerBoundaryIs><LinearRing>\
                 <coordinates>{}</coordinates></LinearRing></outerBoundaryIs></Polygon></Placemark>",
                name, coords
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <kml xmlns=\"http://www.opengis.net/kml/2.2\"><Document>{}</Document></kml>",
        body
    )
}

const FIELD: &str = "5.021,52.041,0 5.079,52.041,0 5.021,52.089,0 5.021,52.041,0";
const FAR_AWAY: &str = "10.0,40.0,0 10.1,40.0,0 10.1,40.1,0 10.0,40.0,0";

/// 10x10 two-band WGS84 raster covering lon 5.0..5.1, lat 52.0..52.1
fn write_source(dir: &Path) -> PathBuf {
    let path = dir.join("S1A_20230501_dB.tif");
    let transform = GeoTransform::from_gdal([5.0, 0.01, 0.0, 52.1, 0.0, -0.01]);
    let wkt = SpatialRef::from_epsg(4326).unwrap().to_wkt().unwrap();
    let vv = Array2::from_shape_fn((10, 10), |(r, c)| -(r as f32) - c as f32 / 10.0 - 1.0);
    let vh = vv.mapv(|v| v - 6.0);
    write_geotiff(&path, &[vv, vh], &transform, &wkt, f64::NAN).expect("Failed to write source raster");
    path
}

#[test]
fn test_subset_writes_masked_crop() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();
    let raster = write_source(dir.path());
    let kml_path = dir.path().join("field7.kml");
    std::fs::write(&kml_path, kml(&[("field7", FIELD)])).unwrap();

    let polygons = aoi::load_multipolygon(&kml_path).unwrap();
    let output = dir.path().join("out").join("subset.tif");
    let outcome = subset::subset_raster(&raster, &polygons, &output).expect("subset");

    assert!(output.exists());
    assert!(outcome.valid_pixels > 0);
    let (_, _, width, height) = outcome.window;
    assert!(width <= 7 && height <= 6);

    let result = RasterSource::open(&output).unwrap();
    assert_eq!(result.band_count, 2);
    assert_eq!((result.width, result.height), (width, height));
    assert!(result.spatial_ref().is_some());

    let band = result.read_band(1).unwrap();
    let finite = band.iter().filter(|v| v.is_finite()).count();
    assert_eq!(finite, outcome.valid_pixels);
    assert!(band.iter().any(|v| v.is_nan()));
}

#[test]
fn test_non_overlapping_kml_fails_without_output() {
    let dir = TempDir::new().unwrap();
    let raster = write_source(dir.path());
    let kml_path = dir.path().join("far.kml");
    std::fs::write(&kml_path, kml(&[("far", FAR_AWAY)])).unwrap();

    let polygons = aoi::load_multipolygon(&kml_path).unwrap();
    let output = dir.path().join("far_subset.tif");
    let result = subset::subset_raster(&raster, &polygons, &output);

    assert!(matches!(result, Err(AgriError::NoOverlap(_))));
    assert!(!output.exists());
}

#[test]
fn test_per_aoi_subsets_skip_failures() {
    let dir = TempDir::new().unwrap();
    let raster = write_source(dir.path());
    let kml_path = dir.path().join("fields.kml");
    std::fs::write(&kml_path, kml(&[("field 7", FIELD), ("far", FAR_AWAY)])).unwrap();

    let aois = aoi::load_per_aoi(&kml_path).unwrap();
    assert_eq!(aois.len(), 2);

    let out_dir = dir.path().join("per_aoi");
    let outcomes = subset::subset_per_aoi(&raster, &aois, &out_dir).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(out_dir.join("S1A_20230501_dB_field_7.tif").exists());
    assert!(!out_dir.join("S1A_20230501_dB_far.tif").exists());

    let only_far = vec![aois[1].clone()];
    assert!(subset::subset_per_aoi(&raster, &only_far, &out_dir).is_err());
}

#[test]
fn test_sub_pixel_aoi_between_centres_is_empty() {
    let dir = TempDir::new().unwrap();
    let raster = write_source(dir.path());
    // Inside the top-left pixel, away from its centre at (5.005, 52.095)
    let sliver = "5.001,52.099,0 5.003,52.099,0 5.001,52.097,0 5.001,52.099,0";
    let kml_path = dir.path().join("sliver.kml");
    std::fs::write(&kml_path, kml(&[("sliver", sliver)])).unwrap();

    let polygons = aoi::load_multipolygon(&kml_path).unwrap();
    let output = dir.path().join("sliver_subset.tif");
    let result = subset::subset_raster(&raster, &polygons, &output);

    assert!(matches!(result, Err(AgriError::EmptyResult(_))));
    assert!(!output.exists());
}

#[test]
fn test_per_aoi_names_colliding_after_sanitizing() {
    let dir = TempDir::new().unwrap();
    let raster = write_source(dir.path());
    let kml_path = dir.path().join("fields.kml");
    std::fs::write(&kml_path, kml(&[("field 7", FIELD), ("field/7", FIELD)])).unwrap();

    let aois = aoi::load_per_aoi(&kml_path).unwrap();
    let out_dir = dir.path().join("per_aoi");
    let outcomes = subset::subset_per_aoi(&raster, &aois, &out_dir).unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_ne!(outcomes[0].output, outcomes[1].output);
    assert!(out_dir.join("S1A_20230501_dB_field_7.tif").exists());
    assert!(out_dir.join("S1A_20230501_dB_field_7_2.tif").exists());
}
