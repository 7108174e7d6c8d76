use agrisat::core::stats::{self, S1StatsRequest};
use agrisat::io::{append_records, write_geotiff, RasterSource};
use agrisat::{AgriError, GeoTransform, OrbitDirection, StatsKind};
use approx::assert_relative_eq;
use ndarray::Array2;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SCENE_ID: &str = "S1A_IW_SLC__1SDV_20230501T054012_20230501T054039_048323_05D00F_1A2B";

fn transform() -> GeoTransform {
    GeoTransform::from_gdal([5.0, 0.01, 0.0, 52.1, 0.0, -0.01])
}

fn band(values: &[f32]) -> Array2<f32> {
    Array2::from_shape_vec((2, 2), values.to_vec()).expect("2x2 band")
}

fn write_raster(path: &Path, bands: &[Array2<f32>], no_data: f64) {
    write_geotiff(path, bands, &transform(), "", no_data).expect("Failed to write test raster");
}

fn request(raster: PathBuf) -> S1StatsRequest {
    S1StatsRequest {
        raster,
        scene_id: SCENE_ID.to_string(),
        field_id: "field7".to_string(),
        acquisition_time: "2023-05-01T05:40:12Z".to_string(),
        descending_hour: 5,
    }
}

#[test]
fn test_backscatter_rows_append_under_one_header() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();
    let raster = dir.path().join("S1A_20230501_dB_field7.tif");
    write_raster(
        &raster,
        &[
            band(&[-12.0, -10.0, -9999.0, -14.0]),
            band(&[-18.0, -20.0, -19.0, -9999.0]),
            band(&[35.0, 36.0, 37.0, 38.0]),
        ],
        -9999.0,
    );

    let record = stats::extract_s1_stats(&request(raster.clone())).expect("stats");
    assert_eq!(record.kind, StatsKind::Backscatter);
    assert_eq!(record.orbit_direction, OrbitDirection::Descending);
    assert_eq!(record.relative_orbit, Some(126));

    let (name, vv) = record.bands[0];
    assert_eq!(name, "VV");
    assert_relative_eq!(vv.mean, -12.0);
    assert_eq!(vv.min, -14.0);
    assert_eq!(vv.max, -10.0);

    let base = dir.path().join("csv").join("stats");
    let csv_path = stats::s1_csv_path(&base, record.kind);
    append_records(&csv_path, &[record]).unwrap();

    let second = stats::extract_s1_stats(&request(raster)).unwrap();
    append_records(&csv_path, &[second]).unwrap();

    assert!(csv_path.ends_with("stats_backscatter.csv"));
    let content = std::fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("mean_VV,variance_VV,min_VV,max_VV"));
    assert!(lines[0].ends_with("scene_id,field_id,acquisition_time,data_type,orbit_direction,relative_orbit"));
    assert_eq!(lines.iter().filter(|l| l.starts_with("mean_")).count(), 1);
    assert!(lines[1].contains(",field7,2023-05-01 05:40:12,backscatter,Descending,126"));
}

#[test]
fn test_zero_mean_band_produces_no_row() {
    let dir = TempDir::new().unwrap();
    let raster = dir.path().join("S1A_20230501_dB_field7.tif");
    write_raster(
        &raster,
        &[
            band(&[-12.0, -10.0, -11.0, -14.0]),
            band(&[-1.0, 1.0, -2.0, 2.0]),
            band(&[35.0, 36.0, 37.0, 38.0]),
        ],
        f64::NAN,
    );

    let result = stats::extract_s1_stats(&request(raster));
    assert!(matches!(result, Err(AgriError::Rejected(_))));
}

#[test]
fn test_poldecomp_needs_four_bands() {
    let dir = TempDir::new().unwrap();
    let raster = dir.path().join("S1A_20230501_poldecomp_field7.tif");
    let data = band(&[0.5, 0.6, 0.7, 0.8]);
    write_raster(&raster, &[data.clone(), data.clone(), data], f64::NAN);

    let result = stats::extract_s1_stats(&request(raster));
    assert!(matches!(result, Err(AgriError::InvalidFormat(_))));
}

#[test]
fn test_ndvi_out_of_range_scene_rejected() {
    let dir = TempDir::new().unwrap();
    write_raster(
        &dir.path().join("NDVI_2023-06-01_field7.tif"),
        &[band(&[0.2, 0.4, f32::NAN, 0.6])],
        f64::NAN,
    );
    write_raster(
        &dir.path().join("NDVI_2023-06-02_field7.tif"),
        &[band(&[0.2, 1.5, 0.3, 0.6])],
        f64::NAN,
    );
    write_raster(
        &dir.path().join("RGB_2023-06-03_field7.tif"),
        &[band(&[0.2, 0.4, 0.3, 0.6])],
        f64::NAN,
    );

    let source = RasterSource::open(dir.path().join("NDVI_2023-06-02_field7.tif")).unwrap();
    assert!(matches!(
        stats::ndvi_stats(&source, "field7"),
        Err(AgriError::Rejected(_))
    ));

    let records = stats::extract_ndvi_directory(dir.path(), Some("7")).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].scene_name, "field7");
    assert_relative_eq!(records[0].stats.mean, 0.4, epsilon = 1e-6);
    assert_eq!(records[0].field_id.as_deref(), Some("7"));

    let csv_path = dir.path().join(stats::ndvi_csv_name("20230601", "20230630"));
    append_records(&csv_path, &records).unwrap();
    append_records(&csv_path, &records).unwrap();
    let content = std::fs::read_to_string(&csv_path).unwrap();
    assert_eq!(content.lines().count(), 3);
    assert!(content.starts_with(
        "ndvi_mean,ndvi_variance,ndvi_min,ndvi_max,scene_name,acquisition_date,field_id\n"
    ));
}
