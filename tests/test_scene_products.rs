use agrisat::core::geometry::{MultiPolygon, Polygon};
use agrisat::core::scene::{relative_orbit, SceneName};
use agrisat::core::BurstAnalyzer;
use agrisat::io::{download, SafeReader};
use agrisat::Satellite;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::TempDir;
use zip::write::FileOptions;
use zip::ZipArchive;

const SAFE: &str = "S1A_IW_SLC__1SDV_20230501T054012_20230501T054039_048323_05D00F_1A2B.SAFE";

fn write_zip(path: &Path, entries: &[(&str, Option<&str>)]) {
    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, content) in entries {
        match content {
            Some(content) => {
                writer.start_file(*name, FileOptions::default()).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
            None => writer.add_directory(*name, FileOptions::default()).unwrap(),
        }
    }
    writer.finish().unwrap();
}

/// Annotation of one sub-swath: 3 bursts stacked northwards from `lat0`, 0.2 deg each
fn annotation(swath: &str, lon0: f64, lat0: f64) -> String {
    let mut points = String::new();
    for row in 0..=3 {
        let lat = lat0 + row as f64 * 0.2;
        for (pixel, dlon) in [(0, 0.0), (12000, 0.4), (24000, 0.8)] {
            points.push_str(&format!(
                "<geolocationGridPoint><line>{}</line><pixel>{}</pixel>\
                 <latitude>{}</latitude><longitude>{}</longitude></geolocationGridPoint>",
                row * 1500,
                pixel,
                lat,
                lon0 + dlon
            ));
        }
    }
    format!(
        "<product><adsHeader><missionId>S1A</missionId><productType>SLC</productType>\
         <polarisation>VH</polarisation><swath>{}</swath>\
         <startTime>2023-05-01T05:40:12</startTime><stopTime>2023-05-01T05:40:39</stopTime></adsHeader>\
         <swathTiming><linesPerBurst>1500</linesPerBurst><samplesPerBurst>24000</samplesPerBurst>\
         <burstList count=\"3\"><burst><azimuthTime>2023-05-01T05:40:12</azimuthTime></burst>\
         <burst><azimuthTime>2023-05-01T05:40:15</azimuthTime></burst>\
         <burst><azimuthTime>2023-05-01T05:40:18</azimuthTime></burst></burstList></swathTiming>\
         <geolocationGrid><geolocationGridPointList>{}</geolocationGridPointList></geolocationGrid></product>",
        swath, points
    )
}

#[test]
fn test_relative_orbit_examples() {
    assert_eq!(relative_orbit(Satellite::S1A, 73), Some(1));
    assert_eq!(relative_orbit(Satellite::S1A, 248), Some(1));
    assert_eq!(relative_orbit(Satellite::S1B, 27), Some(1));
    assert_eq!(relative_orbit(Satellite::Other, 1000), None);

    let scene = SceneName::parse(SAFE).unwrap();
    assert_eq!(scene.absolute_orbit, 48323);
    assert_eq!(scene.relative_orbit(), Some(126));
}

#[test]
fn test_repackage_reroots_at_safe_folder() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("download.zip");
    let manifest = format!("tmp/{}/manifest.safe", SAFE);
    let annotation_dir = format!("tmp/{}/annotation/", SAFE);
    write_zip(
        &source,
        &[
            ("tmp/readme.txt", Some("outside")),
            (annotation_dir.as_str(), None),
            (manifest.as_str(), Some("<xfdu/>")),
        ],
    );

    let out_dir = dir.path().join("products");
    let output = download::repackage_archive(&source, "uuid-1", &out_dir).unwrap();
    assert_eq!(output, out_dir.join(format!("{}.zip", SAFE)));

    let mut archive = ZipArchive::new(File::open(&output).unwrap()).unwrap();
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    assert_eq!(names.len(), 2);
    assert!(names.iter().all(|n| n.starts_with(SAFE)));

    let mut content = String::new();
    archive
        .by_name(&format!("{}/manifest.safe", SAFE))
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    assert_eq!(content, "<xfdu/>");
}

#[test]
fn test_repackage_without_safe_uses_product_id() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("download.zip");
    write_zip(&source, &[("data/file.txt", Some("x"))]);

    let output = download::repackage_archive(&source, "uuid-2", dir.path()).unwrap();
    assert_eq!(output, dir.path().join("uuid-2.zip"));
}

#[test]
fn test_burst_intersection_from_annotations() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();
    let zip_path = dir.path().join(format!("{}.zip", SAFE.trim_end_matches(".SAFE")));

    let iw1 = annotation("IW1", 5.0, 52.0);
    let iw2 = annotation("IW2", 5.8, 52.0);
    let iw1_name = format!("{}/annotation/s1a-iw1-slc-vh-20230501t054012-048323-05d00f-001.xml", SAFE);
    let iw2_name = format!("{}/annotation/s1a-iw2-slc-vh-20230501t054013-048323-05d00f-002.xml", SAFE);
    let cal_name = format!(
        "{}/annotation/calibration/calibration-s1a-iw1-slc-vh-20230501t054012-048323-05d00f-001.xml",
        SAFE
    );
    write_zip(
        &zip_path,
        &[
            (iw1_name.as_str(), Some(iw1.as_str())),
            (iw2_name.as_str(), Some(iw2.as_str())),
            (cal_name.as_str(), Some("<calibration/>")),
        ],
    );

    // Field straddling the IW1/IW2 boundary in the middle burst
    let field = MultiPolygon(vec![Polygon::new(
        vec![(5.75, 52.25), (5.85, 52.25), (5.85, 52.3), (5.75, 52.3)],
        vec![],
    )]);

    let mut reader = SafeReader::new(&zip_path).unwrap();
    let bursts = BurstAnalyzer::standard()
        .intersecting_bursts(&mut reader, &field)
        .expect("burst analysis");
    assert_eq!(bursts, vec![("IW1".to_string(), 2), ("IW2".to_string(), 2)]);

    let far = MultiPolygon(vec![Polygon::new(
        vec![(9.0, 40.0), (9.1, 40.0), (9.1, 40.1)],
        vec![],
    )]);
    assert!(BurstAnalyzer::standard()
        .intersecting_bursts(&mut reader, &far)
        .unwrap()
        .is_empty());

    assert!(BurstAnalyzer::standard()
        .intersecting_bursts(&mut reader, &MultiPolygon::default())
        .is_err());
}
