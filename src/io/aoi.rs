//! Field boundary (AOI) readers.
//!
//! KML geometries are always WGS84 lon/lat. GeoJSON is assumed to be WGS84 as
//! well (RFC 7946). Any other vector format (GeoPackage, Shapefile, ...) is
//! read through OGR and reprojected to WGS84 from its layer CRS.

use crate::core::geometry::{Coord, MultiPolygon, Polygon};
use crate::core::subset::transform_polygons;
use crate::types::{AgriError, AgriResult};
use gdal::spatial_ref::SpatialRef;
use gdal::vector::{Geometry as OgrGeometry, LayerAccess};
use gdal::Dataset;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// A named area of interest
#[derive(Debug, Clone)]
pub struct Aoi {
    pub name: String,
    pub polygons: MultiPolygon,
}

/// Pick the first `*.kml` (sorted by name) when given a directory
pub fn resolve_kml_path(path: &Path) -> AgriResult<PathBuf> {
    if !path.is_dir() {
        return Ok(path.to_path_buf());
    }
    list_kml_files(path)?
        .into_iter()
        .next()
        .ok_or_else(|| {
            AgriError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("No .kml file found in directory: {}", path.display()),
            ))
        })
}

/// All `*.kml` files of a directory, sorted by name
pub fn list_kml_files(dir: &Path) -> AgriResult<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| e.eq_ignore_ascii_case("kml"))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Whether the file is read by the KML/GeoJSON text parsers rather than OGR
fn is_text_format(path: &Path) -> bool {
    matches!(extension(path).as_str(), "kml" | "geojson" | "json")
}

/// Read every AOI of a file (one per placemark / feature)
pub fn read_aoi_file(path: &Path) -> AgriResult<Vec<Aoi>> {
    if !path.exists() {
        return Err(AgriError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("AOI file not found: {}", path.display()),
        )));
    }

    let stem = file_stem(path);
    match extension(path).as_str() {
        "geojson" | "json" => parse_geojson(&std::fs::read_to_string(path)?, &stem),
        "kml" => parse_kml(&std::fs::read_to_string(path)?, &stem),
        _ => read_vector_dataset(path, None),
    }
}

/// Polygon features of one layer of an OGR dataset, reprojected to WGS84.
///
/// `layer` selects a layer by name; without it the first layer is read.
/// Features are named `<layer>_<fid>`.
pub fn read_vector_dataset(path: &Path, layer: Option<&str>) -> AgriResult<Vec<Aoi>> {
    let dataset = Dataset::open(path)?;
    let mut layer = match layer {
        Some(name) => dataset.layer_by_name(name).map_err(|_| {
            AgriError::InvalidFormat(format!("Layer '{}' not found in {}", name, path.display()))
        })?,
        None => dataset.layers().next().ok_or_else(|| {
            AgriError::InvalidFormat(format!("No vector layer in {}", path.display()))
        })?,
    };
    let layer_name = layer.name();
    let layer_srs = layer.spatial_ref();

    let mut aois = Vec::new();
    for feature in layer.features() {
        let Some(geometry) = feature.geometry() else {
            continue;
        };
        let polygons = ogr_polygons(geometry);
        if polygons.is_empty() {
            continue;
        }
        let name = match feature.fid() {
            Some(fid) => format!("{}_{}", layer_name, fid),
            None => format!("{}_{}", layer_name, aois.len()),
        };
        aois.push(Aoi {
            name,
            polygons: MultiPolygon(polygons),
        });
    }

    match layer_srs {
        Some(srs) => {
            let wgs84 = SpatialRef::from_epsg(4326)?;
            for aoi in &mut aois {
                aoi.polygons = transform_polygons(&aoi.polygons, &srs, &wgs84)?;
            }
        }
        None => log::warn!(
            "Layer {} of {} has no CRS; assuming WGS84",
            layer_name,
            path.display()
        ),
    }
    Ok(aois)
}

fn ogr_ring(geometry: &OgrGeometry) -> Vec<Coord> {
    geometry
        .get_point_vec()
        .into_iter()
        .map(|(x, y, _)| (x, y))
        .collect()
}

fn ogr_polygon(geometry: &OgrGeometry) -> Option<Polygon> {
    let count = geometry.geometry_count();
    if count == 0 {
        return None;
    }
    let exterior = ogr_ring(&geometry.get_geometry(0));
    let interiors = (1..count).map(|i| ogr_ring(&geometry.get_geometry(i))).collect();
    Some(Polygon::new(exterior, interiors))
}

fn ogr_polygons(geometry: &OgrGeometry) -> Vec<Polygon> {
    match geometry.geometry_name().as_str() {
        "POLYGON" => ogr_polygon(geometry).into_iter().collect(),
        "MULTIPOLYGON" => (0..geometry.geometry_count())
            .filter_map(|i| ogr_polygon(&geometry.get_geometry(i)))
            .collect(),
        _ => Vec::new(),
    }
}

/// Union of every polygon found at `path` (file, or first KML of a directory)
pub fn load_multipolygon(path: &Path) -> AgriResult<MultiPolygon> {
    let file = resolve_kml_path(path)?;
    log::info!("Reading AOI: {}", file.display());
    let polygons = read_aoi_file(&file)?
        .into_iter()
        .flat_map(|aoi| aoi.polygons.0)
        .collect();
    Ok(MultiPolygon(polygons))
}

/// One AOI per KML file of a directory, or one per placemark of a single file
pub fn load_per_aoi(path: &Path) -> AgriResult<Vec<Aoi>> {
    if path.is_dir() {
        let mut aois = Vec::new();
        for file in list_kml_files(path)? {
            let polygons = read_aoi_file(&file)?
                .into_iter()
                .flat_map(|aoi| aoi.polygons.0)
                .collect();
            aois.push(Aoi {
                name: sanitize_name(&file_stem(&file)),
                polygons: MultiPolygon(polygons),
            });
        }
        Ok(aois)
    } else {
        Ok(read_aoi_file(path)?
            .into_iter()
            .map(|aoi| Aoi {
                name: sanitize_name(&aoi.name),
                polygons: aoi.polygons,
            })
            .collect())
    }
}

/// First polygon of the file.
///
/// `layer` names a dataset layer for OGR formats and a placemark / feature
/// name for KML and GeoJSON.
pub fn first_polygon(path: &Path, layer: Option<&str>) -> AgriResult<Polygon> {
    let aois = if is_text_format(path) {
        read_aoi_file(path)?
            .into_iter()
            .filter(|aoi| layer.map_or(true, |name| aoi.name == name))
            .collect()
    } else {
        read_vector_dataset(path, layer)?
    };
    aois.into_iter()
        .flat_map(|aoi| aoi.polygons.0)
        .next()
        .ok_or_else(|| {
            AgriError::InvalidFormat(format!(
                "No valid Polygon/MultiPolygon in {}",
                path.display()
            ))
        })
}

/// Replace characters unsafe for file names with `_`
pub fn sanitize_name(raw: &str) -> String {
    let re = Regex::new(r"[^A-Za-z0-9_-]").expect("static regex");
    re.replace_all(raw, "_").into_owned()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("aoi")
        .to_string()
}

fn parse_coordinates(text: &str) -> AgriResult<Vec<Coord>> {
    let mut coords = Vec::new();
    for tuple in text.split_whitespace() {
        let mut parts = tuple.split(',');
        let lon = parts.next().and_then(|v| v.parse::<f64>().ok());
        let lat = parts.next().and_then(|v| v.parse::<f64>().ok());
        match (lon, lat) {
            (Some(lon), Some(lat)) => coords.push((lon, lat)),
            _ => {
                return Err(AgriError::InvalidFormat(format!(
                    "Invalid KML coordinate tuple: {}",
                    tuple
                )))
            }
        }
    }
    Ok(coords)
}

#[derive(Default)]
struct PlacemarkState {
    name: Option<String>,
    polygons: Vec<Polygon>,
    exterior: Option<Vec<Coord>>,
    interiors: Vec<Vec<Coord>>,
}

/// Parse KML content into one AOI per placemark that carries polygons
pub fn parse_kml(content: &str, default_name: &str) -> AgriResult<Vec<Aoi>> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut aois = Vec::new();
    let mut placemark: Option<PlacemarkState> = None;
    let mut path: Vec<Vec<u8>> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                match name.as_slice() {
                    b"Placemark" => placemark = Some(PlacemarkState::default()),
                    b"Polygon" => {
                        if let Some(pm) = placemark.as_mut() {
                            pm.exterior = None;
                            pm.interiors.clear();
                        }
                    }
                    _ => {}
                }
                path.push(name);
            }
            Ok(Event::End(e)) => {
                let name = e.local_name().as_ref().to_vec();
                path.pop();
                match name.as_slice() {
                    b"Polygon" => {
                        if let Some(pm) = placemark.as_mut() {
                            if let Some(exterior) = pm.exterior.take() {
                                let interiors = std::mem::take(&mut pm.interiors);
                                pm.polygons.push(Polygon::new(exterior, interiors));
                            }
                        }
                    }
                    b"Placemark" => {
                        if let Some(pm) = placemark.take() {
                            if !pm.polygons.is_empty() {
                                let name = pm
                                    .name
                                    .unwrap_or_else(|| format!("{}_{}", default_name, aois.len()));
                                aois.push(Aoi {
                                    name,
                                    polygons: MultiPolygon(pm.polygons),
                                });
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| AgriError::XmlParsing(format!("Bad KML text: {}", e)))?;
                let Some(pm) = placemark.as_mut() else { continue };
                let current = path.last().map(Vec::as_slice);

                if current == Some(b"name".as_slice()) && path.len() >= 2 {
                    if path[path.len() - 2].as_slice() == b"Placemark" {
                        pm.name = Some(text.trim().to_string());
                    }
                } else if current == Some(b"coordinates".as_slice()) {
                    let coords = parse_coordinates(&text)?;
                    if path.iter().any(|p| p.as_slice() == b"innerBoundaryIs") {
                        pm.interiors.push(coords);
                    } else if path.iter().any(|p| p.as_slice() == b"outerBoundaryIs") {
                        pm.exterior = Some(coords);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(AgriError::XmlParsing(format!(
                    "Failed to read KML at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(aois)
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum GeoJson {
    FeatureCollection { features: Vec<Feature> },
    Feature(Feature),
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Vec<f64>>>> },
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
    #[serde(default)]
    properties: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Vec<f64>>>> },
    #[serde(other)]
    Unsupported,
}

fn rings_to_polygon(rings: Vec<Vec<Vec<f64>>>) -> Option<Polygon> {
    let mut rings = rings
        .into_iter()
        .map(|ring| {
            ring.into_iter()
                .filter(|c| c.len() >= 2)
                .map(|c| (c[0], c[1]))
                .collect::<Vec<Coord>>()
        });
    let exterior = rings.next()?;
    Some(Polygon::new(exterior, rings.collect()))
}

fn geometry_polygons(geometry: Geometry) -> Vec<Polygon> {
    match geometry {
        Geometry::Polygon { coordinates } => rings_to_polygon(coordinates).into_iter().collect(),
        Geometry::MultiPolygon { coordinates } => {
            coordinates.into_iter().filter_map(rings_to_polygon).collect()
        }
        Geometry::Unsupported => Vec::new(),
    }
}

/// Parse GeoJSON content; features without polygon geometry are skipped
pub fn parse_geojson(content: &str, default_name: &str) -> AgriResult<Vec<Aoi>> {
    let doc: GeoJson = serde_json::from_str(content)?;

    let features = match doc {
        GeoJson::FeatureCollection { features } => features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Polygon { coordinates } => vec![Feature {
            geometry: Some(Geometry::Polygon { coordinates }),
            properties: None,
        }],
        GeoJson::MultiPolygon { coordinates } => vec![Feature {
            geometry: Some(Geometry::MultiPolygon { coordinates }),
            properties: None,
        }],
    };

    let mut aois = Vec::new();
    for feature in features {
        let polygons = feature.geometry.map(geometry_polygons).unwrap_or_default();
        if polygons.is_empty() {
            continue;
        }
        let name = feature
            .properties
            .as_ref()
            .and_then(|p| p.get("name"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_{}", default_name, aois.len()));
        aois.push(Aoi {
            name,
            polygons: MultiPolygon(polygons),
        });
    }
    Ok(aois)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS_KML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <name>fields</name>
    <Folder>
      <Placemark>
        <name>field 12</name>
        <Polygon>
          <outerBoundaryIs><LinearRing><coordinates>
            5.10,52.00,0 5.20,52.00,0 5.20,52.10,0 5.10,52.10,0 5.10,52.00,0
          </coordinates></LinearRing></outerBoundaryIs>
          <innerBoundaryIs><LinearRing><coordinates>
            5.14,52.04 5.16,52.04 5.16,52.06 5.14,52.06
          </coordinates></LinearRing></innerBoundaryIs>
        </Polygon>
      </Placemark>
      <Placemark>
        <name>road</name>
        <LineString><coordinates>5.0,52.0 5.3,52.3</coordinates></LineString>
      </Placemark>
      <Placemark>
        <MultiGeometry>
          <Polygon><outerBoundaryIs><LinearRing><coordinates>
            6.0,53.0 6.1,53.0 6.1,53.1
          </coordinates></LinearRing></outerBoundaryIs></Polygon>
          <Polygon><outerBoundaryIs><LinearRing><coordinates>
            7.0,54.0 7.1,54.0 7.1,54.1
          </coordinates></LinearRing></outerBoundaryIs></Polygon>
        </MultiGeometry>
      </Placemark>
    </Folder>
  </Document>
</kml>"#;

    #[test]
    fn test_parse_kml_placemarks() {
        let aois = parse_kml(FIELDS_KML, "fields").unwrap();
        assert_eq!(aois.len(), 2);
        assert_eq!(aois[0].name, "field 12");
        assert_eq!(aois[0].polygons.0.len(), 1);
        assert_eq!(aois[0].polygons.0[0].interiors.len(), 1);
        assert!(!aois[0].polygons.contains_point((5.15, 52.05)));
        assert!(aois[0].polygons.contains_point((5.11, 52.01)));
        assert_eq!(aois[1].name, "fields_1");
        assert_eq!(aois[1].polygons.0.len(), 2);
    }

    #[test]
    fn test_parse_geojson() {
        let content = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"name":"north"},
             "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}},
            {"type":"Feature","properties":{},
             "geometry":{"type":"Point","coordinates":[0,0]}}]}"#;
        let aois = parse_geojson(content, "plots").unwrap();
        assert_eq!(aois.len(), 1);
        assert_eq!(aois[0].name, "north");
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("field 12/north"), "field_12_north");
        assert_eq!(sanitize_name("plot-3_a"), "plot-3_a");
    }

    #[test]
    fn test_resolve_kml_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.kml"), FIELDS_KML).unwrap();
        std::fs::write(dir.path().join("a.kml"), FIELDS_KML).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        assert_eq!(resolve_kml_path(dir.path()).unwrap(), dir.path().join("a.kml"));

        let per_aoi = load_per_aoi(dir.path()).unwrap();
        assert_eq!(per_aoi.len(), 2);
        assert_eq!(per_aoi[0].name, "a");
        assert_eq!(per_aoi[0].polygons.0.len(), 3);

        let empty = tempfile::TempDir::new().unwrap();
        assert!(resolve_kml_path(empty.path()).is_err());
    }
}
