use crate::types::{AgriError, AgriResult};
use quick_xml::de::from_str;
use serde::Deserialize;

/// Subset of a Sentinel-1 product annotation needed for burst geometry.
/// This represents the root <product> element directly
#[derive(Debug, Deserialize)]
pub struct SwathAnnotation {
    #[serde(rename = "adsHeader")]
    pub ads_header: AdsHeader,
    #[serde(rename = "swathTiming")]
    pub swath_timing: SwathTiming,
    #[serde(rename = "geolocationGrid")]
    pub geolocation_grid: GeolocationGrid,
}

#[derive(Debug, Deserialize)]
pub struct AdsHeader {
    #[serde(rename = "missionId")]
    pub mission_id: String,
    #[serde(rename = "productType")]
    pub product_type: Option<String>,
    #[serde(rename = "polarisation")]
    pub polarisation: Option<String>,
    #[serde(rename = "swath")]
    pub swath: String,
    #[serde(rename = "startTime")]
    pub start_time: String,
    #[serde(rename = "stopTime")]
    pub stop_time: String,
}

#[derive(Debug, Deserialize)]
pub struct SwathTiming {
    #[serde(rename = "linesPerBurst")]
    pub lines_per_burst: usize,
    #[serde(rename = "samplesPerBurst")]
    pub samples_per_burst: Option<usize>,
    #[serde(rename = "burstList")]
    pub burst_list: BurstList,
}

#[derive(Debug, Deserialize)]
pub struct BurstList {
    #[serde(rename = "@count")]
    pub count: Option<usize>,
    #[serde(rename = "burst", default)]
    pub bursts: Vec<Burst>,
}

#[derive(Debug, Deserialize)]
pub struct Burst {
    #[serde(rename = "azimuthTime")]
    pub azimuth_time: String,
}

#[derive(Debug, Deserialize)]
pub struct GeolocationGrid {
    #[serde(rename = "geolocationGridPointList")]
    pub point_list: GeolocationGridPointList,
}

#[derive(Debug, Deserialize)]
pub struct GeolocationGridPointList {
    #[serde(rename = "geolocationGridPoint", default)]
    pub points: Vec<GeolocationGridPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeolocationGridPoint {
    pub line: u32,
    pub pixel: u32,
    pub latitude: f64,
    pub longitude: f64,
}

/// Parser for Sentinel-1 annotation XML files
pub struct AnnotationParser;

impl AnnotationParser {
    /// Parse annotation XML
    pub fn parse_annotation(xml_content: &str) -> AgriResult<SwathAnnotation> {
        from_str::<SwathAnnotation>(xml_content)
            .map_err(|e| AgriError::XmlParsing(format!("Failed to parse annotation XML: {}", e)))
    }

    /// Number of bursts; the `count` attribute wins over the element count
    pub fn burst_count(annotation: &SwathAnnotation) -> usize {
        let list = &annotation.swath_timing.burst_list;
        list.count.unwrap_or(list.bursts.len())
    }

    /// Geolocation grid rows, grouped by line and sorted by pixel
    pub fn grid_rows(annotation: &SwathAnnotation) -> AgriResult<Vec<(u32, Vec<GeolocationGridPoint>)>> {
        let points = &annotation.geolocation_grid.point_list.points;
        if points.is_empty() {
            return Err(AgriError::XmlParsing(
                "Annotation has no geolocation grid points".to_string(),
            ));
        }

        let mut rows: Vec<(u32, Vec<GeolocationGridPoint>)> = Vec::new();
        for point in points {
            match rows.iter_mut().find(|(line, _)| *line == point.line) {
                Some((_, row)) => row.push(point.clone()),
                None => rows.push((point.line, vec![point.clone()])),
            }
        }
        rows.sort_by_key(|(line, _)| *line);
        for (_, row) in rows.iter_mut() {
            row.sort_by_key(|p| p.pixel);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<product>
  <adsHeader>
    <missionId>S1A</missionId>
    <productType>SLC</productType>
    <polarisation>VH</polarisation>
    <mode>IW</mode>
    <swath>IW2</swath>
    <startTime>2020-01-03T17:08:16.618328</startTime>
    <stopTime>2020-01-03T17:08:41.754329</stopTime>
  </adsHeader>
  <swathTiming>
    <linesPerBurst>1500</linesPerBurst>
    <samplesPerBurst>25000</samplesPerBurst>
    <burstList count="2">
      <burst><azimuthTime>2020-01-03T17:08:16.6</azimuthTime></burst>
      <burst><azimuthTime>2020-01-03T17:08:19.4</azimuthTime></burst>
    </burstList>
  </swathTiming>
  <geolocationGrid>
    <geolocationGridPointList count="4">
      <geolocationGridPoint><line>1500</line><pixel>0</pixel><latitude>52.1</latitude><longitude>5.0</longitude></geolocationGridPoint>
      <geolocationGridPoint><line>0</line><pixel>24999</pixel><latitude>52.0</latitude><longitude>6.0</longitude></geolocationGridPoint>
      <geolocationGridPoint><line>0</line><pixel>0</pixel><latitude>52.0</latitude><longitude>5.0</longitude></geolocationGridPoint>
      <geolocationGridPoint><line>1500</line><pixel>24999</pixel><latitude>52.1</latitude><longitude>6.0</longitude></geolocationGridPoint>
    </geolocationGridPointList>
  </geolocationGrid>
</product>"#;

    #[test]
    fn test_annotation_parsing() {
        let annotation = AnnotationParser::parse_annotation(SAMPLE).unwrap();
        assert_eq!(annotation.ads_header.swath, "IW2");
        assert_eq!(annotation.swath_timing.lines_per_burst, 1500);
        assert_eq!(AnnotationParser::burst_count(&annotation), 2);

        let rows = AnnotationParser::grid_rows(&annotation).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, 0);
        assert_eq!(rows[0].1[0].pixel, 0);
        assert_eq!(rows[0].1[1].pixel, 24999);
    }

    #[test]
    fn test_invalid_annotation() {
        assert!(AnnotationParser::parse_annotation("<product></product>").is_err());
    }
}
