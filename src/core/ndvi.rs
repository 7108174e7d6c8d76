//! Daily-mean, cloud-filtered Sentinel-2 NDVI export through Earth Engine.
//!
//! Surface-reflectance and cloud-probability images are paired on their image
//! index. A pair is kept when the share of AOI pixels whose cloud probability
//! exceeds the threshold is at most the threshold (in percent). Kept images
//! are grouped by UTC date and each day's mean NDVI is rendered as GeoTIFF.

use crate::io::earth_engine::{EarthEngineClient, EeImage, ExprGraph};
use crate::types::{AgriError, AgriResult};
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

const CLOUD_SCALE: f64 = 10.0;
const MAX_PIXELS: f64 = 1e9;

/// Parameters of one export run
#[derive(Debug, Clone)]
pub struct NdviExportParams {
    pub sr_collection: String,
    pub cloud_collection: String,
    /// Percent; used both as probability cut-off and as maximum cloudy share
    pub cloud_threshold: f64,
    pub scale: f64,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub output_dir: PathBuf,
}

/// Surface-reflectance image with its cloud-probability counterpart
#[derive(Debug, Clone)]
pub struct ImagePair {
    pub sr: EeImage,
    pub cloud: EeImage,
}

/// Inner join on the image index; keeps the order of `sr`
pub fn join_on_index(sr: Vec<EeImage>, cloud: Vec<EeImage>) -> Vec<ImagePair> {
    let mut by_index: HashMap<String, EeImage> = cloud
        .into_iter()
        .map(|image| (image.index().to_string(), image))
        .collect();

    sr.into_iter()
        .filter_map(|image| {
            let cloud = by_index.remove(image.index())?;
            Some(ImagePair { sr: image, cloud })
        })
        .collect()
}

/// GeoJSON polygon of a lon/lat ring
pub fn region_geojson(ring: &[(f64, f64)]) -> Value {
    let coordinates: Vec<Value> = ring.iter().map(|(x, y)| json!([x, y])).collect();
    json!({ "type": "Polygon", "coordinates": [coordinates] })
}

/// Expression for the fraction (0..1) of AOI pixels with cloud probability above `threshold`
pub fn cloud_fraction_expression(cloud_id: &str, ring: &[(f64, f64)], threshold: f64) -> AgriResult<Value> {
    let mut graph = ExprGraph::new();
    let geometry = graph.polygon(ring);
    let image = graph.invoke("Image.load", vec![("id", ExprGraph::constant(cloud_id))]);
    let probability = graph.invoke(
        "Image.select",
        vec![
            ("input", image),
            ("bandSelectors", ExprGraph::constant(vec!["probability"])),
        ],
    );
    let limit = graph.invoke("Image.constant", vec![("value", ExprGraph::constant(threshold))]);
    let cloudy = graph.invoke("Image.gt", vec![("image1", probability), ("image2", limit)]);
    let reducer = graph.invoke("Reducer.mean", vec![]);
    let reduced = graph.invoke(
        "Image.reduceRegion",
        vec![
            ("image", cloudy),
            ("reducer", reducer),
            ("geometry", geometry),
            ("scale", ExprGraph::constant(CLOUD_SCALE)),
            ("maxPixels", ExprGraph::constant(MAX_PIXELS)),
        ],
    );
    let fraction = graph.invoke(
        "Dictionary.get",
        vec![("dictionary", reduced), ("key", ExprGraph::constant("probability"))],
    );
    graph.into_expression(&fraction)
}

/// Expression of the masked daily mean NDVI of `images`, clipped and scaled for download
pub fn daily_ndvi_expression(images: &[EeImage], ring: &[(f64, f64)], scale: f64) -> AgriResult<Value> {
    if images.is_empty() {
        return Err(AgriError::Processing("No images for daily mean".to_string()));
    }

    let mut graph = ExprGraph::new();
    let geometry = graph.polygon(ring);

    let ndvi_images: Vec<Value> = images
        .iter()
        .map(|image| {
            let loaded = graph.invoke("Image.load", vec![("id", ExprGraph::constant(image.id.as_str()))]);
            let ndvi = graph.invoke(
                "Image.normalizedDifference",
                vec![("input", loaded), ("bandNames", ExprGraph::constant(vec!["B8", "B4"]))],
            );
            graph.invoke(
                "Image.rename",
                vec![("input", ndvi), ("names", ExprGraph::constant(vec!["ndvi"]))],
            )
        })
        .collect();

    let collection = graph.invoke(
        "ImageCollection.fromImages",
        vec![("images", ExprGraph::array(ndvi_images))],
    );
    let reducer = graph.invoke("Reducer.mean", vec![]);
    let mean = graph.invoke(
        "ImageCollection.reduce",
        vec![("collection", collection), ("reducer", reducer)],
    );
    let renamed = graph.invoke(
        "Image.rename",
        vec![("input", mean), ("names", ExprGraph::constant(vec!["ndvi"]))],
    );
    let clipped = graph.invoke(
        "Image.clip",
        vec![("input", renamed), ("geometry", geometry.clone())],
    );
    let zero = graph.invoke("Image.constant", vec![("value", ExprGraph::constant(0))]);
    let non_zero = graph.invoke("Image.neq", vec![("image1", clipped.clone()), ("image2", zero)]);
    let masked = graph.invoke(
        "Image.updateMask",
        vec![("image", clipped), ("mask", non_zero)],
    );
    let scaled = graph.invoke(
        "Image.clipToBoundsAndScale",
        vec![
            ("input", masked),
            ("geometry", geometry),
            ("scale", ExprGraph::constant(scale)),
        ],
    );
    graph.into_expression(&scaled)
}

/// Group images by UTC acquisition date; images without a start time are dropped
pub fn group_by_date(images: Vec<EeImage>) -> BTreeMap<NaiveDate, Vec<EeImage>> {
    let mut groups: BTreeMap<NaiveDate, Vec<EeImage>> = BTreeMap::new();
    for image in images {
        match image.acquisition_time() {
            Some(time) => groups.entry(time.date()).or_default().push(image),
            None => log::warn!("Image {} has no start time, skipped", image.id),
        }
    }
    groups
}

/// Output file name of one day
pub fn ndvi_file_name(date: NaiveDate, aoi_name: &str) -> String {
    format!("NDVI_{}_{}.tif", date.format("%Y-%m-%d"), aoi_name)
}

/// Unzip the first member when the payload is a zip archive
pub fn unpack_payload(data: Vec<u8>) -> AgriResult<Vec<u8>> {
    if !data.starts_with(b"PK") {
        return Ok(data);
    }

    let mut archive = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| AgriError::InvalidFormat(format!("Bad zip payload: {}", e)))?;
    if archive.len() == 0 {
        return Err(AgriError::InvalidFormat("Zip payload is empty".to_string()));
    }
    let mut member = archive
        .by_index(0)
        .map_err(|e| AgriError::InvalidFormat(format!("Bad zip payload: {}", e)))?;
    let mut content = Vec::with_capacity(member.size() as usize);
    member.read_to_end(&mut content)?;
    Ok(content)
}

/// Runs the export against an Earth Engine client
pub struct NdviExporter<'a> {
    client: &'a EarthEngineClient,
    params: NdviExportParams,
}

impl<'a> NdviExporter<'a> {
    pub fn new(client: &'a EarthEngineClient, params: NdviExportParams) -> Self {
        Self { client, params }
    }

    /// Cloud share of one pair in percent
    fn cloud_percentage(&self, pair: &ImagePair, ring: &[(f64, f64)]) -> AgriResult<Option<f64>> {
        let expression = cloud_fraction_expression(&pair.cloud.id, ring, self.params.cloud_threshold)?;
        let result = self.client.compute_value(expression)?;
        Ok(result.as_f64().map(|fraction| fraction * 100.0))
    }

    /// Pairs whose cloud share within the AOI is at most the threshold
    pub fn clear_images(&self, ring: &[(f64, f64)]) -> AgriResult<Vec<EeImage>> {
        let region = region_geojson(ring);
        let p = &self.params;
        let sr = self.client.list_images(&p.sr_collection, p.start, p.end, &region)?;
        let cloud = self.client.list_images(&p.cloud_collection, p.start, p.end, &region)?;

        let pairs = join_on_index(sr, cloud);
        log::info!("{} image pairs after join", pairs.len());

        let mut clear = Vec::new();
        for pair in pairs {
            match self.cloud_percentage(&pair, ring)? {
                Some(pct) if pct <= p.cloud_threshold => {
                    log::debug!("{}: {:.1}% cloudy, kept", pair.sr.index(), pct);
                    clear.push(pair.sr);
                }
                Some(pct) => log::debug!("{}: {:.1}% cloudy, dropped", pair.sr.index(), pct),
                None => log::warn!("{}: no cloud estimate over AOI, dropped", pair.sr.index()),
            }
        }
        Ok(clear)
    }

    /// Export one GeoTIFF per acquisition day; returns the written files
    pub fn run(&self, aoi_name: &str, ring: &[(f64, f64)]) -> AgriResult<Vec<PathBuf>> {
        let daily = group_by_date(self.clear_images(ring)?);
        std::fs::create_dir_all(&self.params.output_dir)?;
        log::info!("Exporting {} daily-averaged NDVI image(s)", daily.len());

        let mut written = Vec::with_capacity(daily.len());
        for (date, images) in daily {
            let output = self.params.output_dir.join(ndvi_file_name(date, aoi_name));
            self.export_day(&images, ring, &output)?;
            written.push(output);
        }
        Ok(written)
    }

    fn export_day(&self, images: &[EeImage], ring: &[(f64, f64)], output: &Path) -> AgriResult<()> {
        log::info!("Downloading {} ({} images)", output.display(), images.len());
        let expression = daily_ndvi_expression(images, ring, self.params.scale)?;
        let payload = self.client.download_geotiff(expression, "ndvi")?;
        std::fs::write(output, unpack_payload(payload)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn image(id: &str, start: &str) -> EeImage {
        serde_json::from_value(json!({ "id": id, "startTime": start })).unwrap()
    }

    const RING: [(f64, f64); 4] = [(5.0, 52.0), (5.1, 52.0), (5.1, 52.1), (5.0, 52.0)];

    #[test]
    fn test_join_on_index() {
        let sr = vec![
            image("S2_SR/20230501T1_T31UFU", "2023-05-01T10:39:04Z"),
            image("S2_SR/20230503T1_T31UFU", "2023-05-03T10:39:04Z"),
        ];
        let cloud = vec![image("S2_CP/20230503T1_T31UFU", "2023-05-03T10:39:04Z")];
        let pairs = join_on_index(sr, cloud);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].sr.id, "S2_SR/20230503T1_T31UFU");
        assert_eq!(pairs[0].cloud.id, "S2_CP/20230503T1_T31UFU");
    }

    #[test]
    fn test_group_by_date() {
        let groups = group_by_date(vec![
            image("a", "2023-05-01T10:39:04Z"),
            image("b", "2023-05-01T10:39:19Z"),
            image("c", "2023-05-04T10:29:00Z"),
        ]);
        assert_eq!(groups.len(), 2);
        let first = groups.values().next().unwrap();
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_daily_expression_graph() {
        let images = vec![image("S2/a", "2023-05-01T10:39:04Z"), image("S2/b", "2023-05-01T10:39:19Z")];
        let expression = daily_ndvi_expression(&images, &RING, 10.0).unwrap();

        let values = expression["values"].as_object().unwrap();
        let result = expression["result"].as_str().unwrap();
        assert_eq!(
            values[result]["functionInvocationValue"]["functionName"],
            "Image.clipToBoundsAndScale"
        );
        let functions: Vec<&str> = values
            .values()
            .filter_map(|v| v["functionInvocationValue"]["functionName"].as_str())
            .collect();
        assert_eq!(functions.iter().filter(|f| **f == "Image.load").count(), 2);
        assert!(functions.contains(&"Image.updateMask"));
        assert!(functions.contains(&"ImageCollection.reduce"));
        assert!(daily_ndvi_expression(&[], &RING, 10.0).is_err());
    }

    #[test]
    fn test_cloud_expression_uses_threshold() {
        let expression = cloud_fraction_expression("S2_CP/x", &RING, 20.0).unwrap();
        let text = expression.to_string();
        assert!(text.contains("\"Image.gt\""));
        assert!(text.contains("\"constantValue\":20.0"));
    }

    #[test]
    fn test_unpack_payload() {
        let raw = b"II*\0tiff".to_vec();
        assert_eq!(unpack_payload(raw.clone()).unwrap(), raw);

        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            writer
                .start_file("download.ndvi.tif", zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(&raw).unwrap();
            writer.finish().unwrap();
        }
        assert_eq!(unpack_payload(buffer.into_inner()).unwrap(), raw);
    }

    #[test]
    fn test_file_name() {
        let date = NaiveDate::from_ymd_opt(2023, 6, 14).unwrap();
        assert_eq!(ndvi_file_name(date, "field_12"), "NDVI_2023-06-14_field_12.tif");
    }
}
