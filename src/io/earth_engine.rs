//! Minimal Earth Engine REST client.
//!
//! Computations are sent as serialized expression graphs: a map of numbered
//! nodes plus the id of the result node. [`ExprGraph`] builds those graphs.

use crate::types::{AgriError, AgriResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Project hosting the public data catalog
pub const PUBLIC_CATALOG_PROJECT: &str = "earthengine-public";
pub const TOKEN_ENV: &str = "EARTHENGINE_TOKEN";
const PAGE_SIZE: u32 = 1000;

/// Bearer token from the config, else from the environment
pub fn resolve_token(configured: Option<&str>) -> AgriResult<String> {
    if let Some(token) = configured.filter(|t| !t.trim().is_empty()) {
        return Ok(token.trim().to_string());
    }
    std::env::var(TOKEN_ENV)
        .ok()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            AgriError::Config(format!(
                "No Earth Engine token: set 'sentinel2.earth_engine.access_token' or {}",
                TOKEN_ENV
            ))
        })
}

/// One image of a catalog listing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EeImage {
    /// Asset id, e.g. `COPERNICUS/S2_SR_HARMONIZED/20230501T103031_..._T31UFU`
    pub id: String,
    #[serde(default)]
    pub start_time: Option<String>,
}

impl EeImage {
    /// Image index: the last component of the asset id
    pub fn index(&self) -> &str {
        self.id.rsplit('/').next().unwrap_or(&self.id)
    }

    pub fn acquisition_time(&self) -> Option<NaiveDateTime> {
        self.start_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc).naive_utc())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListImagesResponse {
    #[serde(default)]
    images: Vec<EeImage>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ComputeResponse {
    result: Value,
}

#[derive(Debug, Deserialize)]
struct ThumbnailResponse {
    name: String,
}

/// Builder for Earth Engine expression graphs
#[derive(Debug, Default)]
pub struct ExprGraph {
    values: Map<String, Value>,
}

impl ExprGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function call node and return a reference to it
    pub fn invoke(&mut self, function: &str, arguments: Vec<(&str, Value)>) -> Value {
        let id = self.values.len().to_string();
        let arguments: Map<String, Value> = arguments
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        self.values.insert(
            id.clone(),
            json!({
                "functionInvocationValue": {
                    "functionName": function,
                    "arguments": arguments,
                }
            }),
        );
        json!({ "valueReference": id })
    }

    pub fn constant<T: Into<Value>>(value: T) -> Value {
        json!({ "constantValue": value.into() })
    }

    pub fn array(values: Vec<Value>) -> Value {
        json!({ "arrayValue": { "values": values } })
    }

    /// Polygon geometry node from a lon/lat ring
    pub fn polygon(&mut self, ring: &[(f64, f64)]) -> Value {
        let coordinates: Vec<Value> = ring.iter().map(|(x, y)| json!([x, y])).collect();
        self.invoke(
            "GeometryConstructors.Polygon",
            vec![
                ("coordinates", Self::constant(vec![Value::Array(coordinates)])),
                ("evenOdd", Self::constant(true)),
            ],
        )
    }

    /// Finish the graph with `result` (a reference returned by [`invoke`](Self::invoke))
    pub fn into_expression(self, result: &Value) -> AgriResult<Value> {
        let id = result
            .get("valueReference")
            .and_then(Value::as_str)
            .ok_or_else(|| AgriError::Processing("Expression result is not a node".to_string()))?;
        Ok(json!({ "result": id, "values": self.values }))
    }
}

/// Blocking Earth Engine REST client
pub struct EarthEngineClient {
    client: reqwest::blocking::Client,
    base_url: String,
    project: String,
    token: String,
}

impl EarthEngineClient {
    pub fn new(base_url: &str, project: &str, token: String) -> AgriResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(None)
            .build()
            .map_err(|e| AgriError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            project: project.to_string(),
            token,
        })
    }

    fn check(response: reqwest::blocking::Response, what: &str) -> AgriResult<reqwest::blocking::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().unwrap_or_default();
        Err(AgriError::Http(format!("{} failed with status {}: {}", what, status, body)))
    }

    /// All images of a public collection within `[start, end)` intersecting `region`
    pub fn list_images(
        &self,
        collection: &str,
        start: NaiveDate,
        end: NaiveDate,
        region: &Value,
    ) -> AgriResult<Vec<EeImage>> {
        let url = format!(
            "{}/v1/projects/{}/assets/{}:listImages",
            self.base_url, PUBLIC_CATALOG_PROJECT, collection
        );
        let start_time = format!("{}T00:00:00Z", start.format("%Y-%m-%d"));
        let end_time = format!("{}T00:00:00Z", end.format("%Y-%m-%d"));
        let region = region.to_string();
        let page_size = PAGE_SIZE.to_string();

        let mut images = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![
                ("startTime", start_time.as_str()),
                ("endTime", end_time.as_str()),
                ("region", region.as_str()),
                ("pageSize", page_size.as_str()),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .query(&query)
                .send()?;
            let page: ListImagesResponse = Self::check(response, "listImages")?.json()?;
            images.extend(page.images);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        log::info!("{}: {} images", collection, images.len());
        Ok(images)
    }

    /// Evaluate an expression to a JSON value
    pub fn compute_value(&self, expression: Value) -> AgriResult<Value> {
        let url = format!("{}/v1/projects/{}/value:compute", self.base_url, self.project);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&json!({ "expression": expression }))
            .send()?;
        let computed: ComputeResponse = Self::check(response, "value:compute")?.json()?;
        Ok(computed.result)
    }

    /// Render an image expression as GeoTIFF bytes (possibly zipped)
    pub fn download_geotiff(&self, expression: Value, band: &str) -> AgriResult<Vec<u8>> {
        let url = format!("{}/v1/projects/{}/thumbnails", self.base_url, self.project);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&json!({
                "expression": expression,
                "fileFormat": "GEO_TIFF",
                "bandIds": [band],
            }))
            .send()?;
        let thumbnail: ThumbnailResponse = Self::check(response, "thumbnails")?.json()?;

        let pixels_url = format!("{}/v1/{}:getPixels", self.base_url, thumbnail.name);
        let response = self
            .client
            .get(&pixels_url)
            .bearer_auth(&self.token)
            .send()?;
        let bytes = Self::check(response, "getPixels")?.bytes()?;
        Ok(bytes.to_vec())
    }
}
