//! Copernicus Data Space OData catalog queries for Sentinel-1 products.

use crate::config::Sentinel1Config;
use crate::core::scene::SceneName;
use crate::types::{AgriError, AgriResult, OrbitDirection};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct ODataResponse {
    #[serde(default)]
    value: Vec<ODataProduct>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ODataProduct {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ContentDate")]
    pub content_date: Option<ContentDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentDate {
    #[serde(rename = "Start")]
    pub start: String,
    #[serde(rename = "End")]
    pub end: Option<String>,
}

/// Catalog entry enriched with the fields derived from its name
#[derive(Debug, Clone)]
pub struct CatalogProduct {
    pub id: String,
    pub name: String,
    pub scene: SceneName,
    pub start: Option<NaiveDateTime>,
    pub relative_orbit: Option<u32>,
    pub orbit_direction: Option<OrbitDirection>,
    pub polarisation: String,
}

/// Scene search against the OData `Products` endpoint
pub struct CatalogClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl CatalogClient {
    pub fn new(base_url: &str) -> AgriResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(None)
            .build()
            .map_err(|e| AgriError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    /// Run the product search and return the raw catalog entries
    pub fn search(
        &self,
        s1: &Sentinel1Config,
        wkt: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AgriResult<Vec<ODataProduct>> {
        let filter = build_filter(s1, wkt, start, end);
        log::info!("Querying catalog: {}", self.base_url);
        log::debug!("$filter = {}", filter);

        let top = s1.odata.top.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("$filter", filter.as_str()),
                ("$orderby", s1.odata.orderby.as_str()),
                ("$top", top.as_str()),
            ])
            .send()
            .map_err(|e| AgriError::Http(format!("Catalog request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(AgriError::Http(format!(
                "Catalog query failed with status {}: {}",
                status, body
            )));
        }

        let parsed: ODataResponse = response
            .json()
            .map_err(|e| AgriError::Http(format!("Invalid catalog response: {}", e)))?;
        log::info!("Catalog returned {} products", parsed.value.len());
        Ok(parsed.value)
    }
}

/// OData `$filter` expression for the configured acquisition parameters
pub fn build_filter(s1: &Sentinel1Config, wkt: &str, start: NaiveDate, end: NaiveDate) -> String {
    let contains = if s1.satellite.eq_ignore_ascii_case("BOTH") {
        format!(
            "(contains(Name, 'S1A_{mode}_{level}') or contains(Name, 'S1B_{mode}_{level}'))",
            mode = s1.mode,
            level = s1.level
        )
    } else {
        format!("contains(Name, '{}_{}_{}')", s1.satellite, s1.mode, s1.level)
    };

    [
        format!("Collection/Name eq '{}'", s1.collection),
        contains,
        format!("OData.CSC.Intersects(area=geography'SRID=4326;{}')", wkt),
        format!("ContentDate/Start gt {}T00:00:00.000Z", start.format("%Y-%m-%d")),
        format!("ContentDate/Start lt {}T00:00:00.000Z", end.format("%Y-%m-%d")),
    ]
    .join(" and ")
}

fn parse_content_start(value: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc).naive_utc())
        .ok()
}

/// Derive orbit and polarisation fields; entries with unparseable names are dropped
pub fn enrich(products: Vec<ODataProduct>, descending_hour: u32) -> Vec<CatalogProduct> {
    products
        .into_iter()
        .filter_map(|p| {
            let scene = match SceneName::parse(&p.name) {
                Ok(scene) => scene,
                Err(e) => {
                    log::warn!("Skipping catalog entry {}: {}", p.name, e);
                    return None;
                }
            };
            let start = p
                .content_date
                .as_ref()
                .and_then(|c| parse_content_start(&c.start));
            Some(CatalogProduct {
                relative_orbit: scene.relative_orbit(),
                orbit_direction: start
                    .as_ref()
                    .map(|t| crate::core::scene::orbit_direction(t, descending_hour)),
                polarisation: scene.polarisation_label(),
                start,
                id: p.id,
                name: p.name,
                scene,
            })
        })
        .collect()
}

/// Apply relative-orbit, polarisation and COG filters
pub fn filter_products(products: Vec<CatalogProduct>, s1: &Sentinel1Config) -> Vec<CatalogProduct> {
    products
        .into_iter()
        .filter(|p| s1.rel_orbit.map_or(true, |rel| p.relative_orbit == Some(rel)))
        .filter(|p| {
            s1.polarisation
                .as_deref()
                .map_or(true, |pol| p.polarisation == pol)
        })
        .filter(|p| !p.name.contains("COG"))
        .collect()
}

/// Substitute `{key}` placeholders of the CSV name pattern
pub fn format_csv_name(pattern: &str, values: &[(&str, String)]) -> String {
    values.iter().fold(pattern.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}

/// Write the `Id,Name` table, replacing any existing file
pub fn write_scene_csv(path: &Path, products: &[CatalogProduct]) -> AgriResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["Id", "Name"])?;
    for product in products {
        writer.write_record([product.id.as_str(), product.name.trim_end_matches(".SAFE")])?;
    }
    writer.flush()?;
    Ok(())
}

/// Read the `Id` column of a scene table written by [`write_scene_csv`]
pub fn read_scene_ids(path: &Path) -> AgriResult<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let id_column = headers.iter().position(|h| h == "Id").ok_or_else(|| {
        AgriError::InvalidFormat(format!("No 'Id' column in {}", path.display()))
    })?;

    let mut ids = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(id) = record.get(id_column) {
            if !id.trim().is_empty() {
                ids.push(id.trim().to_string());
            }
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s1(satellite: &str) -> Sentinel1Config {
        Sentinel1Config {
            satellite: satellite.to_string(),
            ..Sentinel1Config::default()
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_filter_for_both_satellites() {
        let filter = build_filter(&s1("BOTH"), "MULTIPOLYGON EMPTY", date("2023-04-01"), date("2023-05-01"));
        assert_eq!(
            filter,
            "Collection/Name eq 'SENTINEL-1' and \
             (contains(Name, 'S1A_IW_SLC') or contains(Name, 'S1B_IW_SLC')) and \
             OData.CSC.Intersects(area=geography'SRID=4326;MULTIPOLYGON EMPTY') and \
             ContentDate/Start gt 2023-04-01T00:00:00.000Z and \
             ContentDate/Start lt 2023-05-01T00:00:00.000Z"
        );
    }

    #[test]
    fn test_filter_for_single_satellite() {
        let filter = build_filter(&s1("S1A"), "WKT", date("2023-04-01"), date("2023-05-01"));
        assert!(filter.contains("contains(Name, 'S1A_IW_SLC')"));
        assert!(!filter.contains("S1B"));
    }

    fn product(id: &str, name: &str, start: &str) -> ODataProduct {
        ODataProduct {
            id: id.to_string(),
            name: name.to_string(),
            content_date: Some(ContentDate {
                start: start.to_string(),
                end: None,
            }),
        }
    }

    #[test]
    fn test_enrich_and_filter() {
        let products = vec![
            product(
                "a",
                "S1A_IW_SLC__1SDV_20230501T054012_20230501T054039_048323_05D00F_1A2B.SAFE",
                "2023-05-01T05:40:12.000Z",
            ),
            product(
                "b",
                "S1A_IW_SLC__1SDV_20230503T171512_20230503T171539_048352_05D0F1_3C4D_COG.SAFE",
                "2023-05-03T17:15:12.000Z",
            ),
            product(
                "c",
                "S1A_IW_SLC__1SSH_20230505T054012_20230505T054039_048381_05D1C2_5E6F.SAFE",
                "2023-05-05T05:40:12.000Z",
            ),
            product("d", "garbage", "2023-05-05T05:40:12.000Z"),
        ];

        let enriched = enrich(products, 5);
        assert_eq!(enriched.len(), 3);
        assert_eq!(enriched[0].orbit_direction, Some(OrbitDirection::Descending));
        assert_eq!(enriched[1].orbit_direction, Some(OrbitDirection::Ascending));
        assert_eq!(enriched[0].relative_orbit, Some(((48323 - 73) % 175 + 1) as u32));

        let config = Sentinel1Config {
            polarisation: Some("VV+VH".to_string()),
            ..Sentinel1Config::default()
        };
        let kept = filter_products(enriched, &config);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "a");
    }

    #[test]
    fn test_csv_name_pattern() {
        let name = format_csv_name(
            "s1_{satellite}_{polarisation}_{start}_{end}_{rel_orbit}.csv",
            &[
                ("satellite", "BOTH".to_string()),
                ("polarisation", "VVVH".to_string()),
                ("start", "20230401".to_string()),
                ("end", "20230930".to_string()),
                ("rel_orbit", "ALL".to_string()),
            ],
        );
        assert_eq!(name, "s1_BOTH_VVVH_20230401_20230930_ALL.csv");
    }

    #[test]
    fn test_scene_csv_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ids").join("s1_ids.csv");
        let products = enrich(
            vec![product(
                "uuid-1",
                "S1B_IW_SLC__1SDV_20210101T054012_20210101T054039_025000_02F000_ABCD.SAFE",
                "2021-01-01T05:40:12.000Z",
            )],
            6,
        );
        write_scene_csv(&path, &products).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("Id,Name\n"));
        assert!(content.contains("uuid-1,S1B_IW_SLC__1SDV_20210101T054012_20210101T054039_025000_02F000_ABCD\n"));
        assert_eq!(read_scene_ids(&path).unwrap(), vec!["uuid-1".to_string()]);
    }
}
