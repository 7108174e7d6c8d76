//! Sentinel-1 product-name parsing and orbit bookkeeping.

use crate::types::{AgriError, AgriResult, OrbitDirection, Satellite};
use chrono::{NaiveDateTime, Timelike};

/// Orbits per Sentinel-1 repeat cycle
pub const ORBITS_PER_CYCLE: i64 = 175;

/// Parsed Sentinel-1 product name, e.g.
/// `S1A_IW_SLC__1SDV_20200103T170815_20200103T170842_030639_0382D5_DADE.SAFE`
#[derive(Debug, Clone, PartialEq)]
pub struct SceneName {
    pub satellite: Satellite,
    pub satellite_code: String,
    pub mode: String,
    pub product_type: String,
    pub polarisation: String,
    pub start: String,
    pub stop: String,
    pub absolute_orbit: i64,
    pub mission_id: String,
    pub product_id: String,
}

impl SceneName {
    /// Split a product name into its fields; the `.SAFE` suffix is ignored
    pub fn parse(name: &str) -> AgriResult<Self> {
        let normalized = name.trim_end_matches(".SAFE").replace("__", "_");
        let parts: Vec<&str> = normalized.split('_').collect();

        if parts.len() < 7 {
            return Err(AgriError::InvalidFormat(format!(
                "Product name has too few fields: {}",
                name
            )));
        }

        let absolute_orbit = parts[6].parse::<i64>().map_err(|_| {
            AgriError::InvalidFormat(format!(
                "Absolute orbit '{}' is not a number in {}",
                parts[6], name
            ))
        })?;

        let field = |i: usize| parts.get(i).map(|s| s.to_string()).unwrap_or_default();

        Ok(Self {
            satellite: Satellite::from_prefix(parts[0]),
            satellite_code: field(0),
            mode: field(1),
            product_type: field(2),
            polarisation: field(3),
            start: field(4),
            stop: field(5),
            absolute_orbit,
            mission_id: field(7),
            product_id: field(8),
        })
    }

    pub fn relative_orbit(&self) -> Option<u32> {
        relative_orbit(self.satellite, self.absolute_orbit)
    }

    /// Sensing start parsed from the compact `YYYYMMDDTHHMMSS` field
    pub fn start_time(&self) -> AgriResult<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.start, "%Y%m%dT%H%M%S").map_err(|e| {
            AgriError::InvalidFormat(format!("Bad sensing start '{}': {}", self.start, e))
        })
    }

    /// Polarisation label (`VV+VH`, ...) for the product's polarisation code
    pub fn polarisation_label(&self) -> String {
        polarisation_label(&self.polarisation)
    }
}

/// Relative orbit from the absolute orbit: `((abs - offset) mod 175) + 1`
pub fn relative_orbit(satellite: Satellite, absolute_orbit: i64) -> Option<u32> {
    let offset = satellite.orbit_offset()?;
    Some(((absolute_orbit - offset).rem_euclid(ORBITS_PER_CYCLE) + 1) as u32)
}

/// Pass direction from the acquisition hour
pub fn orbit_direction(time: &NaiveDateTime, descending_hour: u32) -> OrbitDirection {
    if time.hour() == descending_hour {
        OrbitDirection::Descending
    } else {
        OrbitDirection::Ascending
    }
}

/// Map a product polarisation code to its channel label; unknown codes pass through
pub fn polarisation_label(code: &str) -> String {
    match code {
        "1SDV" => "VV+VH",
        "1SDH" => "HH+HV",
        "1SSV" => "VV",
        "1SSH" => "HH",
        other => other,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const NAME: &str = "S1A_IW_SLC__1SDV_20200103T170815_20200103T170842_030639_0382D5_DADE.SAFE";

    #[test]
    fn test_parse_product_name() {
        let scene = SceneName::parse(NAME).unwrap();
        assert_eq!(scene.satellite, Satellite::S1A);
        assert_eq!(scene.mode, "IW");
        assert_eq!(scene.product_type, "SLC");
        assert_eq!(scene.polarisation, "1SDV");
        assert_eq!(scene.absolute_orbit, 30639);
        assert_eq!(scene.mission_id, "0382D5");
        assert_eq!(scene.product_id, "DADE");
        assert_eq!(scene.polarisation_label(), "VV+VH");
        assert_eq!(scene.start_time().unwrap().hour(), 17);
    }

    #[test]
    fn test_relative_orbit_cycle() {
        assert_eq!(relative_orbit(Satellite::S1A, 73), Some(1));
        assert_eq!(relative_orbit(Satellite::S1A, 248), Some(1));
        assert_eq!(relative_orbit(Satellite::S1A, 72), Some(175));
        assert_eq!(relative_orbit(Satellite::S1B, 27), Some(1));
        assert_eq!(relative_orbit(Satellite::Other, 27), None);

        let scene = SceneName::parse(NAME).unwrap();
        assert_eq!(scene.relative_orbit(), Some(((30639 - 73) % 175 + 1) as u32));
    }

    #[test]
    fn test_orbit_direction_by_hour() {
        let morning = NaiveDate::from_ymd_opt(2023, 5, 1)
            .unwrap()
            .and_hms_opt(5, 40, 0)
            .unwrap();
        assert_eq!(orbit_direction(&morning, 5), OrbitDirection::Descending);
        assert_eq!(orbit_direction(&morning, 6), OrbitDirection::Ascending);
    }

    #[test]
    fn test_bad_orbit_rejected() {
        assert!(SceneName::parse("S1A_IW_SLC__1SDV_a_b_orbit_x_y").is_err());
        assert!(SceneName::parse("field_12").is_err());
    }
}
