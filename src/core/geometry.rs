//! Planar polygon geometry for AOIs and burst footprints.
//!
//! Coordinates are `(x, y)`, i.e. `(lon, lat)` for WGS84 geometries.

use crate::types::BoundingBox;

pub type Coord = (f64, f64);

/// Polygon with one exterior ring and optional holes; rings are closed
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub exterior: Vec<Coord>,
    pub interiors: Vec<Vec<Coord>>,
}

impl Polygon {
    pub fn new(exterior: Vec<Coord>, interiors: Vec<Vec<Coord>>) -> Self {
        Self {
            exterior: close_ring(exterior),
            interiors: interiors.into_iter().map(close_ring).collect(),
        }
    }

    pub fn bounds(&self) -> BoundingBox {
        ring_bounds(&self.exterior)
    }

    /// Signed shoelace area of the exterior ring minus holes
    pub fn area(&self) -> f64 {
        let holes: f64 = self.interiors.iter().map(|r| ring_area(r).abs()).sum();
        ring_area(&self.exterior).abs() - holes
    }

    /// At least three distinct vertices and a non-zero area
    pub fn is_valid(&self) -> bool {
        let mut distinct: Vec<Coord> = Vec::new();
        for c in &self.exterior {
            if !distinct.iter().any(|d| d == c) {
                distinct.push(*c);
            }
        }
        distinct.len() >= 3
            && self.area().abs() > f64::EPSILON
            && self.exterior.iter().all(|(x, y)| x.is_finite() && y.is_finite())
    }

    /// Even-odd containment, holes excluded
    pub fn contains_point(&self, p: Coord) -> bool {
        ring_contains(&self.exterior, p) && !self.interiors.iter().any(|r| ring_contains(r, p))
    }

    /// True when the polygons share any point: crossing edges or containment
    pub fn intersects(&self, other: &Polygon) -> bool {
        if !self.bounds().intersects(&other.bounds()) {
            return false;
        }

        for a in self.exterior.windows(2) {
            for b in other.exterior.windows(2) {
                if segments_intersect(a[0], a[1], b[0], b[1]) {
                    return true;
                }
            }
        }

        other.exterior.first().map_or(false, |p| self.contains_point(*p))
            || self.exterior.first().map_or(false, |p| other.contains_point(*p))
    }

    /// Apply a coordinate mapping to every vertex
    pub fn map_coords<F: Fn(Coord) -> Coord>(&self, f: F) -> Polygon {
        Polygon {
            exterior: self.exterior.iter().map(|c| f(*c)).collect(),
            interiors: self
                .interiors
                .iter()
                .map(|r| r.iter().map(|c| f(*c)).collect())
                .collect(),
        }
    }

    fn wkt_body(&self) -> String {
        let mut rings = vec![ring_wkt(&self.exterior)];
        rings.extend(self.interiors.iter().map(|r| ring_wkt(r)));
        format!("({})", rings.join(","))
    }
}

/// Collection of polygons, e.g. all placemarks of an AOI file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiPolygon(pub Vec<Polygon>);

impl MultiPolygon {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn bounds(&self) -> Option<BoundingBox> {
        let mut iter = self.0.iter().map(Polygon::bounds);
        let first = iter.next()?;
        Some(iter.fold(first, |acc, b| BoundingBox {
            min_lon: acc.min_lon.min(b.min_lon),
            max_lon: acc.max_lon.max(b.max_lon),
            min_lat: acc.min_lat.min(b.min_lat),
            max_lat: acc.max_lat.max(b.max_lat),
        }))
    }

    pub fn contains_point(&self, p: Coord) -> bool {
        self.0.iter().any(|poly| poly.contains_point(p))
    }

    pub fn intersects(&self, polygon: &Polygon) -> bool {
        self.0.iter().any(|poly| poly.intersects(polygon))
    }

    /// Well-known text; an empty collection is `MULTIPOLYGON EMPTY`
    pub fn to_wkt(&self) -> String {
        if self.0.is_empty() {
            return "MULTIPOLYGON EMPTY".to_string();
        }
        let parts: Vec<String> = self.0.iter().map(Polygon::wkt_body).collect();
        format!("MULTIPOLYGON ({})", parts.join(","))
    }
}

fn close_ring(mut ring: Vec<Coord>) -> Vec<Coord> {
    if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
        if first != last {
            ring.push(first);
        }
    }
    ring
}

fn ring_wkt(ring: &[Coord]) -> String {
    let coords: Vec<String> = ring.iter().map(|(x, y)| format!("{} {}", x, y)).collect();
    format!("({})", coords.join(", "))
}

fn ring_bounds(ring: &[Coord]) -> BoundingBox {
    ring.iter().fold(
        BoundingBox {
            min_lon: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
        },
        |b, (x, y)| BoundingBox {
            min_lon: b.min_lon.min(*x),
            max_lon: b.max_lon.max(*x),
            min_lat: b.min_lat.min(*y),
            max_lat: b.max_lat.max(*y),
        },
    )
}

fn ring_area(ring: &[Coord]) -> f64 {
    ring.windows(2)
        .map(|w| w[0].0 * w[1].1 - w[1].0 * w[0].1)
        .sum::<f64>()
        / 2.0
}

fn ring_contains(ring: &[Coord], (px, py): Coord) -> bool {
    let mut inside = false;
    for w in ring.windows(2) {
        let ((x1, y1), (x2, y2)) = (w[0], w[1]);
        if (y1 > py) != (y2 > py) {
            let x_cross = x1 + (py - y1) * (x2 - x1) / (y2 - y1);
            if px < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

fn orientation(a: Coord, b: Coord, c: Coord) -> f64 {
    (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
}

fn on_segment(a: Coord, b: Coord, p: Coord) -> bool {
    p.0 >= a.0.min(b.0) && p.0 <= a.0.max(b.0) && p.1 >= a.1.min(b.1) && p.1 <= a.1.max(b.1)
}

fn segments_intersect(p1: Coord, p2: Coord, q1: Coord, q2: Coord) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(q1, q2, p1))
        || (d2 == 0.0 && on_segment(q1, q2, p2))
        || (d3 == 0.0 && on_segment(p1, p2, q1))
        || (d4 == 0.0 && on_segment(p1, p2, q2))
}
