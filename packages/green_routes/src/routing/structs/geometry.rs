//! Defines the structs which contain all of the details about the physical
//! geometry of a route (i.e. the points it visits)
use geo::{Coord, LineString};
use serde::Serialize;

use crate::common::bbox::BBox;
use crate::common::graph_data::EdgeData;
use crate::common::projection::Utm;

/// Stores the geometry of a route in the projected CRS while its edges are
/// being walked
#[derive(Debug, Clone, Default)]
pub struct PathGeometry {
    coords: Vec<Coord>,
    skipped: usize,
}

impl PathGeometry {
    pub fn new() -> PathGeometry {
        PathGeometry::default()
    }

    /// Append the geometry of an edge. Edges without a stored geometry are
    /// skipped, so the route loses the exact shape of that segment. This
    /// only affects what's drawn, metrics are calculated separately. Joins
    /// between segments are not deduplicated
    pub fn take_step(&mut self, edata: &EdgeData) {
        match &edata.geometry {
            Some(line) => self.coords.extend(line.coords().copied()),
            None => self.skipped += 1,
        }
    }

    /// Reproject the collected coordinates back to EPSG:4326
    pub fn finalize(self, utm: &Utm) -> RouteGeometry {
        let projected = LineString::new(self.coords);
        let line = utm.line_to_wgs84(&projected);
        let coords: Vec<(f64, f64)> = line.coords().map(|c| (c.x, c.y)).collect();

        RouteGeometry {
            bbox: get_bbox(&coords),
            coords,
            skipped_segments: self.skipped,
            projected,
        }
    }
}

/// Determine the bounding box of a set of (lon, lat) coordinates, this can
/// be used to set the viewport when rendering the route
fn get_bbox(coords: &[(f64, f64)]) -> Option<BBox> {
    let (first_lon, first_lat) = *coords.first()?;
    let mut bbox = BBox {
        min_lat: first_lat,
        min_lon: first_lon,
        max_lat: first_lat,
        max_lon: first_lon,
    };
    for (lon, lat) in coords.iter().skip(1) {
        bbox.min_lat = bbox.min_lat.min(*lat);
        bbox.min_lon = bbox.min_lon.min(*lon);
        bbox.max_lat = bbox.max_lat.max(*lat);
        bbox.max_lon = bbox.max_lon.max(*lon);
    }
    Some(bbox)
}

/// Stores the geometry of each route in a format which can easily be rendered
/// in the frontend. Coordinates are (lon, lat)
#[derive(Debug, Clone, Serialize)]
pub struct RouteGeometry {
    pub coords: Vec<(f64, f64)>,
    pub bbox: Option<BBox>,
    pub skipped_segments: usize,
    #[serde(skip)]
    pub projected: LineString,
}

impl RouteGeometry {
    /// The route as a line string in EPSG:4326
    pub fn line_string(&self) -> LineString {
        self.coords.clone().into()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }
}

#[cfg(test)]
mod tests {

    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::common::projection::project;

    fn edge_with_line(coords: Vec<(f64, f64)>) -> EdgeData {
        EdgeData {
            geometry: Some(coords.into()),
            ..Default::default()
        }
    }

    /// Segments are concatenated in order, shared endpoints are kept
    #[test]
    fn test_take_step_concatenates() {
        let utm = project();
        let (ax, ay) = utm.forward(77.59, 12.97);
        let (bx, by) = utm.forward(77.60, 12.97);
        let (cx, cy) = utm.forward(77.60, 12.98);

        let mut geometry = PathGeometry::new();
        geometry.take_step(&edge_with_line(vec![(ax, ay), (bx, by)]));
        geometry.take_step(&edge_with_line(vec![(bx, by), (cx, cy)]));

        let result = geometry.finalize(&utm);

        assert_eq!(result.coords.len(), 4);
        assert_eq!(result.skipped_segments, 0);
        assert_abs_diff_eq!(result.coords[0].0, 77.59, epsilon = 1e-6);
        assert_abs_diff_eq!(result.coords[0].1, 12.97, epsilon = 1e-6);
        assert_abs_diff_eq!(result.coords[3].0, 77.60, epsilon = 1e-6);
        assert_abs_diff_eq!(result.coords[3].1, 12.98, epsilon = 1e-6);

        let bbox = result.bbox.unwrap();
        assert_abs_diff_eq!(bbox.min_lon, 77.59, epsilon = 1e-6);
        assert_abs_diff_eq!(bbox.max_lat, 12.98, epsilon = 1e-6);
    }

    /// Edges without geometry are dropped from the drawn route
    #[test]
    fn test_take_step_skips_missing() {
        let utm = project();
        let (ax, ay) = utm.forward(77.59, 12.97);
        let (bx, by) = utm.forward(77.60, 12.97);

        let mut geometry = PathGeometry::new();
        geometry.take_step(&EdgeData::default());
        geometry.take_step(&edge_with_line(vec![(ax, ay), (bx, by)]));

        let result = geometry.finalize(&utm);

        assert_eq!(result.coords.len(), 2);
        assert_eq!(result.skipped_segments, 1);
        assert_eq!(result.projected.0.len(), 2);
    }

    #[test]
    fn test_finalize_empty() {
        let result = PathGeometry::new().finalize(&project());

        assert!(result.is_empty());
        assert!(result.bbox.is_none());
        assert!(result.line_string().0.is_empty());
    }
}
