//! Selection of the points of interest which lie close to a route. The route
//! is projected into a metric CRS, and any POI within the buffer radius of
//! the projected line is kept.

use geo::{Distance, Euclidean, Geometry, LineString};
use geojson::FeatureCollection;
use serde::Serialize;

use crate::common::projection::Utm;
use crate::loading::pois::{Poi, PoiSets};

/// A route line in the projected CRS, along with the radius around it which
/// counts as being on the way
pub struct RouteBuffer {
    line: Geometry,
    radius: f64,
}

impl RouteBuffer {
    /// Project a route line (EPSG:4326) and set the buffer radius in metres.
    /// Returns None for an empty line, as nothing can be near it
    pub fn new(line_wgs: &LineString, radius: f64, utm: &Utm) -> Option<RouteBuffer> {
        if line_wgs.0.is_empty() {
            return None;
        }
        Some(RouteBuffer {
            line: Geometry::LineString(utm.line_to_utm(line_wgs)),
            radius: radius.max(0.0),
        })
    }

    /// Planar distance from a projected geometry to the route line, zero
    /// where the two touch
    pub fn distance_to(&self, geometry: &Geometry) -> f64 {
        Euclidean::distance(&self.line, geometry)
    }

    /// Check whether a projected geometry falls within the buffer
    pub fn contains(&self, geometry: &Geometry) -> bool {
        self.distance_to(geometry) <= self.radius
    }

    /// All POIs from a single category which lie within the buffer
    pub fn select<'a>(&self, pois: &'a [Poi]) -> Vec<&'a Poi> {
        pois.iter()
            .filter(|poi| self.contains(&poi.projected))
            .collect()
    }
}

/// The POIs found close to a route, split by category
#[derive(Debug, Default, PartialEq)]
pub struct NearbyPois<'a> {
    pub parks: Vec<&'a Poi>,
    pub ev: Vec<&'a Poi>,
    pub metro: Vec<&'a Poi>,
}

impl NearbyPois<'_> {
    pub fn is_empty(&self) -> bool {
        self.parks.is_empty() && self.ev.is_empty() && self.metro.is_empty()
    }

    /// Convert to GeoJSON for returning to the user, coordinates are
    /// EPSG:4326
    pub fn to_geojson(&self) -> NearbyPoisGeoJson {
        let collect = |pois: &[&Poi]| FeatureCollection {
            bbox: None,
            features: pois.iter().map(|poi| poi.to_feature()).collect(),
            foreign_members: None,
        };
        NearbyPoisGeoJson {
            parks: collect(&self.parks),
            ev: collect(&self.ev),
            metro: collect(&self.metro),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NearbyPoisGeoJson {
    pub parks: FeatureCollection,
    pub ev: FeatureCollection,
    pub metro: FeatureCollection,
}

/// Find all POIs within `buffer_m` metres of a route line (EPSG:4326). An
/// empty route gives empty results rather than an error
pub fn pois_along_route<'a>(
    line_wgs: &LineString,
    buffer_m: f64,
    pois: &'a PoiSets,
    utm: &Utm,
) -> NearbyPois<'a> {
    let Some(buffer) = RouteBuffer::new(line_wgs, buffer_m, utm) else {
        return NearbyPois::default();
    };

    NearbyPois {
        parks: buffer.select(&pois.parks),
        ev: buffer.select(&pois.ev),
        metro: buffer.select(&pois.metro),
    }
}
