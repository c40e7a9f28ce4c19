//! Defines a struct to represent a bounding box, which is used to represent
//! a 2d square(ish) on the planet's surface. This is used when requesting
//! air quality stations for the city, and to set the viewport for a route

use serde::{Deserialize, Serialize};

/// A bounding box for geographical data. Contains the minimum and maximum
/// latitudes & longitudes, defining a 'rectangle' on the surface of the Earth
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BBox {
    /// Format the box in the south,west,north,east order expected by the
    /// WAQI map bounds endpoint
    pub fn to_latlng_str(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min_lat, self.min_lon, self.max_lat, self.max_lon
        )
    }
}

impl Default for BBox {
    /// Covers the greater Bengaluru area
    fn default() -> Self {
        BBox {
            min_lat: 12.7,
            min_lon: 77.4,
            max_lat: 13.2,
            max_lon: 77.9,
        }
    }
}
