//! Edge cost model. Each road segment is scored on how green it is (NDVI)
//! and how polluted it is (AQI), the two are blended into a single cost
//! which is used as the routing weight for the greenest route.

use crate::common::graph_data::{EdgeData, RoadGraph};

/// Used when an edge has no NDVI reading
pub const DEFAULT_NDVI: f64 = 0.0;
/// Used when an edge has no AQI reading
pub const DEFAULT_AQI: f64 = 50.0;
/// Used when an edge has no length
pub const DEFAULT_LENGTH: f64 = 1.0;

const GREENNESS_WEIGHT: f64 = 0.7;
const POLLUTION_WEIGHT: f64 = 0.3;

/// Cost of travelling along a segment based on the vegetation around it.
/// Dense vegetation (NDVI near 1) costs close to nothing, bare ground or
/// water (NDVI near -1) costs the full length of the segment
pub fn greenness_cost(ndvi: f64, length: f64) -> f64 {
    let ndvi_norm = (ndvi.clamp(-1.0, 1.0) + 1.0) / 2.0;
    length * (1.0 - ndvi_norm)
}

/// Cost of travelling along a segment based on air quality, every 100 AQI
/// points adds the length of the segment again
pub fn pollution_cost(aqi: f64, length: f64) -> f64 {
    length * (1.0 + aqi / 100.0)
}

/// Blend of greenness and pollution costs, weighted 70/30
pub fn hybrid_cost(ndvi: f64, aqi: f64, length: f64) -> f64 {
    GREENNESS_WEIGHT * greenness_cost(ndvi, length)
        + POLLUTION_WEIGHT * pollution_cost(aqi, length)
}

impl EdgeData {
    /// NDVI for the edge, with the default substituted if not set
    pub fn ndvi_or_default(&self) -> f64 {
        finite_or(self.ndvi, DEFAULT_NDVI)
    }

    /// AQI for the edge, with the default substituted if not set or
    /// negative
    pub fn aqi_or_default(&self) -> f64 {
        non_negative_or(self.aqi, DEFAULT_AQI)
    }

    /// Length for the edge, with the default substituted if not set or
    /// negative
    pub fn length_or_default(&self) -> f64 {
        non_negative_or(self.length, DEFAULT_LENGTH)
    }

    /// Fill in any missing environmental attributes and recalculate the
    /// green cost for the edge
    pub fn sanitize(&mut self) {
        self.ndvi = Some(self.ndvi_or_default());
        self.aqi = Some(self.aqi_or_default());
        self.length = Some(self.length_or_default());
        self.green_cost = hybrid_cost(
            self.ndvi_or_default(),
            self.aqi_or_default(),
            self.length_or_default(),
        );
    }
}

/// Null and non-finite readings are both treated as missing
fn finite_or(value: Option<f64>, default: f64) -> f64 {
    match value {
        Some(val) if val.is_finite() => val,
        _ => default,
    }
}

/// Routing weights must never be negative, so negative readings are
/// treated as missing
fn non_negative_or(value: Option<f64>, default: f64) -> f64 {
    match value {
        Some(val) if val.is_finite() && val >= 0.0 => val,
        _ => default,
    }
}

/// Sanitize every edge in the graph. This must be called once after loading,
/// before any routes are generated
pub fn sanitize_edges(graph: &mut RoadGraph) {
    for edge in graph.edge_weights_mut() {
        edge.sanitize();
    }
}
