//! Defines the structs which contain high level information about a route
//! (i.e. total distance, average greenness, average air quality)

use crate::common::graph_data::EdgeData;
use serde::Serialize;

/// Round a value to the provided number of decimal places
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Container for the running totals of a route as it's being unpacked
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathMetrics {
    pub dist: f64,
    pub green_cost: f64,
    pub ndvi_sum: f64,
    pub aqi_sum: f64,
    pub edges: usize,
}

impl PathMetrics {
    pub fn new() -> PathMetrics {
        PathMetrics::default()
    }

    /// Update the metrics to reflect their state after traversing the
    /// provided edge. Values are read from the sanitized edge attributes,
    /// the edge geometry plays no part
    pub fn take_step(&mut self, edata: &EdgeData) {
        self.dist += edata.length_or_default();
        self.green_cost += edata.green_cost;
        self.ndvi_sum += edata.ndvi_or_default();
        self.aqi_sum += edata.aqi_or_default();
        self.edges += 1;
    }

    fn mean(&self, total: f64) -> f64 {
        if self.edges == 0 {
            0.0
        } else {
            total / self.edges as f64
        }
    }

    pub fn finalize(self) -> RouteMetrics {
        RouteMetrics {
            distance_km: round_to(self.dist / 1000.0, 2),
            mean_ndvi: round_to(self.mean(self.ndvi_sum), 3),
            mean_aqi: round_to(self.mean(self.aqi_sum), 2),
            total_length_m: self.dist,
            total_green_cost: self.green_cost,
        }
    }
}

/// Container for the overall metrics of a completed route. Distance is in
/// km to 2dp, NDVI is a mean per edge to 3dp and AQI a mean per edge to 2dp.
/// Raw totals are kept for comparing routes
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RouteMetrics {
    pub distance_km: f64,
    pub mean_ndvi: f64,
    pub mean_aqi: f64,
    pub total_length_m: f64,
    pub total_green_cost: f64,
}

#[cfg(test)]
mod tests {

    use approx::assert_relative_eq;

    use super::*;

    fn edge(length: f64, ndvi: f64, aqi: f64) -> EdgeData {
        let mut edata = EdgeData {
            length: Some(length),
            ndvi: Some(ndvi),
            aqi: Some(aqi),
            ..Default::default()
        };
        edata.sanitize();
        edata
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(1.23456, 3), 1.235);
        assert_eq!(round_to(0.0, 2), 0.0);
    }

    #[test]
    fn test_take_step() {
        let mut metrics = PathMetrics::new();
        metrics.take_step(&edge(100.0, 0.5, 40.0));
        metrics.take_step(&edge(250.0, 0.1, 60.0));

        assert_eq!(metrics.edges, 2);
        assert_relative_eq!(metrics.dist, 350.0);
        assert_relative_eq!(metrics.ndvi_sum, 0.6);
        assert_relative_eq!(metrics.aqi_sum, 100.0);
    }

    #[test]
    fn test_finalize() {
        let mut metrics = PathMetrics::new();
        metrics.take_step(&edge(1234.0, 0.1234, 51.111));
        metrics.take_step(&edge(1000.0, 0.2, 48.0));

        let result = metrics.finalize();

        assert_eq!(result.distance_km, 2.23);
        assert_eq!(result.mean_ndvi, 0.162);
        assert_eq!(result.mean_aqi, 49.56);
        assert_relative_eq!(result.total_length_m, 2234.0);
    }

    /// A route which never leaves its start node has nothing to average
    #[test]
    fn test_finalize_empty() {
        let result = PathMetrics::new().finalize();

        assert_eq!(result.distance_km, 0.0);
        assert_eq!(result.mean_ndvi, 0.0);
        assert_eq!(result.mean_aqi, 0.0);
    }
}
