//! This module contains structs which represent configuration, both for the
//! system as a whole (where the data lives, which air quality source to use,
//! where to serve the API) and for individual route requests received from
//! the end user.

use crate::common::bbox::BBox;
use clap::ValueEnum;
use config::{Config, ConfigError, Environment, File};
use geo::Point;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default radius (metres) used when searching for points of interest along
/// a route
pub const DEFAULT_BUFFER_M: f64 = 300.0;

/// Placeholder value for the WAQI token, treated the same as a missing token
pub const WAQI_TOKEN_PLACEHOLDER: &str = "YOUR_WAQI_TOKEN_HERE";

/// Sets the edge attribute which is minimised when finding a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Weight {
    Length,
    GreenCost,
}

impl Weight {
    pub fn as_str(&self) -> &'static str {
        match self {
            Weight::Length => "length",
            Weight::GreenCost => "green_cost",
        }
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Determines how air quality readings are attached to road edges when
/// building the environmental graph. Uniform applies a single city-wide
/// reading to every edge, NearestStation uses the closest monitoring station.
/// The command line and the config files accept the same spellings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum AqiStrategy {
    Uniform,
    #[serde(alias = "nearest-station")]
    #[value(alias = "nearest-station")]
    NearestStation,
}

/// System level settings. Defaults are set in code, and can be overridden
/// by config/default.toml (optional) followed by GREEN_ROUTES__* environment
/// variables
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub ndvi_path: PathBuf,
    pub pois_dir: PathBuf,
    pub city: String,
    pub waqi_token: String,
    pub waqi_base_url: String,
    pub aqi_strategy: AqiStrategy,
    pub station_bounds: BBox,
    pub bind: String,
    pub buffer_m: f64,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("GREEN_ROUTES").separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    /// Settings with only the in-code defaults applied
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    fn builder()
    -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError>
    {
        let bounds = BBox::default();
        Config::builder()
            .set_default("data_dir", "data")?
            .set_default(
                "ndvi_path",
                "data/raw/sentinel_ndvi/ndvi_bengaluru_2024.tiff",
            )?
            .set_default("pois_dir", "data/pois")?
            .set_default("city", "Bengaluru")?
            .set_default("waqi_token", "")?
            .set_default("waqi_base_url", "https://api.waqi.info")?
            .set_default("aqi_strategy", "nearest_station")?
            .set_default("station_bounds.min_lat", bounds.min_lat)?
            .set_default("station_bounds.min_lon", bounds.min_lon)?
            .set_default("station_bounds.max_lat", bounds.max_lat)?
            .set_default("station_bounds.max_lon", bounds.max_lon)?
            .set_default("bind", "0.0.0.0:8000")?
            .set_default("buffer_m", DEFAULT_BUFFER_M)
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    /// Projected road graph as downloaded from OSM, input to the pipeline
    pub fn base_graph_path(&self) -> PathBuf {
        self.processed_dir().join("roads_base_utm.graphml")
    }

    /// Road graph with environmental attributes, output of the pipeline
    pub fn env_graph_path(&self) -> PathBuf {
        self.processed_dir().join("roads_with_env.graphml")
    }

    pub fn edges_geojson_path(&self) -> PathBuf {
        self.processed_dir().join("edges_ndvi_aqi.geojson")
    }

    pub fn edges_csv_path(&self) -> PathBuf {
        self.processed_dir().join("edges_ndvi_aqi.csv")
    }

    /// Check that a usable WAQI token has been configured
    pub fn waqi_token(&self) -> Option<&str> {
        let token = self.waqi_token.trim();
        if token.is_empty() || token == WAQI_TOKEN_PLACEHOLDER {
            None
        } else {
            Some(token)
        }
    }
}

/// Stores the user's route request exactly as it is received from the API
#[derive(Deserialize, Debug, PartialEq)]
pub struct UserRouteQuery {
    pub origin_lat: f64,
    pub origin_lon: f64,
    pub dest_lat: f64,
    pub dest_lon: f64,
    pub buffer_m: Option<f64>,
}

impl UserRouteQuery {
    /// Convert into a RouteRequest, falling back to the provided radius if
    /// the user didn't ask for one
    pub fn into_request(self, default_buffer_m: f64) -> RouteRequest {
        RouteRequest {
            origin: Point::new(self.origin_lon, self.origin_lat),
            destination: Point::new(self.dest_lon, self.dest_lat),
            buffer_m: self.buffer_m.unwrap_or(default_buffer_m),
        }
    }
}

/// A request for the shortest & greenest routes between two points. Points
/// are stored as (lon, lat) in EPSG:4326
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub origin: Point,
    pub destination: Point,
    pub buffer_m: f64,
}

impl RouteRequest {
    /// Check that the request can be processed, coordinates must be finite
    /// and the buffer radius must not be negative
    pub fn validate(&self) -> Result<(), String> {
        let coords = [
            self.origin.x(),
            self.origin.y(),
            self.destination.x(),
            self.destination.y(),
        ];
        if coords.iter().any(|c| !c.is_finite()) {
            return Err("coordinates must be finite numbers".to_string());
        }
        if !(self.buffer_m.is_finite() && self.buffer_m >= 0.0) {
            return Err("buffer_m must be a non-negative number".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    /// Weight keys are serialized with the same names as the edge attributes
    #[test]
    fn test_weight_names() {
        for weight in [Weight::Length, Weight::GreenCost] {
            assert_eq!(
                serde_json::to_value(weight).unwrap(),
                serde_json::json!(weight.as_str())
            );
        }
        assert_eq!(Weight::GreenCost.to_string(), "green_cost");
    }

    /// Both spellings of each strategy are accepted from the command line
    /// and from config
    #[test]
    fn test_aqi_strategy_spellings() {
        let cases = [
            ("uniform", AqiStrategy::Uniform),
            ("nearest_station", AqiStrategy::NearestStation),
            ("nearest-station", AqiStrategy::NearestStation),
        ];
        for (input, target) in cases {
            assert_eq!(AqiStrategy::from_str(input, false), Ok(target), "{input}");
            let parsed: AqiStrategy =
                serde_json::from_value(serde_json::json!(input)).unwrap();
            assert_eq!(parsed, target, "{input}");
        }
        assert!(AqiStrategy::from_str("other", false).is_err());
        assert!(serde_json::from_value::<AqiStrategy>(serde_json::json!("other")).is_err());
    }

    /// In-code defaults should describe the Bengaluru setup
    #[test]
    fn test_default_settings() {
        let settings = Settings::defaults().unwrap();

        assert_eq!(settings.city, "Bengaluru");
        assert_eq!(settings.aqi_strategy, AqiStrategy::NearestStation);
        assert_eq!(settings.station_bounds, BBox::default());
        assert_eq!(settings.buffer_m, DEFAULT_BUFFER_M);
        assert_eq!(
            settings.env_graph_path(),
            PathBuf::from("data/processed/roads_with_env.graphml")
        );
    }

    /// Missing or placeholder tokens should not be handed out
    #[test]
    fn test_waqi_token() {
        let mut settings = Settings::defaults().unwrap();
        assert_eq!(settings.waqi_token(), None);

        settings.waqi_token = WAQI_TOKEN_PLACEHOLDER.to_string();
        assert_eq!(settings.waqi_token(), None);

        settings.waqi_token = " abc123 ".to_string();
        assert_eq!(settings.waqi_token(), Some("abc123"));
    }

    /// Check conversion from UserRouteQuery to RouteRequest retains all of
    /// the necessary information
    #[test]
    fn test_user_query_to_request() {
        let query = UserRouteQuery {
            origin_lat: 12.97,
            origin_lon: 77.59,
            dest_lat: 12.93,
            dest_lon: 77.62,
            buffer_m: None,
        };

        let target = RouteRequest {
            origin: (77.59, 12.97).into(),
            destination: (77.62, 12.93).into(),
            buffer_m: 300.0,
        };

        assert_eq!(query.into_request(DEFAULT_BUFFER_M), target);
    }

    #[test]
    fn test_validate_request() {
        let mut request = RouteRequest {
            origin: (77.59, 12.97).into(),
            destination: (77.62, 12.93).into(),
            buffer_m: 0.0,
        };
        assert!(request.validate().is_ok());

        request.buffer_m = -1.0;
        assert!(request.validate().is_err());

        request.buffer_m = 300.0;
        request.origin = (f64::NAN, 12.97).into();
        assert!(request.validate().is_err());
    }
}
