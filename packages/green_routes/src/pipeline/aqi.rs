//! Air quality readings from the World Air Quality Index (WAQI) API, and
//! their assignment to road edges.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::common::bbox::BBox;
use crate::common::config::{AqiStrategy, Settings};

#[derive(Debug, Error)]
pub enum AqiError {
    #[error("no WAQI token configured, set GREEN_ROUTES__WAQI_TOKEN")]
    MissingToken,
    #[error("WAQI request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("WAQI API error: {0}")]
    Api(Value),
    #[error("unexpected WAQI response: {0}")]
    InvalidResponse(String),
    #[error("no usable AQI stations found")]
    NoStations,
    #[error("unable to save AQI response: {0}")]
    Io(#[from] std::io::Error),
    #[error("unable to serialize AQI response: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single monitoring station with a current reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub aqi: f64,
    pub lat: f64,
    pub lon: f64,
}

/// The air quality data used to score edges, as selected by AqiStrategy
#[derive(Debug, Clone, PartialEq)]
pub enum AqiSource {
    Uniform(f64),
    Stations(Vec<Station>),
}

impl AqiSource {
    /// AQI to attach to an edge with its centroid at (lon, lat)
    pub fn aqi_at(&self, lon: f64, lat: f64) -> Option<f64> {
        match self {
            AqiSource::Uniform(aqi) => Some(*aqi),
            AqiSource::Stations(stations) => nearest_station_aqi(lon, lat, stations),
        }
    }
}

/// Reading from the station closest to (lon, lat). Distances are squared
/// differences in degrees, which is only an approximation but is good
/// enough at city scale. Ties go to the first station in the list
pub fn nearest_station_aqi(lon: f64, lat: f64, stations: &[Station]) -> Option<f64> {
    let mut best_dist = f64::INFINITY;
    let mut best_aqi = None;
    for station in stations {
        let dist = (lat - station.lat).powi(2) + (lon - station.lon).powi(2);
        if dist < best_dist {
            best_dist = dist;
            best_aqi = Some(station.aqi);
        }
    }
    best_aqi
}

/// WAQI reports AQI either as a number or a numeric string, with "-" or ""
/// used when a station has no current reading
pub fn parse_aqi_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => match text.trim() {
            "" | "-" => None,
            other => other.parse::<f64>().ok(),
        },
        _ => None,
    }
}

fn check_status(response: &Value) -> Result<(), AqiError> {
    match response.get("status").and_then(Value::as_str) {
        Some("ok") => Ok(()),
        _ => Err(AqiError::Api(response.clone())),
    }
}

/// Pull the city-wide AQI out of a city feed response
pub fn parse_city_response(response: &Value) -> Result<f64, AqiError> {
    check_status(response)?;
    let aqi = response
        .get("data")
        .and_then(|data| data.get("aqi"))
        .ok_or_else(|| AqiError::InvalidResponse("missing data.aqi".to_string()))?;
    parse_aqi_value(aqi)
        .ok_or_else(|| AqiError::InvalidResponse(format!("unusable AQI value {aqi}")))
}

/// Pull all stations with a current reading out of a map bounds response
pub fn parse_station_response(response: &Value) -> Result<Vec<Station>, AqiError> {
    check_status(response)?;
    let records = response
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| AqiError::InvalidResponse("missing data array".to_string()))?;

    let stations = records
        .iter()
        .filter_map(|record| {
            Some(Station {
                aqi: parse_aqi_value(record.get("aqi")?)?,
                lat: record.get("lat")?.as_f64()?,
                lon: record.get("lon")?.as_f64()?,
            })
        })
        .collect();
    Ok(stations)
}

/// Blocking client for the two WAQI endpoints used when building the graph
pub struct WaqiClient {
    client: Client,
    base_url: String,
    token: String,
}

impl WaqiClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        WaqiClient {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// Create a client from the system settings, failing if no real token
    /// has been provided
    pub fn from_settings(settings: &Settings) -> Result<Self, AqiError> {
        let token = settings.waqi_token().ok_or(AqiError::MissingToken)?;
        Ok(WaqiClient::new(&settings.waqi_base_url, token))
    }

    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, AqiError> {
        let response = self
            .client
            .get(url)
            .query(&[("token", self.token.as_str())])
            .query(query)
            .send()?
            .error_for_status()?
            .json::<Value>()?;
        Ok(response)
    }

    /// Raw response from the city feed endpoint
    pub fn city_feed(&self, city: &str) -> Result<Value, AqiError> {
        info!("Fetching AQI for {city} from WAQI");
        let url = format!("{}/feed/{}/", self.base_url, city);
        self.get(&url, &[])
    }

    /// Raw response from the map bounds endpoint, listing all stations
    /// within the provided bounds
    pub fn stations_in(&self, bounds: &BBox) -> Result<Value, AqiError> {
        info!("Fetching AQI stations within {}", bounds.to_latlng_str());
        let url = format!("{}/map/bounds/", self.base_url);
        let latlng = bounds.to_latlng_str();
        self.get(&url, &[("latlng", latlng.as_str())])
    }
}

/// Fetch the air quality data for the configured strategy. The city-wide
/// response is saved as-is to `aqi_raw.json`, the usable stations to
/// `aqi_stations.json`, both in `raw_dir`
pub fn fetch_aqi(
    client: &WaqiClient,
    settings: &Settings,
    strategy: AqiStrategy,
    raw_dir: &Path,
) -> Result<AqiSource, AqiError> {
    match strategy {
        AqiStrategy::Uniform => {
            let response = client.city_feed(&settings.city)?;
            let aqi = parse_city_response(&response)?;
            info!("AQI for {}: {aqi}", settings.city);

            let path = raw_dir.join("aqi_raw.json");
            fs::write(&path, serde_json::to_string_pretty(&response)?)?;
            info!("Saved {}", path.display());
            Ok(AqiSource::Uniform(aqi))
        }
        AqiStrategy::NearestStation => {
            let response = client.stations_in(&settings.station_bounds)?;
            let stations = parse_station_response(&response)?;
            if stations.is_empty() {
                return Err(AqiError::NoStations);
            }
            info!("Found {} AQI stations", stations.len());

            let path = raw_dir.join("aqi_stations.json");
            fs::write(&path, serde_json::to_string_pretty(&stations)?)?;
            info!("Saved {}", path.display());
            Ok(AqiSource::Stations(stations))
        }
    }
}
