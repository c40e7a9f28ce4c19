//! HTTP interface for the route planner. The road network and POIs are
//! loaded once at startup and shared between requests, the only mutable
//! state is the pair of points the user has clicked on.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use geo::Point;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::common::bbox::BBox;
use crate::common::config::{RouteRequest, Settings, UserRouteQuery};
use crate::common::graph_data::RoadNetwork;
use crate::common::projection::{Utm, project};
use crate::loading::graphml::GraphmlError;
use crate::loading::petgraph::load_road_network;
use crate::loading::pois::PoiSets;
use crate::routing::router::{ComparisonRow, RoutePair, Router as RoutePlanner, RoutingError};
use crate::routing::structs::Route;
use crate::routing::structs::metrics::RouteMetrics;
use crate::spatial::{NearbyPoisGeoJson, pois_along_route};

/// At most an origin and a destination are stored
const MAX_POINTS: usize = 2;

/// Everything the handlers need access to
pub struct AppState {
    pub network: RoadNetwork,
    pub pois: PoiSets,
    pub settings: Settings,
    pub utm: Utm,
    points: Mutex<Vec<(f64, f64)>>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(network: RoadNetwork, pois: PoiSets, settings: Settings) -> Self {
        AppState {
            network,
            pois,
            settings,
            utm: project(),
            points: Mutex::new(Vec::with_capacity(MAX_POINTS)),
        }
    }

    /// Load the enriched road network and the POIs from the locations set
    /// in the settings. Missing POIs are not fatal, the network is
    pub fn load(settings: Settings) -> Result<Self, GraphmlError> {
        let utm = project();
        let network = load_road_network(&settings.env_graph_path())?;
        let pois = PoiSets::load(&settings.pois_dir, &utm);
        Ok(AppState::new(network, pois, settings))
    }

    /// Snapshot of the stored points as (lat, lon)
    pub fn points(&self) -> Vec<(f64, f64)> {
        self.points
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Store a clicked point, returning false if both points are already set
    pub fn add_point(&self, lat: f64, lon: f64) -> bool {
        let mut points = self.points.lock().unwrap_or_else(PoisonError::into_inner);
        if points.len() >= MAX_POINTS {
            return false;
        }
        points.push((lat, lon));
        true
    }

    pub fn reset_points(&self) {
        self.points
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error("route planning stopped unexpectedly: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Routing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "status": "error",
            "message": self.to_string()
        });
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// A route as returned to the user, with its path as a GeoJSON line
#[derive(Debug, Serialize)]
pub struct RouteSummary {
    pub nodes: Vec<i64>,
    pub geometry: geojson::Geometry,
    pub bbox: Option<BBox>,
    pub skipped_segments: usize,
    pub metrics: RouteMetrics,
}

impl From<&Route> for RouteSummary {
    fn from(route: &Route) -> Self {
        RouteSummary {
            nodes: route.nodes.clone(),
            geometry: geojson::Geometry::new(geojson::Value::from(
                &route.geometry.line_string(),
            )),
            bbox: route.geometry.bbox,
            skipped_segments: route.geometry.skipped_segments,
            metrics: route.metrics.clone(),
        }
    }
}

/// Full response for a pair of points: both routes, the POIs along the
/// greenest route and a side by side comparison
#[derive(Debug, Serialize)]
pub struct RouteResponse {
    pub shortest: RouteSummary,
    pub greenest: RouteSummary,
    pub pois: NearbyPoisGeoJson,
    pub comparison: Vec<ComparisonRow>,
}

/// Plan both routes for a request and find the POIs along the greenest one
pub fn plan_routes(state: &AppState, request: &RouteRequest) -> Result<RouteResponse, ApiError> {
    request.validate().map_err(ApiError::BadRequest)?;

    let now = Instant::now();
    let planner = RoutePlanner::new(&state.network);
    let pair: RoutePair = planner.plan(&request.origin, &request.destination)?;

    if pair.greenest.geometry.is_empty() {
        warn!("Greenest route has no stored geometry, no POIs can be found");
    }
    let nearby = pois_along_route(
        &pair.greenest.geometry.line_string(),
        request.buffer_m,
        &state.pois,
        &state.utm,
    );

    info!(
        "Routes found in {:.2?}: shortest {} km, greenest {} km",
        now.elapsed(),
        pair.shortest.metrics.distance_km,
        pair.greenest.metrics.distance_km
    );

    Ok(RouteResponse {
        shortest: RouteSummary::from(&pair.shortest),
        greenest: RouteSummary::from(&pair.greenest),
        pois: nearby.to_geojson(),
        comparison: pair.comparison_table(),
    })
}

/// Route planning is CPU bound, run it on the blocking pool so the async
/// workers stay free
async fn plan_routes_blocking(
    state: SharedState,
    request: RouteRequest,
) -> Result<RouteResponse, ApiError> {
    tokio::task::spawn_blocking(move || plan_routes(&state, &request)).await?
}

async fn health_check() -> impl IntoResponse {
    let json_response = json!({
        "status": "success",
        "message": "OK"
    });

    Json(json_response)
}

async fn get_routes(
    State(state): State<SharedState>,
    Query(query): Query<UserRouteQuery>,
) -> Result<Json<RouteResponse>, ApiError> {
    let request = query.into_request(state.settings.buffer_m);
    let response = plan_routes_blocking(state, request).await?;
    Ok(Json(response))
}

/// A point clicked on the map
#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct ClickPoint {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Serialize)]
pub struct PointsResponse {
    pub points: Vec<ClickPoint>,
    pub accepted: bool,
    pub routes: Option<RouteResponse>,
}

fn to_click_points(points: &[(f64, f64)]) -> Vec<ClickPoint> {
    points
        .iter()
        .map(|(lat, lon)| ClickPoint { lat: *lat, lon: *lon })
        .collect()
}

/// Once an origin and destination have both been set, plan routes between
/// them
async fn routes_for_points(
    state: SharedState,
    points: &[(f64, f64)],
) -> Result<Option<RouteResponse>, ApiError> {
    let [(o_lat, o_lon), (d_lat, d_lon)] = points else {
        return Ok(None);
    };
    let request = RouteRequest {
        origin: Point::new(*o_lon, *o_lat),
        destination: Point::new(*d_lon, *d_lat),
        buffer_m: state.settings.buffer_m,
    };
    plan_routes_blocking(state, request).await.map(Some)
}

async fn add_point(
    State(state): State<SharedState>,
    payload: Result<Json<ClickPoint>, JsonRejection>,
) -> Result<Json<PointsResponse>, ApiError> {
    let Json(point) = payload?;
    if !(point.lat.is_finite() && point.lon.is_finite()) {
        return Err(ApiError::BadRequest(
            "coordinates must be finite numbers".to_string(),
        ));
    }

    let accepted = state.add_point(point.lat, point.lon);
    let points = state.points();
    let routes = routes_for_points(state, &points).await?;

    Ok(Json(PointsResponse {
        points: to_click_points(&points),
        accepted,
        routes,
    }))
}

async fn get_points(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({ "points": to_click_points(&state.points()) }))
}

async fn reset_points(State(state): State<SharedState>) -> impl IntoResponse {
    state.reset_points();
    Json(json!({ "points": [] }))
}

/// Set up the routes served by the API
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/healthcheck", get(health_check))
        .route("/routes", get(get_routes))
        .route("/points", get(get_points).post(add_point))
        .route("/reset", post(reset_points))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until the process is stopped
pub async fn serve(state: SharedState, bind: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Serving on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}
