//! Attaches NDVI, AQI and length to every edge of a road network

use geo::{Centroid, Distance, Euclidean, LineString, Point};
use indicatif::ProgressBar;
use petgraph::graph::EdgeIndex;
use rayon::prelude::*;
use tracing::info;

use crate::common::graph_data::{RoadGraph, RoadNetwork};
use crate::common::projection::{PROJECT_EPSG, Utm};
use crate::pipeline::aqi::AqiSource;
use crate::pipeline::ndvi::NdviRaster;

/// Environmental values calculated for a single edge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeEnvironment {
    pub ndvi: f64,
    pub aqi: Option<f64>,
    pub length: f64,
}

/// Geometry of an edge in the projected CRS. Where none was stored, a
/// straight line between its two nodes is used instead
pub fn edge_line(graph: &RoadGraph, edge: EdgeIndex) -> Option<LineString> {
    let edata = graph.edge_weight(edge)?;
    if let Some(line) = &edata.geometry {
        return Some(line.clone());
    }
    let (src, dst) = graph.edge_endpoints(edge)?;
    let (src, dst) = (&graph[src], &graph[dst]);
    Some(LineString::from(vec![(src.x, src.y), (dst.x, dst.y)]))
}

/// Planar length of a line in the projected CRS, in metres
pub fn planar_length(line: &LineString) -> f64 {
    line.lines()
        .map(|segment| Euclidean::distance(segment.start_point(), segment.end_point()))
        .sum()
}

/// Centroid of an edge in EPSG:4326, used for sampling the NDVI raster and
/// finding the nearest AQI station
pub fn edge_centroid(line: &LineString, utm: &Utm) -> Option<Point> {
    utm.line_to_wgs84(line).centroid()
}

/// Work out the environmental values for a single edge. NDVI falls back to
/// 0.0 where the raster has no value
pub fn edge_environment(
    line: &LineString,
    raster: &NdviRaster,
    aqi: &AqiSource,
    utm: &Utm,
) -> EdgeEnvironment {
    let centroid = edge_centroid(line, utm);
    let ndvi = centroid
        .and_then(|point| raster.sample(point.x(), point.y()))
        .unwrap_or(0.0);
    let aqi = centroid.and_then(|point| aqi.aqi_at(point.x(), point.y()));

    EdgeEnvironment {
        ndvi,
        aqi,
        length: planar_length(line),
    }
}

/// Calculate NDVI, AQI and length for every edge in the network and store
/// them against the edges. The calculation runs in parallel, results are
/// written back in edge order so the output doesn't depend on scheduling
pub fn enrich_network(
    network: &mut RoadNetwork,
    raster: &NdviRaster,
    aqi: &AqiSource,
    utm: &Utm,
) {
    info!("Sampling NDVI and attaching AQI for {} edges", network.edge_count());
    let graph = &network.graph;
    let edges: Vec<EdgeIndex> = graph.edge_indices().collect();
    let bar = ProgressBar::new(edges.len() as u64);

    let mut results: Vec<Option<EdgeEnvironment>> = Vec::new();
    edges
        .par_iter()
        .map(|edge| {
            let env = edge_line(graph, *edge)
                .map(|line| edge_environment(&line, raster, aqi, utm));
            bar.inc(1);
            env
        })
        .collect_into_vec(&mut results);
    bar.finish();

    for (edge, env) in edges.into_iter().zip(results) {
        let (Some(env), Some(edata)) = (env, network.graph.edge_weight_mut(edge)) else {
            continue;
        };
        edata.ndvi = Some(env.ndvi);
        edata.aqi = env.aqi;
        edata.length = Some(env.length);
        edata.sanitize();
    }
    info!("NDVI, AQI and length (EPSG:{PROJECT_EPSG}) added");
}
