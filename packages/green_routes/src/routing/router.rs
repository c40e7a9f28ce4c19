//! Finds the shortest and greenest routes between two points. Both searches
//! run on the same graph, the only difference being which edge attribute is
//! minimised.

use geo::Point;
use petgraph::algo::astar;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use std::cmp::Ordering;
use thiserror::Error;
use tracing::debug;

use crate::common::config::Weight;
use crate::common::graph_data::{EdgeData, RoadGraph, RoadNetwork};
use crate::common::projection::{Utm, project};
use crate::loading::petgraph::nearest_node;
use crate::routing::structs::Route;

#[derive(Debug, Error, PartialEq)]
pub enum RoutingError {
    #[error("the road network has no nodes")]
    EmptyGraph,
    #[error("no path exists between node {from} and node {to}")]
    NoPath { from: i64, to: i64 },
}

/// Fetch the routing weight of an edge for the provided weight key
pub fn edge_weight(edata: &EdgeData, weight: Weight) -> f64 {
    match weight {
        Weight::Length => edata.length_or_default(),
        Weight::GreenCost => edata.green_cost,
    }
}

/// Ordering used to choose between parallel edges, lowest weight first with
/// the edge key breaking any ties
fn compare_edges(a: &EdgeData, b: &EdgeData, weight: Weight) -> Ordering {
    edge_weight(a, weight)
        .total_cmp(&edge_weight(b, weight))
        .then(a.key.cmp(&b.key))
}

/// Pick the edge to travel along between two adjacent nodes. Where several
/// parallel edges connect them, the one with the lowest weight is used (the
/// one the shortest path search will have used), falling back to the lowest
/// key
pub fn select_edge(
    graph: &RoadGraph,
    src: NodeIndex,
    dst: NodeIndex,
    weight: Weight,
) -> Option<EdgeIndex> {
    graph
        .edges_connecting(src, dst)
        .min_by(|a, b| compare_edges(a.weight(), b.weight(), weight))
        .map(|eref| eref.id())
}

/// Wraps a road network, providing nearest node lookups and shortest path
/// searches over it
pub struct Router<'a> {
    network: &'a RoadNetwork,
    utm: Utm,
}

impl<'a> Router<'a> {
    pub fn new(network: &'a RoadNetwork) -> Router<'a> {
        Router {
            network,
            utm: project(),
        }
    }

    pub fn graph(&self) -> &RoadGraph {
        &self.network.graph
    }

    /// Find the node nearest to a (lon, lat) point
    pub fn nearest_node(&self, point: &Point) -> Result<NodeIndex, RoutingError> {
        nearest_node(self.graph(), &self.utm, point)
            .ok_or(RoutingError::EmptyGraph)
    }

    /// Non-negative weight shortest path between two nodes, returned as the
    /// full list of nodes visited (both ends included). A* is run with a
    /// zero heuristic, which makes it equivalent to Dijkstra's algorithm
    pub fn shortest_path(
        &self,
        from: NodeIndex,
        to: NodeIndex,
        weight: Weight,
    ) -> Result<Vec<NodeIndex>, RoutingError> {
        let graph = self.graph();
        let result = astar(
            graph,
            from,
            |finish| finish == to,
            |eref| edge_weight(eref.weight(), weight),
            |_| 0.0,
        );

        match result {
            Some((cost, path)) => {
                debug!("Found {weight} path with {} nodes, cost {cost:.2}", path.len());
                Ok(path)
            }
            None => Err(RoutingError::NoPath {
                from: graph[from].id,
                to: graph[to].id,
            }),
        }
    }

    /// Resolve the origin & destination (lon, lat) to nodes and find the
    /// shortest path between them
    pub fn compute_path(
        &self,
        origin: &Point,
        destination: &Point,
        weight: Weight,
    ) -> Result<Vec<NodeIndex>, RoutingError> {
        let from = self.nearest_node(origin)?;
        let to = self.nearest_node(destination)?;
        self.shortest_path(from, to, weight)
    }

    /// Compute a full route, including geometry and metrics
    pub fn route(
        &self,
        origin: &Point,
        destination: &Point,
        weight: Weight,
    ) -> Result<Route, RoutingError> {
        let path = self.compute_path(origin, destination, weight)?;
        Ok(self.route_from_path(path, weight))
    }

    /// Build a route from a list of nodes, selecting the edge used for each
    /// hop. Consecutive nodes are always connected when the path comes from
    /// shortest_path
    pub fn route_from_path(&self, path: Vec<NodeIndex>, weight: Weight) -> Route {
        let graph = self.graph();
        let edges: Vec<EdgeIndex> = path
            .windows(2)
            .filter_map(|pair| select_edge(graph, pair[0], pair[1], weight))
            .collect();

        Route::new(graph, &self.utm, weight, path, edges)
    }

    /// Compute both the shortest and the greenest route for a pair of points
    pub fn plan(
        &self,
        origin: &Point,
        destination: &Point,
    ) -> Result<RoutePair, RoutingError> {
        let shortest = self.route(origin, destination, Weight::Length)?;
        let greenest = self.route(origin, destination, Weight::GreenCost)?;
        Ok(RoutePair { shortest, greenest })
    }
}

/// The two routes computed for each request
#[derive(Debug, Clone, Serialize)]
pub struct RoutePair {
    pub shortest: Route,
    pub greenest: Route,
}

impl RoutePair {
    /// Side by side comparison of the metrics for both routes, one row per
    /// metric
    pub fn comparison_table(&self) -> Vec<ComparisonRow> {
        let short = &self.shortest.metrics;
        let green = &self.greenest.metrics;
        vec![
            ComparisonRow {
                metric: "Distance (km)",
                shortest: short.distance_km,
                greenest: green.distance_km,
            },
            ComparisonRow {
                metric: "Avg NDVI",
                shortest: short.mean_ndvi,
                greenest: green.mean_ndvi,
            },
            ComparisonRow {
                metric: "Avg AQI",
                shortest: short.mean_aqi,
                greenest: green.mean_aqi,
            },
        ]
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ComparisonRow {
    pub metric: &'static str,
    pub shortest: f64,
    pub greenest: f64,
}
