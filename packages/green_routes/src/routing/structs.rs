pub mod geometry;
pub mod metrics;

use crate::routing::structs::geometry::{PathGeometry, RouteGeometry};
use crate::routing::structs::metrics::{PathMetrics, RouteMetrics};

use petgraph::graph::{EdgeIndex, NodeIndex};
use serde::Serialize;

use crate::common::config::Weight;
use crate::common::graph_data::RoadGraph;
use crate::common::projection::Utm;

/// Container for a single route through the graph, as found by the router.
/// Holds the nodes visited, the edge which was selected for each hop, and
/// the geometry & metrics derived from those edges
#[derive(Debug, Clone, Serialize)]
pub struct Route {
    pub weight: Weight,
    // OSM identifiers, as these are stable across graph reloads
    pub nodes: Vec<i64>,
    #[serde(skip)]
    pub path: Vec<NodeIndex>,
    #[serde(skip)]
    pub edges: Vec<EdgeIndex>,
    pub geometry: RouteGeometry,
    pub metrics: RouteMetrics,
}

impl Route {
    /// Walk the selected edges of a path, building up the geometry and the
    /// metrics for the route as we go
    pub fn new(
        graph: &RoadGraph,
        utm: &Utm,
        weight: Weight,
        path: Vec<NodeIndex>,
        edges: Vec<EdgeIndex>,
    ) -> Route {
        let mut geometry = PathGeometry::new();
        let mut metrics = PathMetrics::new();

        for edge in edges.iter() {
            let edata = &graph[*edge];
            geometry.take_step(edata);
            metrics.take_step(edata);
        }

        Route {
            weight,
            nodes: path.iter().map(|inx| graph[*inx].id).collect(),
            path,
            edges,
            geometry: geometry.finalize(utm),
            metrics: metrics.finalize(),
        }
    }
}
