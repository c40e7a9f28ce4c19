use geo::LineString;
use petgraph::graph::NodeIndex;
use petgraph::{Directed, Graph};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Sets the data which will be stored as weights in the petgraph graph. The
/// x & y coordinates are in the projected (metric) CRS, any attributes which
/// are not used for routing are carried along so they can be written back out
#[derive(Default, Debug, Clone, PartialEq)]
pub struct NodeData {
    pub id: i64,
    pub x: f64,
    pub y: f64,
    pub attrs: BTreeMap<String, String>,
}

/// Container for edge metadata which will be stored in the graph. The
/// environmental attributes are optional as they will only be present once
/// the enrichment pipeline has been run, `sanitize` fills in the gaps
#[derive(Default, Debug, Clone, PartialEq)]
pub struct EdgeData {
    pub src: i64,
    pub dst: i64,
    pub key: u32,
    pub length: Option<f64>,
    pub ndvi: Option<f64>,
    pub aqi: Option<f64>,
    pub green_cost: f64,
    pub geometry: Option<LineString>,
    pub attrs: BTreeMap<String, String>,
}

pub type RoadGraph = Graph<NodeData, EdgeData, Directed, u32>;

/// A road graph along with a lookup from OSM node IDs to graph indexes. Node
/// indexes are only stable for as long as no nodes are removed, which never
/// happens once a network has been created
#[derive(Debug, Clone, Default)]
pub struct RoadNetwork {
    pub graph: RoadGraph,
    pub node_lookup: FxHashMap<i64, NodeIndex>,
    pub graph_attrs: BTreeMap<String, String>,
}

impl RoadNetwork {
    pub fn node_index(&self, id: i64) -> Option<NodeIndex> {
        self.node_lookup.get(&id).copied()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
