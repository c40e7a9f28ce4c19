use crate::common::graph_data::{EdgeData, NodeData, RoadGraph, RoadNetwork};
use crate::common::projection::Utm;
use crate::loading::graphml::{
    EdgeRow, GraphmlDocument, GraphmlError, NodeRow, read_graphml,
};
use crate::routing::cost::sanitize_edges;
use core::f64;
use geo::{Distance, Euclidean, Point};
use petgraph::graph::NodeIndex;
use petgraph::visit::IntoNodeReferences;
use rustc_hash::FxHashMap;
use std::path::Path;
use tracing::info;

/// Based on the contents of a GraphML file, generate a petgraph graph which
/// can be used for route plotting. Parallel edges are all kept, each one
/// retains the key it was stored with
pub fn create_graph(doc: GraphmlDocument) -> Result<RoadNetwork, GraphmlError> {
    let mut graph = RoadGraph::with_capacity(doc.nodes.len(), doc.edges.len());

    // Add all nodes to the graph, create mapping from OSM IDs to node indexes
    let mut node_lookup = FxHashMap::<i64, NodeIndex>::default();
    for row in doc.nodes {
        let node_data: NodeData = row.try_into()?;
        let id = node_data.id;
        let node_inx = graph.add_node(node_data);
        node_lookup.insert(id, node_inx);
    }

    for row in doc.edges {
        let edge_data: EdgeData = row.try_into()?;

        // Fetch indexes for src and dst as they appear in the graph
        let src_inx = *node_lookup
            .get(&edge_data.src)
            .ok_or(GraphmlError::UnknownNode(edge_data.src))?;
        let dst_inx = *node_lookup
            .get(&edge_data.dst)
            .ok_or(GraphmlError::UnknownNode(edge_data.dst))?;

        graph.add_edge(src_inx, dst_inx, edge_data);
    }

    Ok(RoadNetwork {
        graph,
        node_lookup,
        graph_attrs: doc.graph_attrs,
    })
}

/// Read in a road network from GraphML, and make sure that every edge has
/// usable environmental attributes and a green cost
pub fn load_road_network(path: &Path) -> Result<RoadNetwork, GraphmlError> {
    info!("Loading graph from {}", path.display());
    let doc = read_graphml(path)?;
    let mut network = create_graph(doc)?;
    sanitize_edges(&mut network.graph);
    info!(
        "Loaded: {} nodes | {} edges",
        network.node_count(),
        network.edge_count()
    );
    Ok(network)
}

/// Convert a road network back into a GraphML document, ready to be saved
pub fn to_document(network: &RoadNetwork) -> GraphmlDocument {
    GraphmlDocument {
        graph_attrs: network.graph_attrs.clone(),
        nodes: network
            .graph
            .node_weights()
            .map(NodeRow::from)
            .collect(),
        edges: network
            .graph
            .edge_weights()
            .map(EdgeRow::from)
            .collect(),
    }
}

/// Based on a point provided by the user (lon/lat), determine the closest
/// node to it. Distances are measured in the projected CRS, ties go to the
/// node which was added to the graph first. None is only returned for an
/// empty graph
pub fn nearest_node(
    graph: &RoadGraph,
    utm: &Utm,
    point: &Point,
) -> Option<NodeIndex> {
    let target = utm.point_to_utm(point);

    // Set variables to keep track of the current closest node
    let mut smallest_dist = f64::MAX;
    let mut closest_inx: Option<NodeIndex> = None;

    for (node_index, node_weight) in graph.node_references() {
        let node_coords = Point::new(node_weight.x, node_weight.y);
        let dist = Euclidean::distance(target, node_coords);

        // Store details of new closest node if applicable
        if dist < smallest_dist {
            smallest_dist = dist;
            closest_inx = Some(node_index);
        }
    }

    closest_inx
}
