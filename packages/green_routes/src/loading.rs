//! This module focuses on reading data from disk: the road network stored
//! as GraphML (converted into a petgraph graph object) and the points of
//! interest stored as GeoJSON.

pub mod graphml;
pub mod petgraph;
pub mod pois;
