//! Types shared across the crate: configuration, graph weights, bounding
//! boxes and the projection used for all distance calculations.

pub mod bbox;
pub mod config;
pub mod graph_data;
pub mod projection;
