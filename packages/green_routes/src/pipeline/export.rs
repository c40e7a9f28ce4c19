//! Export of the enriched edge table, as GeoJSON for mapping and CSV for
//! analysis

use geojson::{Feature, FeatureCollection, JsonObject, JsonValue};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use std::fs::{self, File};
use std::path::Path;
use tracing::info;

use crate::common::graph_data::{EdgeData, RoadNetwork};
use crate::common::projection::Utm;
use crate::loading::graphml::to_wkt_linestring;
use crate::pipeline::PipelineError;
use crate::pipeline::enrich::edge_line;

/// A single row of the edge table
#[derive(Debug, Serialize, PartialEq)]
pub struct EdgeRecord {
    pub u: i64,
    pub v: i64,
    pub key: u32,
    pub name: Option<String>,
    pub highway: Option<String>,
    pub length: Option<f64>,
    pub ndvi: Option<f64>,
    pub aqi: Option<f64>,
    pub green_cost: f64,
    /// WKT in the projected CRS
    pub geometry: String,
}

impl EdgeRecord {
    fn new(edata: &EdgeData, geometry: String) -> Self {
        EdgeRecord {
            u: edata.src,
            v: edata.dst,
            key: edata.key,
            name: edata.attrs.get("name").cloned(),
            highway: edata.attrs.get("highway").cloned(),
            length: edata.length,
            ndvi: edata.ndvi,
            aqi: edata.aqi,
            green_cost: edata.green_cost,
            geometry,
        }
    }
}

/// GeoJSON properties for an edge, the enriched values are stored as numbers
/// and any other attributes as they were read in
fn edge_properties(edata: &EdgeData) -> JsonObject {
    let mut properties: JsonObject = edata
        .attrs
        .iter()
        .map(|(key, value)| (key.clone(), JsonValue::from(value.as_str())))
        .collect();
    properties.insert("u".to_string(), edata.src.into());
    properties.insert("v".to_string(), edata.dst.into());
    properties.insert("key".to_string(), edata.key.into());
    properties.insert("length".to_string(), edata.length.into());
    properties.insert("ndvi".to_string(), edata.ndvi.into());
    properties.insert("aqi".to_string(), edata.aqi.into());
    properties.insert("green_cost".to_string(), edata.green_cost.into());
    properties
}

/// Build a FeatureCollection holding every edge, with geometries in
/// EPSG:4326
pub fn edges_to_geojson(network: &RoadNetwork, utm: &Utm) -> FeatureCollection {
    let graph = &network.graph;
    let features = graph
        .edge_references()
        .filter_map(|eref| {
            let line = edge_line(graph, eref.id())?;
            let line_wgs = utm.line_to_wgs84(&line);
            Some(Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&line_wgs))),
                id: None,
                properties: Some(edge_properties(eref.weight())),
                foreign_members: None,
            })
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// All rows of the edge table, in edge order
pub fn edge_records(network: &RoadNetwork) -> Vec<EdgeRecord> {
    let graph = &network.graph;
    graph
        .edge_references()
        .map(|eref| {
            let wkt = edge_line(graph, eref.id())
                .map(|line| to_wkt_linestring(&line))
                .unwrap_or_default();
            EdgeRecord::new(eref.weight(), wkt)
        })
        .collect()
}

pub fn save_edges_geojson(
    network: &RoadNetwork,
    utm: &Utm,
    path: &Path,
) -> Result<(), PipelineError> {
    fs::write(path, edges_to_geojson(network, utm).to_string())?;
    info!("Saved {}", path.display());
    Ok(())
}

pub fn save_edges_csv(network: &RoadNetwork, path: &Path) -> Result<(), PipelineError> {
    let mut writer = csv::Writer::from_writer(File::create(path)?);
    for record in edge_records(network) {
        writer.serialize(record)?;
    }
    writer.flush()?;
    info!("Saved {}", path.display());
    Ok(())
}
