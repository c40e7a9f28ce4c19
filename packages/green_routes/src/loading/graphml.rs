//! The functions defined here read and write road networks stored as
//! GraphML, in the layout produced by osmnx: a directed multigraph where
//! every attribute is stored as a string, edges are keyed through their `id`
//! attribute and edge geometries are WKT line strings in the projected CRS.

use crate::common::graph_data::{EdgeData, NodeData};
use geo::{Coord, LineString};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphmlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("{element} is missing required attribute '{attribute}'")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    #[error("invalid value '{value}' for '{attribute}'")]
    InvalidValue { attribute: String, value: String },
    #[error("edge references unknown node {0}")]
    UnknownNode(i64),
}

/// Container for a node as it is stored in the GraphML file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeRow {
    pub id: i64,
    pub attrs: BTreeMap<String, String>,
}

/// Container for an edge as it is stored in the GraphML file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EdgeRow {
    pub src: i64,
    pub dst: i64,
    pub key: u32,
    pub attrs: BTreeMap<String, String>,
}

/// The full contents of a GraphML file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GraphmlDocument {
    pub graph_attrs: BTreeMap<String, String>,
    pub nodes: Vec<NodeRow>,
    pub edges: Vec<EdgeRow>,
}

impl TryFrom<NodeRow> for NodeData {
    type Error = GraphmlError;

    /// Unpack the raw node data into a format which can be loaded into the
    /// graph, projected coordinates are mandatory
    fn try_from(mut row: NodeRow) -> Result<NodeData, GraphmlError> {
        let x = parse_float("x", row.attrs.remove("x"))?.ok_or(
            GraphmlError::MissingAttribute {
                element: "node",
                attribute: "x",
            },
        )?;
        let y = parse_float("y", row.attrs.remove("y"))?.ok_or(
            GraphmlError::MissingAttribute {
                element: "node",
                attribute: "y",
            },
        )?;

        Ok(NodeData {
            id: row.id,
            x,
            y,
            attrs: row.attrs,
        })
    }
}

impl TryFrom<EdgeRow> for EdgeData {
    type Error = GraphmlError;

    /// Unpack the raw edge data into a format which can be loaded into the
    /// graph. The green cost is always derived, so any stored value is
    /// discarded
    fn try_from(mut row: EdgeRow) -> Result<EdgeData, GraphmlError> {
        let length = parse_float("length", row.attrs.remove("length"))?;
        let ndvi = parse_float("ndvi", row.attrs.remove("ndvi"))?;
        let aqi = parse_float("aqi", row.attrs.remove("aqi"))?;
        let geometry = match row.attrs.remove("geometry") {
            Some(wkt) => Some(parse_wkt_linestring(&wkt)?),
            None => None,
        };
        row.attrs.remove("green_cost");

        Ok(EdgeData {
            src: row.src,
            dst: row.dst,
            key: row.key,
            length,
            ndvi,
            aqi,
            green_cost: 0.0,
            geometry,
            attrs: row.attrs,
        })
    }
}

impl From<&NodeData> for NodeRow {
    fn from(node: &NodeData) -> NodeRow {
        let mut attrs = node.attrs.clone();
        attrs.insert("x".to_string(), node.x.to_string());
        attrs.insert("y".to_string(), node.y.to_string());
        NodeRow { id: node.id, attrs }
    }
}

impl From<&EdgeData> for EdgeRow {
    /// Pack edge data for writing. Only populated environmental attributes
    /// are written, the green cost is left out as it's derived on load
    fn from(edge: &EdgeData) -> EdgeRow {
        let mut attrs = edge.attrs.clone();
        for (name, value) in [
            ("length", edge.length),
            ("ndvi", edge.ndvi),
            ("aqi", edge.aqi),
        ] {
            if let Some(val) = value {
                attrs.insert(name.to_string(), val.to_string());
            }
        }
        if let Some(geometry) = &edge.geometry {
            attrs.insert("geometry".to_string(), to_wkt_linestring(geometry));
        }
        EdgeRow {
            src: edge.src,
            dst: edge.dst,
            key: edge.key,
            attrs,
        }
    }
}

/// Parse an optional float attribute. Empty strings and the literal None are
/// treated as missing
fn parse_float(
    attribute: &str,
    value: Option<String>,
) -> Result<Option<f64>, GraphmlError> {
    match value {
        None => Ok(None),
        Some(val) => {
            let trimmed = val.trim();
            if trimmed.is_empty() || trimmed == "None" {
                return Ok(None);
            }
            trimmed.parse::<f64>().map(Some).map_err(|_| {
                GraphmlError::InvalidValue {
                    attribute: attribute.to_string(),
                    value: val.clone(),
                }
            })
        }
    }
}

/// Parse a WKT LINESTRING, e.g. `LINESTRING (1 2, 3 4)`
pub fn parse_wkt_linestring(wkt: &str) -> Result<LineString, GraphmlError> {
    let invalid = || GraphmlError::InvalidValue {
        attribute: "geometry".to_string(),
        value: wkt.to_string(),
    };

    let trimmed = wkt.trim();
    let is_linestring = trimmed
        .get(..10)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("LINESTRING"));
    if !is_linestring {
        return Err(invalid());
    }
    let body = trimmed[10..]
        .trim()
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(invalid)?;

    let mut coords = Vec::<Coord>::new();
    for pair in body.split(',') {
        let mut parts = pair.split_whitespace();
        let x = parts.next().and_then(|v| v.parse::<f64>().ok());
        let y = parts.next().and_then(|v| v.parse::<f64>().ok());
        match (x, y) {
            (Some(x), Some(y)) => coords.push(Coord { x, y }),
            _ => return Err(invalid()),
        }
    }

    Ok(LineString::new(coords))
}

/// Format a line string as WKT
pub fn to_wkt_linestring(line: &LineString) -> String {
    let coords: Vec<String> = line
        .coords()
        .map(|c| format!("{} {}", c.x, c.y))
        .collect();
    format!("LINESTRING ({})", coords.join(", "))
}

/// Fetch the value of an XML attribute
fn get_attr(
    e: &BytesStart,
    name: &[u8],
) -> Result<Option<String>, GraphmlError> {
    match e.try_get_attribute(name).map_err(quick_xml::Error::from)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn require_attr(
    e: &BytesStart,
    element: &'static str,
    attribute: &'static str,
) -> Result<String, GraphmlError> {
    get_attr(e, attribute.as_bytes())?.ok_or(GraphmlError::MissingAttribute {
        element,
        attribute,
    })
}

fn parse_node_id(value: String) -> Result<i64, GraphmlError> {
    value.trim().parse::<i64>().map_err(|_| GraphmlError::InvalidValue {
        attribute: "node id".to_string(),
        value,
    })
}

/// Tracks which element <data> values should be attached to
enum Owner {
    Graph,
    Node(NodeRow),
    Edge(EdgeRow),
}

/// Handle the opening tag of an element. Returns the new owner if the
/// element is a node or edge
fn open_element(
    e: &BytesStart,
    keys: &mut FxHashMap<String, String>,
    data_key: &mut Option<String>,
) -> Result<Option<Owner>, GraphmlError> {
    match e.local_name().as_ref() {
        b"key" => {
            let id = require_attr(e, "key", "id")?;
            let name = get_attr(e, b"attr.name")?.unwrap_or(id.clone());
            keys.insert(id, name);
            Ok(None)
        }
        b"node" => {
            let id = parse_node_id(require_attr(e, "node", "id")?)?;
            Ok(Some(Owner::Node(NodeRow {
                id,
                attrs: BTreeMap::new(),
            })))
        }
        b"edge" => {
            let src = parse_node_id(require_attr(e, "edge", "source")?)?;
            let dst = parse_node_id(require_attr(e, "edge", "target")?)?;
            let key = match get_attr(e, b"id")? {
                Some(val) => val.trim().parse::<u32>().map_err(|_| {
                    GraphmlError::InvalidValue {
                        attribute: "edge id".to_string(),
                        value: val.clone(),
                    }
                })?,
                None => 0,
            };
            Ok(Some(Owner::Edge(EdgeRow {
                src,
                dst,
                key,
                attrs: BTreeMap::new(),
            })))
        }
        b"data" => {
            let key_id = require_attr(e, "data", "key")?;
            let name = keys.get(&key_id).cloned().unwrap_or(key_id);
            *data_key = Some(name);
            Ok(None)
        }
        _ => Ok(None),
    }
}

fn attrs_of<'a>(
    owner: &'a mut Owner,
    doc: &'a mut GraphmlDocument,
) -> &'a mut BTreeMap<String, String> {
    match owner {
        Owner::Graph => &mut doc.graph_attrs,
        Owner::Node(row) => &mut row.attrs,
        Owner::Edge(row) => &mut row.attrs,
    }
}

fn close_owner(owner: Owner, doc: &mut GraphmlDocument) {
    match owner {
        Owner::Node(row) => doc.nodes.push(row),
        Owner::Edge(row) => doc.edges.push(row),
        Owner::Graph => (),
    }
}

/// Parse a GraphML document from any buffered reader
pub fn parse_graphml<R: BufRead>(
    source: R,
) -> Result<GraphmlDocument, GraphmlError> {
    // Text is not trimmed, whitespace in <data> values is kept as-is
    let mut reader = Reader::from_reader(source);

    let mut doc = GraphmlDocument::default();
    let mut keys = FxHashMap::<String, String>::default();
    let mut owner = Owner::Graph;
    let mut data_key: Option<String> = None;
    let mut data_text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => {
                if let Some(new_owner) =
                    open_element(&e, &mut keys, &mut data_key)?
                {
                    owner = new_owner;
                }
                data_text.clear();
            }
            Event::Empty(e) => {
                if let Some(new_owner) =
                    open_element(&e, &mut keys, &mut data_key)?
                {
                    close_owner(new_owner, &mut doc);
                }
                // An empty <data/> element holds an empty string
                if let Some(name) = data_key.take() {
                    attrs_of(&mut owner, &mut doc).insert(name, String::new());
                }
            }
            Event::Text(t) => {
                if data_key.is_some() {
                    data_text.push_str(&t.unescape()?);
                }
            }
            Event::CData(t) => {
                if data_key.is_some() {
                    data_text.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"data" => {
                    if let Some(name) = data_key.take() {
                        attrs_of(&mut owner, &mut doc)
                            .insert(name, std::mem::take(&mut data_text));
                    }
                }
                b"node" | b"edge" => {
                    close_owner(
                        std::mem::replace(&mut owner, Owner::Graph),
                        &mut doc,
                    );
                }
                _ => (),
            },
            _ => (),
        }
        buf.clear();
    }

    Ok(doc)
}

/// Read a GraphML file from disk
pub fn read_graphml(path: &Path) -> Result<GraphmlDocument, GraphmlError> {
    let file = File::open(path)?;
    parse_graphml(BufReader::new(file))
}

const GRAPHML_NS: &str = "http://graphml.graphdrawing.org/xmlns";
const GRAPHML_SCHEMA: &str = "http://graphml.graphdrawing.org/xmlns \
     http://graphml.graphdrawing.org/xmlns/1.0/graphml.xsd";

/// Serialize a GraphML document. Keys are declared for every attribute name
/// which appears on the graph, its nodes or its edges
pub fn write_graphml<W: Write>(
    doc: &GraphmlDocument,
    out: W,
) -> Result<(), GraphmlError> {
    let graph_names: BTreeSet<&String> = doc.graph_attrs.keys().collect();
    let node_names: BTreeSet<&String> =
        doc.nodes.iter().flat_map(|n| n.attrs.keys()).collect();
    let edge_names: BTreeSet<&String> =
        doc.edges.iter().flat_map(|e| e.attrs.keys()).collect();

    let mut writer = Writer::new_with_indent(out, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("graphml").with_attributes([
        ("xmlns", GRAPHML_NS),
        ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
        ("xsi:schemaLocation", GRAPHML_SCHEMA),
    ])))?;

    let mut key_ids = FxHashMap::<(&str, &str), String>::default();
    let mut counter = 0;
    for (domain, names) in [
        ("graph", &graph_names),
        ("node", &node_names),
        ("edge", &edge_names),
    ] {
        for name in names.iter() {
            let id = format!("d{counter}");
            counter += 1;
            writer.write_event(Event::Empty(BytesStart::new("key").with_attributes([
                ("id", id.as_str()),
                ("for", domain),
                ("attr.name", name.as_str()),
                ("attr.type", "string"),
            ])))?;
            key_ids.insert((domain, name.as_str()), id);
        }
    }

    writer.write_event(Event::Start(
        BytesStart::new("graph").with_attributes([("edgedefault", "directed")]),
    ))?;
    write_data(&mut writer, "graph", &doc.graph_attrs, &key_ids)?;

    for node in doc.nodes.iter() {
        let id = node.id.to_string();
        writer.write_event(Event::Start(
            BytesStart::new("node").with_attributes([("id", id.as_str())]),
        ))?;
        write_data(&mut writer, "node", &node.attrs, &key_ids)?;
        writer.write_event(Event::End(BytesEnd::new("node")))?;
    }

    for edge in doc.edges.iter() {
        let (src, dst, key) =
            (edge.src.to_string(), edge.dst.to_string(), edge.key.to_string());
        writer.write_event(Event::Start(BytesStart::new("edge").with_attributes([
            ("source", src.as_str()),
            ("target", dst.as_str()),
            ("id", key.as_str()),
        ])))?;
        write_data(&mut writer, "edge", &edge.attrs, &key_ids)?;
        writer.write_event(Event::End(BytesEnd::new("edge")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("graph")))?;
    writer.write_event(Event::End(BytesEnd::new("graphml")))?;

    let mut out = writer.into_inner();
    out.write_all(b"\n")?;
    out.flush()?;

    Ok(())
}

fn write_data<W: Write>(
    writer: &mut Writer<W>,
    domain: &str,
    attrs: &BTreeMap<String, String>,
    key_ids: &FxHashMap<(&str, &str), String>,
) -> Result<(), GraphmlError> {
    for (name, value) in attrs.iter() {
        if let Some(id) = key_ids.get(&(domain, name.as_str())) {
            writer.write_event(Event::Start(
                BytesStart::new("data").with_attributes([("key", id.as_str())]),
            ))?;
            writer.write_event(Event::Text(BytesText::new(value)))?;
            writer.write_event(Event::End(BytesEnd::new("data")))?;
        }
    }
    Ok(())
}

/// Write a GraphML file to disk
pub fn save_graphml(
    doc: &GraphmlDocument,
    path: &Path,
) -> Result<(), GraphmlError> {
    let file = File::create(path)?;
    write_graphml(doc, BufWriter::new(file))
}

#[cfg(test)]
mod tests {

    use super::*;

    const SAMPLE: &str = r#"<?xml version='1.0' encoding='utf-8'?>
<graphml xmlns="http://graphml.graphdrawing.org/xmlns">
  <key id="d0" for="graph" attr.name="crs" attr.type="string" />
  <key id="d1" for="node" attr.name="y" attr.type="string" />
  <key id="d2" for="node" attr.name="x" attr.type="string" />
  <key id="d3" for="node" attr.name="street_count" attr.type="string" />
  <key id="d4" for="edge" attr.name="osmid" attr.type="string" />
  <key id="d5" for="edge" attr.name="name" attr.type="string" />
  <key id="d6" for="edge" attr.name="length" attr.type="string" />
  <key id="d7" for="edge" attr.name="geometry" attr.type="string" />
  <graph edgedefault="directed">
    <data key="d0">epsg:32643</data>
    <node id="1">
      <data key="d1">1434000.0</data>
      <data key="d2">780000.0</data>
      <data key="d3">3</data>
    </node>
    <node id="2">
      <data key="d1">1434100.0</data>
      <data key="d2">780000.0</data>
    </node>
    <edge source="1" target="2" id="0">
      <data key="d4">555</data>
      <data key="d5">M.G. Road &amp; Co</data>
      <data key="d6">100.0</data>
    </edge>
    <edge source="1" target="2" id="1">
      <data key="d4">556</data>
      <data key="d6">140.5</data>
      <data key="d7">LINESTRING (780000 1434000, 780050 1434050, 780000 1434100)</data>
    </edge>
  </graph>
</graphml>
"#;

    /// Check that keys, nodes, parallel edges and escaped values are all
    /// picked up
    #[test]
    fn test_parse_graphml() {
        let doc = parse_graphml(SAMPLE.as_bytes()).unwrap();

        assert_eq!(doc.graph_attrs.get("crs").unwrap(), "epsg:32643");
        assert_eq!(doc.nodes.len(), 2);
        assert_eq!(doc.edges.len(), 2);

        let node = &doc.nodes[0];
        assert_eq!(node.id, 1);
        assert_eq!(node.attrs.get("x").unwrap(), "780000.0");
        assert_eq!(node.attrs.get("street_count").unwrap(), "3");

        let edge = &doc.edges[0];
        assert_eq!((edge.src, edge.dst, edge.key), (1, 2, 0));
        assert_eq!(edge.attrs.get("name").unwrap(), "M.G. Road & Co");
        assert_eq!(doc.edges[1].key, 1);
    }

    #[test]
    fn test_node_row_to_data() {
        let doc = parse_graphml(SAMPLE.as_bytes()).unwrap();

        let result: NodeData = doc.nodes[0].clone().try_into().unwrap();

        let mut attrs = BTreeMap::new();
        attrs.insert("street_count".to_string(), "3".to_string());
        let target = NodeData {
            id: 1,
            x: 780000.0,
            y: 1434000.0,
            attrs,
        };

        assert_eq!(result, target);
    }

    #[test]
    fn test_node_row_missing_coords() {
        let row = NodeRow {
            id: 4,
            attrs: BTreeMap::new(),
        };

        let result: Result<NodeData, GraphmlError> = row.try_into();

        assert!(matches!(
            result,
            Err(GraphmlError::MissingAttribute { attribute: "x", .. })
        ));
    }

    #[test]
    fn test_edge_row_to_data() {
        let doc = parse_graphml(SAMPLE.as_bytes()).unwrap();

        let result: EdgeData = doc.edges[1].clone().try_into().unwrap();

        assert_eq!(result.key, 1);
        assert_eq!(result.length, Some(140.5));
        assert_eq!(result.ndvi, None);
        assert_eq!(result.aqi, None);
        assert_eq!(result.geometry.unwrap().0.len(), 3);
        assert_eq!(result.attrs.get("osmid").unwrap(), "556");
        assert!(!result.attrs.contains_key("length"));
    }

    #[test]
    fn test_edge_row_invalid_float() {
        let mut attrs = BTreeMap::new();
        attrs.insert("ndvi".to_string(), "green".to_string());
        let row = EdgeRow {
            src: 1,
            dst: 2,
            key: 0,
            attrs,
        };

        let result: Result<EdgeData, GraphmlError> = row.try_into();

        assert!(matches!(result, Err(GraphmlError::InvalidValue { .. })));
    }

    #[test]
    fn test_parse_wkt() {
        let line = parse_wkt_linestring("LINESTRING (1 2, 3.5 -4)").unwrap();
        assert_eq!(line, LineString::from(vec![(1.0, 2.0), (3.5, -4.0)]));

        let line = parse_wkt_linestring("LineString(1 2,3 4)").unwrap();
        assert_eq!(line, LineString::from(vec![(1.0, 2.0), (3.0, 4.0)]));

        assert!(parse_wkt_linestring("POINT (1 2)").is_err());
        assert!(parse_wkt_linestring("LINESTRING (1 2, 3)").is_err());
    }

    #[test]
    fn test_wkt_round_trip() {
        let line = LineString::from(vec![(780000.25, 1434000.0), (1.0, 2.0)]);
        let wkt = to_wkt_linestring(&line);

        assert_eq!(wkt, "LINESTRING (780000.25 1434000, 1 2)");
        assert_eq!(parse_wkt_linestring(&wkt).unwrap(), line);
    }

    /// Writing a document out and reading it back in should not lose
    /// anything, including characters which need escaping
    #[test]
    fn test_write_read_round_trip() {
        let doc = parse_graphml(SAMPLE.as_bytes()).unwrap();

        let mut buffer = Vec::<u8>::new();
        write_graphml(&doc, &mut buffer).unwrap();
        let result = parse_graphml(buffer.as_slice()).unwrap();

        assert_eq!(result, doc);
    }

    /// Leading and trailing whitespace in values survives a round trip
    #[test]
    fn test_round_trip_keeps_whitespace() {
        let mut doc = parse_graphml(SAMPLE.as_bytes()).unwrap();
        doc.edges[0]
            .attrs
            .insert("name".to_string(), "  Residency Road ".to_string());
        doc.nodes[1].attrs.insert("ref".to_string(), String::new());

        let mut buffer = Vec::<u8>::new();
        write_graphml(&doc, &mut buffer).unwrap();
        let result = parse_graphml(buffer.as_slice()).unwrap();

        assert_eq!(result.edges[0].attrs.get("name").unwrap(), "  Residency Road ");
        assert_eq!(result.nodes[1].attrs.get("ref").unwrap(), "");
        assert_eq!(result, doc);
    }

    /// Environmental attributes are written, the derived green cost is not
    #[test]
    fn test_edge_data_to_row() {
        let edge = EdgeData {
            src: 1,
            dst: 2,
            key: 3,
            length: Some(12.5),
            ndvi: Some(0.25),
            aqi: None,
            green_cost: 99.0,
            geometry: None,
            attrs: BTreeMap::new(),
        };

        let row: EdgeRow = (&edge).into();

        assert_eq!(row.key, 3);
        assert_eq!(row.attrs.get("length").unwrap(), "12.5");
        assert_eq!(row.attrs.get("ndvi").unwrap(), "0.25");
        assert!(!row.attrs.contains_key("aqi"));
        assert!(!row.attrs.contains_key("green_cost"));
    }
}
