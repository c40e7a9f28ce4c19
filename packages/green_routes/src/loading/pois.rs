//! Reading and writing of the points of interest which are shown alongside
//! a route. Raw OSM features are split into parks, EV chargers and metro
//! stations, each category being stored in its own GeoJSON file.

use aho_corasick::AhoCorasick;
use geo::{Centroid, Geometry};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::common::projection::Utm;

/// Names containing any of these are railway infrastructure rather than
/// somewhere a passenger can board
const METRO_BLACKLIST: [&str; 3] = ["yard", "depot", "workshop"];

const METRO_RAILWAY_TAGS: [&str; 3] = ["station", "halt", "subway_entrance"];

#[derive(Debug, Error)]
pub enum PoiError {
    #[error("unable to access POI file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid GeoJSON in {path}: {source}")]
    GeoJson {
        path: PathBuf,
        source: geojson::Error,
    },
    #[error("POI file {0} not found")]
    Missing(PathBuf),
    #[error("expected a FeatureCollection in {0}")]
    NotACollection(PathBuf),
    #[error("unable to build name filter: {0}")]
    Filter(#[from] aho_corasick::BuildError),
}

/// The three categories of POI, each of which is stored separately
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoiCategory {
    Park,
    EvCharger,
    Metro,
}

impl PoiCategory {
    pub const ALL: [PoiCategory; 3] =
        [PoiCategory::Park, PoiCategory::EvCharger, PoiCategory::Metro];

    pub fn file_name(&self) -> &'static str {
        match self {
            PoiCategory::Park => "parks.geojson",
            PoiCategory::EvCharger => "ev.geojson",
            PoiCategory::Metro => "metro.geojson",
        }
    }
}

/// A single point of interest. The geometry is kept in EPSG:4326 for
/// output, alongside a copy in the projected CRS for distance checks
#[derive(Debug, Clone, PartialEq)]
pub struct Poi {
    pub name: Option<String>,
    pub properties: JsonObject,
    pub geometry: Geometry,
    pub projected: Geometry,
}

impl Poi {
    pub fn new(geometry: Geometry, properties: JsonObject, utm: &Utm) -> Poi {
        let name = properties
            .get("name")
            .and_then(JsonValue::as_str)
            .map(str::to_string);
        Poi {
            name,
            projected: utm.geometry_to_utm(&geometry),
            properties,
            geometry,
        }
    }

    /// Convert back into a GeoJSON feature with the original properties
    pub fn to_feature(&self) -> Feature {
        Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(
                &self.geometry,
            ))),
            id: None,
            properties: Some(self.properties.clone()),
            foreign_members: None,
        }
    }
}

/// Convert a list of POIs into a GeoJSON FeatureCollection
pub fn to_feature_collection(pois: &[Poi]) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: pois.iter().map(Poi::to_feature).collect(),
        foreign_members: None,
    }
}

/// All of the POIs available for display, grouped by category
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoiSets {
    pub parks: Vec<Poi>,
    pub ev: Vec<Poi>,
    pub metro: Vec<Poi>,
}

impl PoiSets {
    pub fn get(&self, category: PoiCategory) -> &Vec<Poi> {
        match category {
            PoiCategory::Park => &self.parks,
            PoiCategory::EvCharger => &self.ev,
            PoiCategory::Metro => &self.metro,
        }
    }

    fn get_mut(&mut self, category: PoiCategory) -> &mut Vec<Poi> {
        match category {
            PoiCategory::Park => &mut self.parks,
            PoiCategory::EvCharger => &mut self.ev,
            PoiCategory::Metro => &mut self.metro,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parks.is_empty() && self.ev.is_empty() && self.metro.is_empty()
    }

    /// Load every category from its file in the POI directory. If any of
    /// the files is missing or can't be read, all categories are left empty
    /// so that routing can still be served without POIs
    pub fn load(dir: &Path, utm: &Utm) -> PoiSets {
        match PoiSets::try_load(dir, utm) {
            Ok(sets) => {
                info!(
                    "Loaded POIs: {} parks | {} EV chargers | {} metro stations",
                    sets.parks.len(),
                    sets.ev.len(),
                    sets.metro.len()
                );
                sets
            }
            Err(err) => {
                warn!("POIs not loaded, run the pois command to create them: {err}");
                PoiSets::default()
            }
        }
    }

    /// Load every category, failing if any file is missing or invalid
    pub fn try_load(dir: &Path, utm: &Utm) -> Result<PoiSets, PoiError> {
        let mut sets = PoiSets::default();
        for category in PoiCategory::ALL {
            let path = dir.join(category.file_name());
            if !path.exists() {
                return Err(PoiError::Missing(path));
            }
            *sets.get_mut(category) = read_pois(&path, utm)?;
        }
        Ok(sets)
    }

    /// Write each category to its own file in the provided directory
    pub fn save(&self, dir: &Path) -> Result<(), PoiError> {
        fs::create_dir_all(dir)?;
        for category in PoiCategory::ALL {
            let pois = self.get(category);
            let path = dir.join(category.file_name());
            fs::write(&path, to_feature_collection(pois).to_string())?;
            info!("{} POIs saved to {}", pois.len(), path.display());
        }
        Ok(())
    }
}

/// Read a GeoJSON FeatureCollection from disk
pub fn read_feature_collection(path: &Path) -> Result<FeatureCollection, PoiError> {
    let contents = fs::read_to_string(path)?;
    let geojson = contents
        .parse::<GeoJson>()
        .map_err(|source| PoiError::GeoJson {
            path: path.to_path_buf(),
            source,
        })?;
    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => Err(PoiError::NotACollection(path.to_path_buf())),
    }
}

/// Convert a GeoJSON feature into a POI, features without a usable
/// geometry are dropped
fn feature_to_poi(feature: Feature, utm: &Utm) -> Option<Poi> {
    let geometry = Geometry::<f64>::try_from(feature.geometry?).ok()?;
    Some(Poi::new(geometry, feature.properties.unwrap_or_default(), utm))
}

/// Read a single category of POIs from disk
pub fn read_pois(path: &Path, utm: &Utm) -> Result<Vec<Poi>, PoiError> {
    let fc = read_feature_collection(path)?;
    let total = fc.features.len();
    let pois: Vec<Poi> = fc
        .features
        .into_iter()
        .filter_map(|feature| feature_to_poi(feature, utm))
        .collect();
    if pois.len() < total {
        warn!(
            "Dropped {} features without geometry from {}",
            total - pois.len(),
            path.display()
        );
    }
    Ok(pois)
}

fn tag<'a>(properties: &'a JsonObject, key: &str) -> Option<&'a str> {
    properties.get(key).and_then(JsonValue::as_str)
}

/// Determine which category (if any) a raw OSM feature belongs to, based on
/// its tags. Checks are made in the order park, EV charger, metro so that
/// each feature lands in at most one category
pub fn classify(properties: &JsonObject, blacklist: &AhoCorasick) -> Option<PoiCategory> {
    if tag(properties, "leisure") == Some("park") {
        return Some(PoiCategory::Park);
    }
    if tag(properties, "amenity") == Some("charging_station") {
        return Some(PoiCategory::EvCharger);
    }

    let is_station = tag(properties, "railway")
        .is_some_and(|railway| METRO_RAILWAY_TAGS.contains(&railway))
        || tag(properties, "public_transport") == Some("station");
    let is_blacklisted = tag(properties, "name")
        .is_some_and(|name| blacklist.is_match(name));

    if is_station && !is_blacklisted {
        Some(PoiCategory::Metro)
    } else {
        None
    }
}

/// Collapse anything other than a point down to its centroid, so that every
/// POI can be drawn as a marker
fn to_point_geometry(geometry: Geometry) -> Option<Geometry> {
    match geometry {
        Geometry::Point(_) => Some(geometry),
        other => other.centroid().map(Geometry::Point),
    }
}

/// Split a collection of raw OSM features into the three POI categories.
/// Features which don't match any category, or which have no geometry, are
/// discarded
pub fn partition_osm_features(
    features: Vec<Feature>,
    utm: &Utm,
) -> Result<PoiSets, PoiError> {
    let blacklist = AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(METRO_BLACKLIST)?;

    let mut sets = PoiSets::default();
    for feature in features {
        let properties = feature.properties.clone().unwrap_or_default();
        let Some(category) = classify(&properties, &blacklist) else {
            continue;
        };
        let Some(geometry) = feature
            .geometry
            .and_then(|geom| Geometry::<f64>::try_from(geom).ok())
            .and_then(to_point_geometry)
        else {
            continue;
        };
        sets.get_mut(category)
            .push(Poi::new(geometry, properties, utm));
    }
    Ok(sets)
}

/// Read a raw OSM feature export and write out the three POI files
pub fn generate_pois(input: &Path, output_dir: &Path, utm: &Utm) -> Result<PoiSets, PoiError> {
    info!("Reading raw OSM features from {}", input.display());
    let fc = read_feature_collection(input)?;
    let sets = partition_osm_features(fc.features, utm)?;
    sets.save(output_dir)?;
    Ok(sets)
}

#[cfg(test)]
mod tests {

    use approx::assert_relative_eq;
    use geo::{Point, polygon};
    use serde_json::json;

    use super::*;
    use crate::common::projection::project;

    fn feature(geometry: Geometry, properties: JsonValue) -> Feature {
        Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&geometry))),
            id: None,
            properties: properties.as_object().cloned(),
            foreign_members: None,
        }
    }

    fn blacklist() -> AhoCorasick {
        AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(METRO_BLACKLIST)
            .unwrap()
    }

    fn props(value: JsonValue) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_classify() {
        let ac = blacklist();

        assert_eq!(
            classify(&props(json!({"leisure": "park"})), &ac),
            Some(PoiCategory::Park)
        );
        assert_eq!(
            classify(&props(json!({"amenity": "charging_station"})), &ac),
            Some(PoiCategory::EvCharger)
        );
        assert_eq!(
            classify(&props(json!({"railway": "halt"})), &ac),
            Some(PoiCategory::Metro)
        );
        assert_eq!(
            classify(&props(json!({"public_transport": "station", "name": "MG Road"})), &ac),
            Some(PoiCategory::Metro)
        );
        assert_eq!(classify(&props(json!({"amenity": "cafe"})), &ac), None);
        assert_eq!(classify(&props(json!({"railway": "rail"})), &ac), None);
    }

    /// Railway depots are tagged as stations in OSM but shouldn't be shown
    #[test]
    fn test_classify_excludes_depots() {
        let ac = blacklist();

        for name in ["Peenya Depot", "Baiyappanahalli YARD", "Carriage Workshop"] {
            let properties = props(json!({"railway": "station", "name": name}));
            assert_eq!(classify(&properties, &ac), None, "{name}");
        }
    }

    #[test]
    fn test_partition_osm_features() {
        let utm = project();
        let park = polygon![
            (x: 77.59, y: 12.97),
            (x: 77.60, y: 12.97),
            (x: 77.60, y: 12.98),
            (x: 77.59, y: 12.98),
        ];
        let features = vec![
            feature(
                Geometry::Polygon(park),
                json!({"leisure": "park", "name": "Cubbon Park"}),
            ),
            feature(
                Geometry::Point(Point::new(77.61, 12.95)),
                json!({"amenity": "charging_station"}),
            ),
            feature(
                Geometry::Point(Point::new(77.62, 12.96)),
                json!({"railway": "station", "name": "Indiranagar"}),
            ),
            feature(
                Geometry::Point(Point::new(77.63, 12.96)),
                json!({"railway": "station", "name": "Metro Depot"}),
            ),
            feature(
                Geometry::Point(Point::new(77.64, 12.96)),
                json!({"shop": "bakery"}),
            ),
        ];

        let sets = partition_osm_features(features, &utm).unwrap();

        assert_eq!(sets.parks.len(), 1);
        assert_eq!(sets.ev.len(), 1);
        assert_eq!(sets.metro.len(), 1);
        assert_eq!(sets.parks[0].name.as_deref(), Some("Cubbon Park"));
        assert_eq!(sets.metro[0].name.as_deref(), Some("Indiranagar"));
        assert!(sets.ev[0].name.is_none());

        // Polygons are collapsed to their centroid
        let Geometry::Point(centre) = sets.parks[0].geometry else {
            panic!("park was not converted to a point");
        };
        assert_relative_eq!(centre.x(), 77.595, epsilon = 1e-9);
        assert_relative_eq!(centre.y(), 12.975, epsilon = 1e-9);
    }

    /// POIs written out by the partitioning step can be read back in
    #[test]
    fn test_save_and_load() {
        let utm = project();
        let dir = tempfile::tempdir().unwrap();
        let features = vec![
            feature(
                Geometry::Point(Point::new(77.59, 12.97)),
                json!({"leisure": "park", "name": "Lalbagh"}),
            ),
            feature(
                Geometry::Point(Point::new(77.61, 12.95)),
                json!({"amenity": "charging_station"}),
            ),
        ];

        let sets = partition_osm_features(features, &utm).unwrap();
        sets.save(dir.path()).unwrap();

        let loaded = PoiSets::load(dir.path(), &utm);

        assert_eq!(loaded, sets);
        assert!(loaded.metro.is_empty());
    }

    #[test]
    fn test_load_missing_dir() {
        let dir = tempfile::tempdir().unwrap();

        let loaded = PoiSets::load(&dir.path().join("missing"), &project());

        assert!(loaded.is_empty());
    }

    /// With one file present and the others missing, nothing is loaded
    #[test]
    fn test_load_partial_files() {
        let utm = project();
        let dir = tempfile::tempdir().unwrap();
        let features = vec![feature(
            Geometry::Point(Point::new(77.59, 12.97)),
            json!({"leisure": "park", "name": "Lalbagh"}),
        )];
        let sets = partition_osm_features(features, &utm).unwrap();
        sets.save(dir.path()).unwrap();
        fs::remove_file(dir.path().join("ev.geojson")).unwrap();
        fs::remove_file(dir.path().join("metro.geojson")).unwrap();

        assert!(matches!(
            PoiSets::try_load(dir.path(), &utm),
            Err(PoiError::Missing(_))
        ));
        assert!(PoiSets::load(dir.path(), &utm).is_empty());
    }

    /// A file which can't be parsed leaves every category empty rather than
    /// stopping startup
    #[test]
    fn test_load_malformed_file() {
        let utm = project();
        let dir = tempfile::tempdir().unwrap();
        PoiSets {
            parks: vec![Poi::new(
                Geometry::Point(Point::new(77.59, 12.97)),
                props(json!({"name": "Lalbagh"})),
                &utm,
            )],
            ..Default::default()
        }
        .save(dir.path())
        .unwrap();
        fs::write(dir.path().join("metro.geojson"), "{ not json").unwrap();

        assert!(matches!(
            PoiSets::try_load(dir.path(), &utm),
            Err(PoiError::GeoJson { .. })
        ));
        assert!(PoiSets::load(dir.path(), &utm).is_empty());
    }

    #[test]
    fn test_read_not_a_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parks.geojson");
        fs::write(&path, r#"{"type": "Point", "coordinates": [77.5, 12.9]}"#).unwrap();

        let result = read_pois(&path, &project());

        assert!(matches!(result, Err(PoiError::NotACollection(_))));
    }

    #[test]
    fn test_generate_pois() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("raw.geojson");
        let fc = FeatureCollection {
            bbox: None,
            features: vec![feature(
                Geometry::Point(Point::new(77.62, 12.96)),
                json!({"railway": "subway_entrance"}),
            )],
            foreign_members: None,
        };
        fs::write(&input, fc.to_string()).unwrap();

        let output = dir.path().join("pois");
        let sets = generate_pois(&input, &output, &project()).unwrap();

        assert_eq!(sets.metro.len(), 1);
        for category in PoiCategory::ALL {
            assert!(output.join(category.file_name()).exists());
        }
    }
}
