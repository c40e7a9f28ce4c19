//! Offline build of the environmental road graph. Takes the projected road
//! graph downloaded from OSM, attaches NDVI and AQI to each edge and writes
//! out the enriched graph along with an edge table.

pub mod aqi;
pub mod enrich;
pub mod export;
pub mod ndvi;

use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

use crate::common::config::{AqiStrategy, Settings};
use crate::common::projection::project;
use crate::loading::graphml::{GraphmlError, save_graphml};
use crate::loading::petgraph::{load_road_network, to_document};
use crate::pipeline::aqi::{AqiError, WaqiClient, fetch_aqi};
use crate::pipeline::enrich::enrich_network;
use crate::pipeline::export::{save_edges_csv, save_edges_geojson};
use crate::pipeline::ndvi::{NdviRaster, RasterError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(
        "NDVI raster not found at {0}, download it and place it there before building"
    )]
    MissingNdvi(PathBuf),
    #[error(
        "base road graph not found at {0}, download and project it before building"
    )]
    MissingBaseGraph(PathBuf),
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error(transparent)]
    Aqi(#[from] AqiError),
    #[error(transparent)]
    Graphml(#[from] GraphmlError),
    #[error("unable to write output: {0}")]
    Io(#[from] std::io::Error),
    #[error("unable to write edge table: {0}")]
    Csv(#[from] csv::Error),
}

/// Create the folder structure which the pipeline reads from and writes to
pub fn ensure_folders(settings: &Settings) -> Result<(), PipelineError> {
    fs::create_dir_all(settings.raw_dir())?;
    if let Some(ndvi_dir) = settings.ndvi_path.parent() {
        fs::create_dir_all(ndvi_dir)?;
    }
    fs::create_dir_all(settings.processed_dir())?;
    info!("Folder structure ready");
    Ok(())
}

/// The NDVI raster has to be downloaded by hand, check it's there before
/// doing anything else
pub fn check_ndvi_file(settings: &Settings) -> Result<(), PipelineError> {
    if !settings.ndvi_path.exists() {
        return Err(PipelineError::MissingNdvi(settings.ndvi_path.clone()));
    }
    info!("Found NDVI raster at {}", settings.ndvi_path.display());
    Ok(())
}

/// Run the full build. Every stage writes its output to disk, so the build
/// can be re-run from scratch at any point
pub fn run_build(settings: &Settings, strategy: AqiStrategy) -> Result<(), PipelineError> {
    info!("Building environmental graph for {}", settings.city);

    ensure_folders(settings)?;
    check_ndvi_file(settings)?;

    let base_path = settings.base_graph_path();
    if !base_path.exists() {
        return Err(PipelineError::MissingBaseGraph(base_path));
    }
    info!("Using existing road graph at {}", base_path.display());

    // Checked before any slow work, a missing token can't be recovered from
    let client = WaqiClient::from_settings(settings)?;

    let utm = project();
    let mut network = load_road_network(&base_path)?;
    let raster = NdviRaster::open(&settings.ndvi_path)?;
    let aqi = fetch_aqi(&client, settings, strategy, &settings.raw_dir())?;

    enrich_network(&mut network, &raster, &aqi, &utm);

    save_edges_geojson(&network, &utm, &settings.edges_geojson_path())?;
    save_edges_csv(&network, &settings.edges_csv_path())?;

    let env_path = settings.env_graph_path();
    save_graphml(&to_document(&network), &env_path)?;
    info!("Saved {}", env_path.display());

    Ok(())
}

#[cfg(test)]
mod tests {

    use super::*;

    fn settings(dir: &std::path::Path) -> Settings {
        let mut settings = Settings::defaults().unwrap();
        settings.data_dir = dir.join("data");
        settings.ndvi_path = dir.join("data/raw/sentinel_ndvi/ndvi.tiff");
        settings.waqi_token = "token".to_string();
        // Nothing should ever be sent here
        settings.waqi_base_url = "http://127.0.0.1:9".to_string();
        settings
    }

    #[test]
    fn test_ensure_folders() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());

        ensure_folders(&settings).unwrap();

        assert!(settings.raw_dir().is_dir());
        assert!(settings.processed_dir().is_dir());
        assert!(dir.path().join("data/raw/sentinel_ndvi").is_dir());
    }

    /// A missing raster stops the build before anything else is attempted
    #[test]
    fn test_missing_ndvi() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());

        let result = run_build(&settings, AqiStrategy::Uniform);

        assert!(matches!(result, Err(PipelineError::MissingNdvi(_))));
        assert!(!settings.env_graph_path().exists());
    }

    #[test]
    fn test_missing_base_graph() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        ensure_folders(&settings).unwrap();
        fs::write(&settings.ndvi_path, b"not really a tiff").unwrap();

        let result = run_build(&settings, AqiStrategy::NearestStation);

        assert!(matches!(result, Err(PipelineError::MissingBaseGraph(_))));
    }

    #[test]
    fn test_missing_token() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.waqi_token = String::new();
        ensure_folders(&settings).unwrap();
        fs::write(&settings.ndvi_path, b"not really a tiff").unwrap();
        fs::write(settings.base_graph_path(), b"<graphml/>").unwrap();

        let result = run_build(&settings, AqiStrategy::Uniform);

        assert!(matches!(result, Err(PipelineError::Aqi(AqiError::MissingToken))));
    }
}
