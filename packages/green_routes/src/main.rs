use anyhow::{Context, Result};
use clap::Parser;
use green_routes::api::{AppState, serve};
use green_routes::common::config::{AqiStrategy, Settings};
use green_routes::common::projection::project;
use green_routes::init_tracing;
use green_routes::loading::pois::generate_pois;
use green_routes::pipeline::run_build;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Attach NDVI & AQI to the base road graph and save the enriched graph
    Build {
        /// How AQI is assigned to edges (uniform or nearest-station),
        /// overrides the configured strategy
        #[arg(long, value_enum)]
        aqi: Option<AqiStrategy>,
    },
    /// Split a raw OSM feature export into parks, EV chargers and metro
    /// stations
    Pois {
        /// GeoJSON FeatureCollection of raw OSM features
        input: PathBuf,
        /// Where to write the POI files, defaults to the configured folder
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Serve the routing API
    Serve {
        /// Address to listen on, overrides the configured address
        #[arg(long)]
        bind: Option<String>,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let settings = Settings::load().context("Unable to load settings")?;

    match args.cmd {
        Command::Build { aqi } => {
            let strategy = aqi.unwrap_or(settings.aqi_strategy);
            run_build(&settings, strategy).context("Build failed")?;
            info!("Done, the enriched graph is at {}", settings.env_graph_path().display());
        }
        Command::Pois { input, output } => {
            let output = output.unwrap_or_else(|| settings.pois_dir.clone());
            generate_pois(&input, &output, &project())
                .context("Unable to generate POIs")?;
        }
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| settings.bind.clone());
            let state = AppState::load(settings).context("Unable to load data for the API")?;

            // The runtime is only needed for serving, the build uses a
            // blocking HTTP client
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Unable to start async runtime")?;
            runtime
                .block_on(serve(Arc::new(state), &bind))
                .context("Error serving API")?;
        }
    }

    Ok(())
}
