use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use emissions_atlas::types::{BoundaryLevel, DatasetId};
use emissions_atlas::{aggregate, click, config, data, features, server};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the GeoJSON layer API and the map client
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Aggregate one dataset onto one boundary level and write GeoJSON
    Aggregate {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Dataset name, e.g. NPRI_PM2_5
        #[arg(short, long)]
        dataset: String,
        /// Boundary level: province, c_div, c_subdiv or agg_diss
        #[arg(short, long)]
        level: String,
        /// Output file; stdout when omitted
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Print the polygons under a coordinate at every boundary level
    Click {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { config } => {
            info!("Serving map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            let store = data::load_store(&app_config)?;
            server::start_server(app_config, Arc::new(store)).await?;
        }
        Commands::Aggregate { config, dataset, level, output } => {
            // fail on bad names before loading anything
            let dataset: DatasetId = dataset.parse()?;
            let level: BoundaryLevel = level.parse()?;
            let app_config = config::AppConfig::load_from_file(config)?;
            let store = data::load_store(&app_config)?;

            let polygons = aggregate::aggregate(&store, dataset, level)?;
            info!(dataset = %dataset, level = %level, polygons = polygons.len(), "aggregation complete");
            let collection = features::aggregated_collection(&polygons);
            write_json(output.as_ref(), &collection)?;
        }
        Commands::Click { config, lat, lon } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let store = data::load_store(&app_config)?;
            let resolution = click::resolve_click(&store, *lat, *lon)?;
            if resolution.is_empty() {
                info!(lat, lon, "no boundary contains this location");
            }
            write_json(None, &features::click_collection(&resolution))?;
        }
    }

    Ok(())
}

fn write_json(output: Option<&PathBuf>, collection: &geojson::FeatureCollection) -> anyhow::Result<()> {
    let json = serde_json::to_string(collection).context("Failed to encode GeoJSON")?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
            info!("Wrote {:?}", path);
        }
        None => println!("{json}"),
    }
    Ok(())
}
