use crate::types::{BoundaryLevel, DatasetId};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// Property identifying a boundary polygon.
    #[serde(default = "default_id_column")]
    pub id_column: String,
    /// Facility property holding total emissions in tonnes.
    #[serde(default = "default_emission_column")]
    pub emission_column: String,
    #[serde(default)]
    pub boundaries: Vec<BoundarySource>,
    #[serde(default)]
    pub datasets: Vec<DatasetSource>,
}

/// Geometry of one boundary level, optionally joined with a demographics CSV.
#[derive(Debug, Deserialize, Clone)]
pub struct BoundarySource {
    pub level: BoundaryLevel,
    /// `.shp`, `.json` or `.geojson`.
    pub path: PathBuf,
    pub data_csv: Option<PathBuf>,
    pub join_column_shape: Option<String>,
    pub join_column_csv: Option<String>,
}

impl BoundarySource {
    /// `(csv path, shape column, csv column)` when a demographics join is configured.
    pub fn join(&self) -> Result<Option<(&Path, &str, &str)>> {
        match (&self.data_csv, &self.join_column_shape, &self.join_column_csv) {
            (None, _, _) => Ok(None),
            (Some(csv), Some(shape), Some(column)) => Ok(Some((csv.as_path(), shape.as_str(), column.as_str()))),
            (Some(_), _, _) => Err(anyhow!(
                "{} boundaries: data_csv needs both join_column_shape and join_column_csv",
                self.level
            )),
        }
    }
}

/// GeoJSON point file of one pollutant dataset.
#[derive(Debug, Deserialize, Clone)]
pub struct DatasetSource {
    pub id: DatasetId,
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory served for every path no API route matches.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}

fn default_id_column() -> String {
    "dguid".to_string()
}

fn default_emission_column() -> String {
    "grand_tota".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let mut levels = HashSet::new();
        for source in &self.input.boundaries {
            if !levels.insert(source.level) {
                return Err(anyhow!("Boundary level {} configured more than once", source.level));
            }
            source.join()?;
        }
        let mut datasets = HashSet::new();
        for source in &self.input.datasets {
            if !datasets.insert(source.id) {
                return Err(anyhow!("Dataset {} configured more than once", source.id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [input]
        emission_column = "total"

        [[input.boundaries]]
        level = "province"
        path = "data/province.geojson"

        [[input.boundaries]]
        level = "c_div"
        path = "data/cd.shp"
        data_csv = "data/cd_profile.csv"
        join_column_shape = "CDUID"
        join_column_csv = "cduid"

        [[input.datasets]]
        id = "NPRI_PM2_5"
        path = "data/npri_21_pm2_5.geojson"

        [server]
        port = 8080
    "#;

    #[test]
    fn parses_sources_and_fills_defaults() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.input.id_column, "dguid");
        assert_eq!(config.input.emission_column, "total");
        assert_eq!(config.input.boundaries.len(), 2);
        assert_eq!(config.input.boundaries[1].level, BoundaryLevel::CensusDivision);
        assert!(config.input.boundaries[0].join().unwrap().is_none());
        let (csv, shape, column) = config.input.boundaries[1].join().unwrap().unwrap();
        assert_eq!(csv, Path::new("data/cd_profile.csv"));
        assert_eq!((shape, column), ("CDUID", "cduid"));
        assert_eq!(config.input.datasets[0].id, DatasetId::Pm25);
        assert_eq!(config.server.socket_addr().unwrap().port(), 8080);
        assert_eq!(config.server.static_dir, PathBuf::from("public"));
    }

    #[test]
    fn rejects_unknown_and_duplicate_layers() {
        let unknown = "[input]\n[[input.boundaries]]\nlevel = \"diss_area\"\npath = \"x.shp\"\n";
        assert!(AppConfig::from_toml(unknown).is_err());

        let duplicate = "[input]\n[[input.datasets]]\nid = \"NPRI_CO\"\npath = \"a.geojson\"\n\
                         [[input.datasets]]\nid = \"NPRI_CO\"\npath = \"b.geojson\"\n";
        assert!(AppConfig::from_toml(duplicate).is_err());
    }

    #[test]
    fn half_configured_join_is_an_error() {
        let partial = "[input]\n[[input.boundaries]]\nlevel = \"c_subdiv\"\npath = \"x.shp\"\ndata_csv = \"x.csv\"\n";
        assert!(AppConfig::from_toml(partial).is_err());
    }
}
