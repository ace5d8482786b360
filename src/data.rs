use crate::config::{AppConfig, BoundarySource};
use crate::store::MemoryStore;
use crate::types::{PointFeature, PolygonFeature};
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use geo::{MultiPolygon, Point};
use geojson::{GeoJson, JsonObject};
use shapefile::dbase::FieldValue;
use shapefile::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{info, warn};

/// Loads every configured boundary level and dataset into memory.
pub fn load_store(config: &AppConfig) -> Result<MemoryStore> {
    let mut store = MemoryStore::new();

    for source in &config.input.boundaries {
        let features = load_boundaries(source, &config.input.id_column)
            .with_context(|| format!("Failed to load {} boundaries", source.level))?;
        info!(level = %source.level, polygons = features.len(), "loaded boundaries");
        store.insert_boundaries(source.level, features);
    }

    for source in &config.input.datasets {
        let features = load_facilities(&source.path, &config.input.emission_column)
            .with_context(|| format!("Failed to load dataset {}", source.id))?;
        info!(dataset = %source.id, facilities = features.len(), "loaded facilities");
        store.insert_facilities(source.id, features);
    }

    Ok(store)
}

pub fn load_boundaries(source: &BoundarySource, id_column: &str) -> Result<Vec<PolygonFeature>> {
    let extension = source.path.extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Input geometry file has no extension"))?;

    let shapes = match extension.as_str() {
        "shp" => load_shapefile(&source.path)?,
        "json" | "geojson" => load_geojson_polygons(&source.path)?,
        _ => return Err(anyhow!("Unsupported geometry format: {}", extension)),
    };

    let joined = match source.join()? {
        Some((csv_path, shape_column, csv_column)) => {
            let rows = load_csv_data(csv_path, csv_column)?;
            join_rows(shapes, shape_column, &rows)
        }
        None => shapes,
    };

    let total = joined.len();
    let features: Vec<PolygonFeature> = joined
        .into_iter()
        .filter_map(|(geometry, properties)| PolygonFeature::from_properties(id_column, geometry, properties))
        .collect();
    if features.len() < total {
        warn!(
            skipped = total - features.len(),
            id_column,
            "polygons without an id were skipped"
        );
    }
    Ok(features)
}

/// Merges the CSV row matching each polygon's `shape_column` into its properties.
fn join_rows(
    shapes: Vec<(MultiPolygon<f64>, JsonObject)>,
    shape_column: &str,
    rows: &HashMap<String, JsonObject>,
) -> Vec<(MultiPolygon<f64>, JsonObject)> {
    let mut unmatched = 0usize;
    let joined = shapes
        .into_iter()
        .map(|(geometry, mut properties)| {
            let row = properties.get(shape_column).and_then(key).and_then(|k| rows.get(&k));
            match row {
                Some(row) => properties.extend(row.clone()),
                None => unmatched += 1,
            }
            (geometry, properties)
        })
        .collect();
    if unmatched > 0 {
        warn!(unmatched, shape_column, "polygons without a matching CSV row keep no demographics");
    }
    joined
}

fn key(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// CSV rows keyed by `join_column`; numeric cells become JSON numbers.
fn load_csv_data(path: &Path, join_column: &str) -> Result<HashMap<String, JsonObject>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open CSV file: {:?}", path))?;
    let mut rdr = ReaderBuilder::new().from_reader(file);
    let headers = rdr.headers()?.clone();

    let join_col_idx = headers.iter().position(|h| h == join_column)
        .ok_or_else(|| anyhow!("Join column '{}' not found in CSV", join_column))?;

    let mut data_map = HashMap::new();

    for result in rdr.records() {
        let record = result?;
        let id = record.get(join_col_idx).unwrap_or("").to_string();

        if id.is_empty() { continue; }

        let row: JsonObject = headers
            .iter()
            .zip(record.iter())
            .enumerate()
            .filter(|(i, _)| *i != join_col_idx)
            .map(|(_, (header, cell))| (header.to_string(), cell_value(cell)))
            .collect();

        data_map.insert(id, row);
    }

    info!(rows = data_map.len(), path = ?path, "loaded CSV data");
    Ok(data_map)
}

fn cell_value(cell: &str) -> serde_json::Value {
    let cell = cell.trim();
    if cell.is_empty() {
        return serde_json::Value::Null;
    }
    match cell.parse::<f64>() {
        Ok(n) => serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Err(_) => serde_json::Value::String(cell.to_string()),
    }
}

fn field_value(value: FieldValue) -> serde_json::Value {
    use serde_json::Value;
    let float = |f: f64| serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number);
    match value {
        FieldValue::Character(Some(s)) => Value::String(s.trim().to_string()),
        FieldValue::Numeric(Some(n)) => float(n),
        FieldValue::Float(Some(f)) => float(f64::from(f)),
        FieldValue::Double(d) | FieldValue::Currency(d) => float(d),
        FieldValue::Integer(i) => Value::from(i),
        FieldValue::Logical(Some(b)) => Value::Bool(b),
        FieldValue::Memo(s) => Value::String(s),
        _ => Value::Null,
    }
}

fn load_shapefile(path: &Path) -> Result<Vec<(MultiPolygon<f64>, JsonObject)>> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut shapes = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?,
            shapefile::Shape::PolygonM(polygon) => polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?,
            shapefile::Shape::PolygonZ(polygon) => polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?,
            _ => continue, // Skip non-polygon shapes
        };

        let properties: JsonObject = HashMap::<String, FieldValue>::from(record)
            .into_iter()
            .map(|(name, value)| (name, field_value(value)))
            .collect();

        shapes.push((geometry, properties));
    }

    Ok(shapes)
}

fn read_feature_collection(path: &Path) -> Result<geojson::FeatureCollection> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let reader = BufReader::new(file);

    // Parse the GeoJSON. warning: this loads the whole file into memory.
    let geojson = GeoJson::from_reader(reader).context("Failed to parse GeoJSON")?;

    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => Err(anyhow!("GeoJSON must be a FeatureCollection")),
    }
}

fn load_geojson_polygons(path: &Path) -> Result<Vec<(MultiPolygon<f64>, JsonObject)>> {
    let collection = read_feature_collection(path)?;
    let mut shapes = Vec::new();

    for feature in collection.features {
        let geometry = match feature.geometry {
            Some(geo) => {
                let valid_geo: geo::Geometry<f64> = geo.value.try_into()
                    .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;

                match valid_geo {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue, // Skip points/lines
                }
            }
            None => continue,
        };

        shapes.push((geometry, feature.properties.unwrap_or_default()));
    }

    Ok(shapes)
}

/// Facility points of one dataset from a GeoJSON FeatureCollection.
pub fn load_facilities(path: &Path, emission_column: &str) -> Result<Vec<PointFeature>> {
    let collection = read_feature_collection(path)?;
    let mut facilities = Vec::new();

    for feature in collection.features {
        let location: Point<f64> = match feature.geometry {
            Some(geo) => {
                let valid_geo: geo::Geometry<f64> = geo.value.try_into()
                    .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;

                match valid_geo {
                    geo::Geometry::Point(p) => p,
                    geo::Geometry::MultiPoint(mp) if mp.0.len() == 1 => mp.0[0],
                    _ => continue,
                }
            }
            None => continue,
        };

        facilities.push(PointFeature::from_properties(
            location,
            emission_column,
            feature.properties.unwrap_or_default(),
        ));
    }

    Ok(facilities)
}
