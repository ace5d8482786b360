//! GeoJSON encoding of computed layers.
//!
//! Every feature keeps the properties it was loaded with; derived fields are
//! added alongside them.

use crate::aggregate::{AggregatedPolygonFeature, BaseLayer, DemographicRanks, RankedPoint};
use crate::click::ClickResolution;
use crate::types::{PointFeature, PolygonFeature};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde_json::json;

fn feature(geometry: Value, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geometry)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn insert_ranks(properties: &mut JsonObject, ranks: &DemographicRanks) {
    properties.insert("pop_rank".into(), json!(ranks.pop_rank));
    properties.insert("lowinc_rank".into(), json!(ranks.lowinc_rank));
    properties.insert("ind_rank".into(), json!(ranks.ind_rank));
    properties.insert("vm_rank".into(), json!(ranks.vm_rank));
}

pub fn polygon_feature(polygon: &PolygonFeature) -> Feature {
    feature(Value::from(&polygon.geometry), polygon.properties.clone())
}

pub fn point_feature(point: &PointFeature) -> Feature {
    feature(Value::from(&point.location), point.properties.clone())
}

pub fn aggregated_feature(polygon: &AggregatedPolygonFeature) -> Feature {
    let mut properties = polygon.feature.properties.clone();
    insert_ranks(&mut properties, &polygon.ranks);
    for (key, value) in [
        ("point_count", json!(polygon.point_count)),
        ("total_point_count", json!(polygon.total_point_count)),
        ("record_count", json!(polygon.record_count)),
        ("total_emissions", json!(polygon.total_emissions)),
        ("median_emissions", json!(polygon.median_emissions)),
        ("total_emissions_rank", json!(polygon.total_emissions_rank)),
        ("median_emissions_rank", json!(polygon.median_emissions_rank)),
        ("point_count_rank", json!(polygon.point_count_rank)),
        ("polys_with_points", json!(polygon.polys_with_points)),
    ] {
        properties.insert(key.into(), value);
    }
    feature(Value::from(&polygon.feature.geometry), properties)
}

pub fn ranked_point_feature(point: &RankedPoint) -> Feature {
    let mut properties = point.feature.properties.clone();
    properties.insert("emissions_max".into(), json!(point.emissions_max));
    properties.insert("emissions_min".into(), json!(point.emissions_min));
    properties.insert("record_count".into(), json!(point.record_count));
    properties.insert("emissions_rank".into(), json!(point.emissions_rank));
    feature(Value::from(&point.feature.location), properties)
}

pub fn aggregated_collection(polygons: &[AggregatedPolygonFeature]) -> FeatureCollection {
    collection(polygons.iter().map(aggregated_feature).collect())
}

pub fn ranked_point_collection(points: &[RankedPoint]) -> FeatureCollection {
    collection(points.iter().map(ranked_point_feature).collect())
}

pub fn polygon_collection<'a>(polygons: impl IntoIterator<Item = &'a PolygonFeature>) -> FeatureCollection {
    collection(polygons.into_iter().map(polygon_feature).collect())
}

pub fn point_collection<'a>(points: impl IntoIterator<Item = &'a PointFeature>) -> FeatureCollection {
    collection(points.into_iter().map(point_feature).collect())
}

/// Base layer polygons with level-wide rank, count and population totals.
pub fn base_collection(layer: &BaseLayer) -> FeatureCollection {
    collection(
        layer
            .polygons
            .iter()
            .map(|polygon| {
                let mut properties = polygon.feature.properties.clone();
                properties.insert("record_count".into(), json!(polygon.record_count));
                properties.insert("canada_pop".into(), json!(polygon.canada_pop));
                insert_ranks(&mut properties, &polygon.ranks);
                feature(Value::from(&polygon.feature.geometry), properties)
            })
            .collect(),
    )
}

/// One feature per matched level, coarsest first, tagged with `boundary_level`.
pub fn click_collection(resolution: &ClickResolution) -> FeatureCollection {
    collection(
        resolution
            .matches()
            .map(|(level, polygon)| {
                let mut properties = polygon.properties.clone();
                properties.insert("boundary_level".into(), json!(level.as_str()));
                feature(Value::from(&polygon.geometry), properties)
            })
            .collect(),
    )
}
