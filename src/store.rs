use crate::error::{AtlasError, AtlasResult};
use crate::types::{BoundaryLevel, DatasetId, PointFeature, PolygonFeature};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::algorithm::intersects::Intersects;
use geo::Point;
use rstar::{RTree, RTreeObject, AABB};
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only source of facilities and boundary polygons.
pub trait GeometryStore: Send + Sync {
    fn boundaries(&self, level: BoundaryLevel) -> AtlasResult<Arc<BoundaryLayer>>;
    fn facilities(&self, dataset: DatasetId) -> AtlasResult<Arc<FacilityLayer>>;
}

pub type FacilityLayer = Vec<Arc<PointFeature>>;

// Wrapper for RTree indexing
struct PolygonEnvelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for PolygonEnvelope {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// All polygons of one boundary level, in input order, with a bounding-box index.
pub struct BoundaryLayer {
    pub level: BoundaryLevel,
    pub features: Vec<Arc<PolygonFeature>>,
    tree: RTree<PolygonEnvelope>,
}

impl BoundaryLayer {
    pub fn new(level: BoundaryLevel, features: Vec<PolygonFeature>) -> Self {
        let features: Vec<Arc<PolygonFeature>> = features.into_iter().map(Arc::new).collect();
        // Empty geometries have no bounding rect and can never contain a point.
        let items: Vec<PolygonEnvelope> = features
            .iter()
            .enumerate()
            .filter_map(|(index, feature)| {
                let rect = feature.geometry.bounding_rect()?;
                Some(PolygonEnvelope {
                    index,
                    aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();

        Self {
            level,
            features,
            tree: RTree::bulk_load(items),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Index of the polygon owning `point`.
    ///
    /// Interior containment wins; a point on an edge goes to the first polygon
    /// (in input order) whose boundary it touches. At most one polygon owns a point.
    pub fn locate(&self, point: &Point<f64>) -> Option<usize> {
        let envelope = AABB::from_point([point.x(), point.y()]);
        let mut candidates: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|item| item.index)
            .collect();
        // RTree traversal order is unspecified
        candidates.sort_unstable();

        candidates
            .iter()
            .copied()
            .find(|&i| self.features[i].geometry.contains(point))
            .or_else(|| {
                candidates
                    .iter()
                    .copied()
                    .find(|&i| self.features[i].geometry.intersects(point))
            })
    }

    pub fn feature_at(&self, point: &Point<f64>) -> Option<&Arc<PolygonFeature>> {
        self.locate(point).map(|i| &self.features[i])
    }
}

/// Geometry store held entirely in memory, populated once at startup.
#[derive(Default)]
pub struct MemoryStore {
    boundaries: HashMap<BoundaryLevel, Arc<BoundaryLayer>>,
    facilities: HashMap<DatasetId, Arc<FacilityLayer>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_boundaries(&mut self, level: BoundaryLevel, features: Vec<PolygonFeature>) {
        self.boundaries
            .insert(level, Arc::new(BoundaryLayer::new(level, features)));
    }

    pub fn insert_facilities(&mut self, dataset: DatasetId, features: Vec<PointFeature>) {
        self.facilities
            .insert(dataset, Arc::new(features.into_iter().map(Arc::new).collect()));
    }

    pub fn with_boundaries(mut self, level: BoundaryLevel, features: Vec<PolygonFeature>) -> Self {
        self.insert_boundaries(level, features);
        self
    }

    pub fn with_facilities(mut self, dataset: DatasetId, features: Vec<PointFeature>) -> Self {
        self.insert_facilities(dataset, features);
        self
    }

    pub fn loaded_boundaries(&self) -> Vec<BoundaryLevel> {
        let mut levels: Vec<BoundaryLevel> = self.boundaries.keys().copied().collect();
        levels.sort();
        levels
    }

    pub fn loaded_datasets(&self) -> Vec<DatasetId> {
        let mut datasets: Vec<DatasetId> = self.facilities.keys().copied().collect();
        datasets.sort();
        datasets
    }
}

impl GeometryStore for MemoryStore {
    fn boundaries(&self, level: BoundaryLevel) -> AtlasResult<Arc<BoundaryLayer>> {
        self.boundaries
            .get(&level)
            .cloned()
            .ok_or_else(|| AtlasError::DataSource(format!("no {} boundaries loaded", level)))
    }

    fn facilities(&self, dataset: DatasetId) -> AtlasResult<Arc<FacilityLayer>> {
        self.facilities
            .get(&dataset)
            .cloned()
            .ok_or_else(|| AtlasError::DataSource(format!("no {} facilities loaded", dataset)))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use geo::{Coord, MultiPolygon, Rect};
    use serde_json::json;

    pub fn square(id: &str, x0: f64, y0: f64, size: f64, props: serde_json::Value) -> PolygonFeature {
        let rect = Rect::new(Coord { x: x0, y: y0 }, Coord { x: x0 + size, y: y0 + size });
        let mut properties = props.as_object().cloned().unwrap_or_default();
        properties.insert("dguid".into(), json!(id));
        PolygonFeature::from_properties("dguid", MultiPolygon::new(vec![rect.to_polygon()]), properties)
            .expect("fixture polygon has an id")
    }

    pub fn facility(x: f64, y: f64, emission: Option<f64>) -> PointFeature {
        let properties = json!({
            "grand_tota": emission,
            "company_na": "Acme Smelting",
            "naics_4_se": "Non-ferrous metal production",
            "substance_": "PM2.5",
            "city": "Sudbury",
            "province": "ON",
        });
        PointFeature::from_properties(
            Point::new(x, y),
            "grand_tota",
            properties.as_object().cloned().unwrap_or_default(),
        )
    }

    /// Four levels over the box (0,0)-(10,10); the two finer levels leave gaps.
    pub fn store() -> MemoryStore {
        let province = vec![square(
            "2021A000235",
            0.0,
            0.0,
            10.0,
            json!({"prename": "Ontario", "pop": 1000, "lowinc": 10.0, "ind": 3.0, "vm": 30.0}),
        )];
        let divisions = vec![
            square("2021A00033501", 0.0, 0.0, 5.0, json!({"cdname": "West", "pop": 300, "lowinc": 20.0, "ind": 2.0, "vm": 10.0})),
            square("2021A00033502", 5.0, 0.0, 5.0, json!({"cdname": "East", "pop": 700, "lowinc": 5.0, "ind": 4.0, "vm": 50.0})),
            square("2021A00033503", 0.0, 5.0, 10.0, json!({"cdname": "North", "pop": 0, "lowinc": null, "ind": 1.0, "vm": 0.0})),
        ];
        let subdivisions = vec![
            square("2021A0005350101", 0.0, 0.0, 2.0, json!({"csdname": "Town", "pop": 100, "lowinc": 30.0, "ind": 1.0, "vm": 5.0})),
            square("2021A0005350201", 6.0, 0.0, 2.0, json!({"csdname": "City", "pop": 600, "lowinc": 8.0, "ind": 5.0, "vm": 60.0})),
        ];
        let ada = vec![square(
            "2021S05163501",
            0.0,
            0.0,
            1.0,
            json!({"adauid": "35010001", "pop": 50, "lowinc": 101.5, "ind": 0.5, "vm": 2.0}),
        )];
        let facilities = vec![
            facility(0.5, 0.5, Some(10.0)),
            facility(1.5, 1.5, Some(20.0)),
            facility(4.0, 4.0, Some(30.0)),
            facility(6.5, 1.0, Some(100.0)),
            facility(7.0, 1.5, None),
            facility(20.0, 20.0, Some(5.0)),
        ];
        MemoryStore::new()
            .with_boundaries(BoundaryLevel::Province, province)
            .with_boundaries(BoundaryLevel::CensusDivision, divisions)
            .with_boundaries(BoundaryLevel::CensusSubdivision, subdivisions)
            .with_boundaries(BoundaryLevel::AggregateDisseminationArea, ada)
            .with_facilities(DatasetId::Pm25, facilities.clone())
            .with_facilities(DatasetId::Nh3, facilities[..3].to_vec())
            .with_facilities(DatasetId::Nox, facilities[3..].to_vec())
            .with_facilities(DatasetId::Co, vec![facility(9.0, 9.0, Some(1.0))])
    }
}
