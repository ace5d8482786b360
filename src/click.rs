use crate::error::{AtlasError, AtlasResult};
use crate::store::GeometryStore;
use crate::types::{BoundaryLevel, PolygonFeature};
use geo::Point;
use std::sync::Arc;

/// Polygon under a clicked coordinate at each boundary level.
#[derive(Debug, Clone, Default)]
pub struct ClickResolution {
    pub province: Option<Arc<PolygonFeature>>,
    pub c_div: Option<Arc<PolygonFeature>>,
    pub c_subdiv: Option<Arc<PolygonFeature>>,
    pub agg_diss: Option<Arc<PolygonFeature>>,
}

impl ClickResolution {
    pub fn get(&self, level: BoundaryLevel) -> Option<&Arc<PolygonFeature>> {
        match level {
            BoundaryLevel::Province => self.province.as_ref(),
            BoundaryLevel::CensusDivision => self.c_div.as_ref(),
            BoundaryLevel::CensusSubdivision => self.c_subdiv.as_ref(),
            BoundaryLevel::AggregateDisseminationArea => self.agg_diss.as_ref(),
        }
    }

    fn set(&mut self, level: BoundaryLevel, feature: Option<Arc<PolygonFeature>>) {
        let slot = match level {
            BoundaryLevel::Province => &mut self.province,
            BoundaryLevel::CensusDivision => &mut self.c_div,
            BoundaryLevel::CensusSubdivision => &mut self.c_subdiv,
            BoundaryLevel::AggregateDisseminationArea => &mut self.agg_diss,
        };
        *slot = feature;
    }

    pub fn is_empty(&self) -> bool {
        BoundaryLevel::ALL.iter().all(|&level| self.get(level).is_none())
    }

    /// Matched polygons, coarsest level first.
    pub fn matches(&self) -> impl Iterator<Item = (BoundaryLevel, &Arc<PolygonFeature>)> {
        BoundaryLevel::ALL
            .into_iter()
            .filter_map(move |level| self.get(level).map(|feature| (level, feature)))
    }
}

/// Finds the containing polygon at every boundary level.
///
/// A level with no containing polygon yields `None`; only store failures are errors.
pub fn resolve_click<S: GeometryStore + ?Sized>(store: &S, lat: f64, lon: f64) -> AtlasResult<ClickResolution> {
    if !lat.is_finite() || !lon.is_finite() {
        return Err(AtlasError::GeometryQuery(format!(
            "coordinate ({lat}, {lon}) is not a finite number"
        )));
    }
    let point = Point::new(lon, lat);
    let mut resolution = ClickResolution::default();

    for level in BoundaryLevel::ALL {
        let layer = store.boundaries(level).map_err(|e| match e {
            AtlasError::DataSource(msg) => AtlasError::GeometryQuery(msg),
            other => other,
        })?;
        resolution.set(level, layer.feature_at(&point).cloned());
    }

    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{fixtures, MemoryStore};

    #[test]
    fn resolves_every_level_independently() {
        let store = fixtures::store();
        let hit = resolve_click(&store, 0.5, 0.5).unwrap();
        assert_eq!(hit.province.as_ref().unwrap().id, "2021A000235");
        assert_eq!(hit.c_div.as_ref().unwrap().id, "2021A00033501");
        assert_eq!(hit.c_subdiv.as_ref().unwrap().id, "2021A0005350101");
        assert_eq!(hit.agg_diss.as_ref().unwrap().id, "2021S05163501");
        assert_eq!(hit.matches().count(), 4);

        // inside the province but in the subdivision gap
        let partial = resolve_click(&store, 4.0, 4.0).unwrap();
        assert!(partial.province.is_some() && partial.c_div.is_some());
        assert!(partial.c_subdiv.is_none() && partial.agg_diss.is_none());
    }

    #[test]
    fn outside_all_geometry_is_not_an_error() {
        let store = fixtures::store();
        let miss = resolve_click(&store, 45.0, -75.0).unwrap();
        assert!(miss.is_empty());
        assert!(BoundaryLevel::ALL.iter().all(|&l| miss.get(l).is_none()));
    }

    #[test]
    fn store_failure_is_a_geometry_query_error() {
        let store = MemoryStore::new();
        assert!(matches!(resolve_click(&store, 1.0, 1.0), Err(AtlasError::GeometryQuery(_))));
        assert!(matches!(
            resolve_click(&fixtures::store(), f64::NAN, 1.0),
            Err(AtlasError::GeometryQuery(_))
        ));
    }
}
