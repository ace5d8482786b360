use crate::classify::SymbolTier;
use crate::error::AtlasResult;
use crate::stats::Statistics;
use crate::store::GeometryStore;
use crate::types::{BoundaryLevel, DatasetId, Demographic, PointFeature, PolygonFeature};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::debug;

/// Population and demographic ranks of a polygon among every polygon of its level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemographicRanks {
    pub pop_rank: usize,
    pub lowinc_rank: usize,
    pub ind_rank: usize,
    pub vm_rank: usize,
}

impl DemographicRanks {
    pub fn for_demographic(&self, demographic: Demographic) -> usize {
        match demographic {
            Demographic::Lowinc => self.lowinc_rank,
            Demographic::Ind => self.ind_rank,
            Demographic::Vm => self.vm_rank,
        }
    }
}

fn demographic_ranks(features: &[Arc<PolygonFeature>]) -> Vec<DemographicRanks> {
    let column = |f: fn(&PolygonFeature) -> Option<f64>| -> Vec<usize> {
        let values: Vec<Option<f64>> = features.iter().map(|p| f(p)).collect();
        Statistics::rank_descending(&values)
    };
    let pop = column(|p| p.pop);
    let lowinc = column(|p| p.lowinc);
    let ind = column(|p| p.ind);
    let vm = column(|p| p.vm);

    (0..features.len())
        .map(|i| DemographicRanks {
            pop_rank: pop[i],
            lowinc_rank: lowinc[i],
            ind_rank: ind[i],
            vm_rank: vm[i],
        })
        .collect()
}

/// Boundary polygon as served to the base (demographic-only) layer.
#[derive(Debug, Clone)]
pub struct BasePolygon {
    pub feature: Arc<PolygonFeature>,
    pub ranks: DemographicRanks,
    /// Polygons at this level.
    pub record_count: usize,
    /// Population summed over the level.
    pub canada_pop: f64,
}

#[derive(Debug, Clone)]
pub struct BaseLayer {
    pub level: BoundaryLevel,
    pub polygons: Vec<BasePolygon>,
}

/// A facility with dataset-wide emission statistics attached.
#[derive(Debug, Clone)]
pub struct RankedPoint {
    pub feature: Arc<PointFeature>,
    pub emissions_max: Option<f64>,
    pub emissions_min: Option<f64>,
    /// Facilities in the dataset.
    pub record_count: usize,
    pub emissions_rank: usize,
}

impl RankedPoint {
    pub fn symbol(&self) -> SymbolTier {
        SymbolTier::for_emission(self.feature.emission, self.emissions_min, self.emissions_max)
    }
}

/// A polygon that contains at least one facility, with its derived statistics.
#[derive(Debug, Clone)]
pub struct AggregatedPolygonFeature {
    pub feature: Arc<PolygonFeature>,
    pub ranks: DemographicRanks,
    pub point_count: usize,
    /// Facilities in the whole dataset.
    pub total_point_count: usize,
    /// Polygons at this level, including those without facilities.
    pub record_count: usize,
    pub total_emissions: Option<f64>,
    pub median_emissions: Option<f64>,
    pub total_emissions_rank: usize,
    pub median_emissions_rank: usize,
    pub point_count_rank: usize,
    pub polys_with_points: usize,
}

/// Point layer plus the aggregated polygons at every boundary level for one dataset.
#[derive(Debug)]
pub struct LayerBundle {
    pub dataset: DatasetId,
    pub points: Vec<RankedPoint>,
    boundaries: [Vec<AggregatedPolygonFeature>; 4],
}

impl LayerBundle {
    pub fn new(
        dataset: DatasetId,
        points: Vec<RankedPoint>,
        boundaries: [Vec<AggregatedPolygonFeature>; 4],
    ) -> Self {
        Self {
            dataset,
            points,
            boundaries,
        }
    }

    pub fn boundary_layer(&self, level: BoundaryLevel) -> &[AggregatedPolygonFeature] {
        &self.boundaries[level.index()]
    }

    /// `(min, max)` emissions over the dataset.
    pub fn emission_range(&self) -> (Option<f64>, Option<f64>) {
        self.points
            .first()
            .map_or((None, None), |p| (p.emissions_min, p.emissions_max))
    }
}

/// Joins the facilities of `dataset` onto the polygons of `level`.
///
/// Only polygons containing at least one facility are returned, in input order.
pub fn aggregate<S: GeometryStore + ?Sized>(
    store: &S,
    dataset: DatasetId,
    level: BoundaryLevel,
) -> AtlasResult<Vec<AggregatedPolygonFeature>> {
    let boundaries = store.boundaries(level)?;
    let facilities = store.facilities(dataset)?;

    let owners: Vec<Option<usize>> = facilities
        .par_iter()
        .map(|point| boundaries.locate(&point.location))
        .collect();

    let mut members: Vec<Vec<usize>> = vec![Vec::new(); boundaries.len()];
    for (point_index, owner) in owners.into_iter().enumerate() {
        if let Some(polygon_index) = owner {
            members[polygon_index].push(point_index);
        }
    }

    struct Totals {
        count: usize,
        sum: Option<f64>,
        median: Option<f64>,
    }

    let totals: Vec<Totals> = members
        .par_iter()
        .map(|points| {
            let emissions: Vec<f64> = points
                .iter()
                .filter_map(|&i| facilities[i].emission)
                .collect();
            Totals {
                count: points.len(),
                sum: (!emissions.is_empty()).then(|| Statistics::sum(&emissions)),
                median: Statistics::median(&emissions),
            }
        })
        .collect();

    let ranks = demographic_ranks(&boundaries.features);

    let surviving: Vec<usize> = (0..boundaries.len())
        .filter(|&i| totals[i].count > 0)
        .collect();
    let column = |f: fn(&Totals) -> Option<f64>| -> Vec<usize> {
        let values: Vec<Option<f64>> = surviving.iter().map(|&i| f(&totals[i])).collect();
        Statistics::rank_descending(&values)
    };
    let total_ranks = column(|t| t.sum);
    let median_ranks = column(|t| t.median);
    let count_ranks = column(|t| Some(t.count as f64));

    let polys_with_points = surviving.len();
    debug!(
        dataset = %dataset,
        level = %level,
        polygons = boundaries.len(),
        polys_with_points,
        "aggregated facilities onto boundaries"
    );

    Ok(surviving
        .iter()
        .enumerate()
        .map(|(position, &i)| AggregatedPolygonFeature {
            feature: Arc::clone(&boundaries.features[i]),
            ranks: ranks[i],
            point_count: totals[i].count,
            total_point_count: facilities.len(),
            record_count: boundaries.len(),
            total_emissions: totals[i].sum,
            median_emissions: totals[i].median,
            total_emissions_rank: total_ranks[position],
            median_emissions_rank: median_ranks[position],
            point_count_rank: count_ranks[position],
            polys_with_points,
        })
        .collect())
}

/// [`aggregate`] addressed by layer names; unknown names fail before the store is touched.
pub fn aggregate_named<S: GeometryStore + ?Sized>(
    store: &S,
    point_layer: &str,
    boundary_layer: &str,
) -> AtlasResult<Vec<AggregatedPolygonFeature>> {
    let dataset: DatasetId = point_layer.parse()?;
    let level: BoundaryLevel = boundary_layer.parse()?;
    aggregate(store, dataset, level)
}

/// Every facility of `dataset` with global min/max and its emission rank.
pub fn point_layer<S: GeometryStore + ?Sized>(store: &S, dataset: DatasetId) -> AtlasResult<Vec<RankedPoint>> {
    let facilities = store.facilities(dataset)?;
    let emissions: Vec<Option<f64>> = facilities.iter().map(|p| p.emission).collect();
    let present: Vec<f64> = emissions.iter().flatten().copied().collect();
    let (emissions_min, emissions_max) = match Statistics::min_max(&present) {
        Some((min, max)) => (Some(min), Some(max)),
        None => (None, None),
    };
    let ranks = Statistics::rank_descending(&emissions);

    Ok(facilities
        .iter()
        .zip(ranks)
        .map(|(feature, emissions_rank)| RankedPoint {
            feature: Arc::clone(feature),
            emissions_max,
            emissions_min,
            record_count: facilities.len(),
            emissions_rank,
        })
        .collect())
}

/// Polygons of `level` with population and demographic ranks, no facility data.
pub fn base_layer<S: GeometryStore + ?Sized>(store: &S, level: BoundaryLevel) -> AtlasResult<BaseLayer> {
    let boundaries = store.boundaries(level)?;
    let ranks = demographic_ranks(&boundaries.features);
    let canada_pop: f64 = boundaries.features.iter().filter_map(|p| p.pop).sum();

    let polygons = boundaries
        .features
        .iter()
        .zip(ranks)
        .map(|(feature, ranks)| BasePolygon {
            feature: Arc::clone(feature),
            ranks,
            record_count: boundaries.len(),
            canada_pop,
        })
        .collect();

    Ok(BaseLayer { level, polygons })
}

/// Builds the point layer and all four aggregated boundary layers for `dataset`.
pub fn build_bundle<S: GeometryStore + ?Sized>(store: &S, dataset: DatasetId) -> AtlasResult<LayerBundle> {
    let points = point_layer(store, dataset)?;
    let [a, b, c, d] = BoundaryLevel::ALL;
    let boundaries = [
        aggregate(store, dataset, a)?,
        aggregate(store, dataset, b)?,
        aggregate(store, dataset, c)?,
        aggregate(store, dataset, d)?,
    ];
    Ok(LayerBundle::new(dataset, points, boundaries))
}
