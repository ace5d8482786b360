//! Equal-interval classification of demographic percentages and graduated
//! facility symbols.

use crate::types::Demographic;
use serde::Serialize;

pub const CLASS_BREAKS: [f64; 6] = [0.0, 20.0, 40.0, 60.0, 80.0, 100.0];

pub const POINT_COLOURS: [&str; 4] = ["#ff4f3b", "#d13527", "#a41a14", "#760000"];

/// Maps a percentage to one of five 20-point buckets.
///
/// Anything above 102 is out of range. Values in `(100, 102]` are census
/// rounding noise and still land in the top bucket.
pub fn classify(value: Option<f64>) -> Option<usize> {
    let value = value?;
    if value > 102.0 {
        None
    } else if value >= 80.0 {
        Some(4)
    } else if value >= 60.0 {
        Some(3)
    } else if value >= 40.0 {
        Some(2)
    } else if value >= 20.0 {
        Some(1)
    } else if value >= 0.0 {
        Some(0)
    } else {
        None
    }
}

/// Choropleth fill for a value, `None` meaning the no-data pattern.
pub fn fill_colour(value: Option<f64>, demographic: Demographic) -> Option<&'static str> {
    classify(value).map(|bucket| demographic.info().ramp[bucket])
}

/// Graduated marker style for a facility.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SymbolTier {
    pub tier: usize,
    pub radius: f64,
    pub colour: &'static str,
    pub opacity: f64,
    pub fill_opacity: f64,
}

const TIER_RADII: [f64; 4] = [2.5, 7.5, 16.0, 25.0];

impl SymbolTier {
    pub fn new(tier: usize) -> Self {
        let tier = tier.min(3);
        let (opacity, fill_opacity) = if tier == 0 { (0.75, 0.5) } else { (1.0, 1.0) };
        Self {
            tier,
            radius: TIER_RADII[tier],
            colour: POINT_COLOURS[tier],
            opacity,
            fill_opacity,
        }
    }

    /// Tier thresholds sit at a quarter, half and three quarters of the
    /// dataset maximum, each offset by the dataset minimum.
    pub fn for_emission(value: Option<f64>, min: Option<f64>, max: Option<f64>) -> Self {
        let (Some(value), Some(min), Some(max)) = (value, min, max) else {
            return Self::new(0);
        };
        let tier = [0.75, 0.5, 0.25]
            .iter()
            .position(|share| value >= max * share + min)
            .map_or(0, |i| 3 - i);
        Self::new(tier)
    }
}
