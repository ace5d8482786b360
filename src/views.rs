//! Plain-data models for the views that depend on the session state.
//!
//! Nothing here knows about HTML or the map widget; a renderer turns these
//! into markup.

use crate::aggregate::{AggregatedPolygonFeature, BasePolygon, LayerBundle, RankedPoint};
use crate::classify::{classify, fill_colour, SymbolTier, CLASS_BREAKS};
use crate::click::ClickResolution;
use crate::types::{BoundaryLevel, DatasetId, Demographic, PolygonFeature};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendClass {
    pub label: String,
    pub colour: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendSymbol {
    pub symbol: SymbolTier,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Legend {
    pub demographic: Demographic,
    pub classes: Vec<LegendClass>,
    pub no_data_label: &'static str,
    /// Facility size classes, present only while a dataset is displayed.
    pub symbols: Vec<LegendSymbol>,
}

impl Legend {
    pub fn build(demographic: Demographic, bundle: Option<&LayerBundle>) -> Self {
        let ramp = demographic.info().ramp;
        let classes = CLASS_BREAKS
            .windows(2)
            .zip(ramp)
            .map(|(bounds, colour)| LegendClass {
                label: format!("{}% - {}%", bounds[0], bounds[1]),
                colour,
            })
            .collect();

        let symbols = bundle
            .map(|bundle| {
                let (min, max) = bundle.emission_range();
                let (min, max) = (min.unwrap_or(0.0), max.unwrap_or(0.0));
                let cuts = [min, max * 0.25, max * 0.5, max * 0.75, max];
                (0..4)
                    .map(|tier| LegendSymbol {
                        symbol: SymbolTier::new(tier),
                        label: format!("{:.0} - {:.0}", cuts[tier], cuts[tier + 1]),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            demographic,
            classes,
            no_data_label: "Out of Range",
            symbols,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub id: String,
    /// Demographic percentage.
    pub x: Option<f64>,
    /// Median emissions in tonnes.
    pub y: Option<f64>,
    /// Ramp colour with `BF` alpha, `None` when the value is out of range.
    pub colour: Option<String>,
}

/// Scatter of demographic share against median emissions for the displayed layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub x_title: &'static str,
    pub y_title: &'static str,
    pub points: Vec<ChartPoint>,
    pub highlighted: Option<usize>,
}

impl Chart {
    pub fn build(bundle: &LayerBundle, level: BoundaryLevel, demographic: Demographic) -> Self {
        let points = bundle
            .boundary_layer(level)
            .iter()
            .map(|polygon| {
                let x = demographic.value_of(&polygon.feature);
                ChartPoint {
                    id: polygon.feature.id.clone(),
                    x,
                    y: polygon.median_emissions,
                    colour: fill_colour(x, demographic).map(|c| format!("{c}BF")),
                }
            })
            .collect();

        Self {
            x_title: demographic.info().chart_title,
            y_title: bundle.dataset.chart_title(),
            points,
            highlighted: None,
        }
    }

    /// Marks the point belonging to polygon `id`, if it is plotted.
    pub fn highlight(&mut self, id: &str) {
        self.highlighted = self.points.iter().position(|p| p.id == id);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopupRow {
    pub label: &'static str,
    pub value: Option<f64>,
    pub class: Option<usize>,
    /// `None` renders the no-data pattern.
    pub colour: Option<&'static str>,
    pub emphasized: bool,
}

impl PopupRow {
    fn new(label: &'static str, value: Option<f64>, demographic: Demographic, emphasized: bool) -> Self {
        Self {
            label,
            value,
            class: classify(value),
            colour: fill_colour(value, demographic),
            emphasized,
        }
    }
}

/// Demographic values at the clicked location for every boundary level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Popup {
    pub lat: f64,
    pub lon: f64,
    pub demographic_label: &'static str,
    pub title_colour: &'static str,
    /// Finest level first, national rate last.
    pub rows: Vec<PopupRow>,
    /// Polygon outlined on the map: the match at the current boundary level.
    pub highlight_id: Option<String>,
}

impl Popup {
    pub fn build(
        lat: f64,
        lon: f64,
        resolution: &ClickResolution,
        level: BoundaryLevel,
        demographic: Demographic,
    ) -> Self {
        let info = demographic.info();
        let mut rows: Vec<PopupRow> = BoundaryLevel::ALL
            .into_iter()
            .rev()
            .map(|row_level| {
                let value = resolution
                    .get(row_level)
                    .and_then(|polygon| demographic.value_of(polygon));
                PopupRow::new(row_level.label(), value, demographic, row_level == level)
            })
            .collect();
        rows.push(PopupRow::new("National Rate", Some(info.national_rate), demographic, false));

        Self {
            lat,
            lon,
            demographic_label: info.label,
            title_colour: info.ramp[3],
            rows,
            highlight_id: resolution.get(level).map(|polygon| polygon.id.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoverLine {
    pub label: String,
    pub value: String,
    pub emphasized: bool,
}

impl HoverLine {
    fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            emphasized: false,
        }
    }

    fn emphasized(mut self, emphasized: bool) -> Self {
        self.emphasized = emphasized;
        self
    }
}

/// Contents of the hover information panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hover {
    pub title: String,
    pub heading: String,
    pub lines: Vec<HoverLine>,
    /// Outlined in the facility colour when describing facility data.
    pub outlined: bool,
}

fn heading(polygon: &PolygonFeature, level: BoundaryLevel) -> String {
    let name = polygon.name(level).unwrap_or_default();
    match level {
        BoundaryLevel::AggregateDisseminationArea => format!("ADA ID: {name}"),
        _ => name,
    }
}

fn display(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| v.to_string())
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() >= limit {
        let cut: String = text.chars().take(limit).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

fn demographic_line(
    polygon: &PolygonFeature,
    demographic: Demographic,
    rank: usize,
    record_count: usize,
) -> HoverLine {
    let share = demographic.value_of(polygon);
    let estimate = match (share, polygon.pop) {
        (Some(share), Some(pop)) => ((share / 100.0) * pop).floor().to_string(),
        _ => "n/a".to_string(),
    };
    HoverLine::new(
        demographic.info().hover_label,
        format!("{estimate} | {}% | Rank {rank} of {record_count}", display(share)),
    )
}

impl Hover {
    /// Panel for a demographic-only boundary polygon.
    pub fn boundary(polygon: &BasePolygon, level: BoundaryLevel, current: Demographic) -> Self {
        let feature = &polygon.feature;
        let mut lines = vec![HoverLine::new(
            "Population",
            format!(
                "{} | Rank {} of {}",
                display(feature.pop),
                polygon.ranks.pop_rank,
                polygon.record_count
            ),
        )];
        lines.extend(Demographic::ALL.into_iter().map(|demographic| {
            demographic_line(
                feature,
                demographic,
                polygon.ranks.for_demographic(demographic),
                polygon.record_count,
            )
            .emphasized(demographic == current)
        }));

        Self {
            title: format!("{} Information", level.label()),
            heading: heading(feature, level),
            lines,
            outlined: false,
        }
    }

    /// Panel for a polygon of the displayed dataset's aggregated layer.
    pub fn aggregated(polygon: &AggregatedPolygonFeature, level: BoundaryLevel, current: Demographic) -> Self {
        let feature = &polygon.feature;
        let of = polygon.polys_with_points;
        let lines = vec![
            HoverLine::new(
                "Population",
                format!(
                    "{} | Rank {} of {}",
                    display(feature.pop),
                    polygon.ranks.pop_rank,
                    polygon.record_count
                ),
            ),
            demographic_line(
                feature,
                current,
                polygon.ranks.for_demographic(current),
                polygon.record_count,
            )
            .emphasized(true),
            HoverLine::new(
                "Contained Points",
                format!(
                    "{} (of {}) | Rank {} of {of}",
                    polygon.point_count, polygon.total_point_count, polygon.point_count_rank
                ),
            ),
            HoverLine::new(
                "Median Emissions",
                format!(
                    "{} (t) | Rank {} of {of}",
                    display(polygon.median_emissions),
                    polygon.median_emissions_rank
                ),
            ),
            HoverLine::new(
                "Total Emissions",
                format!(
                    "{} (t) | Rank {} of {of}",
                    polygon
                        .total_emissions
                        .map_or_else(|| "n/a".to_string(), |t| format!("{t:.2}")),
                    polygon.total_emissions_rank
                ),
            ),
        ];

        Self {
            title: format!("{} Information", level.label()),
            heading: heading(feature, level),
            lines,
            outlined: true,
        }
    }

    /// Panel for a single facility.
    pub fn facility(point: &RankedPoint) -> Self {
        let feature = &point.feature;
        let or_blank = |s: &Option<String>| s.clone().unwrap_or_default();
        let lines = vec![
            HoverLine::new("Industry", truncate(&or_blank(&feature.industry), 55)),
            HoverLine::new(
                "Location",
                format!("{}, {}", or_blank(&feature.city), or_blank(&feature.province)),
            ),
            HoverLine::new("Emission Type", or_blank(&feature.substance)),
            HoverLine::new("Total Emissions", format!("{} (t)", display(feature.emission))),
            HoverLine::new(
                "",
                format!(
                    "Ranked {} among {} facilities of this type",
                    point.emissions_rank, point.record_count
                ),
            ),
        ];

        Self {
            title: "Facility Information".to_string(),
            heading: truncate(&or_blank(&feature.company), 60),
            lines,
            outlined: true,
        }
    }
}

/// Base-layer switcher entry for one boundary level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaseLayerEntry {
    pub level: BoundaryLevel,
    pub name: &'static str,
    pub visible: bool,
}

/// Dataset tab.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tab {
    pub dataset: DatasetId,
    pub label: &'static str,
    pub selected: bool,
}

pub fn tabs(active: Option<DatasetId>) -> Vec<Tab> {
    DatasetId::ALL
        .into_iter()
        .map(|dataset| Tab {
            dataset,
            label: dataset.tab_label(),
            selected: active == Some(dataset),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{base_layer, build_bundle, point_layer};
    use crate::click::resolve_click;
    use crate::store::fixtures;

    #[test]
    fn legend_lists_five_classes_and_symbols_only_with_a_dataset() {
        let legend = Legend::build(Demographic::Ind, None);
        assert_eq!(legend.classes.len(), 5);
        assert_eq!(legend.classes[0].label, "0% - 20%");
        assert_eq!(legend.classes[4].colour, "#2b4093");
        assert!(legend.symbols.is_empty());

        let bundle = build_bundle(&fixtures::store(), DatasetId::Pm25).unwrap();
        let legend = Legend::build(Demographic::Lowinc, Some(&bundle));
        let labels: Vec<&str> = legend.symbols.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["5 - 25", "25 - 50", "50 - 75", "75 - 100"]);
        assert_eq!(legend.symbols[3].symbol.radius, 25.0);
    }

    #[test]
    fn chart_plots_the_current_level() {
        let bundle = build_bundle(&fixtures::store(), DatasetId::Pm25).unwrap();
        let mut chart = Chart::build(&bundle, BoundaryLevel::CensusDivision, Demographic::Lowinc);
        assert_eq!(chart.y_title, "Median PM2.5 Emissions (t)");
        assert_eq!(chart.points.len(), 2);
        assert_eq!(chart.points[0].x, Some(20.0));
        assert_eq!(chart.points[0].y, Some(20.0));
        assert_eq!(chart.points[0].colour.as_deref(), Some("#b7d0cfBF"));

        chart.highlight("2021A00033502");
        assert_eq!(chart.highlighted, Some(1));
        chart.highlight("missing");
        assert_eq!(chart.highlighted, None);
    }

    #[test]
    fn popup_emphasises_the_current_level() {
        let store = fixtures::store();
        let resolution = resolve_click(&store, 0.5, 0.5).unwrap();
        let popup = Popup::build(0.5, 0.5, &resolution, BoundaryLevel::CensusDivision, Demographic::Lowinc);

        let labels: Vec<&str> = popup.rows.iter().map(|r| r.label).collect();
        assert_eq!(
            labels,
            vec![
                "Aggregate Dissemination Area",
                "Census Subdivision",
                "Census Division",
                "Province / Territory",
                "National Rate"
            ]
        );
        assert!(popup.rows[2].emphasized);
        assert_eq!(popup.rows.iter().filter(|r| r.emphasized).count(), 1);
        assert_eq!(popup.highlight_id.as_deref(), Some("2021A00033501"));
        // 101.5 is inside the rounding tolerance
        assert_eq!(popup.rows[0].class, Some(4));
        assert_eq!(popup.rows[4].value, Some(11.1));
    }

    #[test]
    fn popup_rows_without_a_match_fall_back_to_no_data() {
        let store = fixtures::store();
        let resolution = resolve_click(&store, 4.0, 4.0).unwrap();
        let popup = Popup::build(4.0, 4.0, &resolution, BoundaryLevel::AggregateDisseminationArea, Demographic::Vm);
        assert_eq!(popup.rows[0].value, None);
        assert_eq!(popup.rows[0].colour, None);
        assert_eq!(popup.highlight_id, None);
    }

    #[test]
    fn hover_panels() {
        let store = fixtures::store();
        let base = base_layer(&store, BoundaryLevel::CensusDivision).unwrap();
        let hover = Hover::boundary(&base.polygons[0], BoundaryLevel::CensusDivision, Demographic::Lowinc);
        assert_eq!(hover.title, "Census Division Information");
        assert_eq!(hover.heading, "West");
        assert_eq!(hover.lines[1].value, "60 | 20% | Rank 1 of 3");
        assert!(hover.lines[1].emphasized && !hover.lines[2].emphasized);

        let bundle = build_bundle(&store, DatasetId::Pm25).unwrap();
        let polygon = &bundle.boundary_layer(BoundaryLevel::CensusDivision)[0];
        let hover = Hover::aggregated(polygon, BoundaryLevel::CensusDivision, Demographic::Lowinc);
        assert_eq!(hover.lines[2].value, "3 (of 6) | Rank 1 of 2");
        assert_eq!(hover.lines[4].value, "60.00 (t) | Rank 2 of 2");

        let points = point_layer(&store, DatasetId::Pm25).unwrap();
        let hover = Hover::facility(&points[3]);
        assert_eq!(hover.heading, "Acme Smelting");
        assert_eq!(hover.lines[4].value, "Ranked 1 among 6 facilities of this type");
    }

    #[test]
    fn long_names_are_truncated() {
        assert_eq!(truncate("short", 60), "short");
        assert_eq!(truncate(&"x".repeat(61), 60), format!("{}...", "x".repeat(60)));
    }

    #[test]
    fn tabs_mark_the_active_dataset() {
        let tabs = tabs(Some(DatasetId::So2));
        assert_eq!(tabs.len(), 6);
        assert!(tabs[4].selected);
        assert_eq!(tabs.iter().filter(|t| t.selected).count(), 1);
    }
}
