use crate::error::AtlasError;
use geo::{MultiPolygon, Point};
use geojson::JsonObject;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Administrative boundary granularity, coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum BoundaryLevel {
    #[default]
    #[serde(rename = "province")]
    Province,
    #[serde(rename = "c_div")]
    CensusDivision,
    #[serde(rename = "c_subdiv")]
    CensusSubdivision,
    #[serde(rename = "agg_diss")]
    AggregateDisseminationArea,
}

impl BoundaryLevel {
    pub const ALL: [BoundaryLevel; 4] = [
        BoundaryLevel::Province,
        BoundaryLevel::CensusDivision,
        BoundaryLevel::CensusSubdivision,
        BoundaryLevel::AggregateDisseminationArea,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BoundaryLevel::Province => "province",
            BoundaryLevel::CensusDivision => "c_div",
            BoundaryLevel::CensusSubdivision => "c_subdiv",
            BoundaryLevel::AggregateDisseminationArea => "agg_diss",
        }
    }

    /// Position in [`BoundaryLevel::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Name shown in the base layer switcher.
    pub fn layer_name(self) -> &'static str {
        match self {
            BoundaryLevel::Province => "Provinces / Territories",
            BoundaryLevel::CensusDivision => "Census Divisions",
            BoundaryLevel::CensusSubdivision => "Census Subdivisions",
            BoundaryLevel::AggregateDisseminationArea => "Aggregate Dissemination Areas",
        }
    }

    /// Singular label used by the hover panel and popup rows.
    pub fn label(self) -> &'static str {
        match self {
            BoundaryLevel::Province => "Province / Territory",
            BoundaryLevel::CensusDivision => "Census Division",
            BoundaryLevel::CensusSubdivision => "Census Subdivision",
            BoundaryLevel::AggregateDisseminationArea => "Aggregate Dissemination Area",
        }
    }

    /// Property holding the human readable name of a polygon at this level.
    pub fn name_property(self) -> &'static str {
        match self {
            BoundaryLevel::Province => "prename",
            BoundaryLevel::CensusDivision => "cdname",
            BoundaryLevel::CensusSubdivision => "csdname",
            BoundaryLevel::AggregateDisseminationArea => "adauid",
        }
    }

    /// 2021 census DGUID prefix (vintage + type + schema) of polygons at this level.
    pub fn dguid_prefix(self) -> &'static str {
        match self {
            BoundaryLevel::Province => "2021A0002",
            BoundaryLevel::CensusDivision => "2021A0003",
            BoundaryLevel::CensusSubdivision => "2021A0005",
            BoundaryLevel::AggregateDisseminationArea => "2021S0516",
        }
    }

    pub fn from_dguid(dguid: &str) -> Option<Self> {
        let prefix = dguid.get(..9)?;
        Self::ALL.into_iter().find(|level| level.dguid_prefix() == prefix)
    }
}

impl fmt::Display for BoundaryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoundaryLevel {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| AtlasError::InvalidDataset(s.to_string()))
    }
}

/// The six NPRI 2021 pollutant facility datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DatasetId {
    #[serde(rename = "NPRI_PM2_5")]
    Pm25,
    #[serde(rename = "NPRI_NH3")]
    Nh3,
    #[serde(rename = "NPRI_NOx")]
    Nox,
    #[serde(rename = "NPRI_CO")]
    Co,
    #[serde(rename = "NPRI_SO2")]
    So2,
    #[serde(rename = "NPRI_VOCs")]
    Vocs,
}

impl DatasetId {
    pub const ALL: [DatasetId; 6] = [
        DatasetId::Pm25,
        DatasetId::Nh3,
        DatasetId::Nox,
        DatasetId::Co,
        DatasetId::So2,
        DatasetId::Vocs,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DatasetId::Pm25 => "NPRI_PM2_5",
            DatasetId::Nh3 => "NPRI_NH3",
            DatasetId::Nox => "NPRI_NOx",
            DatasetId::Co => "NPRI_CO",
            DatasetId::So2 => "NPRI_SO2",
            DatasetId::Vocs => "NPRI_VOCs",
        }
    }

    /// Text on the dataset tab.
    pub fn tab_label(self) -> &'static str {
        match self {
            DatasetId::Pm25 => "PM2_5",
            DatasetId::Nh3 => "NH3",
            DatasetId::Nox => "NOx",
            DatasetId::Co => "CO",
            DatasetId::So2 => "SO2",
            DatasetId::Vocs => "VOCs",
        }
    }

    /// Name of the source table the facilities were exported from.
    pub fn table_name(self) -> &'static str {
        match self {
            DatasetId::Pm25 => "npri_21_pm2_5",
            DatasetId::Nh3 => "npri_21_nh3",
            DatasetId::Nox => "npri_21_nox",
            DatasetId::Co => "npri_21_co",
            DatasetId::So2 => "npri_21_so2",
            DatasetId::Vocs => "npri_21_vocs",
        }
    }

    pub fn chart_title(self) -> &'static str {
        match self {
            DatasetId::Pm25 => "Median PM2.5 Emissions (t)",
            DatasetId::Nh3 => "Median Ammonia Emissions (t)",
            DatasetId::Nox => "Median NOx Emissions (t)",
            DatasetId::Co => "Median CO Emissions (t)",
            DatasetId::So2 => "Median SO2 Emissions (t)",
            DatasetId::Vocs => "Median VOC Emissions (t)",
        }
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetId {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|dataset| dataset.as_str() == s)
            .ok_or_else(|| AtlasError::InvalidDataset(s.to_string()))
    }
}

/// Either kind of layer, for routes that accept both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerName {
    Dataset(DatasetId),
    Boundary(BoundaryLevel),
}

impl FromStr for LayerName {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(dataset) = s.parse() {
            return Ok(LayerName::Dataset(dataset));
        }
        s.parse().map(LayerName::Boundary)
    }
}

/// Census demographic driving the choropleth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Demographic {
    #[default]
    Lowinc,
    Ind,
    Vm,
}

/// Static presentation data for one demographic.
#[derive(Debug)]
pub struct DemographicInfo {
    pub key: &'static str,
    pub ramp: [&'static str; 5],
    /// Canada-wide percentage from the 2021 census profile.
    pub national_rate: f64,
    pub label: &'static str,
    pub hover_label: &'static str,
    pub chart_title: &'static str,
}

static DEMOGRAPHICS: [DemographicInfo; 3] = [
    DemographicInfo {
        key: "lowinc",
        ramp: ["#f0f2e8", "#b7d0cf", "#7aabb3", "#3e8598", "#005f7b"],
        national_rate: 11.1,
        label: "low-income",
        hover_label: "Low-Income Population",
        chart_title: "% of Population Considered \"Low-Income\"",
    },
    DemographicInfo {
        key: "ind",
        ramp: ["#f0f2e8", "#bfc7d5", "#8d99be", "#5b6ca8", "#2b4093"],
        national_rate: 5.0,
        label: "indigenous",
        hover_label: "Indigenous Population",
        chart_title: "% of Population Considered \"Indigenous\"",
    },
    DemographicInfo {
        key: "vm",
        ramp: ["#f0f2e8", "#b8cbb6", "#7ea281", "#457a4e", "#0d521b"],
        national_rate: 26.5,
        label: "visible minority",
        hover_label: "Visible Minority Population",
        chart_title: "% of Population Considered \"Visible Minority\"",
    },
];

impl Demographic {
    pub const ALL: [Demographic; 3] = [Demographic::Lowinc, Demographic::Ind, Demographic::Vm];

    pub fn info(self) -> &'static DemographicInfo {
        &DEMOGRAPHICS[self as usize]
    }

    pub fn as_str(self) -> &'static str {
        self.info().key
    }

    /// Value of this demographic on a polygon.
    pub fn value_of(self, polygon: &PolygonFeature) -> Option<f64> {
        match self {
            Demographic::Lowinc => polygon.lowinc,
            Demographic::Ind => polygon.ind,
            Demographic::Vm => polygon.vm,
        }
    }
}

impl FromStr for Demographic {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| AtlasError::InvalidDataset(s.to_string()))
    }
}

/// A polluting facility.
#[derive(Debug, Clone)]
pub struct PointFeature {
    pub location: Point<f64>,
    /// Total reported emissions in tonnes.
    pub emission: Option<f64>,
    pub company: Option<String>,
    pub industry: Option<String>,
    pub substance: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub properties: JsonObject,
}

impl PointFeature {
    pub fn from_properties(location: Point<f64>, emission_column: &str, properties: JsonObject) -> Self {
        Self {
            location,
            emission: number(&properties, emission_column),
            company: text(&properties, "company_na"),
            industry: text(&properties, "naics_4_se"),
            substance: text(&properties, "substance_"),
            city: text(&properties, "city"),
            province: text(&properties, "province"),
            properties,
        }
    }
}

/// A census boundary polygon with its demographic percentages.
#[derive(Debug, Clone)]
pub struct PolygonFeature {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
    pub pop: Option<f64>,
    pub lowinc: Option<f64>,
    pub ind: Option<f64>,
    pub vm: Option<f64>,
    pub properties: JsonObject,
}

impl PolygonFeature {
    /// Returns `None` when the id column is missing or not a string/number.
    pub fn from_properties(
        id_column: &str,
        geometry: MultiPolygon<f64>,
        properties: JsonObject,
    ) -> Option<Self> {
        let id = match properties.get(id_column) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => return None,
        };
        Some(Self {
            id,
            geometry,
            pop: number(&properties, "pop"),
            lowinc: number(&properties, "lowinc"),
            ind: number(&properties, "ind"),
            vm: number(&properties, "vm"),
            properties,
        })
    }

    pub fn dguid(&self) -> Option<&str> {
        self.properties.get("dguid").and_then(|v| v.as_str())
    }

    pub fn name(&self, level: BoundaryLevel) -> Option<String> {
        match self.properties.get(level.name_property())? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Reads a numeric property, accepting numbers stored as strings.
///
/// Non-finite values (`"NaN"`, `"inf"`) read as absent.
pub fn number(properties: &JsonObject, key: &str) -> Option<f64> {
    match properties.get(key)? {
        serde_json::Value::Number(n) => n.as_f64().filter(|v: &f64| v.is_finite()),
        serde_json::Value::String(s) => s.trim().parse().ok().filter(|v: &f64| v.is_finite()),
        _ => None,
    }
}

fn text(properties: &JsonObject, key: &str) -> Option<String> {
    properties.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identifiers_round_trip_through_strings() {
        for level in BoundaryLevel::ALL {
            assert_eq!(level.as_str().parse::<BoundaryLevel>().unwrap(), level);
        }
        for dataset in DatasetId::ALL {
            assert_eq!(dataset.as_str().parse::<DatasetId>().unwrap(), dataset);
        }
        assert_eq!(
            "diss_area".parse::<BoundaryLevel>(),
            Err(AtlasError::InvalidDataset("diss_area".into()))
        );
        assert!("npri_pm2_5".parse::<DatasetId>().is_err());
    }

    #[test]
    fn layer_name_accepts_both_kinds() {
        assert_eq!("NPRI_CO".parse::<LayerName>().unwrap(), LayerName::Dataset(DatasetId::Co));
        assert_eq!(
            "c_subdiv".parse::<LayerName>().unwrap(),
            LayerName::Boundary(BoundaryLevel::CensusSubdivision)
        );
        assert!("roads".parse::<LayerName>().is_err());
    }

    #[test]
    fn dguid_prefix_identifies_level() {
        assert_eq!(BoundaryLevel::from_dguid("2021A000235"), Some(BoundaryLevel::Province));
        assert_eq!(
            BoundaryLevel::from_dguid("2021S051635200123"),
            Some(BoundaryLevel::AggregateDisseminationArea)
        );
        assert_eq!(BoundaryLevel::from_dguid("2021A"), None);
    }

    #[test]
    fn demographic_table_is_indexed_by_variant() {
        assert_eq!(Demographic::Vm.info().national_rate, 26.5);
        assert_eq!(Demographic::Ind.info().ramp[3], "#5b6ca8");
        assert_eq!(Demographic::default(), Demographic::Lowinc);
    }

    #[test]
    fn polygon_reads_numeric_strings_and_skips_missing_ids() {
        let props = json!({"dguid": "2021A000210", "pop": "510550", "lowinc": 14.2, "ind": null});
        let props = props.as_object().unwrap().clone();
        let poly = PolygonFeature::from_properties("dguid", MultiPolygon::new(vec![]), props.clone())
            .unwrap();
        assert_eq!(poly.pop, Some(510550.0));
        assert_eq!(poly.lowinc, Some(14.2));
        assert_eq!(poly.ind, None);
        assert_eq!(poly.vm, None);
        assert!(PolygonFeature::from_properties("id", MultiPolygon::new(vec![]), props).is_none());
    }

    #[test]
    fn non_finite_strings_read_as_absent() {
        let props = json!({"a": "NaN", "b": " inf ", "c": "-inf", "d": "12.5"});
        let props = props.as_object().unwrap();
        assert_eq!(number(props, "a"), None);
        assert_eq!(number(props, "b"), None);
        assert_eq!(number(props, "c"), None);
        assert_eq!(number(props, "d"), Some(12.5));

        let point = PointFeature::from_properties(
            Point::new(0.0, 0.0),
            "grand_tota",
            json!({"grand_tota": "NaN"}).as_object().unwrap().clone(),
        );
        assert_eq!(point.emission, None);
    }
}
