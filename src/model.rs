use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Parameter code under which facilities report their monthly discharge
/// flow, in million gallons per day. Every other parameter code in the
/// discharge table is a concentration in mg/L.
pub const PARAM_FLOW: &str = "FLOW";

/// A single water-quality measurement from a monitoring station.
///
/// One row of the observations table handed over by the ingestion
/// collaborator. `location_id` is the stable surrogate key assigned at
/// ingestion; records arriving without one are keyed by rounded
/// coordinates during snapshot load.
#[derive(Debug, Clone, Deserialize)]
pub struct Observation {
    #[serde(default)]
    pub location_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub watershed_unit_id: String,
    pub parameter_code: String,
    pub value: f64,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub time: String,
}

/// A single monitoring record from a permitted point-source facility.
///
/// `parameter_code` is either a nutrient concentration (mg/L) or the
/// `FLOW` series (MGD); the two are joined by facility and month to
/// compute mass loads.
#[derive(Debug, Clone, Deserialize)]
pub struct FacilityDischarge {
    pub facility_id: String,
    pub location: String,
    pub watershed_unit_id: String,
    pub parameter_code: String,
    pub value: f64,
    pub units: String,
    pub date: NaiveDate,
}

/// One watershed subunit (HUC12) of the basin topology.
///
/// `downstream_unit_id` is the single outgoing drainage edge; `None`
/// marks a terminal outlet. The geometry is a closed polygon ring in
/// (lon, lat) order, passed through untouched for choropleth rendering.
#[derive(Debug, Clone, Deserialize)]
pub struct WatershedUnit {
    pub unit_id: String,
    #[serde(default)]
    pub downstream_unit_id: Option<String>,
    pub geometry: Vec<[f64; 2]>,
    pub centroid_lat: f64,
    pub centroid_lon: f64,
}

/// Aggregated value for one station location, output of the observation
/// aggregator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationSummary {
    pub location_id: String,
    pub lat: f64,
    pub lon: f64,
    pub aggregated_value: f64,
}

/// Cumulative upstream metric for one watershed unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativeMetric {
    pub unit_id: String,
    pub cumulative_value: f64,
}
