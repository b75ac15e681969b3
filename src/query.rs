use crate::aggregate::{self, AggregationOp, ObservationFilter};
use crate::color;
use crate::error::{AppError, Result};
use crate::graph::FlowGraph;
use crate::loads::{self, MetricKind, TimePeriod};
use crate::model::{LocationSummary, PARAM_FLOW};
use crate::tables::TableSet;
use serde::Serialize;
use tracing::info;

/// Station query as it arrives from the UI collaborator: the operator is
/// still a string and gets validated here, at the boundary.
#[derive(Debug, Clone)]
pub struct StationQuery {
    pub parameter_code: String,
    pub aggregation: String,
    pub year: i32,
    pub month: u32,
    pub watershed_unit_id: Option<String>,
}

/// Per-location summaries plus the global parameter range the renderer
/// uses to calibrate its color scale.
#[derive(Debug, Serialize)]
pub struct StationQueryResult {
    pub summaries: Vec<LocationSummary>,
    pub scale_min: f64,
    pub scale_max: f64,
}

pub fn run_station_query(tables: &TableSet, query: &StationQuery) -> Result<StationQueryResult> {
    let op: AggregationOp = query.aggregation.parse()?;
    if !(1..=12).contains(&query.month) {
        return Err(AppError::InputValidation(format!(
            "Month {} out of valid range (1-12)",
            query.month
        )));
    }

    // A parameter absent from the snapshot entirely is a bad query, not
    // an empty month; an empty slice of a known parameter stays a valid
    // empty result.
    let Some((scale_min, scale_max)) =
        aggregate::parameter_range(&tables.observations, &query.parameter_code)
    else {
        return Err(AppError::InputValidation(format!(
            "Parameter '{}' not present in observations",
            query.parameter_code
        )));
    };

    let filter = ObservationFilter {
        parameter_code: query.parameter_code.clone(),
        year: query.year,
        month: query.month,
        watershed_unit_id: query.watershed_unit_id.clone(),
    };
    let summaries = aggregate::aggregate_observations(&tables.observations, &filter, op);

    info!(
        "Station query {}/{} {}-{:02}: {} locations",
        query.parameter_code,
        query.aggregation,
        query.year,
        query.month,
        summaries.len()
    );

    Ok(StationQueryResult {
        summaries: summaries.into_values().collect(),
        scale_min,
        scale_max,
    })
}

/// Load query from the UI collaborator; `month` of `None` aggregates the
/// whole year.
#[derive(Debug, Clone)]
pub struct LoadQuery {
    pub parameter_code: String,
    pub metric: String,
    pub year: i32,
    pub month: Option<u32>,
}

/// One watershed unit ready for choropleth rendering: cumulative
/// upstream metric, its color on the scale, and the unit's geometry.
#[derive(Debug, Clone, Serialize)]
pub struct ChoroplethRecord {
    pub unit_id: String,
    pub cumulative_value: f64,
    pub color: String,
    pub geometry: Vec<[f64; 2]>,
    pub centroid_lat: f64,
    pub centroid_lon: f64,
}

pub fn run_load_query(
    tables: &TableSet,
    graph: &FlowGraph,
    query: &LoadQuery,
) -> Result<Vec<ChoroplethRecord>> {
    let metric: MetricKind = query.metric.parse()?;
    if query.parameter_code == PARAM_FLOW {
        return Err(AppError::InputValidation(
            "FLOW is the flow series itself, not a nutrient parameter".to_string(),
        ));
    }
    if !tables
        .discharges
        .iter()
        .any(|d| d.parameter_code == query.parameter_code)
    {
        return Err(AppError::InputValidation(format!(
            "Parameter '{}' not present in facility discharges",
            query.parameter_code
        )));
    }
    let period = TimePeriod::new(query.year, query.month)?;

    let own = match metric {
        MetricKind::Load => loads::unit_totals(&loads::unit_month_loads(
            &tables.discharges,
            &query.parameter_code,
            &period,
        )?),
        MetricKind::FacilityCount => {
            loads::facility_counts(&tables.discharges, &query.parameter_code, &period)
        }
    };

    let cumulative = graph.accumulate(&own);
    let colors = color::map_series(&cumulative);

    let mut records: Vec<ChoroplethRecord> = tables
        .topology
        .iter()
        .map(|unit| ChoroplethRecord {
            unit_id: unit.unit_id.clone(),
            cumulative_value: cumulative.get(&unit.unit_id).copied().unwrap_or(0.0),
            color: colors.get(&unit.unit_id).cloned().unwrap_or_default(),
            geometry: unit.geometry.clone(),
            centroid_lat: unit.centroid_lat,
            centroid_lon: unit.centroid_lon,
        })
        .collect();
    records.sort_by(|a, b| a.unit_id.cmp(&b.unit_id));

    info!(
        "Load query {}/{} {}{}: {} units",
        query.parameter_code,
        query.metric,
        query.year,
        query
            .month
            .map(|m| format!("-{:02}", m))
            .unwrap_or_default(),
        records.len()
    );

    Ok(records)
}
