use crate::error::{AppError, Result};
use crate::model::{FacilityDischarge, PARAM_FLOW};
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;
use tracing::debug;

/// Pounds of pollutant per day discharged at 1 mg/L concentration and
/// 1 MGD of flow. 1 MGD of water weighs 8.344 million pounds, so
/// lbs/day = mg/L x MGD x 8.344.
pub const LBS_PER_MGL_MGD: f64 = 8.344;

/// Per-unit metric that can be propagated through the flow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Pollutant mass load in lbs over the period.
    Load,
    /// Number of distinct facilities discharging the parameter.
    FacilityCount,
}

impl FromStr for MetricKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "load" => Ok(MetricKind::Load),
            "facility_count" => Ok(MetricKind::FacilityCount),
            other => Err(AppError::InputValidation(format!(
                "Unknown load metric '{}' (expected load or facility_count)",
                other
            ))),
        }
    }
}

/// Aggregation window for load computation: a single month, or a whole
/// year when `month` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimePeriod {
    pub year: i32,
    pub month: Option<u32>,
}

impl TimePeriod {
    pub fn new(year: i32, month: Option<u32>) -> Result<Self> {
        if let Some(m) = month {
            if !(1..=12).contains(&m) {
                return Err(AppError::InputValidation(format!(
                    "Month {} out of valid range (1-12)",
                    m
                )));
            }
        }
        Ok(Self { year, month })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && self.month.map_or(true, |m| date.month() == m)
    }
}

/// Number of days in a calendar month, the period multiplier that turns
/// a lbs/day rate into a mass for the month.
pub fn days_in_month(year: i32, month: u32) -> Result<i64> {
    let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        AppError::InputValidation(format!("Invalid month {} for year {}", month, year))
    })?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| {
        AppError::InputValidation(format!("Invalid month {} for year {}", month, year))
    })?;
    Ok((end - start).num_days())
}

/// Joins each facility's concentration records for `parameter_code` with
/// its FLOW records by (facility, month) and sums the resulting mass
/// loads per (watershed unit, month).
///
/// Multiple reports for the same facility-month are averaged before the
/// join, on both sides. A facility-month with no matching FLOW record is
/// skipped; unit/month combinations with no load at all are simply
/// absent from the result, and callers treat absence as zero.
pub fn unit_month_loads(
    discharges: &[FacilityDischarge],
    parameter_code: &str,
    period: &TimePeriod,
) -> Result<BTreeMap<(String, u32), f64>> {
    // Monthly mean flow per facility, MGD.
    let mut flows: HashMap<(&str, u32), (f64, u32)> = HashMap::new();
    for d in discharges
        .iter()
        .filter(|d| d.parameter_code == PARAM_FLOW && period.contains(d.date))
    {
        let entry = flows
            .entry((d.facility_id.as_str(), d.date.month()))
            .or_insert((0.0, 0));
        entry.0 += d.value;
        entry.1 += 1;
    }

    // Monthly mean concentration per facility, mg/L, with the unit the
    // facility discharges into. Ordered so the load summation below is
    // deterministic.
    let mut concentrations: BTreeMap<(&str, u32), (f64, u32, &str)> = BTreeMap::new();
    for d in discharges
        .iter()
        .filter(|d| d.parameter_code == parameter_code && period.contains(d.date))
    {
        let entry = concentrations
            .entry((d.facility_id.as_str(), d.date.month()))
            .or_insert((0.0, 0, d.watershed_unit_id.as_str()));
        entry.0 += d.value;
        entry.1 += 1;
    }

    let mut loads: BTreeMap<(String, u32), f64> = BTreeMap::new();
    for ((facility_id, month), (conc_sum, conc_n, unit_id)) in concentrations {
        let Some((flow_sum, flow_n)) = flows.get(&(facility_id, month)) else {
            debug!(
                "No FLOW record for facility {} in {}-{:02}; skipping load",
                facility_id, period.year, month
            );
            continue;
        };
        let concentration = conc_sum / conc_n as f64;
        let flow = flow_sum / *flow_n as f64;
        let load =
            concentration * flow * LBS_PER_MGL_MGD * days_in_month(period.year, month)? as f64;
        *loads.entry((unit_id.to_string(), month)).or_insert(0.0) += load;
    }
    Ok(loads)
}

/// Collapses per-(unit, month) loads into per-unit totals over the period.
pub fn unit_totals(monthly: &BTreeMap<(String, u32), f64>) -> HashMap<String, f64> {
    let mut totals: HashMap<String, f64> = HashMap::new();
    for ((unit_id, _month), load) in monthly {
        *totals.entry(unit_id.clone()).or_insert(0.0) += load;
    }
    totals
}

/// Distinct facilities discharging `parameter_code` per watershed unit
/// within the period.
pub fn facility_counts(
    discharges: &[FacilityDischarge],
    parameter_code: &str,
    period: &TimePeriod,
) -> HashMap<String, f64> {
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut counts: HashMap<String, f64> = HashMap::new();
    for d in discharges
        .iter()
        .filter(|d| d.parameter_code == parameter_code && period.contains(d.date))
    {
        if seen.insert((d.watershed_unit_id.as_str(), d.facility_id.as_str())) {
            *counts.entry(d.watershed_unit_id.clone()).or_insert(0.0) += 1.0;
        }
    }
    counts
}
