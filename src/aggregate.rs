use crate::error::{AppError, Result};
use crate::model::{LocationSummary, Observation};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Aggregation operators accepted by the station query boundary.
///
/// The set is closed: an operator string outside it is an input
/// validation error, never silently replaced with a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationOp {
    Count,
    Mean,
    Median,
    Min,
    Max,
}

impl FromStr for AggregationOp {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "count" => Ok(AggregationOp::Count),
            "mean" => Ok(AggregationOp::Mean),
            "median" => Ok(AggregationOp::Median),
            "min" => Ok(AggregationOp::Min),
            "max" => Ok(AggregationOp::Max),
            other => Err(AppError::InputValidation(format!(
                "Unknown aggregation operator '{}' (expected count, mean, median, min or max)",
                other
            ))),
        }
    }
}

impl AggregationOp {
    /// Applies the operator to a group of values. Returns `None` for an
    /// empty group (cannot happen for groups formed from matched rows,
    /// but callers must not invent a value for it).
    pub fn apply(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return match self {
                AggregationOp::Count => Some(0.0),
                _ => None,
            };
        }
        let result = match self {
            AggregationOp::Count => values.len() as f64,
            AggregationOp::Mean => values.iter().sum::<f64>() / values.len() as f64,
            AggregationOp::Median => median(values),
            AggregationOp::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            AggregationOp::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        };
        Some(result)
    }
}

/// Middle of the sorted values; the two middles are averaged for even counts.
fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

/// Row filter for the observation aggregator. `watershed_unit_id` of
/// `None` means all units.
#[derive(Debug, Clone)]
pub struct ObservationFilter {
    pub parameter_code: String,
    pub year: i32,
    pub month: u32,
    pub watershed_unit_id: Option<String>,
}

impl ObservationFilter {
    pub fn matches(&self, obs: &Observation) -> bool {
        obs.parameter_code == self.parameter_code
            && obs.year == self.year
            && obs.month == self.month
            && self
                .watershed_unit_id
                .as_deref()
                .map_or(true, |unit| obs.watershed_unit_id == unit)
    }
}

/// Groups filtered observations by location and applies the operator to
/// each group's `value` column.
///
/// An empty filter result yields an empty map, which is a valid outcome
/// rather than an error. The returned map is ordered by location id so
/// repeated runs over the same snapshot produce identical output.
pub fn aggregate_observations(
    observations: &[Observation],
    filter: &ObservationFilter,
    op: AggregationOp,
) -> BTreeMap<String, LocationSummary> {
    let mut groups: BTreeMap<&str, (f64, f64, Vec<f64>)> = BTreeMap::new();

    for obs in observations.iter().filter(|o| filter.matches(o)) {
        let group = groups
            .entry(&obs.location_id)
            .or_insert_with(|| (obs.latitude, obs.longitude, Vec::new()));
        group.2.push(obs.value);
    }

    let mut summaries = BTreeMap::new();
    for (location_id, (lat, lon, values)) in groups {
        if let Some(aggregated_value) = op.apply(&values) {
            summaries.insert(
                location_id.to_string(),
                LocationSummary {
                    location_id: location_id.to_string(),
                    lat,
                    lon,
                    aggregated_value,
                },
            );
        }
    }
    summaries
}

/// Global (min, max) of a parameter's values across the whole snapshot,
/// used to calibrate the color scale independently of the query's
/// year/month slice. `None` if the parameter appears nowhere.
pub fn parameter_range(observations: &[Observation], parameter_code: &str) -> Option<(f64, f64)> {
    let mut range: Option<(f64, f64)> = None;
    for obs in observations.iter().filter(|o| o.parameter_code == parameter_code) {
        range = Some(match range {
            None => (obs.value, obs.value),
            Some((lo, hi)) => (lo.min(obs.value), hi.max(obs.value)),
        });
    }
    range
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(location_id: &str, parameter: &str, value: f64, year: i32, month: u32) -> Observation {
        Observation {
            location_id: location_id.to_string(),
            latitude: 39.0,
            longitude: -76.0,
            watershed_unit_id: "0208".to_string(),
            parameter_code: parameter.to_string(),
            value,
            year,
            month,
            day: 15,
            time: "12:00".to_string(),
        }
    }

    fn tn_filter(year: i32, month: u32) -> ObservationFilter {
        ObservationFilter {
            parameter_code: "TN".to_string(),
            year,
            month,
            watershed_unit_id: None,
        }
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        let result = "variance".parse::<AggregationOp>();
        assert!(matches!(result, Err(AppError::InputValidation(_))));
    }

    #[test]
    fn test_operator_parses_known_names() {
        assert_eq!("count".parse::<AggregationOp>().unwrap(), AggregationOp::Count);
        assert_eq!("median".parse::<AggregationOp>().unwrap(), AggregationOp::Median);
    }

    #[test]
    fn test_count_returns_row_count() {
        let observations = vec![
            obs("L1", "TN", 1.0, 2015, 1),
            obs("L1", "TN", 2.0, 2015, 1),
            obs("L1", "TN", 3.0, 2015, 1),
        ];
        let summaries =
            aggregate_observations(&observations, &tn_filter(2015, 1), AggregationOp::Count);
        assert_eq!(summaries["L1"].aggregated_value, 3.0);
    }

    #[test]
    fn test_mean_of_group() {
        let observations = vec![
            obs("L1", "TN", 2.0, 2015, 1),
            obs("L1", "TN", 4.0, 2015, 1),
        ];
        let summaries =
            aggregate_observations(&observations, &tn_filter(2015, 1), AggregationOp::Mean);
        assert_eq!(summaries["L1"].aggregated_value, 3.0);
    }

    #[test]
    fn test_median_odd_and_even_counts() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
    }

    #[test]
    fn test_min_max_within_subset_bounds() {
        let observations = vec![
            obs("L1", "TN", 5.0, 2015, 1),
            obs("L1", "TN", 1.0, 2015, 1),
            obs("L1", "TN", 3.0, 2015, 1),
        ];
        for op in [AggregationOp::Mean, AggregationOp::Median, AggregationOp::Min, AggregationOp::Max] {
            let summaries = aggregate_observations(&observations, &tn_filter(2015, 1), op);
            let value = summaries["L1"].aggregated_value;
            assert!((1.0..=5.0).contains(&value), "{:?} produced {}", op, value);
        }
    }

    #[test]
    fn test_filter_excludes_other_parameters_months_and_years() {
        let observations = vec![
            obs("L1", "TN", 1.0, 2015, 1),
            obs("L1", "TP", 9.0, 2015, 1),
            obs("L1", "TN", 9.0, 2015, 2),
            obs("L1", "TN", 9.0, 2016, 1),
        ];
        let summaries =
            aggregate_observations(&observations, &tn_filter(2015, 1), AggregationOp::Count);
        assert_eq!(summaries["L1"].aggregated_value, 1.0);
    }

    #[test]
    fn test_watershed_unit_filter() {
        let mut other = obs("L2", "TN", 9.0, 2015, 1);
        other.watershed_unit_id = "0305".to_string();
        let observations = vec![obs("L1", "TN", 1.0, 2015, 1), other];

        let filter = ObservationFilter {
            watershed_unit_id: Some("0208".to_string()),
            ..tn_filter(2015, 1)
        };
        let summaries = aggregate_observations(&observations, &filter, AggregationOp::Count);
        assert_eq!(summaries.len(), 1);
        assert!(summaries.contains_key("L1"));
    }

    #[test]
    fn test_empty_filter_result_is_empty_map() {
        let observations = vec![obs("L1", "TN", 1.0, 2015, 1)];
        let summaries =
            aggregate_observations(&observations, &tn_filter(1999, 6), AggregationOp::Mean);
        assert!(summaries.is_empty());
    }

    #[test]
    fn test_groups_are_per_location() {
        let mut far = obs("L2", "TN", 10.0, 2015, 1);
        far.latitude = 40.0;
        let observations = vec![obs("L1", "TN", 2.0, 2015, 1), far];
        let summaries =
            aggregate_observations(&observations, &tn_filter(2015, 1), AggregationOp::Mean);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries["L1"].aggregated_value, 2.0);
        assert_eq!(summaries["L2"].aggregated_value, 10.0);
        assert_eq!(summaries["L2"].lat, 40.0);
    }

    #[test]
    fn test_parameter_range_spans_all_slices() {
        let observations = vec![
            obs("L1", "TN", 1.0, 2014, 6),
            obs("L1", "TN", 8.0, 2015, 1),
            obs("L2", "TP", 99.0, 2015, 1),
        ];
        assert_eq!(parameter_range(&observations, "TN"), Some((1.0, 8.0)));
        assert_eq!(parameter_range(&observations, "DO"), None);
    }
}
