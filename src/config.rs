use crate::aggregate::AggregationOp;
use crate::error::{AppError, Result};
use crate::loads::MetricKind;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub data: DataConfig,
    pub station_query: StationQueryConfig,
    pub load_query: LoadQueryConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

/// Paths to the JSON snapshot tables handed over by the ingestion
/// collaborator.
#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub observations: String,
    pub discharges: String,
    pub topology: String,
}

/// Default station query run by the binary.
#[derive(Debug, Deserialize, Clone)]
pub struct StationQueryConfig {
    pub parameter: String,
    pub aggregation: String,
    pub year: i32,
    pub month: u32,
    #[serde(default)]
    pub watershed_unit: Option<String>,
}

/// Default load query run by the binary. `month` of null selects the
/// whole year.
#[derive(Debug, Deserialize, Clone)]
pub struct LoadQueryConfig {
    pub parameter: String,
    #[serde(default = "default_metric")]
    pub metric: String,
    pub year: i32,
    #[serde(default)]
    pub month: Option<u32>,
}

fn default_metric() -> String {
    "load".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SnapshotConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: f64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
        }
    }
}

fn default_failure_threshold() -> f64 {
    0.10
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        // Substitute environment variables
        let expanded = expand_env_vars(&content)?;

        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    ///
    /// A bad operator or metric name fails here, at startup, rather than
    /// on the first query. Nothing is ever replaced with a fallback.
    fn validate(&self) -> Result<()> {
        let paths = [
            ("observations", &self.data.observations),
            ("discharges", &self.data.discharges),
            ("topology", &self.data.topology),
        ];
        for (name, path) in &paths {
            if path.is_empty() {
                return Err(AppError::Config(format!(
                    "data.{} path cannot be empty",
                    name
                )));
            }
            if path.contains("${") {
                return Err(AppError::Config(format!(
                    "data.{} contains an unexpanded environment variable: {}",
                    name, path
                )));
            }
        }

        if self.station_query.parameter.is_empty() {
            return Err(AppError::Config(
                "station_query.parameter cannot be empty".to_string(),
            ));
        }
        if self.load_query.parameter.is_empty() {
            return Err(AppError::Config(
                "load_query.parameter cannot be empty".to_string(),
            ));
        }

        self.station_query.aggregation.parse::<AggregationOp>()?;
        self.load_query.metric.parse::<MetricKind>()?;

        if !(1..=12).contains(&self.station_query.month) {
            return Err(AppError::Config(format!(
                "station_query.month {} out of valid range (1-12)",
                self.station_query.month
            )));
        }
        if let Some(month) = self.load_query.month {
            if !(1..=12).contains(&month) {
                return Err(AppError::Config(format!(
                    "load_query.month {} out of valid range (1-12)",
                    month
                )));
            }
        }

        let threshold = self.snapshot.failure_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(AppError::Config(format!(
                "snapshot.failure_threshold {} must be in (0, 1]",
                threshold
            )));
        }
        if threshold > 0.5 {
            tracing::warn!(
                "snapshot.failure_threshold of {} tolerates dropping most of a table, consider lowering it",
                threshold
            );
        }

        Ok(())
    }
}

fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}").unwrap();

    let mut missing_vars = Vec::new();

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => {
                result = result.replace(&cap[0], &value);
            }
            Err(_) => {
                missing_vars.push(var_name.to_string());
            }
        }
    }

    if !missing_vars.is_empty() {
        return Err(AppError::Config(format!(
            "Missing required environment variable{}: {}. \
             Set {} in the environment or in a .env file before running.",
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars.join(", "),
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_yaml(aggregation: &str, month: u32) -> String {
        format!(
            r#"
data:
  observations: data/observations.json
  discharges: data/discharges.json
  topology: data/topology.json
station_query:
  parameter: TN
  aggregation: {}
  year: 2015
  month: {}
load_query:
  parameter: TN
  year: 2015
  month: 1
"#,
            aggregation, month
        )
    }

    #[test]
    fn test_valid_config_parses_and_validates() {
        let config: Config = serde_yaml::from_str(&config_yaml("mean", 1)).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.load_query.metric, "load");
        assert_eq!(config.snapshot.failure_threshold, 0.10);
    }

    #[test]
    fn test_unknown_aggregation_fails_validation() {
        let config: Config = serde_yaml::from_str(&config_yaml("variance", 1)).unwrap();
        assert!(matches!(
            config.validate(),
            Err(AppError::InputValidation(_))
        ));
    }

    #[test]
    fn test_month_out_of_range_fails_validation() {
        let config: Config = serde_yaml::from_str(&config_yaml("mean", 13)).unwrap();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_expand_env_vars_substitutes() {
        std::env::set_var("BASINLOAD_TEST_DATA_DIR", "/srv/data");
        let expanded =
            expand_env_vars("observations: ${BASINLOAD_TEST_DATA_DIR}/obs.json").unwrap();
        assert_eq!(expanded, "observations: /srv/data/obs.json");
    }

    #[test]
    fn test_expand_env_vars_reports_missing() {
        let result = expand_env_vars("observations: ${BASINLOAD_TEST_UNSET_VAR}/obs.json");
        match result {
            Err(AppError::Config(msg)) => assert!(msg.contains("BASINLOAD_TEST_UNSET_VAR")),
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_whole_year_load_query_month_defaults_to_none() {
        let yaml = r#"
data:
  observations: o.json
  discharges: d.json
  topology: t.json
station_query:
  parameter: TN
  aggregation: mean
  year: 2015
  month: 1
load_query:
  parameter: TP
  metric: facility_count
  year: 2015
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.load_query.month, None);
    }
}
