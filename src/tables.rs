use crate::config::DataConfig;
use crate::error::{AppError, Result};
use crate::join;
use crate::model::{FacilityDischarge, Observation, WatershedUnit};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Default failure threshold - fail if more than 10% of a table's
/// records are rejected
const DEFAULT_FAILURE_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone)]
pub struct SnapshotStats {
    pub total_records: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub failure_rate: f64,
}

impl SnapshotStats {
    fn new(total_records: usize) -> Self {
        Self {
            total_records,
            accepted: 0,
            rejected: 0,
            failure_rate: 0.0,
        }
    }

    fn finalize(&mut self) {
        self.failure_rate = if self.total_records > 0 {
            self.rejected as f64 / self.total_records as f64
        } else {
            0.0
        };
    }

    pub fn exceeds_threshold(&self, threshold: f64) -> bool {
        self.failure_rate > threshold
    }
}

/// Immutable snapshot of the three reference tables the engine computes
/// over. Loaded once, then only ever borrowed.
#[derive(Debug)]
pub struct TableSet {
    pub observations: Vec<Observation>,
    pub discharges: Vec<FacilityDischarge>,
    pub topology: Vec<WatershedUnit>,
}

impl TableSet {
    pub fn load(data: &DataConfig) -> Result<Self> {
        Self::load_with_threshold(data, DEFAULT_FAILURE_THRESHOLD)
    }

    pub fn load_with_threshold(data: &DataConfig, failure_threshold: f64) -> Result<Self> {
        let observations =
            load_observations(Path::new(&data.observations), failure_threshold)?;
        let discharges = load_discharges(Path::new(&data.discharges), failure_threshold)?;
        let topology = load_topology(Path::new(&data.topology))?;
        info!(
            "Snapshot loaded: {} observations, {} discharge records, {} watershed units",
            observations.len(),
            discharges.len(),
            topology.len()
        );
        Ok(Self {
            observations,
            discharges,
            topology,
        })
    }
}

pub fn load_observations(path: &Path, failure_threshold: f64) -> Result<Vec<Observation>> {
    let (records, stats) = load_table(path, "observations", failure_threshold, validate_observation)?;
    info!(
        "Loaded observations from {}: {} accepted, {} rejected",
        path.display(),
        stats.accepted,
        stats.rejected
    );
    Ok(records)
}

pub fn load_discharges(path: &Path, failure_threshold: f64) -> Result<Vec<FacilityDischarge>> {
    let (records, stats) = load_table(path, "discharges", failure_threshold, validate_discharge)?;
    info!(
        "Loaded facility discharges from {}: {} accepted, {} rejected",
        path.display(),
        stats.accepted,
        stats.rejected
    );
    Ok(records)
}

/// Topology gets no failure budget: a silently dropped unit would leave
/// dangling drainage edges, so any bad record fails the whole load.
pub fn load_topology(path: &Path) -> Result<Vec<WatershedUnit>> {
    let raw = read_table(path, "topology")?;
    let mut units = Vec::with_capacity(raw.len());
    let mut seen: HashSet<String> = HashSet::new();
    for (i, value) in raw.into_iter().enumerate() {
        let unit: WatershedUnit = serde_json::from_value(value).map_err(|e| {
            AppError::Snapshot(format!("Topology record {} is malformed: {}", i, e))
        })?;
        if unit.unit_id.is_empty() {
            return Err(AppError::Snapshot(format!(
                "Topology record {} has an empty unit_id",
                i
            )));
        }
        if !unit.centroid_lat.is_finite() || !unit.centroid_lon.is_finite() {
            return Err(AppError::Snapshot(format!(
                "Topology unit '{}' has a non-finite centroid",
                unit.unit_id
            )));
        }
        if !seen.insert(unit.unit_id.clone()) {
            return Err(AppError::Snapshot(format!(
                "Duplicate unit_id '{}' in topology",
                unit.unit_id
            )));
        }
        units.push(unit);
    }
    info!("Loaded topology from {}: {} units", path.display(), units.len());
    Ok(units)
}

fn read_table(path: &Path, table: &str) -> Result<Vec<serde_json::Value>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        AppError::Snapshot(format!(
            "Failed to read {} table from {}: {}",
            table,
            path.display(),
            e
        ))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        AppError::Snapshot(format!("{} table is not a JSON array: {}", table, e))
    })
}

fn load_table<T, F>(
    path: &Path,
    table: &str,
    failure_threshold: f64,
    mut validate: F,
) -> Result<(Vec<T>, SnapshotStats)>
where
    T: DeserializeOwned,
    F: FnMut(&mut T) -> std::result::Result<(), String>,
{
    let raw = read_table(path, table)?;
    let mut stats = SnapshotStats::new(raw.len());
    let mut records = Vec::with_capacity(raw.len());

    for (i, value) in raw.into_iter().enumerate() {
        match serde_json::from_value::<T>(value) {
            Ok(mut record) => match validate(&mut record) {
                Ok(()) => {
                    records.push(record);
                    stats.accepted += 1;
                }
                Err(reason) => {
                    stats.rejected += 1;
                    warn!("Rejected {} record {}: {}", table, i, reason);
                }
            },
            Err(e) => {
                stats.rejected += 1;
                warn!("Failed to deserialize {} record {}: {}", table, i, e);
            }
        }
    }

    stats.finalize();

    if stats.exceeds_threshold(failure_threshold) {
        return Err(AppError::Snapshot(format!(
            "{} table failure rate {:.1}% exceeds threshold {:.1}%: {} rejected out of {} records",
            table,
            stats.failure_rate * 100.0,
            failure_threshold * 100.0,
            stats.rejected,
            stats.total_records
        )));
    }

    Ok((records, stats))
}

fn validate_observation(obs: &mut Observation) -> std::result::Result<(), String> {
    if obs.parameter_code.is_empty() {
        return Err("empty parameter_code".to_string());
    }
    if !(1..=12).contains(&obs.month) {
        return Err(format!("month {} out of valid range (1-12)", obs.month));
    }
    if !obs.value.is_finite() {
        return Err(format!("non-finite value {}", obs.value));
    }
    if !(-90.0..=90.0).contains(&obs.latitude) || !(-180.0..=180.0).contains(&obs.longitude) {
        return Err(format!(
            "coordinates ({}, {}) out of range",
            obs.latitude, obs.longitude
        ));
    }
    // Records arriving without a surrogate id fall back to the rounded
    // coordinate key; the precision is fixed so repeated loads agree.
    if obs.location_id.is_empty() {
        obs.location_id = join::coord_key(obs.latitude, obs.longitude);
    }
    Ok(())
}

fn validate_discharge(d: &mut FacilityDischarge) -> std::result::Result<(), String> {
    if d.facility_id.is_empty() {
        return Err("empty facility_id".to_string());
    }
    if d.watershed_unit_id.is_empty() {
        return Err("empty watershed_unit_id".to_string());
    }
    if d.parameter_code.is_empty() {
        return Err("empty parameter_code".to_string());
    }
    if !d.value.is_finite() || d.value < 0.0 {
        return Err(format!("invalid measurement value {}", d.value));
    }
    Ok(())
}
