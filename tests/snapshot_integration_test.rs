use basinload::config::{Config, DataConfig};
use basinload::graph::FlowGraph;
use basinload::tables::TableSet;
use basinload::AppError;
use std::path::Path;

fn write_file(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("write fixture");
    path.to_string_lossy().into_owned()
}

fn data_config(dir: &Path, observations: &str, discharges: &str, topology: &str) -> DataConfig {
    DataConfig {
        observations: write_file(dir, "observations.json", observations),
        discharges: write_file(dir, "discharges.json", discharges),
        topology: write_file(dir, "topology.json", topology),
    }
}

const OBSERVATIONS: &str = r#"[
  {"location_id": "L1", "latitude": 39.0, "longitude": -76.0,
   "watershed_unit_id": "A", "parameter_code": "TN", "value": 5.0,
   "year": 2015, "month": 1, "day": 15, "time": "12:00"},
  {"latitude": 39.5, "longitude": -76.5,
   "watershed_unit_id": "B", "parameter_code": "TN", "value": 2.0,
   "year": 2015, "month": 1, "day": 16, "time": "09:30"}
]"#;

const DISCHARGES: &str = r#"[
  {"facility_id": "F1", "location": "39.1,-76.2", "watershed_unit_id": "A",
   "parameter_code": "TN", "value": 2.0, "units": "mg/L", "date": "2015-01-10"},
  {"facility_id": "F1", "location": "39.1,-76.2", "watershed_unit_id": "A",
   "parameter_code": "FLOW", "value": 10.0, "units": "MGD", "date": "2015-01-10"}
]"#;

const TOPOLOGY: &str = r#"[
  {"unit_id": "A", "downstream_unit_id": "B",
   "geometry": [[-76.0, 39.0], [-76.0, 39.1], [-75.9, 39.1], [-76.0, 39.0]],
   "centroid_lat": 39.05, "centroid_lon": -75.95},
  {"unit_id": "B",
   "geometry": [[-76.5, 39.4], [-76.5, 39.6], [-76.4, 39.6], [-76.5, 39.4]],
   "centroid_lat": 39.5, "centroid_lon": -76.45}
]"#;

#[test]
fn test_snapshot_loads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let data = data_config(dir.path(), OBSERVATIONS, DISCHARGES, TOPOLOGY);

    let tables = TableSet::load(&data).expect("snapshot load failed");
    assert_eq!(tables.observations.len(), 2);
    assert_eq!(tables.discharges.len(), 2);
    assert_eq!(tables.topology.len(), 2);

    // record without a surrogate id got the rounded-coordinate key
    assert_eq!(tables.observations[1].location_id, "39.5000,-76.5000");

    // the loaded topology builds a graph straight away
    let graph = FlowGraph::build(&tables.topology).unwrap();
    assert_eq!(graph.downstream_of("A"), Some("B"));
}

#[test]
fn test_rejected_records_are_skipped_below_threshold() {
    let observations = r#"[
      {"location_id": "L1", "latitude": 39.0, "longitude": -76.0,
       "watershed_unit_id": "A", "parameter_code": "TN", "value": 5.0,
       "year": 2015, "month": 1, "day": 15, "time": "12:00"},
      {"location_id": "L2", "latitude": 39.0, "longitude": -76.0,
       "watershed_unit_id": "A", "parameter_code": "TN", "value": 5.0,
       "year": 2015, "month": 13, "day": 15, "time": "12:00"}
    ]"#;
    let dir = tempfile::tempdir().unwrap();
    let data = data_config(dir.path(), observations, DISCHARGES, TOPOLOGY);

    // 1 of 2 rejected exceeds the default 10% threshold...
    assert!(matches!(
        TableSet::load(&data),
        Err(AppError::Snapshot(_))
    ));

    // ...but a permissive threshold keeps the valid record
    let tables = TableSet::load_with_threshold(&data, 0.5).unwrap();
    assert_eq!(tables.observations.len(), 1);
}

#[test]
fn test_duplicate_topology_unit_fails_load() {
    let topology = r#"[
      {"unit_id": "A", "geometry": [[-76.0, 39.0]], "centroid_lat": 39.0, "centroid_lon": -76.0},
      {"unit_id": "A", "geometry": [[-76.0, 39.0]], "centroid_lat": 39.0, "centroid_lon": -76.0}
    ]"#;
    let dir = tempfile::tempdir().unwrap();
    let data = data_config(dir.path(), OBSERVATIONS, DISCHARGES, topology);

    match TableSet::load(&data) {
        Err(AppError::Snapshot(msg)) => assert!(msg.contains("Duplicate")),
        other => panic!("expected Snapshot error, got {:?}", other),
    }
}

#[test]
fn test_malformed_topology_record_fails_load() {
    let topology = r#"[
      {"unit_id": "A", "geometry": [[-76.0, 39.0]], "centroid_lat": 39.0, "centroid_lon": -76.0},
      {"unit_id": "B", "centroid_lat": 39.0}
    ]"#;
    let dir = tempfile::tempdir().unwrap();
    let data = data_config(dir.path(), OBSERVATIONS, DISCHARGES, topology);
    assert!(matches!(TableSet::load(&data), Err(AppError::Snapshot(_))));
}

#[test]
fn test_missing_table_file_is_a_snapshot_error() {
    let dir = tempfile::tempdir().unwrap();
    let data = DataConfig {
        observations: dir
            .path()
            .join("does_not_exist.json")
            .to_string_lossy()
            .into_owned(),
        discharges: write_file(dir.path(), "discharges.json", DISCHARGES),
        topology: write_file(dir.path(), "topology.json", TOPOLOGY),
    };
    assert!(matches!(TableSet::load(&data), Err(AppError::Snapshot(_))));
}

#[test]
fn test_config_loads_with_env_expansion() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var(
        "BASINLOAD_IT_DATA_DIR",
        dir.path().to_string_lossy().into_owned(),
    );
    let config_yaml = r#"
data:
  observations: ${BASINLOAD_IT_DATA_DIR}/observations.json
  discharges: ${BASINLOAD_IT_DATA_DIR}/discharges.json
  topology: ${BASINLOAD_IT_DATA_DIR}/topology.json
station_query:
  parameter: TN
  aggregation: median
  year: 2015
  month: 1
load_query:
  parameter: TN
  year: 2015
  month: 1
"#;
    let config_path = write_file(dir.path(), "config.yaml", config_yaml);
    write_file(dir.path(), "observations.json", OBSERVATIONS);
    write_file(dir.path(), "discharges.json", DISCHARGES);
    write_file(dir.path(), "topology.json", TOPOLOGY);

    let config = Config::load(&config_path).expect("config load failed");
    assert!(config.data.observations.ends_with("observations.json"));
    assert!(!config.data.observations.contains("${"));

    let tables = TableSet::load(&config.data).expect("snapshot load failed");
    assert_eq!(tables.topology.len(), 2);
}

#[test]
fn test_config_with_bad_operator_fails_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let config_yaml = r#"
data:
  observations: o.json
  discharges: d.json
  topology: t.json
station_query:
  parameter: TN
  aggregation: variance
  year: 2015
  month: 1
load_query:
  parameter: TN
  year: 2015
"#;
    let config_path = write_file(dir.path(), "config.yaml", config_yaml);
    assert!(Config::load(&config_path).is_err());
}
