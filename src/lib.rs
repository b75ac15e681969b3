//! Watershed nutrient load aggregation engine.
//!
//! A pure, stateless transform from reference tables (station
//! observations, facility discharge records, watershed topology) plus
//! query parameters to renderable result records: per-location
//! statistics for the station map and cumulative upstream loads for the
//! choropleth. All functions borrow immutable snapshots; the only shared
//! cache is the build-once flow graph.

pub mod aggregate;
pub mod color;
pub mod config;
pub mod error;
pub mod graph;
pub mod join;
pub mod loads;
pub mod model;
pub mod query;
pub mod tables;

pub use error::{AppError, Result};
