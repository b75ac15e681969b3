use basinload::config::Config;
use basinload::graph::FlowGraph;
use basinload::query::{self, ChoroplethRecord, LoadQuery, StationQuery, StationQueryResult};
use basinload::tables::TableSet;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Serialize)]
struct EngineOutput {
    station: StationQueryResult,
    choropleth: Vec<ChoroplethRecord>,
}

fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing; results go to stdout, logs to stderr
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,basinload=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Watershed load engine starting...");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/config.yaml".to_string());
    let config = Config::load(&config_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to load configuration from {}: {}\n\n\
             Make sure the config file exists and any ${{VAR}} references \
             are set in the environment (or a .env file).",
            config_path,
            e
        )
    })?;
    info!("Configuration loaded from {}", config_path);

    let tables = TableSet::load_with_threshold(&config.data, config.snapshot.failure_threshold)?;

    // Topology errors are fatal here, at load time, not per query
    let graph = FlowGraph::build(&tables.topology)?;
    info!("Flow graph built: {} units", graph.len());

    let station = query::run_station_query(
        &tables,
        &StationQuery {
            parameter_code: config.station_query.parameter.clone(),
            aggregation: config.station_query.aggregation.clone(),
            year: config.station_query.year,
            month: config.station_query.month,
            watershed_unit_id: config.station_query.watershed_unit.clone(),
        },
    )?;

    let choropleth = query::run_load_query(
        &tables,
        &graph,
        &LoadQuery {
            parameter_code: config.load_query.parameter.clone(),
            metric: config.load_query.metric.clone(),
            year: config.load_query.year,
            month: config.load_query.month,
        },
    )?;

    let output = EngineOutput {
        station,
        choropleth,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    info!("Engine run complete");
    Ok(())
}
