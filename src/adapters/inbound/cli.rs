use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::adapters::outbound::{
    feature_collection, init_combined_logger, FileGraphStore, HtmlMapRenderer, HttpAssetFetcher,
    OsmResolver, ProcessEngine,
};
use crate::application::{
    run_benchmark, AssetCache, Dispatcher, GraphCache, QueryOutcome, QueryRequest, RouteReport,
    RoutingService,
};
use crate::common::{ApplicationResult, DomainError};
use crate::config::Config;
use crate::domains::routing::{
    EngineInvoker, EngineOutcome, EngineRegistry, EngineResult, LatLon, MapRenderer,
};

#[derive(Debug, Parser)]
#[command(name = "routefan")]
#[command(about = "Run every installed routing engine on the same query and compare the routes", long_about = None)]
pub struct Cli {
    /// Configuration file (default: ./routefan.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve a place and, given both points, route between them with every engine
    Route {
        /// Free-text place name, e.g. "Berlin, Germany"
        place: String,

        /// Source point as LON,LAT
        #[arg(long, value_parser = parse_lon_lat, allow_hyphen_values = true)]
        source: Option<LatLon>,

        /// Destination point as LON,LAT
        #[arg(long, value_parser = parse_lon_lat, allow_hyphen_values = true)]
        destination: Option<LatLon>,

        /// Time budget in seconds passed to every engine
        #[arg(long)]
        budget: Option<u64>,

        /// Print the result as a GeoJSON FeatureCollection instead of writing a map
        #[arg(long)]
        geojson: bool,
    },
    /// List engines found in the engine directory
    Engines,
    /// Replay a recorded engine input with a random source and destination
    Benchmark {
        /// File in the engine input format
        template: PathBuf,

        /// Seed for picking the node pair
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}

/// Parse `LON,LAT` in decimal degrees.
pub fn parse_lon_lat(s: &str) -> Result<LatLon, String> {
    let (lon, lat) = s
        .split_once(',')
        .ok_or_else(|| format!("expected LON,LAT, got {:?}", s))?;
    let lon: f64 = lon.trim().parse().map_err(|_| format!("bad longitude {:?}", lon))?;
    let lat: f64 = lat.trim().parse().map_err(|_| format!("bad latitude {:?}", lat))?;
    if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
        return Err(format!("coordinate out of range: {},{}", lon, lat));
    }
    Ok(LatLon { lat, lon })
}

/// Execute one command against the loaded configuration.
pub async fn execute(command: Command, config: Config) -> ApplicationResult<()> {
    match command {
        Command::ShowConfig => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        Command::Engines => {
            let registry = EngineRegistry::new(&config.engines.directory);
            let engines = registry.discover().await?;
            if engines.is_empty() {
                println!("no engines in {}", config.engines.directory.display());
            }
            for engine in engines {
                println!("{}\t{}", engine.name, engine.path.display());
            }
            Ok(())
        }
        Command::Benchmark { template, seed } => benchmark(&config, template, seed).await,
        Command::Route {
            place,
            source,
            destination,
            budget,
            geojson,
        } => {
            let request = QueryRequest {
                place,
                source,
                destination,
                time_budget: budget.map(Duration::from_secs),
            };
            route(&config, request, geojson).await
        }
    }
}

async fn route(config: &Config, request: QueryRequest, as_geojson: bool) -> ApplicationResult<()> {
    let logger = init_combined_logger(config.logging.domain_log_file.as_deref());
    let resolver = Arc::new(OsmResolver::new(&config.geocoder)?);
    let store = Arc::new(FileGraphStore::new(&config.cache.graph_dir));
    let service = RoutingService::new(
        Arc::new(GraphCache::new(resolver, store)),
        EngineRegistry::new(&config.engines.directory),
        Dispatcher::new().with_kill_grace(config.engines.kill_grace()),
        config.engines.time_budget(),
        logger,
    );

    let outcome = service.query(&request).await?;

    if as_geojson {
        let collection = match &outcome {
            QueryOutcome::Area(area) => feature_collection(area, &[], &[]),
            QueryOutcome::Routes(report) => {
                feature_collection(&report.area, &report.markers, &report.routes)
            }
        };
        let text = serde_json::to_string_pretty(&collection).map_err(DomainError::from)?;
        println!("{}", text);
        if let QueryOutcome::Routes(report) = &outcome {
            print_summary(report, true);
        }
        return Ok(());
    }

    let fetcher = Arc::new(HttpAssetFetcher::new(
        &config.geocoder.user_agent,
        config.geocoder.request_timeout(),
    )?);
    let assets = Arc::new(AssetCache::new(&config.cache.asset_dir, fetcher));
    let renderer = HtmlMapRenderer::new(assets, &config.rendering);

    match outcome {
        QueryOutcome::Area(area) => {
            let name = format!("selection-{}", Uuid::new_v4());
            let path = renderer.render(&name, &area, &[], &[]).await?;
            println!("{} ({})", area.display_name, area.identifier);
            println!("map: {}", path.display());
            println!("click the map to read a point, then pass --source and --destination as LON,LAT");
        }
        QueryOutcome::Routes(report) => {
            let name = format!("routes-{}", report.request_id);
            let path = renderer
                .render(&name, &report.area, &report.markers, &report.routes)
                .await?;
            print_summary(&report, false);
            println!("map: {}", path.display());
        }
    }
    Ok(())
}

/// Per-engine lines; on stderr when stdout carries machine-readable output.
fn print_summary(report: &RouteReport, to_stderr: bool) {
    let mut lines = Vec::new();
    for outcome in &report.outcomes {
        lines.push(outcome_line(outcome));
    }
    for route in &report.routes {
        if !route.notes.is_empty() {
            lines.push(format!("extra info from {}:\n{}", route.engine, route.notes));
        }
    }
    for line in lines {
        if to_stderr {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }
}

fn outcome_line(outcome: &EngineOutcome) -> String {
    let status = match &outcome.result {
        EngineResult::Success { path, .. } if path.is_empty() => "no route".to_string(),
        EngineResult::Success { path, .. } => format!("{} nodes", path.len()),
        EngineResult::Failure(failure) => failure.to_string(),
        EngineResult::TimedOut => "timed out".to_string(),
    };
    format!(
        "{:<20} {:>9.3}s  {}",
        outcome.engine.name,
        outcome.elapsed.as_secs_f64(),
        status
    )
}

async fn benchmark(config: &Config, template: PathBuf, seed: Option<u64>) -> ApplicationResult<()> {
    let text = tokio::fs::read_to_string(&template)
        .await
        .map_err(DomainError::from)?;
    let engines: Vec<Arc<dyn EngineInvoker>> = EngineRegistry::new(&config.engines.directory)
        .discover()
        .await?
        .into_iter()
        .map(|descriptor| Arc::new(ProcessEngine::new(descriptor)) as Arc<dyn EngineInvoker>)
        .collect();
    let dispatcher = Dispatcher::new().with_kill_grace(config.engines.kill_grace());
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let report = run_benchmark(
        &text,
        engines,
        &dispatcher,
        config.engines.time_budget(),
        &mut rng,
    )
    .await?;

    println!(
        "{} nodes, {} edges, {} -> {}",
        report.node_count, report.edge_count, report.source, report.destination
    );
    for outcome in &report.outcomes {
        println!("{}", outcome_line(outcome));
    }
    for diagnostic in &report.aggregation.diagnostics {
        eprintln!("{}: {}", diagnostic.engine, diagnostic.message);
    }
    Ok(())
}
