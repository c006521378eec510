use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::adapters::outbound::ProcessEngine;
use crate::application::{Dispatcher, GraphCache};
use crate::common::{DomainError, DomainResult};
use crate::domains::routing::{
    aggregate, encode_query, EngineDescriptor, EngineDiagnostic, EngineInvoker, EngineOutcome,
    EngineRegistry, LatLon, Marker, NodeId, RenderedRoute, ResolvedArea, RouteQuery,
};
use crate::domains::DynLogger;

/// One user request: a place and, optionally, the two picked points as (lon, lat).
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub place: String,
    pub source: Option<LatLon>,
    pub destination: Option<LatLon>,
    pub time_budget: Option<Duration>,
}

#[derive(Debug, Clone)]
pub enum QueryOutcome {
    /// No points supplied yet: only the area is known, for point selection.
    Area(Arc<ResolvedArea>),
    Routes(RouteReport),
}

#[derive(Debug, Clone)]
pub struct RouteReport {
    pub request_id: Uuid,
    pub area: Arc<ResolvedArea>,
    pub source: NodeId,
    pub destination: NodeId,
    pub degenerate: bool,
    pub markers: Vec<Marker>,
    pub routes: Vec<RenderedRoute>,
    pub diagnostics: Vec<EngineDiagnostic>,
    pub outcomes: Vec<EngineOutcome>,
}

/// Creates the invoker for a discovered engine; the local process backend by default.
pub type InvokerFactory = Arc<dyn Fn(EngineDescriptor) -> Arc<dyn EngineInvoker> + Send + Sync>;

pub struct RoutingService {
    graph_cache: Arc<GraphCache>,
    registry: EngineRegistry,
    dispatcher: Dispatcher,
    invoker_factory: InvokerFactory,
    default_budget: Duration,
    logger: DynLogger,
}

impl RoutingService {
    pub fn new(
        graph_cache: Arc<GraphCache>,
        registry: EngineRegistry,
        dispatcher: Dispatcher,
        default_budget: Duration,
        logger: DynLogger,
    ) -> Self {
        Self {
            graph_cache,
            registry,
            dispatcher,
            invoker_factory: Arc::new(|descriptor: EngineDescriptor| {
                Arc::new(ProcessEngine::new(descriptor)) as Arc<dyn EngineInvoker>
            }),
            default_budget,
            logger,
        }
    }

    pub fn with_invoker_factory(mut self, factory: InvokerFactory) -> Self {
        self.invoker_factory = factory;
        self
    }

    pub async fn query(&self, request: &QueryRequest) -> DomainResult<QueryOutcome> {
        let (area, graph) = self.graph_cache.resolve(&request.place).await?;
        self.logger.info(&format!(
            "Resolved '{}' to {} ({} nodes, {} edges)",
            request.place,
            area.identifier,
            graph.node_count(),
            graph.edge_count()
        ));

        let (source_point, destination_point) = match (request.source, request.destination) {
            (Some(s), Some(d)) => (s, d),
            (None, None) => return Ok(QueryOutcome::Area(area)),
            _ => {
                return Err(DomainError::invalid_input(
                    "source and destination must be given together",
                ))
            }
        };

        for (label, point) in [("Source", source_point), ("Destination", destination_point)] {
            if !area.bbox.contains(point) {
                self.logger.warn(&format!(
                    "{} ({}, {}) lies outside {}; snapping to the nearest road node",
                    label, point.lon, point.lat, area.display_name
                ));
            }
        }

        let source = graph
            .nearest_node(source_point.lon, source_point.lat)
            .ok_or_else(|| DomainError::invalid_input("road graph has no nodes"))?;
        let destination = graph
            .nearest_node(destination_point.lon, destination_point.lat)
            .ok_or_else(|| DomainError::invalid_input("road graph has no nodes"))?;

        let budget = request.time_budget.unwrap_or(self.default_budget);
        let query = RouteQuery::new(graph, source, destination, budget)?;
        let mut report = self.run_query(area, &query).await?;
        report.markers = vec![
            Marker {
                label: "Source".to_string(),
                position: source_point,
            },
            Marker {
                label: "Destination".to_string(),
                position: destination_point,
            },
        ];
        Ok(QueryOutcome::Routes(report))
    }

    /// Encode once, fan out to every engine currently installed, and aggregate.
    pub async fn run_query(&self, area: Arc<ResolvedArea>, query: &RouteQuery) -> DomainResult<RouteReport> {
        let request_id = Uuid::new_v4();
        if query.is_degenerate() {
            self.logger.warn(&format!(
                "[{}] Source and destination are the same node ({})",
                request_id, query.source
            ));
        }

        let encoded = encode_query(query);
        let engines: Vec<Arc<dyn EngineInvoker>> = self
            .registry
            .discover()
            .await?
            .into_iter()
            .map(|descriptor| (self.invoker_factory)(descriptor))
            .collect();
        info!(%request_id, source = query.source, destination = query.destination, engines = engines.len(), "Routing request");

        let outcomes = self.dispatcher.run(&encoded, engines, query.time_budget).await;
        let aggregation = aggregate(&query.graph, &outcomes);

        for route in &aggregation.routes {
            self.logger.info(&format!(
                "[{}] {}: {} points ({})",
                request_id,
                route.engine,
                route.coordinates.len(),
                route.color
            ));
        }
        for diagnostic in &aggregation.diagnostics {
            self.logger.error(&format!(
                "[{}] {}: {}",
                request_id, diagnostic.engine, diagnostic.message
            ));
        }

        Ok(RouteReport {
            request_id,
            area,
            source: query.source,
            destination: query.destination,
            degenerate: query.is_degenerate(),
            markers: Vec::new(),
            routes: aggregation.routes,
            diagnostics: aggregation.diagnostics,
            outcomes,
        })
    }
}

