use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::application::Dispatcher;
use crate::common::{DomainError, DomainResult};
use crate::domains::routing::{
    aggregate, decode_query, encode_query, Aggregation, EngineInvoker, EngineOutcome, NodeId,
    RouteQuery,
};

#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    pub source: NodeId,
    pub destination: NodeId,
    pub node_count: usize,
    pub edge_count: usize,
    pub outcomes: Vec<EngineOutcome>,
    pub aggregation: Aggregation,
}

/// Replay a recorded engine input with a random source/destination pair.
///
/// `fallback_budget` applies when the template header carries no time budget.
pub async fn run_benchmark<R: Rng>(
    template: &str,
    engines: Vec<Arc<dyn EngineInvoker>>,
    dispatcher: &Dispatcher,
    fallback_budget: Duration,
    rng: &mut R,
) -> DomainResult<BenchmarkReport> {
    let (header, graph) = decode_query(template)?;
    let ids: Vec<NodeId> = graph.nodes().map(|n| n.id).collect();
    let picked: Vec<NodeId> = ids.choose_multiple(rng, 2).copied().collect();
    let (source, destination) = match picked.as_slice() {
        [s, d] => (*s, *d),
        _ => {
            return Err(DomainError::invalid_input(
                "benchmark template needs at least two nodes",
            ))
        }
    };

    let budget = header.time_budget.unwrap_or(fallback_budget);
    let graph = Arc::new(graph);
    let query = RouteQuery::new(Arc::clone(&graph), source, destination, budget)?;
    info!(
        source,
        destination,
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "Benchmark query prepared"
    );

    let outcomes = dispatcher.run(&encode_query(&query), engines, budget).await;
    let aggregation = aggregate(&graph, &outcomes);

    Ok(BenchmarkReport {
        source,
        destination,
        node_count: graph.node_count(),
        edge_count: graph.edge_count(),
        outcomes,
        aggregation,
    })
}
