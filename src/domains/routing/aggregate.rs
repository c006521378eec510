use tracing::{debug, warn};

use crate::domains::routing::graph::RoadGraph;
use crate::domains::routing::types::{
    DiagnosticKind, EngineDiagnostic, EngineFailure, EngineOutcome, EngineResult, LatLon, NodeId,
    RenderedRoute,
};

/// Route colors, consumed cyclically, one per successful engine.
pub const PALETTE: [&str; 18] = [
    "red",
    "blue",
    "gray",
    "darkred",
    "lightred",
    "orange",
    "beige",
    "green",
    "darkgreen",
    "lightgreen",
    "darkblue",
    "lightblue",
    "purple",
    "darkpurple",
    "pink",
    "cadetblue",
    "lightgray",
    "black",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    pub routes: Vec<RenderedRoute>,
    pub diagnostics: Vec<EngineDiagnostic>,
}

/// Turn per-engine outcomes into drawable routes, in discovery order.
///
/// Failed, timed-out and malformed results go to `diagnostics` and do not advance the
/// palette, so a failing engine never shifts the colors of the engines after it.
pub fn aggregate(graph: &RoadGraph, outcomes: &[EngineOutcome]) -> Aggregation {
    let mut aggregation = Aggregation::default();
    let mut palette = PALETTE.iter().cycle();

    for outcome in outcomes {
        let engine = &outcome.engine.name;
        match &outcome.result {
            EngineResult::Success { path, diagnostics } => match locate(graph, path) {
                Ok(coordinates) => {
                    let color = palette.next().copied().unwrap_or(PALETTE[0]);
                    debug!(engine = %engine, points = coordinates.len(), color, "Route accepted");
                    aggregation.routes.push(RenderedRoute {
                        engine: engine.clone(),
                        coordinates,
                        color: color.to_string(),
                        notes: diagnostics.trim().to_string(),
                    });
                }
                Err(unknown) => {
                    warn!(engine = %engine, node = unknown, "Route references a node outside the graph");
                    aggregation.diagnostics.push(EngineDiagnostic {
                        engine: engine.clone(),
                        kind: DiagnosticKind::Protocol,
                        message: format!("returned node id {} which is not in the road graph", unknown),
                    });
                }
            },
            EngineResult::Failure(failure) => {
                let kind = match failure {
                    EngineFailure::Protocol(_) => DiagnosticKind::Protocol,
                    _ => DiagnosticKind::Failure,
                };
                aggregation.diagnostics.push(EngineDiagnostic {
                    engine: engine.clone(),
                    kind,
                    message: failure.to_string(),
                });
            }
            EngineResult::TimedOut => {
                aggregation.diagnostics.push(EngineDiagnostic {
                    engine: engine.clone(),
                    kind: DiagnosticKind::TimedOut,
                    message: format!("exceeded its time budget after {:.1}s", outcome.elapsed.as_secs_f64()),
                });
            }
        }
    }

    aggregation
}

/// Map node ids to positions; the first id missing from the graph is returned as the error.
fn locate(graph: &RoadGraph, path: &[NodeId]) -> Result<Vec<LatLon>, NodeId> {
    path.iter()
        .map(|id| graph.position(*id).ok_or(*id))
        .collect()
}
