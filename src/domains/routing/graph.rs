use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::common::{DomainError, DomainResult};
use crate::domains::routing::types::{LatLon, NodeId};

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoadNode {
    pub id: NodeId,
    pub lon: f64,
    pub lat: f64,
}

impl RoadNode {
    pub fn position(&self) -> LatLon {
        LatLon {
            lat: self.lat,
            lon: self.lon,
        }
    }
}

/// Directed road multigraph keyed by OSM node id.
///
/// Only [`RoadGraphBuilder`] and [`RoadGraph::from_petgraph`] construct one, and there is
/// no mutating API, so a graph can be shared behind an `Arc` by any number of readers.
/// Node and edge iteration follow insertion order.
#[derive(Debug, Clone)]
pub struct RoadGraph {
    graph: DiGraph<RoadNode, ()>,
    index: HashMap<NodeId, NodeIndex>,
}

impl RoadGraph {
    pub fn builder() -> RoadGraphBuilder {
        RoadGraphBuilder::default()
    }

    /// Adopt a deserialized petgraph, rebuilding the id index. Duplicate node ids are rejected.
    pub fn from_petgraph(graph: DiGraph<RoadNode, ()>) -> DomainResult<Self> {
        let mut index = HashMap::with_capacity(graph.node_count());
        for idx in graph.node_indices() {
            let id = graph[idx].id;
            if index.insert(id, idx).is_some() {
                return Err(DomainError::invalid_input(format!("duplicate node id {}", id)));
            }
        }
        Ok(Self { graph, index })
    }

    pub fn as_petgraph(&self) -> &DiGraph<RoadNode, ()> {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&RoadNode> {
        self.index.get(&id).map(|idx| &self.graph[*idx])
    }

    pub fn position(&self, id: NodeId) -> Option<LatLon> {
        self.node(id).map(RoadNode::position)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &RoadNode> + '_ {
        self.graph.node_weights()
    }

    /// One `(u, v)` pair per edge, parallel edges included.
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.graph
            .edge_references()
            .map(move |e| (self.graph[e.source()].id, self.graph[e.target()].id))
    }

    /// Node closest to the given point by great-circle distance.
    pub fn nearest_node(&self, lon: f64, lat: f64) -> Option<NodeId> {
        self.nodes()
            .map(|n| (n.id, haversine_km(lon, lat, n.lon, n.lat)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }
}

#[derive(Debug, Default)]
pub struct RoadGraphBuilder {
    graph: DiGraph<RoadNode, ()>,
    index: HashMap<NodeId, NodeIndex>,
}

impl RoadGraphBuilder {
    pub fn with_capacity(nodes: usize, edges: usize) -> Self {
        Self {
            graph: DiGraph::with_capacity(nodes, edges),
            index: HashMap::with_capacity(nodes),
        }
    }

    pub fn add_node(&mut self, id: NodeId, lon: f64, lat: f64) -> DomainResult<()> {
        if self.index.contains_key(&id) {
            return Err(DomainError::invalid_input(format!("duplicate node id {}", id)));
        }
        let idx = self.graph.add_node(RoadNode { id, lon, lat });
        self.index.insert(id, idx);
        Ok(())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    /// Add a directed edge. Both endpoints must already be present; parallel edges are kept.
    pub fn add_edge(&mut self, u: NodeId, v: NodeId) -> DomainResult<()> {
        match (self.index.get(&u), self.index.get(&v)) {
            (Some(a), Some(b)) => {
                self.graph.add_edge(*a, *b, ());
                Ok(())
            }
            (None, _) => Err(DomainError::invalid_input(format!("edge endpoint {} is not a node", u))),
            (_, None) => Err(DomainError::invalid_input(format!("edge endpoint {} is not a node", v))),
        }
    }

    pub fn build(self) -> RoadGraph {
        RoadGraph {
            graph: self.graph,
            index: self.index,
        }
    }
}

/// Query against one graph: validated endpoints plus the per-engine time budget.
#[derive(Debug, Clone)]
pub struct RouteQuery {
    pub graph: Arc<RoadGraph>,
    pub source: NodeId,
    pub destination: NodeId,
    pub time_budget: Duration,
}

impl RouteQuery {
    pub fn new(
        graph: Arc<RoadGraph>,
        source: NodeId,
        destination: NodeId,
        time_budget: Duration,
    ) -> DomainResult<Self> {
        for (role, id) in [("source", source), ("destination", destination)] {
            if !graph.contains(id) {
                return Err(DomainError::invalid_input(format!(
                    "{} node {} is not in the road graph",
                    role, id
                )));
            }
        }
        Ok(Self {
            graph,
            source,
            destination,
            time_budget,
        })
    }

    /// Source and destination coincide. Still a valid query.
    pub fn is_degenerate(&self) -> bool {
        self.source == self.destination
    }
}

pub fn haversine_km(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let dlon = (lon2 - lon1).to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_graph() -> RoadGraph {
        let mut b = RoadGraph::builder();
        for i in 0..5 {
            b.add_node(i, 13.0 + i as f64 * 0.01, 52.0).unwrap();
        }
        for i in 0..4 {
            b.add_edge(i, i + 1).unwrap();
        }
        b.build()
    }

    #[test]
    fn parallel_edges_are_kept() {
        let mut b = RoadGraph::builder();
        b.add_node(1, 0.0, 0.0).unwrap();
        b.add_node(2, 1.0, 0.0).unwrap();
        b.add_edge(1, 2).unwrap();
        b.add_edge(1, 2).unwrap();
        let g = b.build();
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.edges().collect::<Vec<_>>(), vec![(1, 2), (1, 2)]);
    }

    #[test]
    fn edge_to_unknown_node_is_rejected() {
        let mut b = RoadGraph::builder();
        b.add_node(1, 0.0, 0.0).unwrap();
        assert!(matches!(b.add_edge(1, 9), Err(DomainError::InvalidInput { .. })));
    }

    #[test]
    fn duplicate_node_is_rejected() {
        let mut b = RoadGraph::builder();
        b.add_node(1, 0.0, 0.0).unwrap();
        assert!(b.add_node(1, 1.0, 1.0).is_err());
    }

    #[test]
    fn nearest_node_picks_closest() {
        let g = line_graph();
        assert_eq!(g.nearest_node(13.021, 52.0001), Some(2));
        assert_eq!(RoadGraph::builder().build().nearest_node(0.0, 0.0), None);
    }

    #[test]
    fn haversine_one_degree_of_latitude() {
        let d = haversine_km(0.0, 0.0, 0.0, 1.0);
        assert!((d - 111.19).abs() < 0.01, "got {}", d);
    }

    #[test]
    fn route_query_validates_endpoints() {
        let g = Arc::new(line_graph());
        assert!(RouteQuery::new(g.clone(), 0, 4, Duration::from_secs(1)).is_ok());
        assert!(RouteQuery::new(g.clone(), 0, 42, Duration::from_secs(1)).is_err());

        let same = RouteQuery::new(g, 3, 3, Duration::from_secs(1)).unwrap();
        assert!(same.is_degenerate());
    }
}
