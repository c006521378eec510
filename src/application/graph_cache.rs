use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::common::{DomainError, DomainResult};
use crate::domains::routing::{GraphStore, LocationResolver, ResolvedArea, RoadGraph};

/// Resolves place names to road graphs, fetching and persisting on a miss.
///
/// A single mutex covers geocoding, the store lookup and the fetch-and-persist step, so
/// concurrent requests never download or write the same graph twice. Resolved graphs are
/// handed out read-only as `Arc`s and remembered weakly: a graph stays shared while some
/// caller holds it, and is reloaded from the store once every holder has dropped it.
pub struct GraphCache {
    resolver: Arc<dyn LocationResolver>,
    store: Arc<dyn GraphStore>,
    resolved: Mutex<HashMap<String, Weak<RoadGraph>>>,
}

impl GraphCache {
    pub fn new(resolver: Arc<dyn LocationResolver>, store: Arc<dyn GraphStore>) -> Self {
        Self {
            resolver,
            store,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub async fn resolve(&self, location: &str) -> DomainResult<(Arc<ResolvedArea>, Arc<RoadGraph>)> {
        let location = location.trim();
        if location.is_empty() {
            return Err(DomainError::invalid_input("location must not be empty"));
        }

        let mut resolved = self.resolved.lock().await;

        let area = Arc::new(self.resolver.geocode_to_area(location).await?);
        let key = cache_key(&area.identifier);
        debug!(location, area = %area.identifier, key = %key, "Location geocoded");

        if let Some(graph) = resolved.get(&key).and_then(Weak::upgrade) {
            debug!(key = %key, "Graph served from memory");
            return Ok((area, graph));
        }
        resolved.retain(|_, graph| graph.strong_count() > 0);

        match self.store.load(&key).await {
            Ok(Some(graph)) => {
                info!(key = %key, nodes = graph.node_count(), edges = graph.edge_count(), "Graph loaded from cache");
                let graph = Arc::new(graph);
                resolved.insert(key, Arc::downgrade(&graph));
                return Ok((area, graph));
            }
            Ok(None) => debug!(key = %key, "Graph cache miss"),
            Err(e @ DomainError::CacheCorruption { .. }) => {
                warn!(key = %key, error = %e, "Discarding unreadable cached graph");
            }
            Err(e) => return Err(e),
        }

        let graph = self.resolver.fetch_road_network(&area).await?;
        info!(
            key = %key,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Road network fetched"
        );
        if let Err(e) = self.store.save(&key, &graph).await {
            warn!(key = %key, error = %e, "Failed to persist road graph");
        }

        let graph = Arc::new(graph);
        resolved.insert(key, Arc::downgrade(&graph));
        Ok((area, graph))
    }
}

/// File-system safe key derived from a gazetteer identifier.
pub fn cache_key(identifier: &str) -> String {
    identifier
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
