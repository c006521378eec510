use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use routefan::adapters::outbound::FileGraphStore;
use routefan::application::{cache_key, GraphCache};
use routefan::domains::routing::{
    BoundingBox, GraphStore, LatLon, LocationResolver, ResolvedArea, RoadGraph,
};
use routefan::DomainError;

/// Resolver backed by a fixed table, counting network-graph fetches.
struct FakeResolver {
    fetches: AtomicUsize,
    fetch_delay: Duration,
}

impl FakeResolver {
    fn new(fetch_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            fetches: AtomicUsize::new(0),
            fetch_delay,
        })
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationResolver for FakeResolver {
    async fn geocode_to_area(&self, text: &str) -> routefan::DomainResult<ResolvedArea> {
        let id = match text {
            "Smallville" | "smallville, ks" => 42,
            "Metropolis" => 7,
            _ => {
                return Err(DomainError::NotFound {
                    query: text.to_string(),
                })
            }
        };
        Ok(ResolvedArea {
            identifier: format!("relation/{}", id),
            display_name: text.to_string(),
            bbox: BoundingBox {
                south: 0.0,
                west: 0.0,
                north: 1.0,
                east: 1.0,
            },
            centroid: LatLon { lat: 0.5, lon: 0.5 },
            boundary: None,
        })
    }

    async fn fetch_road_network(&self, _area: &ResolvedArea) -> routefan::DomainResult<RoadGraph> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.fetch_delay).await;
        let mut b = RoadGraph::builder();
        b.add_node(1, 0.1, 0.1)?;
        b.add_node(2, 0.2, 0.2)?;
        b.add_edge(1, 2)?;
        b.add_edge(2, 1)?;
        Ok(b.build())
    }
}

#[tokio::test]
async fn concurrent_resolves_fetch_once() {
    let dir = TempDir::new().unwrap();
    let resolver = FakeResolver::new(Duration::from_millis(50));
    let store = Arc::new(FileGraphStore::new(dir.path()));
    let cache = Arc::new(GraphCache::new(resolver.clone(), store.clone()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.resolve("Smallville").await })
        })
        .collect();

    let mut graphs = Vec::new();
    for handle in handles {
        let (area, graph) = handle.await.unwrap().unwrap();
        assert_eq!(area.identifier, "relation/42");
        graphs.push(graph);
    }

    assert_eq!(resolver.fetches(), 1);
    assert!(graphs.iter().all(|g| Arc::ptr_eq(g, &graphs[0])));
    assert!(store.path_for(&cache_key("relation/42")).exists());
}

#[tokio::test]
async fn persisted_graph_survives_a_new_cache() {
    let dir = TempDir::new().unwrap();
    let first = FakeResolver::new(Duration::ZERO);
    GraphCache::new(first.clone(), Arc::new(FileGraphStore::new(dir.path())))
        .resolve("Metropolis")
        .await
        .unwrap();

    let second = FakeResolver::new(Duration::ZERO);
    let (_, graph) = GraphCache::new(second.clone(), Arc::new(FileGraphStore::new(dir.path())))
        .resolve("Metropolis")
        .await
        .unwrap();

    assert_eq!(first.fetches(), 1);
    assert_eq!(second.fetches(), 0);
    assert_eq!(graph.edge_count(), 2);
}

#[tokio::test]
async fn corrupted_cache_file_is_refetched_and_replaced() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileGraphStore::new(dir.path()));
    let path = store.path_for(&cache_key("relation/7"));
    tokio::fs::write(&path, b"RGPH\x01garbage").await.unwrap();
    assert!(matches!(
        store.load(&cache_key("relation/7")).await,
        Err(DomainError::CacheCorruption { .. })
    ));

    let resolver = FakeResolver::new(Duration::ZERO);
    let cache = GraphCache::new(resolver.clone(), store.clone());
    let (_, graph) = cache.resolve("Metropolis").await.unwrap();

    assert_eq!(resolver.fetches(), 1);
    assert_eq!(graph.node_count(), 2);
    let reloaded = store.load(&cache_key("relation/7")).await.unwrap();
    assert_eq!(reloaded.map(|g| g.node_count()), Some(2));
}

#[tokio::test]
async fn unknown_place_is_not_found_and_blank_is_invalid() {
    let dir = TempDir::new().unwrap();
    let resolver = FakeResolver::new(Duration::ZERO);
    let cache = GraphCache::new(resolver.clone(), Arc::new(FileGraphStore::new(dir.path())));

    assert!(matches!(
        cache.resolve("Atlantis").await,
        Err(DomainError::NotFound { .. })
    ));
    assert!(matches!(
        cache.resolve("   ").await,
        Err(DomainError::InvalidInput { .. })
    ));
    assert_eq!(resolver.fetches(), 0);
}

#[tokio::test]
async fn missing_store_file_is_a_miss() {
    let dir = TempDir::new().unwrap();
    let store = FileGraphStore::new(dir.path().join("not-created-yet"));
    assert!(store.load("relation_1").await.unwrap().is_none());
}

#[tokio::test]
async fn dropped_graphs_are_released_and_reloaded_from_store() {
    let dir = TempDir::new().unwrap();
    let resolver = FakeResolver::new(Duration::ZERO);
    let cache = GraphCache::new(resolver.clone(), Arc::new(FileGraphStore::new(dir.path())));

    let (_, held) = cache.resolve("Smallville").await.unwrap();
    let (_, again) = cache.resolve("smallville, ks").await.unwrap();
    assert!(Arc::ptr_eq(&held, &again));

    let released = Arc::downgrade(&held);
    drop(held);
    drop(again);
    assert!(released.upgrade().is_none());

    let (_, reloaded) = cache.resolve("Smallville").await.unwrap();
    assert_eq!(reloaded.node_count(), 2);
    assert_eq!(resolver.fetches(), 1);
}
