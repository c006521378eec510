use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Instant;

use crate::common::DomainResult;
use crate::domains::routing::graph::RoadGraph;
use crate::domains::routing::types::{EngineDescriptor, Marker, RenderedRoute, ResolvedArea};

/// Port for turning place names into areas and areas into road networks
/// (Nominatim/Overpass in production, in-memory fakes in tests).
#[async_trait]
pub trait LocationResolver: Send + Sync {
    /// `NotFound` when nothing matches the text.
    async fn geocode_to_area(&self, text: &str) -> DomainResult<ResolvedArea>;
    /// `Fetch` when the network graph cannot be obtained.
    async fn fetch_road_network(&self, area: &ResolvedArea) -> DomainResult<RoadGraph>;
}

/// Port for persisting road graphs under a cache key.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// `Ok(None)` on a miss, `CacheCorruption` when stored bytes cannot be read back.
    async fn load(&self, key: &str) -> DomainResult<Option<RoadGraph>>;
    async fn save(&self, key: &str, graph: &RoadGraph) -> DomainResult<()>;
}

/// What an engine produced before its output is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEngineOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    /// The deadline passed; the backend has already released the invocation's resources.
    TimedOut,
    Launch(String),
}

/// One execution backend for one engine (local process today, remote worker later).
#[async_trait]
pub trait EngineInvoker: Send + Sync {
    fn descriptor(&self) -> &EngineDescriptor;

    /// Feed `input` to the engine and collect its output, giving up at `deadline`.
    async fn invoke(&self, input: Arc<[u8]>, deadline: Instant) -> Result<RawEngineOutput, InvocationError>;
}

/// Port for downloading external resources referenced by rendered maps.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// `Download` error on transport failure or non-2xx status.
    async fn fetch(&self, url: &str) -> DomainResult<Vec<u8>>;
}

/// Presentation collaborator. Returns the location of the rendered map.
#[async_trait]
pub trait MapRenderer: Send + Sync {
    async fn render(
        &self,
        name: &str,
        area: &ResolvedArea,
        markers: &[Marker],
        routes: &[RenderedRoute],
    ) -> DomainResult<PathBuf>;
}
