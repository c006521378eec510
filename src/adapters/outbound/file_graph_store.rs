use async_trait::async_trait;
use chrono::{DateTime, Utc};
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::common::{DomainError, DomainResult};
use crate::domains::routing::{GraphStore, RoadGraph, RoadNode};

pub const GRAPH_MAGIC: &[u8; 4] = b"RGPH";
pub const GRAPH_FORMAT_VERSION: u8 = 1;

/// Metadata written ahead of the bincode payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphFileHeader {
    pub key: String,
    pub node_count: usize,
    pub edge_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Stores graphs as `<dir>/<key>.graph`:
/// magic, version byte, little-endian `u32` header length, JSON header, bincode petgraph.
pub struct FileGraphStore {
    base: PathBuf,
}

impl FileGraphStore {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self { base: base.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.base.join(format!("{}.graph", key))
    }
}

#[async_trait]
impl GraphStore for FileGraphStore {
    async fn load(&self, key: &str) -> DomainResult<Option<RoadGraph>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            // unreadable counts as corrupt so the cache can refetch
            Err(e) => return Err(DomainError::corruption(key, e)),
        };

        let key_owned = key.to_string();
        let graph = tokio::task::spawn_blocking(move || decode_graph_file(&key_owned, &bytes))
            .await
            .map_err(|e| DomainError::corruption(key, format!("decode task failed: {}", e)))??;
        debug!(key, path = %path.display(), "Graph file decoded");
        Ok(Some(graph))
    }

    async fn save(&self, key: &str, graph: &RoadGraph) -> DomainResult<()> {
        tokio::fs::create_dir_all(&self.base).await?;

        let header = GraphFileHeader {
            key: key.to_string(),
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
            created_at: Utc::now(),
        };
        // spawn_blocking needs an owned graph
        let petgraph = graph.as_petgraph().clone();
        let bytes = tokio::task::spawn_blocking(move || encode_graph_file(&header, &petgraph))
            .await
            .map_err(|e| DomainError::Fetch(format!("encode task failed: {}", e)))??;

        let path = self.path_for(key);
        write_atomically(&self.base, &path, &bytes).await?;
        debug!(key, path = %path.display(), bytes = bytes.len(), "Graph file written");
        Ok(())
    }
}

pub fn encode_graph_file(header: &GraphFileHeader, graph: &DiGraph<RoadNode, ()>) -> DomainResult<Vec<u8>> {
    let header_bytes = serde_json::to_vec(header)?;
    let payload = bincode::serialize(graph)
        .map_err(|e| DomainError::invalid_input(format!("graph encoding failed: {}", e)))?;

    let mut out = Vec::with_capacity(4 + 1 + 4 + header_bytes.len() + payload.len());
    out.extend_from_slice(GRAPH_MAGIC);
    out.push(GRAPH_FORMAT_VERSION);
    out.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&payload);
    Ok(out)
}

pub fn decode_graph_file(key: &str, bytes: &[u8]) -> DomainResult<RoadGraph> {
    if bytes.len() < 9 || &bytes[..4] != GRAPH_MAGIC {
        return Err(DomainError::corruption(key, "missing graph file magic"));
    }
    if bytes[4] != GRAPH_FORMAT_VERSION {
        return Err(DomainError::corruption(key, format!("unsupported format version {}", bytes[4])));
    }
    let header_len = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]) as usize;
    let header_end = 9usize
        .checked_add(header_len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| DomainError::corruption(key, "truncated header"))?;

    let header: GraphFileHeader = serde_json::from_slice(&bytes[9..header_end])
        .map_err(|e| DomainError::corruption(key, format!("bad header: {}", e)))?;
    let petgraph: DiGraph<RoadNode, ()> = bincode::deserialize(&bytes[header_end..])
        .map_err(|e| DomainError::corruption(key, format!("bad payload: {}", e)))?;

    if petgraph.node_count() != header.node_count || petgraph.edge_count() != header.edge_count {
        return Err(DomainError::corruption(key, "payload does not match header counts"));
    }
    RoadGraph::from_petgraph(petgraph).map_err(|e| DomainError::corruption(key, e))
}

/// Write to a uniquely named sibling and rename over the target.
async fn write_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> DomainResult<()> {
    let staging = dir.join(format!(".{}.tmp", Uuid::new_v4()));
    if let Err(e) = tokio::fs::write(&staging, bytes).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(e.into());
    }
    if let Err(e) = tokio::fs::rename(&staging, target).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(e.into());
    }
    Ok(())
}
