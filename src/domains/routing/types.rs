use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// OpenStreetMap node identifier.
pub type NodeId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    pub fn contains(&self, point: LatLon) -> bool {
        point.lat >= self.south
            && point.lat <= self.north
            && point.lon >= self.west
            && point.lon <= self.east
    }
}

/// Geocoded place. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedArea {
    /// Stable gazetteer identifier, e.g. `relation/62422`.
    pub identifier: String,
    pub display_name: String,
    pub bbox: BoundingBox,
    pub centroid: LatLon,
    pub boundary: Option<geojson::Geometry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineDescriptor {
    /// Display name, also used as the route tooltip.
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineResult {
    /// An empty path is a valid "no route found" answer.
    Success { path: Vec<NodeId>, diagnostics: String },
    Failure(EngineFailure),
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineFailure {
    Exit { code: Option<i32>, diagnostics: String },
    Protocol(String),
    Launch(String),
}

impl std::fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineFailure::Exit { code: Some(code), diagnostics } if !diagnostics.is_empty() => {
                write!(f, "exited with status {}: {}", code, diagnostics)
            }
            EngineFailure::Exit { code: Some(code), .. } => write!(f, "exited with status {}", code),
            EngineFailure::Exit { code: None, .. } => write!(f, "terminated by signal"),
            EngineFailure::Protocol(reason) => write!(f, "malformed output: {}", reason),
            EngineFailure::Launch(reason) => write!(f, "could not be launched: {}", reason),
        }
    }
}

/// One engine's answer for one request, in discovery order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOutcome {
    pub engine: EngineDescriptor,
    pub result: EngineResult,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedRoute {
    pub engine: String,
    pub coordinates: Vec<LatLon>,
    pub color: String,
    /// Informational text the engine wrote to stderr on success.
    pub notes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    Failure,
    TimedOut,
    Protocol,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineDiagnostic {
    pub engine: String,
    pub kind: DiagnosticKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAsset {
    pub url: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub label: String,
    pub position: LatLon,
}
