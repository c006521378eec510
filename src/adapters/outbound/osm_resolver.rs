use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::common::{DomainError, DomainResult};
use crate::config::GeocoderConfig;
use crate::domains::routing::{
    BoundingBox, LatLon, LocationResolver, NodeId, ResolvedArea, RoadGraph,
};

const DRIVABLE_HIGHWAYS: &str = "motorway|trunk|primary|secondary|tertiary|unclassified|residential|\
living_street|service|motorway_link|trunk_link|primary_link|secondary_link|tertiary_link";

/// Resolves places with Nominatim and downloads their drivable network from Overpass.
pub struct OsmResolver {
    client: reqwest::Client,
    nominatim_url: String,
    overpass_url: String,
}

impl OsmResolver {
    pub fn new(config: &GeocoderConfig) -> DomainResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| DomainError::Fetch(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            nominatim_url: config.nominatim_url.clone(),
            overpass_url: config.overpass_url.clone(),
        })
    }

    async fn get_bytes(&self, request: reqwest::RequestBuilder, what: &str) -> DomainResult<Vec<u8>> {
        let response = request.send().await.map_err(|e| {
            warn!(error = %e, is_timeout = e.is_timeout(), "{} request failed", what);
            DomainError::Fetch(format!("{} request failed: {}", what, e))
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(DomainError::Fetch(format!("{} returned HTTP {}", what, status)));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| DomainError::Fetch(format!("reading {} response: {}", what, e)))?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl LocationResolver for OsmResolver {
    async fn geocode_to_area(&self, text: &str) -> DomainResult<ResolvedArea> {
        let request = self.client.get(&self.nominatim_url).query(&[
            ("q", text),
            ("format", "jsonv2"),
            ("polygon_geojson", "1"),
            ("limit", "1"),
        ]);
        let body = self.get_bytes(request, "Nominatim").await?;
        let area = area_from_nominatim(text, &body)?;
        info!(query = text, identifier = %area.identifier, "Place geocoded");
        Ok(area)
    }

    async fn fetch_road_network(&self, area: &ResolvedArea) -> DomainResult<RoadGraph> {
        let query = overpass_query(&area.bbox);
        debug!(identifier = %area.identifier, "Requesting road network from Overpass");
        let request = self.client.get(&self.overpass_url).query(&[("data", query.as_str())]);
        let body = self.get_bytes(request, "Overpass").await?;

        let graph = tokio::task::spawn_blocking(move || graph_from_overpass(&body))
            .await
            .map_err(|e| DomainError::Fetch(format!("graph conversion task failed: {}", e)))??;
        info!(
            identifier = %area.identifier,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Road network downloaded"
        );
        Ok(graph)
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    osm_type: String,
    osm_id: i64,
    lat: String,
    lon: String,
    display_name: String,
    /// `[south, north, west, east]` as strings.
    boundingbox: Vec<String>,
    #[serde(default)]
    geojson: Option<geojson::Geometry>,
}

impl NominatimPlace {
    fn into_area(self) -> DomainResult<ResolvedArea> {
        let num = |s: &str, what: &str| {
            s.parse::<f64>()
                .map_err(|_| DomainError::Fetch(format!("Nominatim returned a bad {}: {:?}", what, s)))
        };
        let bbox = match self.boundingbox.as_slice() {
            [south, north, west, east] => BoundingBox {
                south: num(south, "bounding box")?,
                north: num(north, "bounding box")?,
                west: num(west, "bounding box")?,
                east: num(east, "bounding box")?,
            },
            other => {
                return Err(DomainError::Fetch(format!(
                    "Nominatim bounding box has {} fields",
                    other.len()
                )))
            }
        };
        Ok(ResolvedArea {
            identifier: format!("{}/{}", self.osm_type, self.osm_id),
            display_name: self.display_name,
            bbox,
            centroid: LatLon {
                lat: num(&self.lat, "latitude")?,
                lon: num(&self.lon, "longitude")?,
            },
            boundary: self.geojson,
        })
    }
}

/// Parse a Nominatim `jsonv2` search response into the first matching area.
pub fn area_from_nominatim(query: &str, body: &[u8]) -> DomainResult<ResolvedArea> {
    let places: Vec<NominatimPlace> = serde_json::from_slice(body)
        .map_err(|e| DomainError::Fetch(format!("unexpected Nominatim response: {}", e)))?;
    places
        .into_iter()
        .next()
        .ok_or_else(|| DomainError::NotFound {
            query: query.to_string(),
        })?
        .into_area()
}

pub fn overpass_query(bbox: &BoundingBox) -> String {
    format!(
        "[out:json][timeout:180];\
         (way[\"highway\"~\"^({})$\"][\"area\"!~\"yes\"]({},{},{},{}););\
         (._;>;);out body;",
        DRIVABLE_HIGHWAYS, bbox.south, bbox.west, bbox.north, bbox.east
    )
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum OverpassElement {
    Node {
        id: NodeId,
        lat: f64,
        lon: f64,
    },
    Way {
        id: i64,
        nodes: Vec<NodeId>,
        #[serde(default)]
        tags: HashMap<String, String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Both,
    Forward,
    Backward,
}

fn direction(tags: &HashMap<String, String>) -> Direction {
    match tags.get("oneway").map(String::as_str) {
        Some("yes") | Some("true") | Some("1") => Direction::Forward,
        Some("-1") | Some("reverse") => Direction::Backward,
        Some(_) => Direction::Both,
        None if tags.get("junction").map(String::as_str) == Some("roundabout") => Direction::Forward,
        None => Direction::Both,
    }
}

/// Build a directed road graph from an Overpass `out body` JSON document.
///
/// Consecutive way nodes become edges; two-way roads get both directions.
/// Pairs touching a node the response did not include are skipped.
pub fn graph_from_overpass(body: &[u8]) -> DomainResult<RoadGraph> {
    let response: OverpassResponse = serde_json::from_slice(body)
        .map_err(|e| DomainError::Fetch(format!("unexpected Overpass response: {}", e)))?;

    let mut nodes = Vec::new();
    let mut ways = Vec::new();
    for element in response.elements {
        match element {
            OverpassElement::Node { id, lat, lon } => nodes.push((id, lon, lat)),
            OverpassElement::Way { id, nodes: refs, tags } => ways.push((id, refs, direction(&tags))),
            OverpassElement::Other => {}
        }
    }
    if ways.is_empty() {
        return Err(DomainError::Fetch("no drivable ways in the area".to_string()));
    }

    let mut builder = RoadGraph::builder();
    for (id, lon, lat) in nodes {
        if !builder.contains(id) {
            builder.add_node(id, lon, lat)?;
        }
    }

    let mut skipped = 0usize;
    for (way_id, refs, dir) in ways {
        for pair in refs.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if !builder.contains(a) || !builder.contains(b) {
                skipped += 1;
                continue;
            }
            match dir {
                Direction::Forward => builder.add_edge(a, b)?,
                Direction::Backward => builder.add_edge(b, a)?,
                Direction::Both => {
                    builder.add_edge(a, b)?;
                    builder.add_edge(b, a)?;
                }
            }
        }
        if refs.len() < 2 {
            debug!(way_id, "Ignoring way with fewer than two nodes");
        }
    }
    if skipped > 0 {
        warn!(skipped, "Skipped way segments referencing missing nodes");
    }
    Ok(builder.build())
}
