use async_trait::async_trait;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::AssetCache;
use crate::common::DomainResult;
use crate::config::RenderingConfig;
use crate::domains::routing::{MapRenderer, Marker, RenderedRoute, ResolvedArea};

pub const ROUTE_WEIGHT: u32 = 5;

/// Writes a standalone Leaflet page per render, with library assets served from the local mirror.
pub struct HtmlMapRenderer {
    assets: Arc<AssetCache>,
    output_dir: PathBuf,
    stylesheets: Vec<String>,
    scripts: Vec<String>,
}

impl HtmlMapRenderer {
    pub fn new(assets: Arc<AssetCache>, config: &RenderingConfig) -> Self {
        Self {
            assets,
            output_dir: config.output_dir.clone(),
            stylesheets: config.stylesheets.clone(),
            scripts: config.scripts.clone(),
        }
    }

    /// Local `file://` reference for `url`, or the URL itself if it cannot be mirrored.
    async fn local_reference(&self, url: &str) -> String {
        match self.assets.localize(url).await {
            Ok(asset) => match tokio::fs::canonicalize(&asset.path).await {
                Ok(abs) => format!("file://{}", abs.display()),
                Err(_) => asset.path.display().to_string(),
            },
            Err(e) => {
                warn!(url, error = %e, "Asset not mirrored, referencing it remotely");
                url.to_string()
            }
        }
    }
}

#[async_trait]
impl MapRenderer for HtmlMapRenderer {
    async fn render(
        &self,
        name: &str,
        area: &ResolvedArea,
        markers: &[Marker],
        routes: &[RenderedRoute],
    ) -> DomainResult<PathBuf> {
        let mut head = String::new();
        for url in &self.stylesheets {
            head.push_str(&format!(
                "<link rel=\"stylesheet\" href=\"{}\"/>\n",
                self.local_reference(url).await
            ));
        }
        for url in &self.scripts {
            head.push_str(&format!(
                "<script src=\"{}\"></script>\n",
                self.local_reference(url).await
            ));
        }

        let collection = feature_collection(area, markers, routes);
        let page = html_page(&head, area, &serde_json::to_string(&collection)?);

        let path = self.output_dir.join(format!("{}.html", name));
        write_page(&self.output_dir, &path, &page).await?;
        info!(path = %path.display(), routes = routes.len(), "Map written");
        Ok(path)
    }
}

async fn write_page(dir: &Path, path: &Path, page: &str) -> DomainResult<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(path, page).await?;
    Ok(())
}

fn properties(value: serde_json::Value) -> Option<JsonObject> {
    match value {
        serde_json::Value::Object(map) => Some(map),
        _ => None,
    }
}

fn feature(geometry: Option<Geometry>, props: serde_json::Value) -> Feature {
    Feature {
        bbox: None,
        geometry,
        id: None,
        properties: properties(props),
        foreign_members: None,
    }
}

/// The area outline, the markers, and one line per route.
///
/// A route with no coordinates keeps its feature with a null geometry so the
/// legend still lists the engine. A one-node route is drawn as a point.
pub fn feature_collection(
    area: &ResolvedArea,
    markers: &[Marker],
    routes: &[RenderedRoute],
) -> FeatureCollection {
    let mut features = Vec::with_capacity(1 + markers.len() + routes.len());

    if let Some(boundary) = &area.boundary {
        features.push(feature(
            Some(boundary.clone()),
            json!({ "kind": "area", "name": area.display_name, "identifier": area.identifier }),
        ));
    }

    for marker in markers {
        let point = Value::Point(vec![marker.position.lon, marker.position.lat]);
        features.push(feature(
            Some(Geometry::new(point)),
            json!({ "kind": "marker", "label": marker.label }),
        ));
    }

    for route in routes {
        let geometry = match route.coordinates.as_slice() {
            [] => None,
            [only] => Some(Geometry::new(Value::Point(vec![only.lon, only.lat]))),
            coords => {
                let line = coords.iter().map(|p| vec![p.lon, p.lat]).collect();
                Some(Geometry::new(Value::LineString(line)))
            }
        };
        features.push(feature(
            geometry,
            json!({
                "kind": "route",
                "engine": route.engine,
                "color": route.color,
                "weight": ROUTE_WEIGHT,
                "notes": route.notes,
            }),
        ));
    }

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn html_page(head: &str, area: &ResolvedArea, features_json: &str) -> String {
    // keep "</script>" inside the data from closing the element
    let data = features_json.replace("</", "<\\/");
    let title = area
        .display_name
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8"/>
<title>{title}</title>
{head}<style>html, body, #map {{ height: 100%; margin: 0; }}</style>
</head>
<body>
<div id="map"></div>
<script>
var map = L.map('map');
map.fitBounds([[{south}, {west}], [{north}, {east}]]);
L.tileLayer('https://{{s}}.tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png', {{
  attribution: '&copy; OpenStreetMap contributors'
}}).addTo(map);
var data = {data};
L.geoJSON(data, {{
  style: function (f) {{
    if (f.properties.kind === 'route') {{
      return {{ color: f.properties.color, weight: f.properties.weight }};
    }}
    return {{ color: '#3388ff', weight: 2, fillOpacity: 0.05 }};
  }},
  onEachFeature: function (f, layer) {{
    if (f.properties.kind === 'route') {{ layer.bindTooltip(f.properties.engine); }}
    if (f.properties.kind === 'marker') {{ layer.bindTooltip(f.properties.label); }}
  }}
}}).addTo(map);
map.on('click', function (e) {{
  L.popup().setLatLng(e.latlng)
    .setContent(e.latlng.lng.toFixed(7) + ',' + e.latlng.lat.toFixed(7))
    .openOn(map);
}});
</script>
</body>
</html>
"#,
        title = title,
        head = head,
        south = area.bbox.south,
        west = area.bbox.west,
        north = area.bbox.north,
        east = area.bbox.east,
        data = data,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::routing::{BoundingBox, LatLon};

    fn area() -> ResolvedArea {
        ResolvedArea {
            identifier: "relation/1".to_string(),
            display_name: "Town <A>".to_string(),
            bbox: BoundingBox {
                south: 0.0,
                west: 0.0,
                north: 1.0,
                east: 1.0,
            },
            centroid: LatLon { lat: 0.5, lon: 0.5 },
            boundary: None,
        }
    }

    fn route(engine: &str, coords: Vec<LatLon>) -> RenderedRoute {
        RenderedRoute {
            engine: engine.to_string(),
            coordinates: coords,
            color: "red".to_string(),
            notes: String::new(),
        }
    }

    #[test]
    fn routes_become_lon_lat_lines() {
        let routes = vec![route(
            "astar",
            vec![LatLon { lat: 0.1, lon: 0.2 }, LatLon { lat: 0.3, lon: 0.4 }],
        )];
        let fc = feature_collection(&area(), &[], &routes);
        assert_eq!(fc.features.len(), 1);
        let geometry = fc.features[0].geometry.as_ref().unwrap();
        assert_eq!(geometry.value, Value::LineString(vec![vec![0.2, 0.1], vec![0.4, 0.3]]));
        let props = fc.features[0].properties.as_ref().unwrap();
        assert_eq!(props["engine"], "astar");
        assert_eq!(props["weight"], 5);
    }

    #[test]
    fn empty_route_keeps_feature_without_geometry() {
        let markers = [Marker {
            label: "Source".to_string(),
            position: LatLon { lat: 0.1, lon: 0.1 },
        }];
        let fc = feature_collection(&area(), &markers, &[route("none", vec![])]);
        assert_eq!(fc.features.len(), 2);
        assert!(fc.features[1].geometry.is_none());
    }

    #[test]
    fn single_node_route_is_a_point() {
        let fc = feature_collection(&area(), &[], &[route("stay", vec![LatLon { lat: 0.5, lon: 0.6 }])]);
        let geometry = fc.features[0].geometry.as_ref().unwrap();
        assert_eq!(geometry.value, Value::Point(vec![0.6, 0.5]));
        assert_eq!(fc.features[0].properties.as_ref().unwrap()["kind"], "route");
    }

    #[test]
    fn page_escapes_title_and_script_data() {
        let page = html_page("", &area(), r#"{"x":"</script>"}"#);
        assert!(page.contains("<title>Town &lt;A&gt;</title>"));
        assert!(!page.contains("\"</script>\""));
    }
}
