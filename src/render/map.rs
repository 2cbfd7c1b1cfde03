use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::core::config::MapConfig;
use crate::error::{map_io_err, PadResult};
use crate::geo::GeoTable;
use super::caption;

const LEAFLET_VERSION: &str = "1.9.4";

/// Renders geometry results as a standalone Leaflet page
#[derive(Debug, Clone)]
pub struct MapRenderer {
    center_lat: f64,
    center_lon: f64,
    zoom: u8,
    output: PathBuf,
}

impl MapRenderer {
    pub fn new(config: &MapConfig) -> Self {
        Self {
            center_lat: config.center_lat,
            center_lon: config.center_lon,
            zoom: config.zoom,
            output: config.output.clone(),
        }
    }

    /// The features of `geo` as a GeoJSON FeatureCollection string
    pub fn geojson(&self, geo: &GeoTable) -> PadResult<String> {
        Ok(serde_json::to_string_pretty(&geo.to_feature_collection())?)
    }

    /// HTML page showing every feature of `geo` over an OpenStreetMap base layer
    pub fn to_html(&self, geo: &GeoTable) -> PadResult<String> {
        let data = serde_json::to_string(&geo.to_feature_collection())?;
        // keep property text from closing the script element
        let data = data.replace("</", "<\\/");

        Ok(format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="generator" content="padchat {version}">
<meta name="created" content="{created}">
<title>padchat: {count} features</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@{leaflet}/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@{leaflet}/dist/leaflet.js"></script>
<style>
html, body, #map {{ height: 100%; margin: 0; }}
.caption {{ background: white; padding: 4px 8px; font: 14px sans-serif; }}
</style>
</head>
<body>
<div id="map"></div>
<script>
const data = {data};
const map = L.map('map').setView([{lat}, {lon}], {zoom});
L.tileLayer('https://tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png', {{
  maxZoom: 19,
  attribution: '&copy; OpenStreetMap contributors'
}}).addTo(map);
const layer = L.geoJSON(data, {{
  onEachFeature: (feature, l) => {{
    const rows = Object.entries(feature.properties || {{}})
      .map(([k, v]) => `<b>${{k}}</b>: ${{v}}`);
    if (rows.length) l.bindPopup(rows.join('<br>'));
  }}
}}).addTo(map);
if (layer.getLayers().length) map.fitBounds(layer.getBounds());
const caption = L.control({{ position: 'bottomleft' }});
caption.onAdd = () => {{
  const div = L.DomUtil.create('div', 'caption');
  div.textContent = '{caption}';
  return div;
}};
caption.addTo(map);
</script>
</body>
</html>
"#,
            version = crate::version(),
            created = Local::now().format("%Y-%m-%d %H:%M:%S"),
            caption = caption(geo),
            count = geo.feature_count(),
            leaflet = LEAFLET_VERSION,
            data = data,
            lat = self.center_lat,
            lon = self.center_lon,
            zoom = self.zoom,
        ))
    }

    /// Write the map page to the configured output path
    pub fn write(&self, geo: &GeoTable) -> PadResult<&Path> {
        let html = self.to_html(geo)?;
        if let Some(parent) = self.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(map_io_err(parent))?;
        }
        fs::write(&self.output, html).map_err(map_io_err(&self.output))?;

        info!("Wrote map with {} features to {}", geo.feature_count(), self.output.display());
        Ok(&self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::testing::square;
    use crate::sql::testing::point_wkb;
    use crate::sql::{QueryResult, Scalar};
    use tempfile::tempdir;

    fn sample() -> GeoTable {
        let result = QueryResult {
            columns: vec!["manager_name".to_string(), "geometry".to_string()],
            rows: vec![
                vec![
                    Scalar::Text("Forest </script> Service".to_string()),
                    Scalar::Blob(point_wkb(-105.0, 40.0)),
                ],
                vec![
                    Scalar::Text("BLM".to_string()),
                    Scalar::Blob(square(0.0, 0.0, 1.0)),
                ],
            ],
            row_count: 2,
            truncated: false,
        };
        GeoTable::decode(result, 1).unwrap()
    }

    #[test]
    fn test_html_embeds_features() {
        let renderer = MapRenderer::new(&MapConfig::default());
        let html = renderer.to_html(&sample()).unwrap();

        assert!(html.contains("setView([35, -100], 4)"));
        assert!(html.contains("\"FeatureCollection\""));
        assert!(html.contains("\"Polygon\""));
        assert!(html.contains("Forest <\\/script> Service"));
        assert_eq!(html.matches("</script>").count(), 2);
    }

    #[test]
    fn test_geojson_properties() {
        let renderer = MapRenderer::new(&MapConfig::default());
        let json: serde_json::Value =
            serde_json::from_str(&renderer.geojson(&sample()).unwrap()).unwrap();

        let features = json["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[1]["properties"]["manager_name"], "BLM");
        assert!(features[0]["properties"].get("geometry").is_none());
        assert_eq!(features[0]["geometry"]["coordinates"][0], -105.0);
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let config = MapConfig {
            output: dir.path().join("out").join("map.html"),
            ..Default::default()
        };
        let renderer = MapRenderer::new(&config);

        let written = renderer.write(&sample()).unwrap().to_path_buf();
        assert_eq!(written, config.output);
        let html = std::fs::read_to_string(&written).unwrap();
        assert!(html.contains("padchat: 2 features"));
        assert!(html.contains("matching features: 2"));
    }
}
