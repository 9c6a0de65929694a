use geojson::{Feature, GeoJson, Geometry, Value};
use gpx_routes_lib::{metrics::RouteMetrics, track::Track};

const LEAFLET_CSS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";
const LEAFLET_JS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";
const TILE_URL: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";
const TILE_ATTRIBUTION: &str = "&copy; OpenStreetMap contributors";

/// Self-contained interactive map document: Leaflet over OSM tiles with the
/// track embedded as GeoJSON plus start/end markers. No server round-trips
/// besides the tile fetches, so the file can be stored and served as-is.
pub fn interactive_map_document(title: &str, track: &Track, metrics: &RouteMetrics) -> String {
    let route_geojson = track_geojson(track);
    let title = escape_html(title);

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<link rel="stylesheet" href="{LEAFLET_CSS}">
<script src="{LEAFLET_JS}"></script>
<style>html, body, #map {{ margin: 0; height: 100%; }}</style>
</head>
<body>
<div id="map"></div>
<script>
var map = L.map('map');
L.tileLayer('{TILE_URL}', {{ attribution: '{TILE_ATTRIBUTION}' }}).addTo(map);
var route = L.geoJSON({route_geojson}, {{
    style: {{ color: '#0d6efd', weight: 4, opacity: 0.8 }}
}}).addTo(map);
L.circleMarker([{start_lat}, {start_lon}], {{
    radius: 10, color: 'green', fillColor: 'lightgreen', fillOpacity: 0.9
}}).bindPopup('<b>Start</b>').addTo(map);
L.circleMarker([{end_lat}, {end_lon}], {{
    radius: 10, color: 'red', fillColor: 'lightcoral', fillOpacity: 0.9
}}).bindPopup('<b>End</b>').addTo(map);
map.fitBounds(route.getBounds(), {{ padding: [20, 20] }});
</script>
</body>
</html>
"#,
        start_lat = metrics.start_lat,
        start_lon = metrics.start_lon,
        end_lat = metrics.end_lat,
        end_lon = metrics.end_lon,
    )
}

fn track_geojson(track: &Track) -> String {
    let coordinates: Vec<Vec<f64>> = track
        .waypoints
        .iter()
        .map(|waypoint| vec![waypoint.longitude(), waypoint.latitude()])
        .collect();

    let feature = Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::LineString(coordinates))),
        id: None,
        properties: None,
        foreign_members: None,
    };

    GeoJson::Feature(feature).to_string()
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Point;
    use gpx_routes_lib::track::Waypoint;

    fn sample_track() -> Track {
        Track::new(
            Some("Harbor Loop".to_string()),
            vec![
                Waypoint::new(Point::new(9.0, 55.0), None, None),
                Waypoint::new(Point::new(9.01, 55.01), None, None),
            ],
        )
    }

    #[test]
    fn document_embeds_track_and_markers() {
        let track = sample_track();
        let metrics = RouteMetrics::from_track(&track).unwrap();
        let html = interactive_map_document("Harbor Loop", &track, &metrics);

        assert!(html.contains("leaflet"));
        assert!(html.contains("LineString"));
        assert!(html.contains("[9.0,55.0]"));
        assert!(html.contains("<b>Start</b>"));
        assert!(html.contains("<b>End</b>"));
        assert!(html.contains("fitBounds"));
    }

    #[test]
    fn titles_are_escaped() {
        let track = sample_track();
        let metrics = RouteMetrics::from_track(&track).unwrap();
        let html = interactive_map_document("Hills & <Valleys>", &track, &metrics);

        assert!(html.contains("<title>Hills &amp; &lt;Valleys&gt;</title>"));
    }
}
