use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use gpx_routes_lib::{
    metrics::RouteMetrics,
    track::{Track, Waypoint},
};
use plotters::prelude::*;

pub const THUMBNAIL_WIDTH: u32 = 800;
pub const THUMBNAIL_HEIGHT: u32 = 200;

const ROUTE_COLOR: RGBColor = RGBColor(13, 110, 253);
const BACKGROUND_COLOR: RGBColor = RGBColor(227, 242, 253);
const START_COLOR: RGBColor = RGBColor(40, 167, 69);
const END_COLOR: RGBColor = RGBColor(220, 53, 69);

// Longest path accepted in a static-map query before downsampling.
const MAX_PATH_POINTS: usize = 100;
// Responses smaller than this are tile-less error pages, not maps.
const MIN_IMAGE_BYTES: usize = 5000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const ATTEMPTS: u32 = 3;
const BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub enum RenderError {
    Backend(String),
    Io(String),
}

/// Thumbnail rendering capability. One implementation is picked at startup;
/// the polyline renderer stays available as the degraded path when the
/// richer backend fails at render time.
#[async_trait]
pub trait Renderer: Send + Sync {
    fn style(&self) -> &'static str;

    async fn render_thumbnail(
        &self,
        track: &Track,
        metrics: &RouteMetrics,
        out: &Path,
    ) -> Result<(), RenderError>;
}

/// Pick the thumbnail backend once, based on what the environment offers: a
/// configured and reachable static-map service, or the offline polyline
/// renderer.
pub async fn select_renderer(static_map_url: Option<String>) -> Box<dyn Renderer> {
    match static_map_url {
        Some(base_url) => match StaticMapRenderer::probe(base_url).await {
            Ok(renderer) => {
                tracing::info!("Using static-map rendering backend");
                Box::new(renderer)
            }
            Err(err) => {
                tracing::warn!("Static-map backend unavailable ({err:?}), using polyline renderer");
                Box::new(PolylineRenderer)
            }
        },
        None => {
            tracing::info!("No static-map service configured, using polyline renderer");
            Box::new(PolylineRenderer)
        }
    }
}

/// Fetches a basemap image with the route path baked in from a static-map
/// HTTP service.
pub struct StaticMapRenderer {
    client: reqwest::Client,
    base_url: String,
}

impl StaticMapRenderer {
    pub async fn probe(base_url: String) -> Result<Self, RenderError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| RenderError::Backend(format!("{err}")))?;

        // Reachability only; the service may well reject a parameterless
        // request with a client error.
        client
            .get(&base_url)
            .send()
            .await
            .map_err(|err| RenderError::Backend(format!("probe failed: {err}")))?;

        Ok(Self { client, base_url })
    }

    fn query(track: &Track, metrics: &RouteMetrics) -> Vec<(String, String)> {
        let path = sample_waypoints(track, MAX_PATH_POINTS)
            .map(|waypoint| format!("{:.5},{:.5}", waypoint.latitude(), waypoint.longitude()))
            .collect::<Vec<_>>()
            .join("|");

        vec![
            (
                "size".to_string(),
                format!("{THUMBNAIL_WIDTH}x{THUMBNAIL_HEIGHT}"),
            ),
            ("path".to_string(), format!("color:0d6efd|weight:4|{path}")),
            (
                "markers".to_string(),
                format!(
                    "{:.5},{:.5},green|{:.5},{:.5},red",
                    metrics.start_lat, metrics.start_lon, metrics.end_lat, metrics.end_lon
                ),
            ),
        ]
    }
}

#[async_trait]
impl Renderer for StaticMapRenderer {
    fn style(&self) -> &'static str {
        "static-map"
    }

    async fn render_thumbnail(
        &self,
        track: &Track,
        metrics: &RouteMetrics,
        out: &Path,
    ) -> Result<(), RenderError> {
        let query = Self::query(track, metrics);
        let mut last_error = String::new();

        for attempt in 0..ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(BACKOFF * 2u32.pow(attempt - 1)).await;
            }

            let response = match self.client.get(&self.base_url).query(&query).send().await {
                Ok(response) if response.status().is_success() => response,
                Ok(response) => {
                    last_error = format!("service returned {}", response.status());
                    continue;
                }
                Err(err) => {
                    last_error = format!("{err}");
                    continue;
                }
            };

            let bytes = match response.bytes().await {
                Ok(bytes) => bytes,
                Err(err) => {
                    last_error = format!("{err}");
                    continue;
                }
            };

            if bytes.len() < MIN_IMAGE_BYTES {
                last_error = format!("response too small to be a map ({} bytes)", bytes.len());
                continue;
            }

            return tokio::fs::write(out, &bytes)
                .await
                .map_err(|err| RenderError::Io(format!("{err}")));
        }

        Err(RenderError::Backend(last_error))
    }
}

/// Offline fallback: route line with start/end markers on a plain
/// background, no basemap.
pub struct PolylineRenderer;

#[async_trait]
impl Renderer for PolylineRenderer {
    fn style(&self) -> &'static str {
        "polyline"
    }

    async fn render_thumbnail(
        &self,
        track: &Track,
        _metrics: &RouteMetrics,
        out: &Path,
    ) -> Result<(), RenderError> {
        let pixels = project_waypoints(track, THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT);
        let (Some(first), Some(last)) = (pixels.first().copied(), pixels.last().copied()) else {
            return Err(RenderError::Backend("no waypoints to draw".to_string()));
        };

        let root =
            BitMapBackend::new(out, (THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT)).into_drawing_area();

        root.fill(&BACKGROUND_COLOR)
            .map_err(|err| RenderError::Backend(format!("{err}")))?;

        root.draw(&PathElement::new(pixels, ROUTE_COLOR.stroke_width(3)))
            .map_err(|err| RenderError::Backend(format!("{err}")))?;

        for (center, color) in [(first, START_COLOR), (last, END_COLOR)] {
            root.draw(&Circle::new(center, 9, WHITE.filled()))
                .map_err(|err| RenderError::Backend(format!("{err}")))?;
            root.draw(&Circle::new(center, 7, color.filled()))
                .map_err(|err| RenderError::Backend(format!("{err}")))?;
        }

        root.present()
            .map_err(|err| RenderError::Io(format!("{err}")))
    }
}

/// Neutral image served for routes where every rendering backend failed.
pub fn render_placeholder(out: &Path) -> Result<(), RenderError> {
    let root = BitMapBackend::new(out, (THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT)).into_drawing_area();

    root.fill(&BACKGROUND_COLOR)
        .map_err(|err| RenderError::Backend(format!("{err}")))?;
    root.present()
        .map_err(|err| RenderError::Io(format!("{err}")))
}

/// Even-stride downsampling, always keeping the first and last point.
fn sample_waypoints(track: &Track, max_points: usize) -> impl Iterator<Item = &'_ Waypoint> {
    let len = track.len();
    let stride = len.div_ceil(max_points).max(1);

    track
        .waypoints
        .iter()
        .enumerate()
        .filter(move |(index, _)| index % stride == 0 || *index == len - 1)
        .map(|(_, waypoint)| waypoint)
}

/// Map coordinates onto the thumbnail canvas, preserving aspect ratio and
/// leaving a small margin. Degenerate extents (single point) collapse to
/// the canvas center.
fn project_waypoints(track: &Track, width: u32, height: u32) -> Vec<(i32, i32)> {
    if track.is_empty() {
        return Vec::new();
    }

    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lon = f64::MAX;
    let mut max_lon = f64::MIN;

    for waypoint in &track.waypoints {
        min_lat = min_lat.min(waypoint.latitude());
        max_lat = max_lat.max(waypoint.latitude());
        min_lon = min_lon.min(waypoint.longitude());
        max_lon = max_lon.max(waypoint.longitude());
    }

    let lat_span = (max_lat - min_lat).max(1e-6);
    let lon_span = (max_lon - min_lon).max(1e-6);

    let usable_width = width as f64 * 0.9;
    let usable_height = height as f64 * 0.9;
    let scale = (usable_width / lon_span).min(usable_height / lat_span);

    let center_lat = (min_lat + max_lat) / 2.0;
    let center_lon = (min_lon + max_lon) / 2.0;

    track
        .waypoints
        .iter()
        .map(|waypoint| {
            let x = width as f64 / 2.0 + (waypoint.longitude() - center_lon) * scale;
            let y = height as f64 / 2.0 - (waypoint.latitude() - center_lat) * scale;
            (x.round() as i32, y.round() as i32)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Point;

    fn track_of(points: &[(f64, f64)]) -> Track {
        Track::new(
            None,
            points
                .iter()
                .map(|(lat, lon)| Waypoint::new(Point::new(*lon, *lat), None, None))
                .collect(),
        )
    }

    #[test]
    fn projection_stays_on_canvas() {
        let track = track_of(&[(55.0, 9.0), (55.2, 9.4), (55.1, 9.2)]);
        let pixels = project_waypoints(&track, THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT);

        assert_eq!(pixels.len(), 3);
        for (x, y) in pixels {
            assert!((0..=THUMBNAIL_WIDTH as i32).contains(&x));
            assert!((0..=THUMBNAIL_HEIGHT as i32).contains(&y));
        }
    }

    #[test]
    fn single_point_projects_to_center() {
        let track = track_of(&[(40.0, -105.0)]);
        let pixels = project_waypoints(&track, THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT);
        assert_eq!(pixels, vec![(400, 100)]);
    }

    #[test]
    fn north_maps_to_smaller_y() {
        let track = track_of(&[(55.0, 9.0), (55.1, 9.0)]);
        let pixels = project_waypoints(&track, THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT);
        assert!(pixels[1].1 < pixels[0].1);
    }

    #[test]
    fn sampling_bounds_the_path_length() {
        let points: Vec<(f64, f64)> = (0..1000).map(|i| (50.0 + i as f64 * 1e-4, 9.0)).collect();
        let track = track_of(&points);

        let sampled: Vec<_> = sample_waypoints(&track, MAX_PATH_POINTS).collect();
        assert!(sampled.len() <= MAX_PATH_POINTS + 1);
        assert_eq!(sampled.first().unwrap().latitude(), 50.0);
        assert_eq!(sampled.last().unwrap().latitude(), 50.0 + 999.0 * 1e-4);
    }

    #[test]
    fn short_tracks_are_not_downsampled() {
        let track = track_of(&[(50.0, 9.0), (50.1, 9.1), (50.2, 9.2)]);
        assert_eq!(sample_waypoints(&track, MAX_PATH_POINTS).count(), 3);
    }

    #[test]
    fn static_map_query_encodes_size_and_path() {
        let track = track_of(&[(55.0, 9.0), (55.1, 9.1)]);
        let metrics = RouteMetrics::from_track(&track).unwrap();

        let query = StaticMapRenderer::query(&track, &metrics);
        assert!(query.contains(&("size".to_string(), "800x200".to_string())));

        let path = &query.iter().find(|(key, _)| key == "path").unwrap().1;
        assert!(path.starts_with("color:0d6efd|weight:4|"));
        assert!(path.contains("55.00000,9.00000"));
    }

    #[tokio::test]
    async fn polyline_renderer_writes_a_png() {
        let track = track_of(&[(55.0, 9.0), (55.05, 9.1), (55.1, 9.05)]);
        let metrics = RouteMetrics::from_track(&track).unwrap();
        let out = std::env::temp_dir().join(format!(
            "gpx_routes_thumb_{}.png",
            hex::encode(rand::random::<[u8; 8]>())
        ));

        PolylineRenderer
            .render_thumbnail(&track, &metrics, &out)
            .await
            .unwrap();

        let bytes = std::fs::read(&out).unwrap();
        assert!(bytes.len() > 100);
        // PNG signature
        assert_eq!(&bytes[..8], &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);
        std::fs::remove_file(&out).ok();
    }
}
