use chrono::Utc;
use gpx_routes_lib::{gpx_util::parse_gpx, metrics::RouteMetrics, route::Route, track::Track};

use crate::{
    DataManager, DataManagerError, PLACEHOLDER_THUMBNAIL,
    geocode::{GeocodedLocation, Geocoder},
    map_html::interactive_map_document,
    render::{PolylineRenderer, Renderer},
};

/// Everything the enrichment pass needs besides the data itself: the
/// selected rendering backend, the always-available degraded renderer, and
/// the geocoder.
pub struct RouteProcessor {
    pub renderer: Box<dyn Renderer>,
    pub fallback: PolylineRenderer,
    pub geocoder: Geocoder,
}

impl RouteProcessor {
    pub fn new(renderer: Box<dyn Renderer>, geocoder: Geocoder) -> Self {
        Self {
            renderer,
            fallback: PolylineRenderer,
            geocoder,
        }
    }

    /// Build the processor from environment configuration:
    /// `GPX_ROUTES_STATIC_MAP_URL` (unset: offline polyline rendering),
    /// `GPX_ROUTES_GEOCODER_URL` (`off` disables the API, unset uses the
    /// public Nominatim instance) and `GPX_ROUTES_PLACES_FILE`.
    pub async fn from_env() -> Self {
        let static_map_url = std::env::var("GPX_ROUTES_STATIC_MAP_URL")
            .ok()
            .filter(|url| !url.is_empty());

        let geocoder_url = match std::env::var("GPX_ROUTES_GEOCODER_URL") {
            Ok(url) if url == "off" => None,
            Ok(url) if !url.is_empty() => Some(url),
            _ => Some(crate::geocode::DEFAULT_GEOCODER_URL.to_string()),
        };

        let places = match std::env::var("GPX_ROUTES_PLACES_FILE") {
            Ok(path) if !path.is_empty() => {
                crate::geocode::PlaceIndex::load(std::path::Path::new(&path))
            }
            _ => crate::geocode::PlaceIndex::empty(),
        };

        Self::new(
            crate::render::select_renderer(static_map_url).await,
            Geocoder::new(geocoder_url, places),
        )
    }
}

#[derive(Debug)]
pub struct FailedUpload {
    pub file_name: String,
    pub reason: String,
}

/// End-of-batch report for bulk ingestion. Files succeed and fail
/// independently.
#[derive(Debug, Default)]
pub struct BulkIngestSummary {
    pub uploaded: Vec<Route>,
    pub failed: Vec<FailedUpload>,
}

impl DataManager {
    /// One synchronous unit of work per uploaded file: parse, compute
    /// metrics, store the original bytes, insert the record and attach
    /// tags. Rendering and geocoding happen in the enrichment pass.
    pub async fn ingest_upload(
        &self,
        file_name: &str,
        bytes: &[u8],
        name_override: Option<String>,
        tag_names: &[String],
    ) -> Result<Route, DataManagerError> {
        let track = parse_gpx(bytes).map_err(DataManagerError::Ingest)?;
        let metrics = RouteMetrics::from_track(&track).map_err(DataManagerError::Ingest)?;

        let gpx_file = self.artifacts.store_gpx(file_name, bytes).await?;
        let name = resolve_name(name_override, &track, file_name);

        let mut route = Route::new(name, gpx_file, &metrics, Utc::now());
        route.route_id = self.database.insert_route(&route).await?;

        route.tags = self.add_tags(route.route_id, tag_names).await?;

        tracing::info!(
            "Ingested route {} ({}): {:.2} km, {:.0} m gain, {} points",
            route.route_id,
            route.name,
            route.distance_km,
            route.elevation_gain_m,
            metrics.point_count,
        );

        Ok(route)
    }

    /// Bulk ingestion: every file goes through the single-file pipeline on
    /// its own; a failure is recorded in the summary and never touches
    /// sibling files.
    pub async fn ingest_many(
        &self,
        files: Vec<(String, Vec<u8>)>,
        default_tags: &[String],
    ) -> BulkIngestSummary {
        let mut summary = BulkIngestSummary::default();

        for (file_name, bytes) in files {
            match self.ingest_upload(&file_name, &bytes, None, default_tags).await {
                Ok(route) => summary.uploaded.push(route),
                Err(err) => {
                    tracing::warn!("Failed to ingest {file_name}: {err:?}");
                    summary.failed.push(FailedUpload {
                        file_name,
                        reason: describe_failure(&err),
                    });
                }
            }
        }

        summary
    }

    /// Fill in what ingestion deferred: start location, thumbnail and
    /// interactive map. Safe to run more than once; existing values are
    /// kept.
    pub async fn enrich_route(
        &self,
        route_id: i64,
        processor: &RouteProcessor,
    ) -> Result<(), DataManagerError> {
        let route = self.database.get_route(route_id).await?;
        let track = self.load_track(&route).await?;
        let metrics = RouteMetrics::from_track(&track).map_err(DataManagerError::Ingest)?;

        if route.start_location.is_none() {
            self.geocode_start(&route, processor).await?;
        }

        if route.thumbnail_image.is_none() {
            self.render_thumbnail(&route, &track, &metrics, processor).await?;
        }

        if route.map_html.is_none() {
            let html = interactive_map_document(&route.name, &track, &metrics);
            let map_file = self.artifacts.store_map_html(&html).await?;
            self.database.set_map_html(route_id, &map_file).await?;
        }

        self.database.mark_processed(route_id).await
    }

    /// Re-render a route's thumbnail unconditionally.
    pub async fn regenerate_thumbnail(
        &self,
        route_id: i64,
        processor: &RouteProcessor,
    ) -> Result<(), DataManagerError> {
        let route = self.database.get_route(route_id).await?;
        let track = self.load_track(&route).await?;
        let metrics = RouteMetrics::from_track(&track).map_err(DataManagerError::Ingest)?;

        if let Some(old) = &route.thumbnail_image {
            if old != PLACEHOLDER_THUMBNAIL {
                self.artifacts.delete(old).await;
            }
        }

        self.render_thumbnail(&route, &track, &metrics, processor).await
    }

    /// Re-geocode a route's start coordinate unconditionally.
    pub async fn update_start_location(
        &self,
        route_id: i64,
        processor: &RouteProcessor,
    ) -> Result<bool, DataManagerError> {
        let route = self.database.get_route(route_id).await?;

        match processor.geocoder.reverse(route.start_lat, route.start_lon).await {
            GeocodedLocation::Place(name) => {
                self.database.set_start_location(route_id, &name).await?;
                Ok(true)
            }
            GeocodedLocation::Unavailable => Ok(false),
        }
    }

    async fn load_track(&self, route: &Route) -> Result<Track, DataManagerError> {
        let bytes = self.artifacts.read(&route.gpx_file).await?;
        parse_gpx(&bytes).map_err(DataManagerError::Ingest)
    }

    async fn geocode_start(
        &self,
        route: &Route,
        processor: &RouteProcessor,
    ) -> Result<(), DataManagerError> {
        match processor.geocoder.reverse(route.start_lat, route.start_lon).await {
            GeocodedLocation::Place(name) => {
                self.database.set_start_location(route.route_id, &name).await
            }
            GeocodedLocation::Unavailable => {
                // The record keeps None; display surfaces fall back to the
                // raw coordinates.
                tracing::debug!("No location name for route {}", route.route_id);
                Ok(())
            }
        }
    }

    async fn render_thumbnail(
        &self,
        route: &Route,
        track: &Track,
        metrics: &RouteMetrics,
        processor: &RouteProcessor,
    ) -> Result<(), DataManagerError> {
        let (relative, absolute) = self.artifacts.new_thumbnail_path();

        let rendered = match processor
            .renderer
            .render_thumbnail(track, metrics, &absolute)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    "Rendering degraded for route {}: {:?} backend failed ({err:?})",
                    route.route_id,
                    processor.renderer.style(),
                );
                match processor
                    .fallback
                    .render_thumbnail(track, metrics, &absolute)
                    .await
                {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::error!(
                            "Fallback rendering failed for route {}: {err:?}",
                            route.route_id,
                        );
                        false
                    }
                }
            }
        };

        let thumbnail = if rendered {
            relative.as_str()
        } else {
            PLACEHOLDER_THUMBNAIL
        };

        self.database.set_thumbnail(route.route_id, thumbnail).await
    }
}

fn resolve_name(name_override: Option<String>, track: &Track, file_name: &str) -> String {
    if let Some(name) = name_override {
        let name = name.trim().to_string();
        if !name.is_empty() {
            return name;
        }
    }

    if let Some(name) = &track.name {
        if !name.trim().is_empty() {
            return name.trim().to_string();
        }
    }

    let stem = file_name.trim_end_matches(".gpx");
    if stem.is_empty() {
        "Unnamed".to_string()
    } else {
        stem.to_string()
    }
}

fn describe_failure(err: &DataManagerError) -> String {
    match err {
        DataManagerError::Ingest(track_err) => track_err.to_string(),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactStore;
    use crate::database::db::RouteDatabase;
    use crate::geocode::{KnownPlace, PlaceIndex};
    use crate::render::select_renderer;

    const SAMPLE_GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test">
  <trk>
    <name>Harbor Loop</name>
    <trkseg>
      <trkpt lat="55.0" lon="9.0"><ele>10</ele></trkpt>
      <trkpt lat="55.01" lon="9.01"><ele>35</ele></trkpt>
      <trkpt lat="55.02" lon="9.0"><ele>20</ele></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    async fn test_manager() -> DataManager {
        let database = RouteDatabase::in_memory().await.unwrap();
        let root = std::env::temp_dir().join(format!(
            "gpx_routes_ingest_{}",
            hex::encode(rand::random::<[u8; 8]>())
        ));
        let artifacts = ArtifactStore::at(root).await.unwrap();
        DataManager::new(database, artifacts)
    }

    fn offline_processor() -> RouteProcessor {
        RouteProcessor::new(Box::new(PolylineRenderer), Geocoder::disabled())
    }

    #[tokio::test]
    async fn ingest_persists_metrics_and_tags() {
        let manager = test_manager().await;

        let route = manager
            .ingest_upload(
                "harbor.gpx",
                SAMPLE_GPX.as_bytes(),
                None,
                &["hiking".to_string(), "coast".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(route.name, "Harbor Loop");
        assert!(route.distance_km > 0.0);
        assert_eq!(route.elevation_gain_m, 25.0);
        assert_eq!(route.tags, vec!["coast", "hiking"]);
        assert_eq!(route.share_token.len(), 32);

        let stored = manager.get_route(route.route_id).await.unwrap();
        assert_eq!(stored.distance_km, route.distance_km);
        assert!(stored.thumbnail_image.is_none());
    }

    #[tokio::test]
    async fn name_override_beats_track_name() {
        let manager = test_manager().await;

        let route = manager
            .ingest_upload("harbor.gpx", SAMPLE_GPX.as_bytes(), Some("My Loop".to_string()), &[])
            .await
            .unwrap();
        assert_eq!(route.name, "My Loop");
    }

    #[tokio::test]
    async fn malformed_upload_is_a_typed_failure() {
        let manager = test_manager().await;

        let err = manager
            .ingest_upload("junk.gpx", b"not a gpx file", None, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DataManagerError::Ingest(_)));
        assert!(manager.get_routes(None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bulk_failures_leave_siblings_intact() {
        let manager = test_manager().await;

        let summary = manager
            .ingest_many(
                vec![
                    ("good.gpx".to_string(), SAMPLE_GPX.as_bytes().to_vec()),
                    ("bad.gpx".to_string(), b"<broken".to_vec()),
                    ("also_good.gpx".to_string(), SAMPLE_GPX.as_bytes().to_vec()),
                ],
                &["bulk".to_string()],
            )
            .await;

        assert_eq!(summary.uploaded.len(), 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].file_name, "bad.gpx");

        let routes = manager.get_routes(Some("bulk"), None).await.unwrap();
        assert_eq!(routes.len(), 2);
    }

    #[tokio::test]
    async fn enrichment_fills_artifacts_and_clears_the_queue() {
        let manager = test_manager().await;
        let processor = offline_processor();

        let route = manager
            .ingest_upload("harbor.gpx", SAMPLE_GPX.as_bytes(), None, &[])
            .await
            .unwrap();
        assert_eq!(manager.unprocessed_route_ids().await.unwrap(), vec![route.route_id]);

        manager.enrich_route(route.route_id, &processor).await.unwrap();

        let enriched = manager.get_route(route.route_id).await.unwrap();
        let thumbnail = enriched.thumbnail_image.clone().unwrap();
        assert!(thumbnail.starts_with("thumbnails/"));
        assert!(manager.artifacts().absolute(&thumbnail).exists());

        let map_html = enriched.map_html.clone().unwrap();
        let html = manager.artifacts().read(&map_html).await.unwrap();
        assert!(String::from_utf8(html).unwrap().contains("LineString"));

        // Geocoding was unavailable: no name, coordinate fallback on display
        assert!(enriched.start_location.is_none());
        assert_eq!(enriched.display_location(), "55.0000, 9.0000");

        assert!(manager.unprocessed_route_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn enrichment_uses_the_place_index() {
        let manager = test_manager().await;
        let places = PlaceIndex::from_places(vec![KnownPlace {
            name: "Harbor Office".to_string(),
            lat: 55.0,
            lon: 9.0,
        }]);
        let processor = RouteProcessor::new(
            Box::new(PolylineRenderer),
            Geocoder::new(None, places),
        );

        let route = manager
            .ingest_upload("harbor.gpx", SAMPLE_GPX.as_bytes(), None, &[])
            .await
            .unwrap();
        manager.enrich_route(route.route_id, &processor).await.unwrap();

        let enriched = manager.get_route(route.route_id).await.unwrap();
        assert_eq!(enriched.start_location.as_deref(), Some("Harbor Office"));
    }

    #[tokio::test]
    async fn deleting_a_route_removes_its_files() {
        let manager = test_manager().await;
        let processor = offline_processor();

        let route = manager
            .ingest_upload("harbor.gpx", SAMPLE_GPX.as_bytes(), None, &[])
            .await
            .unwrap();
        manager.enrich_route(route.route_id, &processor).await.unwrap();

        let enriched = manager.get_route(route.route_id).await.unwrap();
        let gpx_path = manager.artifacts().absolute(&enriched.gpx_file);
        let thumb_path = manager
            .artifacts()
            .absolute(enriched.thumbnail_image.as_ref().unwrap());

        manager.delete_route(route.route_id).await.unwrap();

        assert!(!gpx_path.exists());
        assert!(!thumb_path.exists());
        assert!(matches!(
            manager.get_route(route.route_id).await,
            Err(DataManagerError::RouteNotFound(_))
        ));
    }

    #[tokio::test]
    async fn selecting_without_a_service_yields_the_polyline_renderer() {
        let renderer = select_renderer(None).await;
        assert_eq!(renderer.style(), "polyline");
    }
}
