use chrono::{DateTime, Utc};
use gpx_routes_data_management::ingest::BulkIngestSummary;
use gpx_routes_lib::route::Route;
use serde::Serialize;

/// JSON projection of a route record as the API serves it: media URLs
/// instead of store-relative paths, plus the derived display fields.
#[derive(Serialize)]
pub struct RouteView {
    pub route_id: i64,
    pub name: String,
    pub distance_km: f64,
    pub distance_miles: f64,
    pub elevation_gain_m: f64,
    pub start_location: String,
    pub start_lat: f64,
    pub start_lon: f64,
    pub end_lat: f64,
    pub end_lon: f64,
    pub uploaded_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub gpx_url: String,
    pub thumbnail_url: Option<String>,
    pub map_url: Option<String>,
    pub share_url: String,
}

impl RouteView {
    pub fn from_route(route: &Route) -> Self {
        Self {
            route_id: route.route_id,
            name: route.name.clone(),
            distance_km: route.distance_km,
            distance_miles: route.distance_miles(),
            elevation_gain_m: route.elevation_gain_m,
            start_location: route.display_location(),
            start_lat: route.start_lat,
            start_lon: route.start_lon,
            end_lat: route.end_lat,
            end_lon: route.end_lon,
            uploaded_at: route.uploaded_at,
            tags: route.tags.clone(),
            gpx_url: media_url(&route.gpx_file),
            thumbnail_url: route.thumbnail_image.as_deref().map(media_url),
            map_url: route.map_html.as_deref().map(media_url),
            share_url: format!("/share/{}", route.share_token),
        }
    }
}

#[derive(Serialize)]
pub struct FailedUploadView {
    pub file_name: String,
    pub reason: String,
}

#[derive(Serialize)]
pub struct BulkUploadView {
    pub uploaded: Vec<RouteView>,
    pub failed: Vec<FailedUploadView>,
}

impl BulkUploadView {
    pub fn from_summary(summary: &BulkIngestSummary) -> Self {
        Self {
            uploaded: summary.uploaded.iter().map(RouteView::from_route).collect(),
            failed: summary
                .failed
                .iter()
                .map(|failure| FailedUploadView {
                    file_name: failure.file_name.clone(),
                    reason: failure.reason.clone(),
                })
                .collect(),
        }
    }
}

fn media_url(relative: &str) -> String {
    format!("/media/{relative}")
}
