use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "sqlx")]
use sqlx::{prelude::*, sqlite::SqliteRow};

use crate::metrics::RouteMetrics;

pub const SHARE_TOKEN_BYTES: usize = 16;

/// A persisted route record. Artifact fields hold store-relative paths and
/// stay `None` until the enrichment pass has produced them. `start_location`
/// is `None` when geocoding was unavailable, which is not the same as an
/// empty name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub route_id: i64,
    pub name: String,
    pub gpx_file: String,
    pub thumbnail_image: Option<String>,
    pub map_html: Option<String>,
    pub distance_km: f64,
    pub elevation_gain_m: f64,
    pub start_location: Option<String>,
    pub start_lat: f64,
    pub start_lon: f64,
    pub end_lat: f64,
    pub end_lon: f64,
    pub uploaded_at: DateTime<Utc>,
    pub share_token: String,
    pub tags: Vec<String>,
}

impl Route {
    pub fn new(
        name: String,
        gpx_file: String,
        metrics: &RouteMetrics,
        uploaded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            route_id: -1,
            name,
            gpx_file,
            thumbnail_image: None,
            map_html: None,
            distance_km: metrics.distance_km,
            elevation_gain_m: metrics.elevation_gain_m,
            start_location: None,
            start_lat: metrics.start_lat,
            start_lon: metrics.start_lon,
            end_lat: metrics.end_lat,
            end_lon: metrics.end_lon,
            uploaded_at,
            share_token: generate_share_token(),
            tags: Vec::new(),
        }
    }

    pub fn distance_miles(&self) -> f64 {
        self.distance_km * 0.621371
    }

    /// Geocoded name when available, coordinate fallback otherwise.
    pub fn display_location(&self) -> String {
        match &self.start_location {
            Some(name) => name.clone(),
            None => format!("{:.4}, {:.4}", self.start_lat, self.start_lon),
        }
    }
}

/// Unguessable identifier granting read-only access to one route.
pub fn generate_share_token() -> String {
    let bytes: [u8; SHARE_TOKEN_BYTES] = rand::random();
    hex::encode(bytes)
}

#[cfg(feature = "sqlx")]
impl FromRow<'_, SqliteRow> for Route {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            route_id: row.get(0),
            name: row.get(1),
            gpx_file: row.get(2),
            thumbnail_image: row.get(3),
            map_html: row.get(4),
            distance_km: row.get(5),
            elevation_gain_m: row.get(6),
            start_location: row.get(7),
            start_lat: row.get(8),
            start_lon: row.get(9),
            end_lat: row.get(10),
            end_lon: row.get(11),
            uploaded_at: row.get(12),
            share_token: row.get(13),
            tags: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metrics() -> RouteMetrics {
        RouteMetrics {
            distance_km: 10.0,
            elevation_gain_m: 250.0,
            start_lat: 40.0,
            start_lon: -105.0,
            end_lat: 40.1,
            end_lon: -105.1,
            point_count: 42,
        }
    }

    #[test]
    fn share_tokens_are_hex_and_unique() {
        let first = generate_share_token();
        let second = generate_share_token();
        assert_eq!(first.len(), SHARE_TOKEN_BYTES * 2);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }

    #[test]
    fn display_location_falls_back_to_coordinates() {
        let mut route = Route::new(
            "Flatirons Loop".to_string(),
            "gpx/flatirons.gpx".to_string(),
            &sample_metrics(),
            Utc::now(),
        );
        assert_eq!(route.display_location(), "40.0000, -105.0000");

        route.start_location = Some("Boulder, Colorado".to_string());
        assert_eq!(route.display_location(), "Boulder, Colorado");
    }

    #[test]
    fn distance_miles_converts_from_km() {
        let route = Route::new(
            "Ten K".to_string(),
            "gpx/ten_k.gpx".to_string(),
            &sample_metrics(),
            Utc::now(),
        );
        assert!((route.distance_miles() - 6.21371).abs() < 1e-9);
    }
}
