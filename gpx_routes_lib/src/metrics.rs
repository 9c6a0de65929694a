use serde::{Deserialize, Serialize};

use crate::track::{Track, TrackError};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Summary figures derived from a track, computed once and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteMetrics {
    pub distance_km: f64,
    pub elevation_gain_m: f64,
    pub start_lat: f64,
    pub start_lon: f64,
    pub end_lat: f64,
    pub end_lon: f64,
    pub point_count: usize,
}

impl RouteMetrics {
    /// Distance is the running sum of great-circle legs between consecutive
    /// waypoints, in the order they were recorded. Elevation gain counts
    /// only ascents between pairs where both endpoints report an elevation;
    /// a pair with a missing elevation is skipped outright.
    pub fn from_track(track: &Track) -> Result<Self, TrackError> {
        let (first, last) = match (track.waypoints.first(), track.waypoints.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(TrackError::EmptyTrack),
        };

        let mut distance_m = 0.0;
        let mut elevation_gain_m = 0.0;

        for pair in track.waypoints.windows(2) {
            distance_m += haversine_distance(
                pair[0].latitude(),
                pair[0].longitude(),
                pair[1].latitude(),
                pair[1].longitude(),
            );

            if let (Some(from), Some(to)) = (pair[0].elevation, pair[1].elevation) {
                if to > from {
                    elevation_gain_m += to - from;
                }
            }
        }

        Ok(RouteMetrics {
            distance_km: distance_m / 1000.0,
            elevation_gain_m,
            start_lat: first.latitude(),
            start_lon: first.longitude(),
            end_lat: last.latitude(),
            end_lon: last.longitude(),
            point_count: track.len(),
        })
    }
}

/// Great-circle distance between two coordinates in meters.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}
