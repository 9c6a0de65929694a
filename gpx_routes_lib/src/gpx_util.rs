use std::io::Cursor;

use chrono::{DateTime, Utc};
use gpx::GpxVersion;

use crate::track::{Track, TrackError, Waypoint};

/// Decode raw GPX bytes into an ordered waypoint sequence.
///
/// Points are taken from track segments in file order. Files without tracks
/// fall back to route points, then to bare waypoints, matching what common
/// exporters produce. Segment boundaries are flattened without inserting
/// synthetic points.
pub fn parse_gpx(bytes: &[u8]) -> Result<Track, TrackError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| TrackError::UnsupportedFormat("not a text document".to_string()))?;

    if !text.contains("<gpx") {
        return Err(TrackError::UnsupportedFormat(
            "no <gpx> root element".to_string(),
        ));
    }

    let gpx = gpx::read(Cursor::new(bytes)).map_err(|err| {
        let reason = err.to_string();
        if reason.contains("version") {
            TrackError::UnsupportedFormat(reason)
        } else {
            TrackError::MalformedTrack(reason)
        }
    })?;

    if gpx.version == GpxVersion::Unknown {
        return Err(TrackError::UnsupportedFormat(
            "unknown GPX version".to_string(),
        ));
    }

    let mut name = None;
    let mut waypoints = Vec::new();

    for track in gpx.tracks {
        if name.is_none() {
            name = track.name;
        }
        for segment in track.segments {
            for point in segment.points {
                waypoints.push(convert_waypoint(point)?);
            }
        }
    }

    if waypoints.is_empty() {
        for route in gpx.routes {
            if name.is_none() {
                name = route.name;
            }
            for point in route.points {
                waypoints.push(convert_waypoint(point)?);
            }
        }
    }

    if waypoints.is_empty() {
        for point in gpx.waypoints {
            waypoints.push(convert_waypoint(point)?);
        }
    }

    if name.is_none() {
        name = gpx.metadata.and_then(|meta| meta.name);
    }

    if waypoints.is_empty() {
        return Err(TrackError::EmptyTrack);
    }

    Ok(Track::new(name, waypoints))
}

fn convert_waypoint(point: gpx::Waypoint) -> Result<Waypoint, TrackError> {
    let position = point.point();
    let (lat, lon) = (position.y(), position.x());

    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(TrackError::MalformedTrack(format!(
            "coordinate out of range: ({lat}, {lon})"
        )));
    }

    Ok(Waypoint::new(
        position,
        point.elevation,
        point.time.and_then(gpx_time_to_chrono),
    ))
}

// gpx::Time wraps time::OffsetDateTime, convert via its RFC 3339 rendering.
fn gpx_time_to_chrono(time: gpx::Time) -> Option<DateTime<Utc>> {
    let formatted = time.format().ok()?;
    DateTime::parse_from_rfc3339(&formatted)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
