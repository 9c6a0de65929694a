use chrono::{DateTime, Utc};
use geo_types::Point;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TrackError {
    #[error("unsupported track format: {0}")]
    UnsupportedFormat(String),
    #[error("malformed track file: {0}")]
    MalformedTrack(String),
    #[error("track contains no waypoints")]
    EmptyTrack,
}

/// A single recorded sample. Elevation and time are kept optional so that
/// downstream accounting can tell "absent" apart from zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub position: Point,
    pub elevation: Option<f64>,
    pub time: Option<DateTime<Utc>>,
}

impl Waypoint {
    pub fn new(position: Point, elevation: Option<f64>, time: Option<DateTime<Utc>>) -> Self {
        Self {
            position,
            elevation,
            time,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.position.y()
    }

    pub fn longitude(&self) -> f64 {
        self.position.x()
    }
}

/// An ordered waypoint sequence as it appeared in the source file.
/// Segments are already flattened in file order; the sequence is never
/// reordered or deduplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub name: Option<String>,
    pub waypoints: Vec<Waypoint>,
}

impl Track {
    pub fn new(name: Option<String>, waypoints: Vec<Waypoint>) -> Self {
        Self { name, waypoints }
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }
}
