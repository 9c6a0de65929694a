use const_format::concatcp;
use gpx_routes_lib::track::TrackError;

pub mod artifacts;
pub mod database;
pub mod geocode;
pub mod ingest;
pub mod map_html;
pub mod render;
mod data_manager;

pub use data_manager::*;

pub const DATA_DIR: &str = "data/";
pub const DATABASE_PATH: &str = concatcp!(DATA_DIR, "routes.db");
pub const GPX_FILE_DIR: &str = "gpx";
pub const THUMBNAIL_DIR: &str = "thumbnails";
pub const MAP_DIR: &str = "maps";

/// Served when every rendering backend failed for a route.
pub const PLACEHOLDER_THUMBNAIL: &str = "placeholder.png";

#[derive(Debug)]
pub enum DataManagerError {
    Database(String),
    ArtifactStore(String),
    Ingest(TrackError),
    RouteNotFound(i64),
}
