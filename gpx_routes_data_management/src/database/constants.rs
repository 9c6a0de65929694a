#![allow(dead_code)]

pub const ROUTES_TABLE_NAME: &str = "Routes";
pub const ROUTE_ID: &str = "route_id";
pub const NAME: &str = "name";
pub const GPX_FILE: &str = "gpx_file";
pub const THUMBNAIL_IMAGE: &str = "thumbnail_image";
pub const MAP_HTML: &str = "map_html";
pub const DISTANCE_KM: &str = "distance_km";
pub const ELEVATION_GAIN_M: &str = "elevation_gain_m";
pub const START_LOCATION: &str = "start_location";
pub const START_LAT: &str = "start_lat";
pub const START_LON: &str = "start_lon";
pub const END_LAT: &str = "end_lat";
pub const END_LON: &str = "end_lon";
pub const UPLOADED_AT: &str = "uploaded_at";
pub const SHARE_TOKEN: &str = "share_token";
pub const PROCESSED: &str = "processed";

pub const TAGS_TABLE_NAME: &str = "Tags";
pub const TAG_ID: &str = "tag_id";
// name
pub const CREATED_AT: &str = "created_at";

pub const ROUTE_TAGS_TABLE_NAME: &str = "RouteTags";
// route_id, tag_id
