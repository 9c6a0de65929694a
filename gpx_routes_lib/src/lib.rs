pub mod gpx_util;
pub mod metrics;
pub mod route;
pub mod tag;
pub mod track;
