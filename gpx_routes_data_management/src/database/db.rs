use std::path::PathBuf;

use chrono::Utc;
use const_format::concatcp;
use gpx_routes_lib::{route::Route, tag::Tag};
use sqlx::{
    Executor, Pool, Sqlite, SqlitePool, query, query_as,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use crate::{DATABASE_PATH, DataManagerError};

use super::constants::*;

#[derive(Clone)]
pub struct RouteDatabase {
    pool: Pool<Sqlite>,
}

impl RouteDatabase {
    pub async fn connect() -> Result<Self, DataManagerError> {
        let root: PathBuf = project_root::get_project_root()
            .map_err(|err| DataManagerError::Database(format!("Failed to locate project root: {err}")))?;
        let options = SqliteConnectOptions::new()
            .filename(root.join(DATABASE_PATH))
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|err| DataManagerError::Database(format!("Failed to connect to database: {err}")))?;

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// Single-connection in-memory database, used by tests and nothing else.
    pub async fn in_memory() -> Result<Self, DataManagerError> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|err| DataManagerError::Database(format!("Failed to open in-memory database: {err}")))?;

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    pub async fn init(&self) -> Result<(), DataManagerError> {
        self.pool
            .execute(concatcp!(
                "
            CREATE TABLE IF NOT EXISTS ", ROUTES_TABLE_NAME, "(",
                ROUTE_ID,         " INTEGER PRIMARY KEY AUTOINCREMENT,",
                NAME,             " TEXT NOT NULL,",
                GPX_FILE,         " TEXT NOT NULL,",
                THUMBNAIL_IMAGE,  " TEXT,",
                MAP_HTML,         " TEXT,",
                DISTANCE_KM,      " REAL NOT NULL,",
                ELEVATION_GAIN_M, " REAL NOT NULL,",
                START_LOCATION,   " TEXT,",
                START_LAT,        " REAL NOT NULL,",
                START_LON,        " REAL NOT NULL,",
                END_LAT,          " REAL NOT NULL,",
                END_LON,          " REAL NOT NULL,",
                UPLOADED_AT,      " TIMESTAMP NOT NULL,",
                SHARE_TOKEN,      " TEXT NOT NULL UNIQUE,",
                PROCESSED,        " BOOLEAN NOT NULL DEFAULT 0);

            CREATE TABLE IF NOT EXISTS ", TAGS_TABLE_NAME, "(",
                TAG_ID,     " INTEGER PRIMARY KEY AUTOINCREMENT,",
                NAME,       " TEXT NOT NULL COLLATE NOCASE UNIQUE,",
                CREATED_AT, " TIMESTAMP NOT NULL);

            CREATE TABLE IF NOT EXISTS ", ROUTE_TAGS_TABLE_NAME, "(",
                ROUTE_ID, " INTEGER NOT NULL,",
                TAG_ID,   " INTEGER NOT NULL,
                PRIMARY KEY(", ROUTE_ID, ", ", TAG_ID, "),
                FOREIGN KEY(", ROUTE_ID, ") REFERENCES ", ROUTES_TABLE_NAME, "(", ROUTE_ID, ") ON DELETE CASCADE,
                FOREIGN KEY(", TAG_ID, ") REFERENCES ", TAGS_TABLE_NAME, "(", TAG_ID, ") ON DELETE CASCADE
            )"
            ))
            .await
            .map_err(|err| DataManagerError::Database(format!("Failed to create tables: {err}")))?;

        Ok(())
    }

    pub async fn insert_route(&self, route: &Route) -> Result<i64, DataManagerError> {
        query_as::<_, (i64,)>(concatcp!(
            "
            INSERT INTO ", ROUTES_TABLE_NAME, "(",
            ROUTE_ID, ", ", NAME, ", ", GPX_FILE, ", ", THUMBNAIL_IMAGE, ", ", MAP_HTML, ", ",
            DISTANCE_KM, ", ", ELEVATION_GAIN_M, ", ", START_LOCATION, ", ",
            START_LAT, ", ", START_LON, ", ", END_LAT, ", ", END_LON, ", ",
            UPLOADED_AT, ", ", SHARE_TOKEN, ", ", PROCESSED, ")
            VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 0) RETURNING ", ROUTE_ID
        ))
        .bind(&route.name)
        .bind(&route.gpx_file)
        .bind(&route.thumbnail_image)
        .bind(&route.map_html)
        .bind(route.distance_km)
        .bind(route.elevation_gain_m)
        .bind(&route.start_location)
        .bind(route.start_lat)
        .bind(route.start_lon)
        .bind(route.end_lat)
        .bind(route.end_lon)
        .bind(route.uploaded_at)
        .bind(&route.share_token)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| DataManagerError::Database(format!("Failed to insert route: {err}")))
        .map(|row| row.0)
    }

    pub async fn get_route(&self, route_id: i64) -> Result<Route, DataManagerError> {
        let route = query_as::<_, Route>(concatcp!(
            "SELECT * FROM ", ROUTES_TABLE_NAME, " WHERE ", ROUTE_ID, " = ?1"
        ))
        .bind(route_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| DataManagerError::Database(format!("Failed to get route: {err}")))?;

        match route {
            Some(mut route) => {
                route.tags = self.route_tags(route.route_id).await?;
                Ok(route)
            }
            None => Err(DataManagerError::RouteNotFound(route_id)),
        }
    }

    /// Share-token lookup. An unknown token is reported exactly like a
    /// deleted one so the response does not leak which tokens ever existed.
    pub async fn get_route_by_token(&self, token: &str) -> Result<Option<Route>, DataManagerError> {
        let route = query_as::<_, Route>(concatcp!(
            "SELECT * FROM ", ROUTES_TABLE_NAME, " WHERE ", SHARE_TOKEN, " = ?1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| DataManagerError::Database(format!("Failed to get route by token: {err}")))?;

        match route {
            Some(mut route) => {
                route.tags = self.route_tags(route.route_id).await?;
                Ok(Some(route))
            }
            None => Ok(None),
        }
    }

    pub async fn get_routes(
        &self,
        tag: Option<&str>,
        search: Option<&str>,
    ) -> Result<Vec<Route>, DataManagerError> {
        let search_pattern = match search {
            Some(search) => format!("%{search}%"),
            None => "%".to_string(),
        };

        let mut routes = if let Some(tag) = tag {
            query_as::<_, Route>(concatcp!(
                "
                SELECT r.* FROM ", ROUTES_TABLE_NAME, " r
                JOIN ", ROUTE_TAGS_TABLE_NAME, " rt ON rt.", ROUTE_ID, " = r.", ROUTE_ID, "
                JOIN ", TAGS_TABLE_NAME, " t ON t.", TAG_ID, " = rt.", TAG_ID, "
                WHERE t.", NAME, " = ?1 AND r.", NAME, " LIKE ?2
                ORDER BY r.", UPLOADED_AT, " DESC"
            ))
            .bind(tag)
            .bind(&search_pattern)
            .fetch_all(&self.pool)
            .await
        } else {
            query_as::<_, Route>(concatcp!(
                "
                SELECT * FROM ", ROUTES_TABLE_NAME, "
                WHERE ", NAME, " LIKE ?1
                ORDER BY ", UPLOADED_AT, " DESC"
            ))
            .bind(&search_pattern)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|err| DataManagerError::Database(format!("Failed to list routes: {err}")))?;

        for route in routes.iter_mut() {
            route.tags = self.route_tags(route.route_id).await?;
        }

        Ok(routes)
    }

    pub async fn delete_route(&self, route_id: i64) -> Result<(), DataManagerError> {
        query(concatcp!(
            "DELETE FROM ", ROUTES_TABLE_NAME, " WHERE ", ROUTE_ID, " = ?1"
        ))
        .bind(route_id)
        .execute(&self.pool)
        .await
        .map_err(|err| DataManagerError::Database(format!("Failed to delete route: {err}")))
        .map(|_| ())
    }

    pub async fn set_start_location(
        &self,
        route_id: i64,
        start_location: &str,
    ) -> Result<(), DataManagerError> {
        query(concatcp!(
            "UPDATE ", ROUTES_TABLE_NAME, " SET ", START_LOCATION, " = ?1 WHERE ", ROUTE_ID, " = ?2"
        ))
        .bind(start_location)
        .bind(route_id)
        .execute(&self.pool)
        .await
        .map_err(|err| DataManagerError::Database(format!("Failed to set start location: {err}")))
        .map(|_| ())
    }

    pub async fn set_thumbnail(
        &self,
        route_id: i64,
        thumbnail_image: &str,
    ) -> Result<(), DataManagerError> {
        query(concatcp!(
            "UPDATE ", ROUTES_TABLE_NAME, " SET ", THUMBNAIL_IMAGE, " = ?1 WHERE ", ROUTE_ID, " = ?2"
        ))
        .bind(thumbnail_image)
        .bind(route_id)
        .execute(&self.pool)
        .await
        .map_err(|err| DataManagerError::Database(format!("Failed to set thumbnail: {err}")))
        .map(|_| ())
    }

    pub async fn set_map_html(
        &self,
        route_id: i64,
        map_html: &str,
    ) -> Result<(), DataManagerError> {
        query(concatcp!(
            "UPDATE ", ROUTES_TABLE_NAME, " SET ", MAP_HTML, " = ?1 WHERE ", ROUTE_ID, " = ?2"
        ))
        .bind(map_html)
        .bind(route_id)
        .execute(&self.pool)
        .await
        .map_err(|err| DataManagerError::Database(format!("Failed to set map document: {err}")))
        .map(|_| ())
    }

    pub async fn mark_processed(&self, route_id: i64) -> Result<(), DataManagerError> {
        query(concatcp!(
            "UPDATE ", ROUTES_TABLE_NAME, " SET ", PROCESSED, " = 1 WHERE ", ROUTE_ID, " = ?1"
        ))
        .bind(route_id)
        .execute(&self.pool)
        .await
        .map_err(|err| DataManagerError::Database(format!("Failed to mark route processed: {err}")))
        .map(|_| ())
    }

    pub async fn unprocessed_route_ids(&self) -> Result<Vec<i64>, DataManagerError> {
        query_as::<_, (i64,)>(concatcp!(
            "SELECT ", ROUTE_ID, " FROM ", ROUTES_TABLE_NAME,
            " WHERE ", PROCESSED, " = 0 ORDER BY ", ROUTE_ID
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|err| DataManagerError::Database(format!("Failed to list unprocessed routes: {err}")))
        .map(|rows| rows.into_iter().map(|row| row.0).collect())
    }

    pub async fn get_or_create_tag(&self, name: &str) -> Result<Tag, DataManagerError> {
        let existing = query_as::<_, Tag>(concatcp!(
            "SELECT * FROM ", TAGS_TABLE_NAME, " WHERE ", NAME, " = ?1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| DataManagerError::Database(format!("Failed to look up tag: {err}")))?;

        if let Some(tag) = existing {
            return Ok(tag);
        }

        let created_at = Utc::now();
        let tag_id = query_as::<_, (i64,)>(concatcp!(
            "INSERT INTO ", TAGS_TABLE_NAME, "(", TAG_ID, ", ", NAME, ", ", CREATED_AT, ")
             VALUES (NULL, ?1, ?2) RETURNING ", TAG_ID
        ))
        .bind(name)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| DataManagerError::Database(format!("Failed to insert tag: {err}")))
        .map(|row| row.0)?;

        Ok(Tag::new(tag_id, name.to_string(), created_at))
    }

    pub async fn tag_route(&self, route_id: i64, tag_id: i64) -> Result<(), DataManagerError> {
        query(concatcp!(
            "INSERT OR IGNORE INTO ", ROUTE_TAGS_TABLE_NAME, "(", ROUTE_ID, ", ", TAG_ID, ")
             VALUES (?1, ?2)"
        ))
        .bind(route_id)
        .bind(tag_id)
        .execute(&self.pool)
        .await
        .map_err(|err| DataManagerError::Database(format!("Failed to tag route: {err}")))
        .map(|_| ())
    }

    pub async fn untag_route(&self, route_id: i64, tag_name: &str) -> Result<(), DataManagerError> {
        query(concatcp!(
            "DELETE FROM ", ROUTE_TAGS_TABLE_NAME, "
             WHERE ", ROUTE_ID, " = ?1 AND ", TAG_ID, " IN
               (SELECT ", TAG_ID, " FROM ", TAGS_TABLE_NAME, " WHERE ", NAME, " = ?2)"
        ))
        .bind(route_id)
        .bind(tag_name)
        .execute(&self.pool)
        .await
        .map_err(|err| DataManagerError::Database(format!("Failed to untag route: {err}")))
        .map(|_| ())
    }

    pub async fn route_tags(&self, route_id: i64) -> Result<Vec<String>, DataManagerError> {
        query_as::<_, (String,)>(concatcp!(
            "SELECT t.", NAME, " FROM ", TAGS_TABLE_NAME, " t
             JOIN ", ROUTE_TAGS_TABLE_NAME, " rt ON rt.", TAG_ID, " = t.", TAG_ID, "
             WHERE rt.", ROUTE_ID, " = ?1 ORDER BY t.", NAME
        ))
        .bind(route_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| DataManagerError::Database(format!("Failed to get route tags: {err}")))
        .map(|rows| rows.into_iter().map(|row| row.0).collect())
    }

    pub async fn get_tags(&self) -> Result<Vec<Tag>, DataManagerError> {
        query_as::<_, Tag>(concatcp!(
            "SELECT * FROM ", TAGS_TABLE_NAME, " ORDER BY ", NAME
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|err| DataManagerError::Database(format!("Failed to list tags: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpx_routes_lib::metrics::RouteMetrics;

    fn sample_route(name: &str) -> Route {
        let metrics = RouteMetrics {
            distance_km: 12.5,
            elevation_gain_m: 340.0,
            start_lat: 55.0,
            start_lon: 9.0,
            end_lat: 55.1,
            end_lon: 9.1,
            point_count: 120,
        };
        Route::new(name.to_string(), format!("gpx/{name}.gpx"), &metrics, Utc::now())
    }

    #[tokio::test]
    async fn insert_and_fetch_route_roundtrip() {
        let db = RouteDatabase::in_memory().await.unwrap();

        let route = sample_route("roundtrip");
        let route_id = db.insert_route(&route).await.unwrap();
        let fetched = db.get_route(route_id).await.unwrap();

        assert_eq!(fetched.name, "roundtrip");
        assert_eq!(fetched.distance_km, 12.5);
        assert_eq!(fetched.share_token, route.share_token);
        assert!(fetched.thumbnail_image.is_none());
        assert!(fetched.tags.is_empty());
    }

    #[tokio::test]
    async fn share_token_lookup_hides_unknown_tokens() {
        let db = RouteDatabase::in_memory().await.unwrap();

        let route = sample_route("shared");
        db.insert_route(&route).await.unwrap();

        let found = db.get_route_by_token(&route.share_token).await.unwrap();
        assert_eq!(found.unwrap().name, "shared");

        let missing = db.get_route_by_token("0000000000000000").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn tag_filter_and_search() {
        let db = RouteDatabase::in_memory().await.unwrap();

        let hike_id = db.insert_route(&sample_route("Sunrise Hike")).await.unwrap();
        let ride_id = db.insert_route(&sample_route("Evening Ride")).await.unwrap();

        let hiking = db.get_or_create_tag("hiking").await.unwrap();
        db.tag_route(hike_id, hiking.tag_id).await.unwrap();

        let tagged = db.get_routes(Some("hiking"), None).await.unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].route_id, hike_id);
        assert_eq!(tagged[0].tags, vec!["hiking"]);

        let searched = db.get_routes(None, Some("ride")).await.unwrap();
        assert_eq!(searched.len(), 1);
        assert_eq!(searched[0].route_id, ride_id);

        let all = db.get_routes(None, None).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn tags_are_case_insensitive() {
        let db = RouteDatabase::in_memory().await.unwrap();

        let lower = db.get_or_create_tag("trail").await.unwrap();
        let upper = db.get_or_create_tag("TRAIL").await.unwrap();
        assert_eq!(lower.tag_id, upper.tag_id);

        let route_id = db.insert_route(&sample_route("tagged")).await.unwrap();
        db.tag_route(route_id, lower.tag_id).await.unwrap();

        let routes = db.get_routes(Some("Trail"), None).await.unwrap();
        assert_eq!(routes.len(), 1);
    }

    #[tokio::test]
    async fn deleting_a_route_drops_its_tag_links() {
        let db = RouteDatabase::in_memory().await.unwrap();

        let route_id = db.insert_route(&sample_route("doomed")).await.unwrap();
        let tag = db.get_or_create_tag("temporary").await.unwrap();
        db.tag_route(route_id, tag.tag_id).await.unwrap();

        db.delete_route(route_id).await.unwrap();

        assert!(matches!(
            db.get_route(route_id).await,
            Err(DataManagerError::RouteNotFound(_))
        ));
        assert!(db.route_tags(route_id).await.unwrap().is_empty());
        // The tag itself survives for reuse
        assert_eq!(db.get_tags().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn processed_flag_drives_the_work_queue() {
        let db = RouteDatabase::in_memory().await.unwrap();

        let first = db.insert_route(&sample_route("first")).await.unwrap();
        let second = db.insert_route(&sample_route("second")).await.unwrap();

        assert_eq!(db.unprocessed_route_ids().await.unwrap(), vec![first, second]);

        db.mark_processed(first).await.unwrap();
        assert_eq!(db.unprocessed_route_ids().await.unwrap(), vec![second]);
    }

    #[tokio::test]
    async fn untag_route_removes_a_single_tag() {
        let db = RouteDatabase::in_memory().await.unwrap();

        let route_id = db.insert_route(&sample_route("multi")).await.unwrap();
        for name in ["alps", "summer"] {
            let tag = db.get_or_create_tag(name).await.unwrap();
            db.tag_route(route_id, tag.tag_id).await.unwrap();
        }

        db.untag_route(route_id, "alps").await.unwrap();
        assert_eq!(db.route_tags(route_id).await.unwrap(), vec!["summer"]);
    }
}
