use std::path::PathBuf;

use gpx_routes_lib::{route::Route, tag::Tag};

use crate::{
    DATA_DIR, DataManagerError, artifacts::ArtifactStore, database::db::RouteDatabase,
};

#[derive(Clone)]
pub struct DataManager {
    pub(crate) database: RouteDatabase,
    pub(crate) artifacts: ArtifactStore,
}

/// The public interface for all route data management.
impl DataManager {
    pub async fn start() -> Result<Self, DataManagerError> {
        // Create data dir if it doesn't exist
        let root: PathBuf = project_root::get_project_root()
            .map_err(|err| DataManagerError::Database(format!("Failed to locate project root: {err}")))?;
        let data_dir = root.join(DATA_DIR);
        if !data_dir.exists() {
            std::fs::create_dir_all(&data_dir).map_err(|_| {
                DataManagerError::Database(format!("Failed to create data directory: {data_dir:?}"))
            })?;
        }

        let database = RouteDatabase::connect().await?;
        let artifacts = ArtifactStore::start().await?;

        Ok(DataManager {
            database,
            artifacts,
        })
    }

    pub fn new(database: RouteDatabase, artifacts: ArtifactStore) -> Self {
        Self {
            database,
            artifacts,
        }
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub async fn get_routes(
        &self,
        tag: Option<&str>,
        search: Option<&str>,
    ) -> Result<Vec<Route>, DataManagerError> {
        self.database.get_routes(tag, search).await
    }

    pub async fn get_route(&self, route_id: i64) -> Result<Route, DataManagerError> {
        self.database.get_route(route_id).await
    }

    pub async fn get_route_by_token(&self, token: &str) -> Result<Option<Route>, DataManagerError> {
        self.database.get_route_by_token(token).await
    }

    /// Remove the record and its stored files. Artifact deletion is
    /// best-effort once the record is gone.
    pub async fn delete_route(&self, route_id: i64) -> Result<(), DataManagerError> {
        let route = self.database.get_route(route_id).await?;
        self.database.delete_route(route_id).await?;

        self.artifacts.delete(&route.gpx_file).await;
        if let Some(thumbnail) = &route.thumbnail_image {
            if thumbnail != crate::PLACEHOLDER_THUMBNAIL {
                self.artifacts.delete(thumbnail).await;
            }
        }
        if let Some(map_html) = &route.map_html {
            self.artifacts.delete(map_html).await;
        }

        Ok(())
    }

    /// Attach tags by name, creating missing ones. Returns the route's
    /// resulting tag set.
    pub async fn add_tags(
        &self,
        route_id: i64,
        tag_names: &[String],
    ) -> Result<Vec<String>, DataManagerError> {
        for name in tag_names {
            let tag = self.database.get_or_create_tag(name).await?;
            self.database.tag_route(route_id, tag.tag_id).await?;
        }
        self.database.route_tags(route_id).await
    }

    pub async fn remove_tag(&self, route_id: i64, tag_name: &str) -> Result<(), DataManagerError> {
        self.database.untag_route(route_id, tag_name).await
    }

    pub async fn get_tags(&self) -> Result<Vec<Tag>, DataManagerError> {
        self.database.get_tags().await
    }

    pub async fn unprocessed_route_ids(&self) -> Result<Vec<i64>, DataManagerError> {
        self.database.unprocessed_route_ids().await
    }
}
