use std::path::{Path, PathBuf};

use crate::{DATA_DIR, DataManagerError, GPX_FILE_DIR, MAP_DIR, THUMBNAIL_DIR};

/// File-backed store for everything an ingested route leaves behind: the
/// original GPX upload, the thumbnail image and the interactive map
/// document. Paths handed out are store-relative so they can be served
/// directly under the media mount.
#[derive(Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub async fn start() -> Result<Self, DataManagerError> {
        let root: PathBuf = project_root::get_project_root()
            .map_err(|err| DataManagerError::ArtifactStore(format!("Failed to locate project root: {err}")))?;
        Self::at(root.join(DATA_DIR)).await
    }

    pub async fn at(root: PathBuf) -> Result<Self, DataManagerError> {
        for dir in [GPX_FILE_DIR, THUMBNAIL_DIR, MAP_DIR] {
            let path = root.join(dir);
            if !path.exists() {
                tokio::fs::create_dir_all(&path).await.map_err(|err| {
                    DataManagerError::ArtifactStore(format!(
                        "Failed to create artifact directory {path:?}: {err}"
                    ))
                })?;
            }
        }

        Ok(ArtifactStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn absolute(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Store uploaded GPX bytes under a collision-free name derived from the
    /// original file name. Returns the store-relative path.
    pub async fn store_gpx(&self, file_name: &str, bytes: &[u8]) -> Result<String, DataManagerError> {
        let stem = sanitize_stem(file_name);
        let relative = format!("{GPX_FILE_DIR}/{stem}_{}.gpx", random_suffix());

        self.write(&relative, bytes).await?;
        Ok(relative)
    }

    /// Reserve a fresh thumbnail path. The renderer writes the file itself,
    /// so this only returns (relative, absolute) names.
    pub fn new_thumbnail_path(&self) -> (String, PathBuf) {
        let relative = format!("{THUMBNAIL_DIR}/{}.png", random_suffix());
        let absolute = self.root.join(&relative);
        (relative, absolute)
    }

    pub async fn store_map_html(&self, html: &str) -> Result<String, DataManagerError> {
        let relative = format!("{MAP_DIR}/{}.html", random_suffix());
        self.write(&relative, html.as_bytes()).await?;
        Ok(relative)
    }

    pub async fn read(&self, relative: &str) -> Result<Vec<u8>, DataManagerError> {
        tokio::fs::read(self.root.join(relative)).await.map_err(|err| {
            DataManagerError::ArtifactStore(format!("Failed to read artifact {relative}: {err}"))
        })
    }

    /// Best-effort removal; a missing file is not an error by the time a
    /// route is being deleted.
    pub async fn delete(&self, relative: &str) {
        if let Err(err) = tokio::fs::remove_file(self.root.join(relative)).await {
            tracing::warn!("Failed to delete artifact {relative}: {err}");
        }
    }

    async fn write(&self, relative: &str, bytes: &[u8]) -> Result<(), DataManagerError> {
        let path = self.root.join(relative);
        tokio::fs::write(&path, bytes).await.map_err(|err| {
            DataManagerError::ArtifactStore(format!("Failed to write artifact {path:?}: {err}"))
        })
    }
}

fn random_suffix() -> String {
    hex::encode(rand::random::<[u8; 8]>())
}

fn sanitize_stem(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("upload");

    let cleaned: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}
