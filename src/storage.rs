use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use uuid::Uuid;

/// Subdirectory of the media root used for in-flight uploads.
const TMP_DIR: &str = "tmp_uploads";

/// Local filesystem storage for measurement photos and profile icons.
///
/// All stored files live under a single media root; database rows keep
/// root-relative paths so the root can move between deployments.
#[derive(Clone)]
pub struct MediaStorage {
    root: PathBuf,
}

impl MediaStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the media root and temp-upload directory if missing.
    pub async fn ensure_layout(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(self.root.join(TMP_DIR)).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a root-relative stored path.
    pub fn absolute(&self, rel_path: &str) -> PathBuf {
        self.root.join(rel_path)
    }

    /// Unique temp-file path for an upload in flight.
    pub fn temp_path(&self, user_id: i32) -> PathBuf {
        self.root
            .join(TMP_DIR)
            .join(format!("tmp_{}_{}", user_id, Uuid::new_v4()))
    }

    /// Root-relative destination for an evidence photo:
    /// `evidencias/{year}/{iso-week}/{user_id}/{uuid}.jpg`.
    pub fn evidence_path(user_id: i32, now: DateTime<Utc>) -> String {
        format!(
            "evidencias/{}/{}/{}/{}.jpg",
            now.year(),
            now.iso_week().week(),
            user_id,
            Uuid::new_v4()
        )
    }

    /// Root-relative destination for a company profile icon.
    pub fn icon_path(user_id: i32) -> String {
        format!("iconos/{}/{}.jpg", user_id, Uuid::new_v4())
    }

    /// Write bytes to a root-relative path, creating parent directories.
    pub async fn write(&self, rel_path: &str, bytes: &[u8]) -> io::Result<()> {
        let abs = self.absolute(rel_path);
        if let Some(parent) = abs.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(abs, bytes).await
    }

    /// Remove a stored file. Best effort; missing files are not an error.
    pub async fn remove(&self, rel_path: &str) {
        let _ = tokio::fs::remove_file(self.absolute(rel_path)).await;
    }
}
