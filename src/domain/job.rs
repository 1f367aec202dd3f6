//! The ephemeral state of one import request.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use super::record::ContentId;
use crate::core::paths;

/// One in-flight import.
///
/// Owns its staging directory exclusively. The directory is removed by
/// [`ImportJob::cleanup`], or on drop if the job is abandoned early.
#[derive(Debug)]
pub struct ImportJob {
    pub content_id: ContentId,

    /// `<path-prefix>/<content-id>` in the object store
    pub remote_root: String,

    /// Name the archive is staged and stored under
    pub archive_name: String,

    staging: TempDir,
}

impl ImportJob {
    /// Mint a content id and create a fresh staging directory below `staging_root`
    pub async fn stage(
        staging_root: &Path,
        path_prefix: &str,
        original_filename: &str,
    ) -> io::Result<Self> {
        let content_id = ContentId::new();

        tokio::fs::create_dir_all(staging_root).await?;
        let root = staging_root.to_path_buf();
        let prefix = format!("{}-", content_id);
        let staging = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix(&prefix).tempdir_in(root)
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;

        debug!(
            content_id = %content_id,
            staging = %staging.path().display(),
            "Staged import job"
        );

        Ok(Self {
            remote_root: paths::root_path(path_prefix, &content_id.to_string()),
            archive_name: paths::archive_file_name(original_filename),
            content_id,
            staging,
        })
    }

    pub fn staging_dir(&self) -> &Path {
        self.staging.path()
    }

    /// Where the inbound archive is persisted
    pub fn archive_path(&self) -> PathBuf {
        self.staging.path().join(&self.archive_name)
    }

    /// Where the archive is expanded
    pub fn content_dir(&self) -> PathBuf {
        self.staging.path().join(paths::CONTENT_DIR)
    }

    /// Remove the staging directory, logging rather than returning failures
    pub async fn cleanup(self) {
        let content_id = self.content_id;
        let staging = self.staging.path().to_path_buf();
        let closed = tokio::task::spawn_blocking(move || self.staging.close())
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
            .and_then(|result| result);
        if let Err(e) = closed {
            warn!(
                content_id = %content_id,
                staging = %staging.display(),
                error = %e,
                "Failed to remove staging directory"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stage_creates_unique_directories() {
        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path().join("staging");

        let a = ImportJob::stage(&root, "h5p-content", "quiz.h5p").await.unwrap();
        let b = ImportJob::stage(&root, "h5p-content", "quiz.h5p").await.unwrap();

        assert_ne!(a.content_id, b.content_id);
        assert_ne!(a.staging_dir(), b.staging_dir());
        assert!(a.staging_dir().starts_with(&root));
        assert_eq!(a.remote_root, format!("h5p-content/{}", a.content_id));
        assert_eq!(a.archive_path(), a.staging_dir().join("quiz.h5p"));
        assert_eq!(a.content_dir(), a.staging_dir().join("content"));
    }

    #[tokio::test]
    async fn test_cleanup_removes_staging() {
        let temp = tempfile::TempDir::new().unwrap();
        let job = ImportJob::stage(temp.path(), "p", "x.h5p").await.unwrap();
        let dir = job.staging_dir().to_path_buf();
        std::fs::write(job.archive_path(), b"zip").unwrap();

        job.cleanup().await;
        assert!(!dir.exists());
    }
}
