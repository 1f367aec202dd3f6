//! The import transaction.
//!
//! ```text
//! PermissionCheck -> Stage -> Extract -> Validate -> Upload -> RecordCreate -> Done
//!                                                      |            |
//!                                                      +-> Compensate (delete remote root)
//! ```
//!
//! Each stage runs only after the previous one succeeded. The staging
//! directory is removed on every exit path once it exists. A failure after
//! upload has started deletes the partially written remote root before the
//! error is returned; a failing compensation is logged and never replaces
//! the original error.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter};
use tracing::{debug, error, info, instrument, warn};

use super::paths;
use super::upload::UploadOrchestrator;
use crate::adapters::{ArchiveExtractor, ExtractError, ObjectStore, StorageError};
use crate::config::Settings;
use crate::domain::{Actor, ImportJob, NewRecord, PackageExtra, PermissionLevel, Record};
use crate::records::{RecordError, RecordStore};
use crate::validation::{ManifestValidator, ValidationError};

/// Errors that end an import
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Actor '{actor}' lacks write permission on {parent_id}")]
    PermissionDenied { actor: String, parent_id: String },

    #[error("Parent record not found: {0}")]
    ParentNotFound(String),

    #[error("Permission check failed: {0}")]
    PermissionCheckFailed(#[source] RecordError),

    #[error("Failed to create staging directory: {0}")]
    Stage(#[source] std::io::Error),

    #[error("Archive exceeds the limit of {limit} bytes")]
    ArchiveTooLarge { limit: u64 },

    #[error("Extraction failed: {0}")]
    ExtractionFailed(#[from] ExtractError),

    #[error("Invalid package: {0}")]
    InvalidPackage(#[from] ValidationError),

    #[error("Upload failed: {0}")]
    UploadFailed(#[source] StorageError),

    #[error("Record creation failed: {0}")]
    RecordCreateFailed(#[source] RecordError),
}

impl ImportError {
    /// Stable error code for hosts
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::InvalidPackage(_) => "GPH5PERR001",
            ImportError::ParentNotFound(_) => "GPH5PERR002",
            ImportError::PermissionDenied { .. } => "PERMISSION_DENIED",
            ImportError::PermissionCheckFailed(_) => "PERMISSION_CHECK_FAILED",
            ImportError::Stage(_) => "STAGE_FAILED",
            ImportError::ArchiveTooLarge { .. } => "ARCHIVE_TOO_LARGE",
            ImportError::ExtractionFailed(_) => "EXTRACTION_FAILED",
            ImportError::UploadFailed(_) => "UPLOAD_FAILED",
            ImportError::RecordCreateFailed(_) => "RECORD_CREATE_FAILED",
        }
    }

    /// HTTP-equivalent status
    pub fn status_code(&self) -> u16 {
        match self {
            ImportError::InvalidPackage(_) => 400,
            ImportError::PermissionDenied { .. } => 403,
            ImportError::ParentNotFound(_) => 404,
            ImportError::ArchiveTooLarge { .. } => 413,
            _ => 500,
        }
    }
}

/// Errors raised while fetching a stored archive
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Record {record_id} has no package extra")]
    MissingExtra { record_id: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    pub fn code(&self) -> &'static str {
        match self {
            DownloadError::MissingExtra { .. } => "GPH5PERR003",
            DownloadError::Storage(StorageError::NotFound(_)) => "GPH5PERR002",
            DownloadError::Storage(_) => "STORAGE_ERROR",
            DownloadError::Io(_) => "IO_ERROR",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            DownloadError::Storage(StorageError::NotFound(_)) => 404,
            _ => 500,
        }
    }
}

/// Imports packages into the object store and registers their records
pub struct Importer {
    settings: Settings,
    store: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
    extractor: Arc<dyn ArchiveExtractor>,
    validator: ManifestValidator,
    uploader: UploadOrchestrator,
}

impl Importer {
    pub fn new(
        settings: Settings,
        store: Arc<dyn ObjectStore>,
        records: Arc<dyn RecordStore>,
        extractor: Arc<dyn ArchiveExtractor>,
        validator: ManifestValidator,
    ) -> Self {
        let uploader = UploadOrchestrator::new(store.clone(), settings.max_concurrent_uploads);
        Self {
            settings,
            store,
            records,
            extractor,
            validator,
            uploader,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Import one package archive read from `archive`.
    ///
    /// Every call mints a new content id, so importing the same archive
    /// twice yields two independent packages and records.
    #[instrument(
        name = "import",
        skip(self, archive, actor),
        fields(actor = %actor.id, filename = original_filename, content_id)
    )]
    pub async fn import_package<R>(
        &self,
        archive: R,
        original_filename: &str,
        actor: &Actor,
        parent_id: Option<&str>,
    ) -> Result<Record, ImportError>
    where
        R: AsyncRead + Unpin + Send,
    {
        if let Some(parent_id) = parent_id {
            self.check_parent(actor, parent_id).await?;
        }

        let job = ImportJob::stage(
            &self.settings.staging_dir,
            &self.settings.path_prefix,
            original_filename,
        )
        .await
        .map_err(ImportError::Stage)?;
        tracing::Span::current().record("content_id", tracing::field::display(job.content_id));

        let result = self
            .run(&job, archive, original_filename, actor, parent_id)
            .await;
        job.cleanup().await;

        match &result {
            Ok(record) => info!(record_id = %record.id, "Imported package"),
            Err(e) => warn!(code = e.code(), error = %e, "Import failed"),
        }
        result
    }

    async fn check_parent(&self, actor: &Actor, parent_id: &str) -> Result<(), ImportError> {
        let denied = || ImportError::PermissionDenied {
            actor: actor.id.clone(),
            parent_id: parent_id.to_string(),
        };

        let parent = match self.records.get_record(actor, parent_id).await {
            Ok(parent) => parent,
            Err(RecordError::NotFound(_)) => {
                return Err(ImportError::ParentNotFound(parent_id.to_string()))
            }
            Err(RecordError::PermissionDenied { .. }) => return Err(denied()),
            Err(e) => return Err(ImportError::PermissionCheckFailed(e)),
        };

        let allowed = self
            .records
            .check_permission(actor, &parent, PermissionLevel::Write)
            .await
            .map_err(ImportError::PermissionCheckFailed)?;
        if !allowed {
            return Err(denied());
        }
        Ok(())
    }

    async fn run<R>(
        &self,
        job: &ImportJob,
        archive: R,
        original_filename: &str,
        actor: &Actor,
        parent_id: Option<&str>,
    ) -> Result<Record, ImportError>
    where
        R: AsyncRead + Unpin + Send,
    {
        // Extract
        let archive_path = job.archive_path();
        let bytes = persist_archive(archive, &archive_path, self.settings.max_archive_bytes).await?;
        self.extractor
            .extract(&archive_path, &job.content_dir())
            .await?;
        debug!(bytes, "Archive extracted");

        // Validate
        let manifest = self.validator.validate_package(&job.content_dir()).await?;
        debug!(title = %manifest.title, main_library = %manifest.main_library, "Package is valid");

        // Upload
        let uploaded = match self
            .uploader
            .upload(job.staging_dir(), &job.remote_root, actor)
            .await
        {
            Ok(uploaded) => uploaded,
            Err(e) => {
                self.compensate(job, actor).await;
                return Err(ImportError::UploadFailed(e));
            }
        };
        debug!(files = uploaded.len(), remote_root = %job.remote_root, "Package uploaded");

        // RecordCreate
        let content_id = job.content_id.to_string();
        let extra = PackageExtra {
            h5p_file_path: paths::join_key(&content_id, &job.archive_name),
            content_file_path: paths::content_path(&content_id),
            content_id,
        };
        let name = paths::truncate_name(original_filename, self.settings.name_max_length);

        match self
            .records
            .create_record(actor, NewRecord::package(name, &extra), parent_id)
            .await
        {
            Ok(record) => Ok(record),
            Err(e) => {
                self.compensate(job, actor).await;
                Err(ImportError::RecordCreateFailed(e))
            }
        }
    }

    /// Best-effort removal of everything uploaded for this job
    async fn compensate(&self, job: &ImportJob, actor: &Actor) {
        match self.store.delete_folder(&job.remote_root, actor).await {
            Ok(()) => info!(remote_root = %job.remote_root, "Removed partially imported package"),
            Err(e) => error!(
                remote_root = %job.remote_root,
                error = %e,
                "Failed to remove partially imported package"
            ),
        }
    }

    /// Write the stored archive of a package record to `dest`
    #[instrument(skip(self, record, dest, actor), fields(record_id = %record.id, dest = %dest.display()))]
    pub async fn download_archive(
        &self,
        record: &Record,
        dest: &Path,
        actor: &Actor,
    ) -> Result<u64, DownloadError> {
        let extra = record
            .package_extra()
            .ok_or_else(|| DownloadError::MissingExtra {
                record_id: record.id.clone(),
            })?;
        let key = paths::join_key(&self.settings.path_prefix, &extra.h5p_file_path);

        let mut stream = self.store.download(&key, actor).await?;

        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let mut writer = BufWriter::new(File::create(dest).await?);
        let bytes = tokio::io::copy(&mut stream, &mut writer).await?;
        writer.flush().await?;

        info!(bytes, key = %key, "Downloaded archive");
        Ok(bytes)
    }
}

/// Persist the inbound archive, refusing streams longer than `limit` bytes
async fn persist_archive<R>(archive: R, dest: &Path, limit: u64) -> Result<u64, ImportError>
where
    R: AsyncRead + Unpin + Send,
{
    let file = File::create(dest).await.map_err(ExtractError::Io)?;
    let mut writer = BufWriter::new(file);
    let mut limited = archive.take(limit.saturating_add(1));

    let written = tokio::io::copy(&mut limited, &mut writer)
        .await
        .map_err(ExtractError::Io)?;
    if written > limit {
        return Err(ImportError::ArchiveTooLarge { limit });
    }
    writer.flush().await.map_err(ExtractError::Io)?;

    Ok(written)
}
