//! Storage side of record lifecycle events.
//!
//! Keeps each package record's Stored Package in step with the record:
//! deleting a record deletes its remote root, copying a record duplicates
//! the archive and asset tree under a fresh content id.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::paths;
use crate::adapters::{ObjectStore, StorageError};
use crate::domain::{Actor, ContentId, PackageExtra, Record};
use crate::records::{BoxError, RecordHook, RecordStore};

/// Appended to the base name of a copied package
pub const COPY_NAME_SUFFIX: &str = " (copy)";

#[derive(Debug, Error)]
pub enum HookError {
    #[error("Package record {record_id} is missing its storage extra")]
    MissingExtra { record_id: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl HookError {
    pub fn code(&self) -> &'static str {
        match self {
            HookError::MissingExtra { .. } => "GPH5PERR003",
            HookError::Storage(_) => "STORAGE_ERROR",
        }
    }

    pub fn status_code(&self) -> u16 {
        500
    }
}

/// Lifecycle handlers for package records
pub struct PackageHooks {
    store: Arc<dyn ObjectStore>,
    path_prefix: String,
    name_max_length: usize,
}

impl PackageHooks {
    pub fn new(store: Arc<dyn ObjectStore>, path_prefix: impl Into<String>, name_max_length: usize) -> Self {
        Self {
            store,
            path_prefix: path_prefix.into(),
            name_max_length,
        }
    }

    /// Subscribe these handlers to a record store
    pub fn register(self: Arc<Self>, records: &dyn RecordStore) {
        records.register_hook(self);
    }

    fn extra_of(record: &Record) -> Result<PackageExtra, HookError> {
        record.package_extra().ok_or_else(|| HookError::MissingExtra {
            record_id: record.id.clone(),
        })
    }

    /// Remove the Stored Package of a deleted record
    #[instrument(skip(self, record, actor), fields(record_id = %record.id))]
    pub async fn handle_delete(&self, record: &Record, actor: &Actor) -> Result<(), HookError> {
        if !record.is_package() {
            return Ok(());
        }

        let extra = Self::extra_of(record)?;
        let root = paths::root_path(&self.path_prefix, &extra.content_id);
        self.store.delete_folder(&root, actor).await?;

        info!(root = %root, "Deleted stored package");
        Ok(())
    }

    /// Duplicate the Stored Package for a record copy and repoint the copy at it.
    ///
    /// `copy` still carries the source's extra on entry. Both storage copies
    /// must succeed before the record is touched.
    #[instrument(skip(self, copy, actor), fields(record_id = %copy.id))]
    pub async fn handle_copy(&self, copy: &mut Record, actor: &Actor) -> Result<(), HookError> {
        if !copy.is_package() {
            return Ok(());
        }

        let source = Self::extra_of(copy)?;
        let content_id = ContentId::new().to_string();
        let archive_name = paths::key_file_name(&source.h5p_file_path).to_string();

        let target = PackageExtra {
            h5p_file_path: paths::join_key(&content_id, &archive_name),
            content_file_path: paths::content_path(&content_id),
            content_id,
        };

        let from_archive = paths::join_key(&self.path_prefix, &source.h5p_file_path);
        let to_archive = paths::join_key(&self.path_prefix, &target.h5p_file_path);
        let from_content = paths::join_key(&self.path_prefix, &source.content_file_path);
        let to_content = paths::join_key(&self.path_prefix, &target.content_file_path);

        let copied = tokio::try_join!(
            self.store.copy_file(&from_archive, &to_archive, actor),
            self.store.copy_folder(&from_content, &to_content, actor),
        );

        if let Err(e) = copied {
            // One side may have landed before the other failed
            let root = paths::root_path(&self.path_prefix, &target.content_id);
            if let Err(cleanup) = self.store.delete_folder(&root, actor).await {
                warn!(root = %root, error = %cleanup, "Failed to remove partial package copy");
            }
            return Err(e.into());
        }

        copy.name = paths::duplicate_name(&copy.name, COPY_NAME_SUFFIX, self.name_max_length);
        copy.set_package_extra(&target);

        info!(
            from = %source.content_id,
            to = %target.content_id,
            name = %copy.name,
            "Copied stored package"
        );
        Ok(())
    }
}

#[async_trait]
impl RecordHook for PackageHooks {
    async fn on_copy(&self, copy: &mut Record, actor: &Actor) -> Result<(), BoxError> {
        Ok(self.handle_copy(copy, actor).await?)
    }

    async fn on_delete(&self, record: &Record, actor: &Actor) -> Result<(), BoxError> {
        Ok(self.handle_delete(record, actor).await?)
    }
}
