//! Adapter interfaces for external systems.
//!
//! - [`ObjectStore`]: where package files live (local disk or a remote
//!   object gateway), chosen once at construction by [`build_object_store`]
//! - [`ArchiveExtractor`]: expands an uploaded archive on local disk

pub mod archive;
pub mod local;
pub mod remote;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::config::StorageConfig;
use crate::domain::Actor;

pub use archive::{ArchiveExtractor, ExtractError, ZipExtractor};
pub use local::LocalObjectStore;
pub use remote::RemoteObjectStore;

/// MIME type used when the extension is unknown
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Byte stream handed to and returned from object stores
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by object stores
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Object gateway returned {status} for {path}: {message}")]
    Http {
        status: u16,
        path: String,
        message: String,
    },

    #[error("Object gateway request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{backend} backend error: {message}")]
    Backend { backend: String, message: String },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Storage capability used by the import pipeline and lifecycle hooks.
///
/// Paths are logical `/`-separated keys. Deleting a missing folder succeeds.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Store `size` bytes read from `body` at `path`
    async fn upload(
        &self,
        path: &str,
        body: ByteStream,
        mime_type: &str,
        size: u64,
        actor: &Actor,
    ) -> StorageResult<()>;

    /// Open the object at `path` for reading
    async fn download(&self, path: &str, actor: &Actor) -> StorageResult<ByteStream>;

    /// Copy a single object
    async fn copy_file(&self, from: &str, to: &str, actor: &Actor) -> StorageResult<()>;

    /// Copy every object below `from` to the same relative key below `to`
    async fn copy_folder(&self, from: &str, to: &str, actor: &Actor) -> StorageResult<()>;

    /// Remove every object below `path`
    async fn delete_folder(&self, path: &str, actor: &Actor) -> StorageResult<()>;
}

/// Build the configured storage backend
pub fn build_object_store(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    match config {
        StorageConfig::Local { root } => Ok(Arc::new(LocalObjectStore::new(root.clone()))),
        StorageConfig::Remote { endpoint, token } => Ok(Arc::new(RemoteObjectStore::new(
            endpoint.clone(),
            token.clone(),
        )?)),
    }
}
