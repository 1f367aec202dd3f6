//! Core import logic.
//!
//! This module contains:
//! - Importer: the import transaction
//! - UploadOrchestrator: recursive, bounded-concurrency tree upload
//! - PackageHooks: storage handlers for record copy and delete
//! - paths: the storage key convention

pub mod hooks;
pub mod importer;
pub mod paths;
pub mod upload;

// Re-export commonly used types
pub use hooks::{HookError, PackageHooks, COPY_NAME_SUFFIX};
pub use importer::{DownloadError, ImportError, Importer};
pub use upload::UploadOrchestrator;
