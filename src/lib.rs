//! h5p-import - H5P package import pipeline
//!
//! Ingests uploaded H5P packages (zip archives with an `h5p.json` manifest
//! and media assets), validates them, places their contents in an object
//! store and registers a metadata record pointing at the stored files.
//!
//! # Architecture
//!
//! An import is a strictly ordered transaction:
//! - PermissionCheck, Stage, Extract, Validate, Upload, RecordCreate
//! - The local staging directory is removed on every exit path
//! - A failure after upload began deletes the partially stored package
//!
//! Record copy and delete events are observed by lifecycle hooks that keep
//! the stored package in step with its record.
//!
//! # Modules
//!
//! - `adapters`: Object stores (local, remote) and archive extraction
//! - `core`: Import transaction, upload orchestrator, lifecycle hooks
//! - `domain`: Data structures (Manifest, Record, ImportJob)
//! - `records`: Record store capability and the JSON catalog
//! - `validation`: Manifest schema and extension allow-list
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Import a package
//! h5p-import import accordion.h5p
//!
//! # Duplicate it, then delete the original
//! h5p-import copy <record-id>
//! h5p-import delete <record-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod records;
pub mod validation;

// Re-export main types at crate root for convenience
pub use adapters::{ArchiveExtractor, LocalObjectStore, ObjectStore, RemoteObjectStore, ZipExtractor};
pub use config::{Settings, StorageConfig};
pub use core::{DownloadError, HookError, ImportError, Importer, PackageHooks, UploadOrchestrator};
pub use domain::{Actor, Manifest, PackageExtra, PermissionLevel, Record};
pub use records::{CatalogRecordStore, RecordHook, RecordStore};
pub use validation::{ManifestValidator, ValidationError};
