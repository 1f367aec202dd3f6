//! Domain types for the import pipeline.
//!
//! This module contains the core data structures:
//! - Manifest: the package's self-describing `h5p.json`
//! - Record: the host's metadata record and its package extra
//! - ImportJob: per-request staging state

pub mod job;
pub mod manifest;
pub mod record;

// Re-export commonly used types
pub use job::ImportJob;
pub use manifest::{EmbedType, LibraryDependency, LibraryVersion, Manifest};
pub use record::{
    Actor, ContentId, NewRecord, PackageExtra, PermissionLevel, Record, PACKAGE_EXTRA_KEY,
    PACKAGE_RECORD_TYPE,
};
