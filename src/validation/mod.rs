//! Package validation.
//!
//! - `manifest`: locate, parse and check the `h5p.json` manifest
//! - `schema`: the manifest JSON Schema behind a [`SchemaValidator`] seam
//! - `extensions`: which asset files may be stored

pub mod extensions;
pub mod manifest;
pub mod schema;

use thiserror::Error;

pub use extensions::{is_extension_allowed, ALLOWED_FILE_EXTENSIONS};
pub use manifest::{parse_secure_json, ManifestValidator, MANIFEST_FILE_NAME};
pub use schema::{manifest_schema, ManifestSchema, SchemaValidator};

/// Reasons a package is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing h5p.json manifest file")]
    MissingManifest,

    #[error("Invalid h5p.json manifest file: {0}")]
    MalformedManifest(String),

    #[error("Invalid h5p.json manifest file: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),

    #[error("Invalid h5p.json manifest file: main library '{main_library}' not found in preloaded dependencies")]
    DanglingMainLibrary { main_library: String },
}
