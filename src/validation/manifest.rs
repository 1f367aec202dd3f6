//! Manifest validation for an extracted package.
//!
//! Checks, in order: the manifest exists, parses as JSON without
//! prototype-polluting keys, conforms to the schema, and lists its main
//! library among the preloaded dependencies.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::fs;
use tracing::debug;

use super::schema::{ManifestSchema, SchemaValidator};
use super::ValidationError;
use crate::domain::Manifest;

/// Manifest file name at the package root
pub const MANIFEST_FILE_NAME: &str = "h5p.json";

/// Keys that are refused anywhere in the manifest document
const FORBIDDEN_KEY: &str = "__proto__";
const CONSTRUCTOR_KEY: &str = "constructor";
const PROTOTYPE_KEY: &str = "prototype";

/// Validates extracted packages against the manifest schema
#[derive(Clone)]
pub struct ManifestValidator {
    schema: Arc<dyn SchemaValidator>,
}

impl ManifestValidator {
    /// Create a validator backed by the given schema
    pub fn new(schema: Arc<dyn SchemaValidator>) -> Self {
        Self { schema }
    }

    /// Create a validator using the built-in `h5p.json` schema
    pub fn with_default_schema() -> Result<Self, ValidationError> {
        Ok(Self::new(Arc::new(ManifestSchema::new()?)))
    }

    fn manifest_path(extracted_root: &Path) -> PathBuf {
        extracted_root.join(MANIFEST_FILE_NAME)
    }

    /// Validate the package extracted at `extracted_root`.
    ///
    /// Only reads the manifest file; returns the parsed manifest on success.
    pub async fn validate_package(&self, extracted_root: &Path) -> Result<Manifest, ValidationError> {
        let manifest_path = Self::manifest_path(extracted_root);

        let raw = match fs::read_to_string(&manifest_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(ValidationError::MissingManifest),
            Err(e) => {
                return Err(ValidationError::MalformedManifest(format!(
                    "failed to read {}: {}",
                    MANIFEST_FILE_NAME, e
                )))
            }
        };

        let document = parse_secure_json(&raw).map_err(ValidationError::MalformedManifest)?;

        let errors = self.schema.validate(&document);
        if !errors.is_empty() {
            return Err(ValidationError::SchemaViolation(errors));
        }

        let manifest: Manifest = serde_json::from_value(document)
            .map_err(|e| ValidationError::MalformedManifest(e.to_string()))?;

        if !manifest.declares_main_library() {
            return Err(ValidationError::DanglingMainLibrary {
                main_library: manifest.main_library,
            });
        }

        debug!(
            title = %manifest.title,
            main_library = %manifest.main_library,
            "Manifest is valid"
        );

        Ok(manifest)
    }
}

/// Parse JSON, refusing documents that carry `__proto__` keys or a
/// `constructor.prototype` object anywhere in the tree.
pub fn parse_secure_json(raw: &str) -> Result<Value, String> {
    let value: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    check_keys(&value)?;
    Ok(value)
}

fn check_keys(value: &Value) -> Result<(), String> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key == FORBIDDEN_KEY {
                    return Err(format!("forbidden key '{}'", FORBIDDEN_KEY));
                }
                if key == CONSTRUCTOR_KEY
                    && child
                        .as_object()
                        .map(|c| c.contains_key(PROTOTYPE_KEY))
                        .unwrap_or(false)
                {
                    return Err(format!(
                        "forbidden key '{}.{}'",
                        CONSTRUCTOR_KEY, PROTOTYPE_KEY
                    ));
                }
                check_keys(child)?;
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(check_keys),
        _ => Ok(()),
    }
}
