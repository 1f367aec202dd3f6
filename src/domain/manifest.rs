//! Typed view of an `h5p.json` package manifest.
//!
//! Field names follow the H5P json file definitions
//! (<https://h5p.org/documentation/developers/json-file-definitions>).
//! Undeclared properties are preserved in [`Manifest::extra`] so a validated
//! manifest can be serialized back without loss.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A structurally valid `h5p.json` manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Display title of the content
    pub title: String,

    /// Machine name of the library initialised with the content data
    pub main_library: String,

    /// ISO-639-1 code, or "und" for language neutral content
    pub language: String,

    /// Libraries that must be preloaded; always includes the main library
    pub preloaded_dependencies: Vec<LibraryDependency>,

    /// Allowed embedding methods (one or both of div / iframe)
    pub embed_types: Vec<EmbedType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<Author>>,

    /// URL of the licensed material
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_extras: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_from: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_to: Option<String>,

    /// Changelog entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<Vec<ChangeLogEntry>>,

    /// Editor-facing comments, never published with the copyright info
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_comments: Option<String>,

    /// Any other property present in the document
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Manifest {
    /// Whether the main library is listed among the preloaded dependencies
    pub fn declares_main_library(&self) -> bool {
        self.preloaded_dependencies
            .iter()
            .any(|dep| dep.machine_name == self.main_library)
    }
}

/// A library reference in `preloadedDependencies`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryDependency {
    pub machine_name: String,
    pub major_version: LibraryVersion,
    pub minor_version: LibraryVersion,
}

/// Library versions appear both as numbers and as numeric strings in the wild.
///
/// Any JSON number is kept as written (`1.0` stays `1.0`), matching what the
/// schema's `integer` type accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LibraryVersion {
    Number(serde_json::Number),
    Text(String),
}

impl From<u64> for LibraryVersion {
    fn from(n: u64) -> Self {
        LibraryVersion::Number(n.into())
    }
}

impl std::fmt::Display for LibraryVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryVersion::Number(n) => write!(f, "{}", n),
            LibraryVersion::Text(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedType {
    Div,
    Iframe,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub role: AuthorRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorRole {
    Author,
    Editor,
    Licensee,
    Originator,
}

/// License codes recognised by H5P
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum License {
    #[serde(rename = "CC-BY")]
    CcBy,
    #[serde(rename = "CC BY-SA")]
    CcBySa,
    #[serde(rename = "CC BY-ND")]
    CcByNd,
    #[serde(rename = "CC BY-NC")]
    CcByNc,
    #[serde(rename = "CC BY-NC-SA")]
    CcByNcSa,
    #[serde(rename = "CC CC-BY-NC-CD")]
    CcByNcCd,
    #[serde(rename = "CC0 1.0")]
    Cc0,
    #[serde(rename = "GNU GPL")]
    GnuGpl,
    #[serde(rename = "PD")]
    PublicDomain,
    #[serde(rename = "ODC PDDL")]
    OdcPddl,
    #[serde(rename = "CC PDM")]
    CcPdm,
    #[serde(rename = "C")]
    Copyright,
    /// Undisclosed
    #[serde(rename = "U")]
    Undisclosed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub date: String,
    pub author: String,
    pub log: String,
}
