//! Metadata records and the actors that own them.
//!
//! A record is the host's durable handle on an imported package. Package
//! records carry a [`PackageExtra`] under the `h5p` key of their extra map,
//! pointing at the stored archive and asset tree.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Record type tag for imported packages
pub const PACKAGE_RECORD_TYPE: &str = "h5p";

/// Key of the package extra inside a record's extra map
pub const PACKAGE_EXTRA_KEY: &str = "h5p";

/// Content identifier minted per import (and per copy)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(Uuid);

impl ContentId {
    /// Generate a fresh, unique identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The member performing an operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Permission levels, ordered from weakest to strongest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    Read,
    Write,
    Admin,
}

impl std::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionLevel::Read => write!(f, "read"),
            PermissionLevel::Write => write!(f, "write"),
            PermissionLevel::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for PermissionLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "read" => Ok(PermissionLevel::Read),
            "write" => Ok(PermissionLevel::Write),
            "admin" => Ok(PermissionLevel::Admin),
            _ => anyhow::bail!("Unknown permission level: {}", s),
        }
    }
}

/// Storage locations of a package, relative to the configured path prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageExtra {
    pub content_id: String,

    /// `<content-id>/<archive-name>`
    pub h5p_file_path: String,

    /// `<content-id>/content`
    pub content_file_path: String,
}

/// Fields supplied when creating a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl NewRecord {
    /// Metadata for a freshly imported package
    pub fn package(name: impl Into<String>, extra: &PackageExtra) -> Self {
        let mut map = Map::new();
        map.insert(
            PACKAGE_EXTRA_KEY.to_string(),
            serde_json::to_value(extra).unwrap_or(Value::Null),
        );
        Self {
            name: name.into(),
            kind: PACKAGE_RECORD_TYPE.to_string(),
            extra: map,
        }
    }
}

/// A persisted metadata record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,

    pub name: String,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub extra: Map<String, Value>,

    /// Containing record, if any
    #[serde(default)]
    pub parent_id: Option<String>,

    /// Actor that created the record (implicitly admin)
    pub creator: String,

    /// Explicit grants, actor id -> level
    #[serde(default)]
    pub memberships: BTreeMap<String, PermissionLevel>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Build a record from creation metadata
    pub fn new(metadata: NewRecord, creator: &Actor, parent_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: metadata.name,
            kind: metadata.kind,
            extra: metadata.extra,
            parent_id,
            creator: creator.id.clone(),
            memberships: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this record represents an imported package
    pub fn is_package(&self) -> bool {
        self.kind == PACKAGE_RECORD_TYPE
    }

    /// The package extra, if present and well-formed
    pub fn package_extra(&self) -> Option<PackageExtra> {
        self.extra
            .get(PACKAGE_EXTRA_KEY)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Replace the package extra
    pub fn set_package_extra(&mut self, extra: &PackageExtra) {
        if let Ok(value) = serde_json::to_value(extra) {
            self.extra.insert(PACKAGE_EXTRA_KEY.to_string(), value);
        }
    }

    /// Level granted to an actor directly on this record
    pub fn direct_permission(&self, actor: &Actor) -> Option<PermissionLevel> {
        if self.creator == actor.id {
            return Some(PermissionLevel::Admin);
        }
        self.memberships.get(&actor.id).copied()
    }
}
