//! Metadata record capability.
//!
//! The import pipeline creates records through [`RecordStore`]; lifecycle
//! handlers subscribe to record deletion and copying through [`RecordHook`].

pub mod catalog;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Actor, NewRecord, PermissionLevel, Record};

pub use catalog::CatalogRecordStore;

/// Error type returned by hook handlers
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for record operations
pub type RecordResult<T> = Result<T, RecordError>;

/// Errors raised by record stores
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Actor '{actor}' lacks {level} permission on record {record_id}")]
    PermissionDenied {
        actor: String,
        record_id: String,
        level: PermissionLevel,
    },

    #[error("{event} hook failed: {source}")]
    Hook {
        event: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("Catalog I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RecordError {
    /// Stable error code for hosts
    pub fn code(&self) -> &'static str {
        match self {
            RecordError::NotFound(_) => "GPH5PERR002",
            RecordError::PermissionDenied { .. } => "PERMISSION_DENIED",
            RecordError::Hook { .. } => "HOOK_FAILED",
            RecordError::Io(_) | RecordError::Serialization(_) => "RECORD_STORE_ERROR",
        }
    }

    /// HTTP-equivalent status
    pub fn status_code(&self) -> u16 {
        match self {
            RecordError::NotFound(_) => 404,
            RecordError::PermissionDenied { .. } => 403,
            _ => 500,
        }
    }
}

/// Observer of record lifecycle events.
///
/// `on_copy` runs before the copy is persisted and may rewrite it; an
/// error aborts the copy. `on_delete` runs after the record is removed.
#[async_trait]
pub trait RecordHook: Send + Sync {
    async fn on_copy(&self, _copy: &mut Record, _actor: &Actor) -> Result<(), BoxError> {
        Ok(())
    }

    async fn on_delete(&self, _record: &Record, _actor: &Actor) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Metadata record store
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a record the actor can at least read
    async fn get_record(&self, actor: &Actor, id: &str) -> RecordResult<Record>;

    /// Whether the actor holds `level` (or stronger) on the record
    async fn check_permission(
        &self,
        actor: &Actor,
        record: &Record,
        level: PermissionLevel,
    ) -> RecordResult<bool>;

    /// Create a record, optionally below a parent the actor can write to
    async fn create_record(
        &self,
        actor: &Actor,
        metadata: NewRecord,
        parent_id: Option<&str>,
    ) -> RecordResult<Record>;

    /// Duplicate a record and its descendants, running copy hooks on each
    /// duplicate. Returns the copy of the requested record.
    async fn copy_record(
        &self,
        actor: &Actor,
        id: &str,
        parent_id: Option<&str>,
    ) -> RecordResult<Record>;

    /// Remove a record and its descendants, then run delete hooks
    async fn delete_record(&self, actor: &Actor, id: &str) -> RecordResult<Record>;

    /// Subscribe a handler to copy and delete events
    fn register_hook(&self, hook: Arc<dyn RecordHook>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(RecordError::NotFound("x".into()).code(), "GPH5PERR002");
        assert_eq!(RecordError::NotFound("x".into()).status_code(), 404);

        let denied = RecordError::PermissionDenied {
            actor: "bob".into(),
            record_id: "r1".into(),
            level: PermissionLevel::Write,
        };
        assert_eq!(denied.status_code(), 403);
        assert_eq!(
            denied.to_string(),
            "Actor 'bob' lacks write permission on record r1"
        );
    }
}
