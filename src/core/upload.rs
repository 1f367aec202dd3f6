//! Recursive upload of an extracted package tree.
//!
//! Siblings are dispatched together and awaited jointly; descending into a
//! subdirectory never waits behind sibling uploads. Actual transfers are
//! gated by a semaphore so a package with thousands of assets cannot open
//! thousands of simultaneous uploads. Directory walking holds no permit.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture, FutureExt};
use tokio::fs::{self, File};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::paths;
use crate::adapters::{ObjectStore, StorageError, StorageResult, DEFAULT_MIME_TYPE};
use crate::domain::Actor;
use crate::validation::is_extension_allowed;

/// Walks a local directory and uploads every allowed file
#[derive(Clone)]
pub struct UploadOrchestrator {
    store: Arc<dyn ObjectStore>,
    permits: Arc<Semaphore>,
}

impl UploadOrchestrator {
    /// Create an orchestrator allowing at most `max_concurrent` uploads in flight
    pub fn new(store: Arc<dyn ObjectStore>, max_concurrent: usize) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Upload the tree below `source_dir` to `target_root`, preserving layout.
    ///
    /// Returns the storage keys written. Disallowed extensions are skipped
    /// silently. Any failure fails the whole call; objects already written
    /// are left for the caller to clean up.
    pub async fn upload(
        &self,
        source_dir: &Path,
        target_root: &str,
        actor: &Actor,
    ) -> StorageResult<BTreeSet<String>> {
        let uploaded = self
            .upload_dir(source_dir.to_path_buf(), target_root.to_string(), actor)
            .await?;

        debug!(
            source = %source_dir.display(),
            target_root,
            files = uploaded.len(),
            "Uploaded tree"
        );
        Ok(uploaded)
    }

    fn upload_dir<'a>(
        &'a self,
        dir: PathBuf,
        target: String,
        actor: &'a Actor,
    ) -> BoxFuture<'a, StorageResult<BTreeSet<String>>> {
        async move {
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| StorageError::io(&dir, e))?;

            let mut tasks: Vec<BoxFuture<'a, StorageResult<BTreeSet<String>>>> = Vec::new();

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::io(&dir, e))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StorageError::io(&path, e))?;

                let name = match entry.file_name().to_str() {
                    Some(name) => name.to_string(),
                    None => {
                        warn!(path = %path.display(), "Skipping entry with non UTF-8 name");
                        continue;
                    }
                };
                let key = paths::join_key(&target, &name);

                if file_type.is_dir() {
                    tasks.push(self.upload_dir(path, key, actor));
                } else if file_type.is_file() {
                    let allowed = path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .map(is_extension_allowed)
                        .unwrap_or(false);

                    if allowed {
                        tasks.push(
                            self.upload_file(path, key, actor)
                                .map(|result| result.map(|key| BTreeSet::from([key])))
                                .boxed(),
                        );
                    } else {
                        debug!(path = %path.display(), "Skipping disallowed extension");
                    }
                } else {
                    debug!(path = %path.display(), "Skipping special file");
                }
            }

            let results = try_join_all(tasks).await?;
            Ok(results.into_iter().flatten().collect())
        }
        .boxed()
    }

    async fn upload_file(&self, path: PathBuf, key: String, actor: &Actor) -> StorageResult<String> {
        let size = fs::metadata(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))?
            .len();
        let mime_type = mime_guess::from_path(&path)
            .first_raw()
            .unwrap_or(DEFAULT_MIME_TYPE);

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| StorageError::Backend {
                backend: self.store.name().to_string(),
                message: e.to_string(),
            })?;

        let file = File::open(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        self.store
            .upload(&key, Box::new(file), mime_type, size, actor)
            .await?;

        Ok(key)
    }
}
