//! Local filesystem object store.
//!
//! Keys map onto files below a root directory.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use super::{ByteStream, ObjectStore, StorageError, StorageResult};
use crate::domain::Actor;

/// Object store rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of this store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path below the root, refusing anything that escapes it
    pub fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(key);
        let mut resolved = self.root.clone();
        let mut depth = 0usize;

        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                _ => {
                    return Err(StorageError::InvalidPath {
                        path: key.to_string(),
                        reason: "only relative, non-traversing keys are allowed".to_string(),
                    })
                }
            }
        }

        if depth == 0 {
            return Err(StorageError::InvalidPath {
                path: key.to_string(),
                reason: "key is empty".to_string(),
            });
        }

        Ok(resolved)
    }

    async fn ensure_parent(path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }
        Ok(())
    }

    /// Recursively copy a directory tree
    async fn copy_tree(from: &Path, to: &Path) -> StorageResult<()> {
        let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];

        while let Some((src, dst)) = pending.pop() {
            fs::create_dir_all(&dst)
                .await
                .map_err(|e| StorageError::io(&dst, e))?;

            let mut entries = fs::read_dir(&src)
                .await
                .map_err(|e| StorageError::io(&src, e))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::io(&src, e))?
            {
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StorageError::io(entry.path(), e))?;
                let target = dst.join(entry.file_name());

                if file_type.is_dir() {
                    pending.push((entry.path(), target));
                } else if file_type.is_file() {
                    fs::copy(entry.path(), &target)
                        .await
                        .map_err(|e| StorageError::io(&target, e))?;
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn upload(
        &self,
        path: &str,
        mut body: ByteStream,
        mime_type: &str,
        size: u64,
        actor: &Actor,
    ) -> StorageResult<()> {
        let target = self.resolve(path)?;
        Self::ensure_parent(&target).await?;

        let file = File::create(&target)
            .await
            .map_err(|e| StorageError::io(&target, e))?;
        let mut writer = BufWriter::new(file);
        let written = tokio::io::copy(&mut body, &mut writer)
            .await
            .map_err(|e| StorageError::io(&target, e))?;
        writer
            .flush()
            .await
            .map_err(|e| StorageError::io(&target, e))?;

        if written != size {
            warn!(path, expected = size, written, "Uploaded size differs from declared size");
        }
        debug!(path, mime_type, size = written, actor = %actor.id, "Stored object");

        Ok(())
    }

    async fn download(&self, path: &str, _actor: &Actor) -> StorageResult<ByteStream> {
        let source = self.resolve(path)?;
        match File::open(&source).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(StorageError::io(source, e)),
        }
    }

    async fn copy_file(&self, from: &str, to: &str, _actor: &Actor) -> StorageResult<()> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        Self::ensure_parent(&target).await?;

        match fs::copy(&source, &target).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(from.to_string()))
            }
            Err(e) => Err(StorageError::io(target, e)),
        }
    }

    async fn copy_folder(&self, from: &str, to: &str, _actor: &Actor) -> StorageResult<()> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;

        if !fs::try_exists(&source)
            .await
            .map_err(|e| StorageError::io(&source, e))?
        {
            return Err(StorageError::NotFound(from.to_string()));
        }

        Self::copy_tree(&source, &target).await
    }

    async fn delete_folder(&self, path: &str, actor: &Actor) -> StorageResult<()> {
        let target = self.resolve(path)?;
        match fs::remove_dir_all(&target).await {
            Ok(()) => {
                debug!(path, actor = %actor.id, "Deleted folder");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(target, e)),
        }
    }
}
