//! JSON catalog implementation of the record store.
//!
//! All records live in a single JSON file. Writers hold an exclusive
//! advisory lock on a sibling `.lock` file so separate processes sharing
//! the catalog do not interleave read-modify-write cycles.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{RecordError, RecordHook, RecordResult, RecordStore};
use crate::domain::{Actor, NewRecord, PermissionLevel, Record};

const CATALOG_VERSION: u32 = 1;

/// On-disk catalog layout
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogFile {
    version: u32,
    records: BTreeMap<String, Record>,
}

impl Default for CatalogFile {
    fn default() -> Self {
        Self {
            version: CATALOG_VERSION,
            records: BTreeMap::new(),
        }
    }
}

impl CatalogFile {
    async fn load(path: &Path) -> RecordResult<Self> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, path: &Path) -> RecordResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write then rename so readers never see a torn file
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Strongest level the actor holds on the record or any ancestor
    fn permission(&self, record: &Record, actor: &Actor) -> Option<PermissionLevel> {
        let mut best = record.direct_permission(actor);
        let mut seen = HashSet::new();
        let mut parent = record.parent_id.clone();

        while let Some(id) = parent {
            if !seen.insert(id.clone()) {
                break;
            }
            match self.records.get(&id) {
                Some(ancestor) => {
                    best = best.max(ancestor.direct_permission(actor));
                    parent = ancestor.parent_id.clone();
                }
                None => break,
            }
        }

        best
    }

    fn require(
        &self,
        record: &Record,
        actor: &Actor,
        level: PermissionLevel,
    ) -> RecordResult<()> {
        match self.permission(record, actor) {
            Some(held) if held >= level => Ok(()),
            _ => Err(RecordError::PermissionDenied {
                actor: actor.id.clone(),
                record_id: record.id.clone(),
                level,
            }),
        }
    }

    fn get(&self, id: &str) -> RecordResult<&Record> {
        self.records
            .get(id)
            .ok_or_else(|| RecordError::NotFound(id.to_string()))
    }

    /// Ids of the record and everything below it, parents before children
    fn subtree(&self, id: &str) -> Vec<String> {
        let mut ids = vec![id.to_string()];
        let mut seen: HashSet<String> = ids.iter().cloned().collect();
        let mut i = 0;
        while i < ids.len() {
            let current = ids[i].clone();
            let children: Vec<String> = self
                .records
                .values()
                .filter(|r| r.parent_id.as_deref() == Some(current.as_str()))
                .map(|r| r.id.clone())
                .filter(|child| seen.insert(child.clone()))
                .collect();
            ids.extend(children);
            i += 1;
        }
        ids
    }
}

/// Exclusive lock on the catalog, released when dropped
struct CatalogLock {
    _file: File,
}

impl CatalogLock {
    async fn acquire(lock_path: PathBuf) -> RecordResult<Self> {
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            if let Some(parent) = lock_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&lock_path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;

        Ok(Self { _file: file })
    }
}

/// Record store persisted to a JSON catalog file
pub struct CatalogRecordStore {
    path: PathBuf,
    /// Serializes catalog access within this process
    guard: Mutex<()>,
    hooks: RwLock<Vec<Arc<dyn RecordHook>>>,
}

impl CatalogRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
            hooks: RwLock::new(Vec::new()),
        }
    }

    /// Catalog file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn hooks(&self) -> Vec<Arc<dyn RecordHook>> {
        match self.hooks.read() {
            Ok(hooks) => hooks.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Run `f` against the catalog while holding both locks, saving if it succeeds
    async fn update<T>(
        &self,
        f: impl FnOnce(&mut CatalogFile) -> RecordResult<T>,
    ) -> RecordResult<T> {
        let _guard = self.guard.lock().await;
        let _lock = CatalogLock::acquire(self.lock_path()).await?;

        let mut catalog = CatalogFile::load(&self.path).await?;
        let result = f(&mut catalog)?;
        catalog.save(&self.path).await?;
        Ok(result)
    }

    async fn read(&self) -> RecordResult<CatalogFile> {
        let _guard = self.guard.lock().await;
        CatalogFile::load(&self.path).await
    }

    /// Every record, most recently created first
    pub async fn list(&self) -> RecordResult<Vec<Record>> {
        let catalog = self.read().await?;
        let mut records: Vec<Record> = catalog.records.into_values().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Grant `member` a level on a record the actor administers
    pub async fn grant(
        &self,
        actor: &Actor,
        record_id: &str,
        member: &str,
        level: PermissionLevel,
    ) -> RecordResult<Record> {
        let record = self
            .update(|catalog| {
                let record = catalog.get(record_id)?;
                catalog.require(record, actor, PermissionLevel::Admin)?;

                let record = catalog
                    .records
                    .get_mut(record_id)
                    .ok_or_else(|| RecordError::NotFound(record_id.to_string()))?;
                record.memberships.insert(member.to_string(), level);
                record.updated_at = Utc::now();
                Ok(record.clone())
            })
            .await?;

        info!(record_id, member, %level, "Granted permission");
        Ok(record)
    }

    /// Run delete hooks for copies that will never be persisted
    async fn discard_copies(
        &self,
        copies: &[Record],
        hooks: &[Arc<dyn RecordHook>],
        actor: &Actor,
    ) {
        for copy in copies {
            for hook in hooks {
                if let Err(e) = hook.on_delete(copy, actor).await {
                    warn!(record_id = %copy.id, error = %e, "Failed to discard record copy");
                }
            }
        }
    }
}

#[async_trait]
impl RecordStore for CatalogRecordStore {
    async fn get_record(&self, actor: &Actor, id: &str) -> RecordResult<Record> {
        let catalog = self.read().await?;
        let record = catalog.get(id)?;
        catalog.require(record, actor, PermissionLevel::Read)?;
        Ok(record.clone())
    }

    async fn check_permission(
        &self,
        actor: &Actor,
        record: &Record,
        level: PermissionLevel,
    ) -> RecordResult<bool> {
        let catalog = self.read().await?;
        Ok(catalog
            .permission(record, actor)
            .map(|held| held >= level)
            .unwrap_or(false))
    }

    async fn create_record(
        &self,
        actor: &Actor,
        metadata: NewRecord,
        parent_id: Option<&str>,
    ) -> RecordResult<Record> {
        let record = self
            .update(|catalog| {
                if let Some(parent_id) = parent_id {
                    let parent = catalog.get(parent_id)?;
                    catalog.require(parent, actor, PermissionLevel::Write)?;
                }

                let record = Record::new(metadata, actor, parent_id.map(str::to_string));
                catalog.records.insert(record.id.clone(), record.clone());
                Ok(record)
            })
            .await?;

        debug!(record_id = %record.id, kind = %record.kind, "Created record");
        Ok(record)
    }

    async fn copy_record(
        &self,
        actor: &Actor,
        id: &str,
        parent_id: Option<&str>,
    ) -> RecordResult<Record> {
        let mut copies = {
            let catalog = self.read().await?;
            let source = catalog.get(id)?;
            catalog.require(source, actor, PermissionLevel::Read)?;

            let parent_id = parent_id
                .map(str::to_string)
                .or_else(|| source.parent_id.clone());
            if let Some(ref parent_id) = parent_id {
                let parent = catalog.get(parent_id)?;
                catalog.require(parent, actor, PermissionLevel::Write)?;
            }

            let subtree = catalog.subtree(id);
            let mut fresh_ids: HashMap<&str, String> = HashMap::new();
            let mut copies = Vec::with_capacity(subtree.len());
            let now = Utc::now();

            for source_id in &subtree {
                let source = catalog.get(source_id)?;
                let copy_parent = if source_id == id {
                    parent_id.clone()
                } else {
                    source
                        .parent_id
                        .as_deref()
                        .and_then(|p| fresh_ids.get(p))
                        .cloned()
                };

                let copy_id = Uuid::new_v4().to_string();
                fresh_ids.insert(source_id.as_str(), copy_id.clone());
                copies.push(Record {
                    id: copy_id,
                    parent_id: copy_parent,
                    creator: actor.id.clone(),
                    memberships: BTreeMap::new(),
                    created_at: now,
                    updated_at: now,
                    ..source.clone()
                });
            }
            copies
        };

        let hooks = self.hooks();
        for index in 0..copies.len() {
            for (h, hook) in hooks.iter().enumerate() {
                if let Err(source) = hook.on_copy(&mut copies[index], actor).await {
                    // Undo what earlier hooks already did for this subtree
                    self.discard_copies(&copies[..index], &hooks, actor).await;
                    self.discard_copies(&copies[index..=index], &hooks[..h], actor)
                        .await;
                    return Err(RecordError::Hook {
                        event: "copy",
                        source,
                    });
                }
            }
        }

        let stored = copies.clone();
        self.update(move |catalog| {
            for copy in stored {
                catalog.records.insert(copy.id.clone(), copy);
            }
            Ok(())
        })
        .await?;

        let copied = copies.len();
        let copy = copies
            .into_iter()
            .next()
            .ok_or_else(|| RecordError::NotFound(id.to_string()))?;

        info!(source_id = id, record_id = %copy.id, name = %copy.name, copied, "Copied record");
        Ok(copy)
    }

    async fn delete_record(&self, actor: &Actor, id: &str) -> RecordResult<Record> {
        let removed = self
            .update(|catalog| {
                let record = catalog.get(id)?;
                catalog.require(record, actor, PermissionLevel::Admin)?;

                let ids = catalog.subtree(id);
                Ok(ids
                    .iter()
                    .filter_map(|id| catalog.records.remove(id))
                    .collect::<Vec<_>>())
            })
            .await?;

        let mut first_error = None;
        for record in &removed {
            for hook in self.hooks() {
                if let Err(e) = hook.on_delete(record, actor).await {
                    warn!(record_id = %record.id, error = %e, "Delete hook failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        info!(record_id = id, removed = removed.len(), "Deleted record");

        if let Some(source) = first_error {
            return Err(RecordError::Hook {
                event: "delete",
                source,
            });
        }

        removed
            .into_iter()
            .next()
            .ok_or_else(|| RecordError::NotFound(id.to_string()))
    }

    fn register_hook(&self, hook: Arc<dyn RecordHook>) {
        match self.hooks.write() {
            Ok(mut hooks) => hooks.push(hook),
            Err(poisoned) => poisoned.into_inner().push(hook),
        }
    }
}
