//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use h5p_import::adapters::{ByteStream, StorageError, StorageResult};
use h5p_import::domain::{NewRecord, PermissionLevel, Record};
use h5p_import::records::{RecordError, RecordHook, RecordResult};
use h5p_import::{
    Actor, CatalogRecordStore, Importer, LocalObjectStore, ManifestValidator, ObjectStore,
    PackageHooks, RecordStore, Settings, StorageConfig, ZipExtractor,
};

/// Build a zip archive in memory
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

pub fn accordion_manifest() -> Value {
    json!({
        "title": "Accordion",
        "mainLibrary": "H5P.Accordion",
        "language": "und",
        "embedTypes": ["div"],
        "license": "U",
        "preloadedDependencies": [
            { "machineName": "H5P.AdvancedText", "majorVersion": "1", "minorVersion": "1" },
            { "machineName": "H5P.Accordion", "majorVersion": "1", "minorVersion": "0" },
            { "machineName": "FontAwesome", "majorVersion": 4, "minorVersion": 5 }
        ]
    })
}

/// A package with the given manifest plus a mix of allowed and disallowed assets
pub fn package_with_manifest(manifest: &Value) -> Vec<u8> {
    let manifest = manifest.to_string();
    zip_bytes(&[
        ("h5p.json", manifest.as_bytes()),
        ("content/content.json", b"{\"panels\":[]}"),
        ("content/images/a.png", b"\x89PNG"),
        ("H5P.Accordion-1.0/library.json", b"{}"),
        ("H5P.Accordion-1.0/accordion.js", b"console.log(1)"),
        ("content/run.exe", b"MZ"),
    ])
}

pub fn accordion_package() -> Vec<u8> {
    package_with_manifest(&accordion_manifest())
}

/// Files of the accordion package that pass the extension filter, relative to the root
pub fn accordion_stored_files(archive_name: &str) -> BTreeSet<String> {
    [
        archive_name,
        "content/h5p.json",
        "content/content/content.json",
        "content/content/images/a.png",
        "content/H5P.Accordion-1.0/library.json",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Relative paths of every file below `root`
pub fn list_files(root: &Path) -> BTreeSet<String> {
    fn walk(base: &Path, dir: &Path, out: &mut BTreeSet<String>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(base, &path, out);
            } else {
                let relative = path.strip_prefix(base).unwrap();
                out.insert(relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }

    let mut files = BTreeSet::new();
    walk(root, root, &mut files);
    files
}

pub fn alice() -> Actor {
    Actor::new("alice")
}

pub fn bob() -> Actor {
    Actor::new("bob")
}

/// Isolated settings, storage and catalog under one temp dir
pub struct TestEnv {
    pub dir: TempDir,
    pub settings: Settings,
    pub storage: Arc<LocalObjectStore>,
    pub records: Arc<CatalogRecordStore>,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let settings = Settings::with_home(dir.path());
        let root = match &settings.storage {
            StorageConfig::Local { root } => root.clone(),
            StorageConfig::Remote { .. } => unreachable!(),
        };
        let storage = Arc::new(LocalObjectStore::new(root));
        let records = Arc::new(CatalogRecordStore::new(settings.catalog_path.clone()));

        Self {
            dir,
            settings,
            storage,
            records,
        }
    }

    pub fn importer(&self) -> Importer {
        self.importer_with(self.storage.clone(), self.records.clone())
    }

    pub fn importer_with(
        &self,
        store: Arc<dyn ObjectStore>,
        records: Arc<dyn RecordStore>,
    ) -> Importer {
        Importer::new(
            self.settings.clone(),
            store,
            records,
            Arc::new(ZipExtractor::new()),
            ManifestValidator::with_default_schema().unwrap(),
        )
    }

    pub fn register_hooks(&self) {
        Arc::new(PackageHooks::new(
            self.storage.clone(),
            self.settings.path_prefix.clone(),
            self.settings.name_max_length,
        ))
        .register(self.records.as_ref());
    }

    /// Local directory backing `<prefix>/<relative>`
    pub fn stored_path(&self, relative: &str) -> PathBuf {
        self.storage
            .root()
            .join(&self.settings.path_prefix)
            .join(relative)
    }

    /// Files stored below `<prefix>/<content-id>`
    pub fn stored_files(&self, content_id: &str) -> BTreeSet<String> {
        list_files(&self.stored_path(content_id))
    }

    /// Content ids with anything stored
    pub fn stored_roots(&self) -> Vec<String> {
        match std::fs::read_dir(self.storage.root().join(&self.settings.path_prefix)) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Number of leftover staging directories
    pub fn staging_entries(&self) -> usize {
        match std::fs::read_dir(&self.settings.staging_dir) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    pub async fn folder(&self, owner: &Actor, name: &str) -> Record {
        self.records
            .create_record(
                owner,
                NewRecord {
                    name: name.to_string(),
                    kind: "folder".to_string(),
                    extra: Default::default(),
                },
                None,
            )
            .await
            .unwrap()
    }
}

/// Object store wrapper that counts calls and can fail on demand
pub struct CountingStore {
    pub inner: Arc<dyn ObjectStore>,
    pub uploads: AtomicUsize,
    pub deletes: AtomicUsize,
    /// Fail the n-th upload (1-based)
    pub fail_upload_at: Option<usize>,
    pub fail_deletes: bool,
}

impl CountingStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            uploads: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            fail_upload_at: None,
            fail_deletes: false,
        }
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

fn injected(message: &str) -> StorageError {
    StorageError::Backend {
        backend: "counting".to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl ObjectStore for CountingStore {
    fn name(&self) -> &str {
        "counting"
    }

    async fn upload(
        &self,
        path: &str,
        body: ByteStream,
        mime_type: &str,
        size: u64,
        actor: &Actor,
    ) -> StorageResult<()> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_upload_at == Some(n) {
            return Err(injected("upload refused"));
        }
        self.inner.upload(path, body, mime_type, size, actor).await
    }

    async fn download(&self, path: &str, actor: &Actor) -> StorageResult<ByteStream> {
        self.inner.download(path, actor).await
    }

    async fn copy_file(&self, from: &str, to: &str, actor: &Actor) -> StorageResult<()> {
        self.inner.copy_file(from, to, actor).await
    }

    async fn copy_folder(&self, from: &str, to: &str, actor: &Actor) -> StorageResult<()> {
        self.inner.copy_folder(from, to, actor).await
    }

    async fn delete_folder(&self, path: &str, actor: &Actor) -> StorageResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes {
            return Err(injected("delete refused"));
        }
        self.inner.delete_folder(path, actor).await
    }
}

/// Record store whose record creation always fails
pub struct FailingCreateStore {
    pub inner: Arc<CatalogRecordStore>,
}

impl FailingCreateStore {
    pub fn new(inner: Arc<CatalogRecordStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl RecordStore for FailingCreateStore {
    async fn get_record(&self, actor: &Actor, id: &str) -> RecordResult<Record> {
        self.inner.get_record(actor, id).await
    }

    async fn check_permission(
        &self,
        actor: &Actor,
        record: &Record,
        level: PermissionLevel,
    ) -> RecordResult<bool> {
        self.inner.check_permission(actor, record, level).await
    }

    async fn create_record(
        &self,
        _actor: &Actor,
        _metadata: NewRecord,
        _parent_id: Option<&str>,
    ) -> RecordResult<Record> {
        Err(RecordError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "catalog unavailable",
        )))
    }

    async fn copy_record(
        &self,
        actor: &Actor,
        id: &str,
        parent_id: Option<&str>,
    ) -> RecordResult<Record> {
        self.inner.copy_record(actor, id, parent_id).await
    }

    async fn delete_record(&self, actor: &Actor, id: &str) -> RecordResult<Record> {
        self.inner.delete_record(actor, id).await
    }

    fn register_hook(&self, hook: Arc<dyn RecordHook>) {
        self.inner.register_hook(hook)
    }
}
