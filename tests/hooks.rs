//! Lifecycle Hook Integration Tests
//!
//! Copy and delete go through the catalog record store, which drives the
//! registered package hooks.

mod common;

use serde_json::Map;

use common::*;
use h5p_import::core::HookError;
use h5p_import::domain::NewRecord;
use h5p_import::records::RecordError;
use h5p_import::{DownloadError, RecordStore};

#[tokio::test]
async fn test_delete_removes_stored_package() {
    let env = TestEnv::new();
    env.register_hooks();

    let record = env
        .importer()
        .import_package(&accordion_package()[..], "accordion.h5p", &alice(), None)
        .await
        .unwrap();
    let extra = record.package_extra().unwrap();
    assert!(!env.stored_files(&extra.content_id).is_empty());

    env.records.delete_record(&alice(), &record.id).await.unwrap();

    assert!(env.stored_files(&extra.content_id).is_empty());
    assert!(!env.stored_path(&extra.content_id).exists());
    assert!(env.records.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_copy_duplicates_stored_package() {
    let env = TestEnv::new();
    env.register_hooks();

    let original = env
        .importer()
        .import_package(&accordion_package()[..], "accordion.h5p", &alice(), None)
        .await
        .unwrap();
    let source = original.package_extra().unwrap();
    let source_files = env.stored_files(&source.content_id);

    let copy = env
        .records
        .copy_record(&alice(), &original.id, None)
        .await
        .unwrap();
    let target = copy.package_extra().unwrap();

    assert_ne!(copy.id, original.id);
    assert_eq!(copy.name, "accordion (copy).h5p");
    assert_ne!(target.content_id, source.content_id);
    assert_eq!(target.h5p_file_path, format!("{}/accordion.h5p", target.content_id));
    assert_eq!(target.content_file_path, format!("{}/content", target.content_id));

    assert_eq!(env.stored_files(&target.content_id), source_files);
    assert_eq!(env.stored_files(&source.content_id), source_files);

    // The persisted copy carries the rewritten extra
    let stored = env.records.get_record(&alice(), &copy.id).await.unwrap();
    assert_eq!(stored.package_extra(), Some(target.clone()));
    let unchanged = env.records.get_record(&alice(), &original.id).await.unwrap();
    assert_eq!(unchanged, original);

    // Deleting the copy leaves the original package in place
    env.records.delete_record(&alice(), &copy.id).await.unwrap();
    assert!(env.stored_files(&target.content_id).is_empty());
    assert_eq!(env.stored_files(&source.content_id), source_files);
}

#[tokio::test]
async fn test_delete_without_extra_fails_loudly() {
    let env = TestEnv::new();
    env.register_hooks();

    let broken = env
        .records
        .create_record(
            &alice(),
            NewRecord {
                name: "broken.h5p".to_string(),
                kind: "h5p".to_string(),
                extra: Map::new(),
            },
            None,
        )
        .await
        .unwrap();

    let err = env
        .records
        .delete_record(&alice(), &broken.id)
        .await
        .unwrap_err();

    match err {
        RecordError::Hook { event, source } => {
            assert_eq!(event, "delete");
            let hook_error = source.downcast_ref::<HookError>().unwrap();
            assert!(matches!(hook_error, HookError::MissingExtra { .. }));
            assert_eq!(hook_error.code(), "GPH5PERR003");
        }
        other => panic!("expected hook failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_copy_without_extra_is_not_persisted() {
    let env = TestEnv::new();
    env.register_hooks();

    let broken = env
        .records
        .create_record(
            &alice(),
            NewRecord {
                name: "broken.h5p".to_string(),
                kind: "h5p".to_string(),
                extra: Map::new(),
            },
            None,
        )
        .await
        .unwrap();

    let err = env
        .records
        .copy_record(&alice(), &broken.id, None)
        .await
        .unwrap_err();

    assert!(matches!(err, RecordError::Hook { event: "copy", .. }));
    assert_eq!(env.records.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_folder_copy_duplicates_nested_packages() {
    let env = TestEnv::new();
    env.register_hooks();

    let course = env.folder(&alice(), "course").await;
    let original = env
        .importer()
        .import_package(&accordion_package()[..], "accordion.h5p", &alice(), Some(&course.id))
        .await
        .unwrap();
    let source = original.package_extra().unwrap();
    let source_files = env.stored_files(&source.content_id);

    let course_copy = env
        .records
        .copy_record(&alice(), &course.id, None)
        .await
        .unwrap();

    let records = env.records.list().await.unwrap();
    let nested: Vec<_> = records
        .iter()
        .filter(|r| r.parent_id.as_deref() == Some(course_copy.id.as_str()))
        .collect();
    assert_eq!(nested.len(), 1);
    assert_eq!(nested[0].name, "accordion (copy).h5p");

    let target = nested[0].package_extra().unwrap();
    assert_ne!(target.content_id, source.content_id);
    assert_eq!(env.stored_files(&target.content_id), source_files);
    assert_eq!(env.stored_roots().len(), 2);

    // Deleting the folder copy removes the nested package copy only
    env.records
        .delete_record(&alice(), &course_copy.id)
        .await
        .unwrap();
    assert!(env.stored_files(&target.content_id).is_empty());
    assert_eq!(env.stored_files(&source.content_id), source_files);
}

#[tokio::test]
async fn test_non_package_records_are_ignored() {
    let env = TestEnv::new();
    env.register_hooks();

    let folder = env.folder(&alice(), "course").await;
    let copy = env
        .records
        .copy_record(&alice(), &folder.id, None)
        .await
        .unwrap();

    assert_eq!(copy.name, "course");
    env.records.delete_record(&alice(), &copy.id).await.unwrap();
    env.records.delete_record(&alice(), &folder.id).await.unwrap();
    assert!(env.stored_roots().is_empty());
}

#[tokio::test]
async fn test_download_archive_returns_original_bytes() {
    let env = TestEnv::new();
    let archive = accordion_package();
    let importer = env.importer();

    let record = importer
        .import_package(&archive[..], "accordion.h5p", &alice(), None)
        .await
        .unwrap();

    let dest = env.dir.path().join("downloads").join("out.h5p");
    let bytes = importer
        .download_archive(&record, &dest, &alice())
        .await
        .unwrap();

    assert_eq!(bytes, archive.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), archive);

    let mut broken = record.clone();
    broken.extra = Map::new();
    let err = importer
        .download_archive(&broken, &dest, &alice())
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::MissingExtra { .. }));
}
