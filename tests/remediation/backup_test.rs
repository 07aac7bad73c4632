//! Backup store: create, restore, verify, prune.

use std::path::PathBuf;
use std::time::Duration;

use devwatch::remediation::backup::{sha256_bytes, BackupError, BackupStore};

fn setup() -> (tempfile::TempDir, BackupStore, PathBuf) {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let store = BackupStore::new(tmp.path().join(".devwatch/backups"));
    let file = tmp.path().join("page.tsx");
    std::fs::write(&file, "export default function Page() {\n  return null;\n}\n")
        .expect("should write source file");
    (tmp, store, file)
}

#[tokio::test]
async fn restore_is_byte_identical() {
    let (_tmp, store, file) = setup();
    let original = std::fs::read(&file).expect("should read file");

    let record = store
        .create(&file, "add-import", "Add an import for 'x'")
        .await
        .expect("backup should succeed");
    assert_eq!(Ok(record.size), u64::try_from(original.len()));
    assert_eq!(record.checksum, sha256_bytes(&original));
    assert!(record.id.starts_with("backup-"));

    std::fs::write(&file, "garbage").expect("should overwrite file");
    let restored = store.restore(&record.id).await.expect("restore should succeed");
    assert_eq!(restored.id, record.id);
    assert_eq!(std::fs::read(&file).expect("should read file"), original);
}

#[tokio::test]
async fn restore_latest_picks_newest() {
    let (_tmp, store, file) = setup();
    store
        .create(&file, "first", "first")
        .await
        .expect("backup should succeed");

    std::fs::write(&file, "second version").expect("should write file");
    let second = store
        .create(&file, "second", "second")
        .await
        .expect("backup should succeed");

    std::fs::write(&file, "third version").expect("should write file");
    let restored = store
        .restore_latest(&file)
        .await
        .expect("restore should succeed");
    assert_eq!(restored.id, second.id);
    assert_eq!(
        std::fs::read_to_string(&file).expect("should read file"),
        "second version"
    );
}

#[tokio::test]
async fn flipped_byte_fails_validation_and_restore() {
    let (_tmp, store, file) = setup();
    let record = store
        .create(&file, "remove-debug-statement", "Remove the debug statement")
        .await
        .expect("backup should succeed");
    assert!(store.validate(&record.id).await.expect("validate should run"));

    let blob = store.dir().join(format!("{}.bak", record.id));
    let mut bytes = std::fs::read(&blob).expect("should read blob");
    bytes[0] ^= 0x01;
    std::fs::write(&blob, &bytes).expect("should write blob");

    assert!(!store.validate(&record.id).await.expect("validate should run"));
    match store.restore(&record.id).await {
        Err(BackupError::ChecksumMismatch { id, .. }) => assert_eq!(id, record.id),
        other => panic!("expected checksum mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let (_tmp, store, file) = setup();
    assert!(matches!(
        store.restore("backup-nope").await,
        Err(BackupError::NotFound(_))
    ));
    assert!(matches!(
        store.validate("backup-nope").await,
        Err(BackupError::NotFound(_))
    ));
    assert!(matches!(
        store.restore_latest(&file).await,
        Err(BackupError::NoBackupForFile(_))
    ));
}

#[tokio::test]
async fn list_filters_by_file() {
    let (tmp, store, file) = setup();
    let other = tmp.path().join("other.ts");
    std::fs::write(&other, "export {};\n").expect("should write file");

    store.create(&file, "a", "a").await.expect("backup should succeed");
    store.create(&other, "b", "b").await.expect("backup should succeed");
    store.create(&file, "c", "c").await.expect("backup should succeed");

    assert_eq!(store.list(None).await.expect("list should succeed").len(), 3);
    let for_file = store.list(Some(&file)).await.expect("list should succeed");
    assert_eq!(for_file.len(), 2);
    assert_eq!(for_file[0].fix_type, "a");
    assert_eq!(for_file[1].fix_type, "c");
}

#[tokio::test]
async fn prune_removes_only_expired() {
    let (_tmp, store, file) = setup();
    let record = store.create(&file, "a", "a").await.expect("backup should succeed");

    let removed = store
        .prune(chrono::Duration::days(7))
        .await
        .expect("prune should succeed");
    assert_eq!(removed, 0);

    tokio::time::sleep(Duration::from_millis(20)).await;
    let removed = store
        .prune(chrono::Duration::zero())
        .await
        .expect("prune should succeed");
    assert_eq!(removed, 1);
    assert!(store.list(None).await.expect("list should succeed").is_empty());
    assert!(!store.dir().join(format!("{}.bak", record.id)).exists());
}

#[tokio::test]
async fn missing_source_is_an_io_error() {
    let (tmp, store, _file) = setup();
    let result = store.create(&tmp.path().join("absent.ts"), "a", "a").await;
    assert!(matches!(result, Err(BackupError::Io { .. })));
}
