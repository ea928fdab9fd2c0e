//! Tests for the filesystem storage backend.

use formdesk_db::{generate_storage_path, FilesystemBackend, StorageBackend};
use tempfile::TempDir;
use uuid::Uuid;

#[tokio::test]
async fn test_write_read_round_trip() {
    let dir = TempDir::new().unwrap();
    let backend = FilesystemBackend::new(dir.path());
    let path = generate_storage_path(&Uuid::now_v7());

    backend.write(&path, b"%PDF-1.7 body").await.unwrap();

    assert!(backend.exists(&path).await.unwrap());
    assert_eq!(backend.read(&path).await.unwrap(), b"%PDF-1.7 body");
}

#[tokio::test]
async fn test_write_leaves_no_temp_file() {
    let dir = TempDir::new().unwrap();
    let backend = FilesystemBackend::new(dir.path());
    let path = generate_storage_path(&Uuid::now_v7());

    backend.write(&path, b"data").await.unwrap();

    let full = dir.path().join(&path);
    assert!(full.exists());
    assert!(!full.with_extension("tmp").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_written_files_are_not_executable() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let backend = FilesystemBackend::new(dir.path());
    let path = generate_storage_path(&Uuid::now_v7());
    backend.write(&path, b"data").await.unwrap();

    let mode = std::fs::metadata(dir.path().join(&path))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o644);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let backend = FilesystemBackend::new(dir.path());
    let path = generate_storage_path(&Uuid::now_v7());
    backend.write(&path, b"data").await.unwrap();

    backend.delete(&path).await.unwrap();
    backend.delete(&path).await.unwrap();

    assert!(!backend.exists(&path).await.unwrap());
}

#[tokio::test]
async fn test_read_missing_is_io_not_found() {
    let dir = TempDir::new().unwrap();
    let backend = FilesystemBackend::new(dir.path());

    match backend.read("blobs/00/00/missing.bin").await {
        Err(formdesk_db::Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
        other => panic!("Expected Io(NotFound), got {other:?}"),
    }
}

#[tokio::test]
async fn test_validate_succeeds_on_writable_dir() {
    let dir = TempDir::new().unwrap();
    let backend = FilesystemBackend::new(dir.path().join("nested/root"));

    backend.validate().await.unwrap();

    assert!(!dir.path().join("nested/root/blobs/.health-check").exists());
}

#[tokio::test]
async fn test_validate_fails_when_root_is_a_file() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("not-a-dir");
    std::fs::write(&file, b"x").unwrap();

    let err = FilesystemBackend::new(&file).validate().await.unwrap_err();
    assert!(matches!(err, formdesk_db::Error::StoreUnavailable(_)));
    assert_eq!(err.status_code(), 503);
}
