//! Blob storage: metadata in PostgreSQL, bytes on a pluggable backend.
//!
//! This module provides the durable blob store shared by every form variant:
//! - Filesystem backend with UUIDv7-based sharded paths
//! - Atomic write operations (temp file + rename)
//! - BLAKE3 content hash recorded per blob for integrity reporting
//! - Startup round-trip validation of the backend
//!
//! ## Example
//!
//! ```rust,ignore
//! use formdesk_db::file_storage::{FilesystemBackend, PgBlobStore};
//!
//! let backend = FilesystemBackend::new("/var/lib/formdesk/files");
//! backend.validate().await?;
//! let store = PgBlobStore::new(pool, backend);
//!
//! let blob = store.put("report.pdf", "application/pdf", data).await?;
//! let content = store.get(blob.id).await?;
//! ```

use async_trait::async_trait;
use formdesk_core::{BlobContent, BlobObject, BlobStore, Error, Result};
use sqlx::{PgPool, Row};
use std::path::PathBuf;
use std::time::Instant;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Storage backend trait for different storage implementations.
///
/// Allows abstracting over filesystem, S3, or other storage providers.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write data to the specified path.
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Read data from the specified path.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Delete data at the specified path. Missing data is not an error.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Check if data exists at the specified path.
    async fn exists(&self, path: &str) -> Result<bool>;
}

/// Filesystem storage backend.
///
/// Stores files in a directory hierarchy based on UUIDv7 blob IDs.
/// Path format: `{base_path}/blobs/{first-2-hex}/{next-2-hex}/{uuid}.bin`
pub struct FilesystemBackend {
    base_path: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend with the given base directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }

    /// Validate that the storage backend can write, read, and delete files.
    ///
    /// Run once at startup, before the portal accepts requests, so an unusable
    /// directory is reported up front instead of on the first upload.
    pub async fn validate(&self) -> Result<()> {
        let test_dir = self.base_path.join("blobs/.health-check");
        let test_file = test_dir.join("test.bin");
        let unavailable = |step: String| Error::StoreUnavailable(step);

        fs::create_dir_all(&test_dir)
            .await
            .map_err(|e| unavailable(format!("create_dir_all({:?}): {}", test_dir, e)))?;

        let data = b"storage-health-check";
        fs::write(&test_file, data)
            .await
            .map_err(|e| unavailable(format!("write({:?}): {}", test_file, e)))?;

        let read_data = fs::read(&test_file)
            .await
            .map_err(|e| unavailable(format!("read({:?}): {}", test_file, e)))?;
        if read_data != data {
            return Err(unavailable("read-back mismatch".to_string()));
        }

        fs::remove_file(&test_file)
            .await
            .map_err(|e| unavailable(format!("remove_file({:?}): {}", test_file, e)))?;
        let _ = fs::remove_dir(&test_dir).await;

        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);
        trace!(
            subsystem = "storage",
            component = "filesystem",
            storage_path = %path,
            size_bytes = data.len(),
            "Writing blob content"
        );

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(
                    subsystem = "storage",
                    component = "filesystem",
                    parent = %parent.display(),
                    error = %e,
                    "create_dir_all failed"
                );
                e
            })?;
        }

        // Atomic write: temp file + rename
        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(
                subsystem = "storage",
                component = "filesystem",
                from = %temp_path.display(),
                to = %full_path.display(),
                error = %e,
                "rename failed"
            );
            e
        })?;

        // rw-r--r--, never executable
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path);
        Ok(fs::read(full_path).await?)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);
        if fs::try_exists(&full_path).await? {
            fs::remove_file(full_path).await?;
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path);
        Ok(fs::try_exists(full_path).await?)
    }
}

/// Compute BLAKE3 hash of data with "blake3:" prefix.
///
/// Returns a string in the format: `blake3:{64-char-hex}`
pub fn compute_content_hash(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    format!("blake3:{}", hash.to_hex())
}

/// Generate storage path from UUID.
///
/// Path format: `blobs/{first-2-hex}/{next-2-hex}/{uuid}.bin`
///
/// Example: `blobs/01/94/01948f7e-8b2a-7c3d-9e4f-5a6b7c8d9e0f.bin`
pub fn generate_storage_path(uuid: &Uuid) -> String {
    let hex = uuid.simple().to_string();
    format!(
        "blobs/{}/{}/{}.bin",
        &hex[0..2],
        &hex[2..4],
        uuid.as_hyphenated()
    )
}

/// Connection-level sqlx failures mean the store cannot be reached at all.
fn classify_db_error(e: sqlx::Error) -> Error {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            Error::StoreUnavailable(e.to_string())
        }
        other => Error::Database(other),
    }
}

const BLOB_COLUMNS: &str = "id, original_name, content_type, size_bytes, content_hash, created_at";

/// PostgreSQL-backed blob store.
///
/// Metadata rows live in `blob_object`; content lives on the backend at
/// `storage_path`. No deduplication: every `put` creates a new blob.
pub struct PgBlobStore {
    pool: PgPool,
    backend: Box<dyn StorageBackend>,
}

impl PgBlobStore {
    /// Create a blob store over an already-validated backend.
    pub fn new(pool: PgPool, backend: impl StorageBackend + 'static) -> Self {
        Self {
            pool,
            backend: Box::new(backend),
        }
    }

    async fn storage_path(&self, id: Uuid) -> Result<String> {
        sqlx::query_scalar::<_, String>("SELECT storage_path FROM blob_object WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_db_error)?
            .ok_or(Error::BlobNotFound(id))
    }
}

#[async_trait]
impl BlobStore for PgBlobStore {
    async fn put(&self, name: &str, content_type: &str, data: Vec<u8>) -> Result<BlobObject> {
        let start = Instant::now();
        let id = Uuid::now_v7();
        let path = generate_storage_path(&id);
        let content_hash = compute_content_hash(&data);
        let size_bytes = data.len() as i64;

        self.backend.write(&path, &data).await?;

        let inserted = sqlx::query(&format!(
            r#"INSERT INTO blob_object
               (id, original_name, content_type, size_bytes, content_hash, storage_path)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING {BLOB_COLUMNS}"#
        ))
        .bind(id)
        .bind(name)
        .bind(content_type)
        .bind(size_bytes)
        .bind(&content_hash)
        .bind(&path)
        .fetch_one(&self.pool)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(e) => {
                // Content without metadata is unreachable; remove it.
                if let Err(cleanup) = self.backend.delete(&path).await {
                    warn!(
                        subsystem = "storage",
                        component = "blob_store",
                        op = "put",
                        blob_id = %id,
                        error = %cleanup,
                        "Failed to remove content after metadata insert failed"
                    );
                }
                return Err(classify_db_error(e));
            }
        };

        debug!(
            subsystem = "storage",
            component = "blob_store",
            op = "put",
            blob_id = %id,
            size_bytes,
            duration_ms = start.elapsed().as_millis() as u64,
            "Blob stored"
        );
        blob_from_row(&row)
    }

    async fn head(&self, id: Uuid) -> Result<BlobObject> {
        let row = sqlx::query(&format!("SELECT {BLOB_COLUMNS} FROM blob_object WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_db_error)?
            .ok_or(Error::BlobNotFound(id))?;
        blob_from_row(&row)
    }

    async fn get(&self, id: Uuid) -> Result<BlobContent> {
        let blob = self.head(id).await?;
        let path = self.storage_path(id).await?;
        let data = self.backend.read(&path).await.map_err(|e| match e {
            Error::Io(io) if io.kind() == std::io::ErrorKind::NotFound => Error::BlobNotFound(id),
            other => other,
        })?;
        Ok(BlobContent { blob, data })
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let path = sqlx::query_scalar::<_, String>(
            "DELETE FROM blob_object WHERE id = $1 RETURNING storage_path",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_db_error)?
        .ok_or(Error::BlobNotFound(id))?;

        // Metadata is gone, so the blob is unreachable even if this fails.
        if let Err(e) = self.backend.delete(&path).await {
            warn!(
                subsystem = "storage",
                component = "blob_store",
                op = "delete",
                blob_id = %id,
                storage_path = %path,
                error = %e,
                "Blob content left on backend after metadata delete"
            );
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<BlobObject>> {
        let rows = sqlx::query(&format!(
            "SELECT {BLOB_COLUMNS} FROM blob_object ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(classify_db_error)?;
        rows.iter().map(blob_from_row).collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        Ok(())
    }
}

/// Convert a database row to a BlobObject.
fn blob_from_row(row: &sqlx::postgres::PgRow) -> Result<BlobObject> {
    Ok(BlobObject {
        id: row.try_get("id")?,
        original_name: row.try_get("original_name")?,
        content_type: row.try_get("content_type")?,
        size_bytes: row.try_get("size_bytes")?,
        content_hash: row.try_get("content_hash")?,
        created_at: row.try_get("created_at")?,
    })
}
