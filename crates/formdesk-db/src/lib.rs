//! # formdesk-db
//!
//! Storage layer for formdesk.
//!
//! This crate provides:
//! - Connection pool management
//! - The PostgreSQL + filesystem blob store
//! - The PostgreSQL form record repository
//! - In-memory collaborators with failure injection for tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use formdesk_db::{Database, FilesystemBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = FilesystemBackend::new("/var/lib/formdesk/files");
//!     let db = Database::connect("postgres://localhost/formdesk", backend).await?;
//!
//!     let blob = db.blobs.put("report.pdf", "application/pdf", data).await?;
//!     println!("Stored blob: {}", blob.id);
//!     Ok(())
//! }
//! ```
pub mod file_storage;
pub mod memory;
pub mod pool;
pub mod records;

// Re-export core types
pub use formdesk_core::*;

pub use file_storage::{
    compute_content_hash, generate_storage_path, FilesystemBackend, PgBlobStore, StorageBackend,
};
pub use memory::{MemoryBlobStore, MemoryRecordRepository};
pub use pool::{create_pool_with_config, redact_url, PoolConfig, PoolHealth};
pub use records::PgFormRecordRepository;

use std::sync::Arc;

/// Combined storage context: pool, blob store and record repository.
///
/// Built once, before any request is served; components receive the store
/// handles by injection.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Blob store shared by all variants.
    pub blobs: Arc<PgBlobStore>,
    /// Form record repository.
    pub records: Arc<PgFormRecordRepository>,
}

impl Database {
    /// Create a new Database from a pool and a validated storage backend.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>, backend: impl StorageBackend + 'static) -> Self {
        Self {
            blobs: Arc::new(PgBlobStore::new(pool.clone(), backend)),
            records: Arc::new(PgFormRecordRepository::new(pool.clone())),
            pool,
        }
    }

    /// Connect and validate the filesystem backend before returning.
    pub async fn connect(url: &str, backend: FilesystemBackend) -> Result<Self> {
        Self::connect_with_config(url, PoolConfig::default(), backend).await
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(
        url: &str,
        config: PoolConfig,
        backend: FilesystemBackend,
    ) -> Result<Self> {
        backend.validate().await?;
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool, backend))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
