//! Core traits for formdesk collaborators.
//!
//! These traits define the interfaces that concrete stores must satisfy,
//! enabling pluggable backends and testability.

use async_trait::async_trait;
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;
use crate::variants::FormVariant;

// =============================================================================
// BLOB STORE
// =============================================================================

/// Durable storage for attachment bytes and their metadata.
///
/// Shared by every variant and safe for concurrent independent operations.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a payload and return its metadata.
    ///
    /// Fails with `StoreUnavailable` when the store is not initialized.
    async fn put(&self, name: &str, content_type: &str, data: Vec<u8>) -> Result<BlobObject>;

    /// Fetch metadata only. Fails with `BlobNotFound`.
    async fn head(&self, id: Uuid) -> Result<BlobObject>;

    /// Fetch metadata and content. Fails with `BlobNotFound`.
    async fn get(&self, id: Uuid) -> Result<BlobContent>;

    /// Delete a blob. Fails with `BlobNotFound` when already gone.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Metadata of every stored blob, oldest first.
    async fn list(&self) -> Result<Vec<BlobObject>>;

    /// Readiness check. Fails with `StoreUnavailable`.
    async fn ping(&self) -> Result<()>;
}

// =============================================================================
// FORM RECORD REPOSITORY
// =============================================================================

/// Filter for listing records of one variant.
#[derive(Debug, Clone)]
pub struct RecordQuery {
    pub variant: FormVariant,
    /// Restrict to one owner; `None` lists every owner's records.
    pub owner_id: Option<String>,
    pub status: Option<FormStatus>,
}

impl RecordQuery {
    pub fn new(variant: FormVariant) -> Self {
        Self {
            variant,
            owner_id: None,
            status: None,
        }
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_status(mut self, status: Option<FormStatus>) -> Self {
        self.status = status;
        self
    }

    /// Whether `record` satisfies this filter.
    pub fn matches(&self, record: &FormRecord) -> bool {
        record.variant == self.variant
            && self
                .owner_id
                .as_deref()
                .map_or(true, |owner| record.owner_id == owner)
            && self.status.map_or(true, |status| record.status == status)
    }
}

/// Persistence for form records.
///
/// No optimistic-concurrency token: concurrent writers to one record are
/// last-write-wins.
#[async_trait]
pub trait FormRecordRepository: Send + Sync {
    /// Insert a new record.
    async fn insert(&self, record: &FormRecord) -> Result<()>;

    /// Fetch by id. Fails with `RecordNotFound`.
    async fn fetch(&self, id: Uuid) -> Result<FormRecord>;

    /// Overwrite slots, payload, status and remarks of an existing record.
    /// Fails with `RecordNotFound`.
    async fn update(&self, record: &FormRecord) -> Result<()>;

    /// Records matching `query`, newest first.
    async fn list(&self, query: &RecordQuery) -> Result<Vec<FormRecord>>;

    /// Set status and remarks.
    ///
    /// When `owner_id` is given, a record owned by someone else is reported as
    /// `RecordNotFound`.
    async fn update_status(
        &self,
        id: Uuid,
        status: FormStatus,
        remarks: Option<String>,
        owner_id: Option<&str>,
    ) -> Result<FormRecord>;

    /// Every blob id referenced by any record's slots.
    async fn referenced_blob_ids(&self) -> Result<HashSet<Uuid>>;
}
