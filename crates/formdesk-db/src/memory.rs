//! In-memory collaborators for deterministic testing.
//!
//! [`MemoryBlobStore`] and [`MemoryRecordRepository`] implement the core
//! traits without PostgreSQL or a filesystem, and expose failure injection so
//! rollback and compensation paths can be exercised.
//!
//! ## Usage
//!
//! ```rust
//! use formdesk_db::memory::MemoryBlobStore;
//! use formdesk_core::BlobStore;
//!
//! # async fn demo() {
//! let store = MemoryBlobStore::new().with_failing_put("broken.pdf");
//!
//! assert!(store.put("broken.pdf", "application/pdf", vec![1]).await.is_err());
//! assert_eq!(store.len(), 0);
//! # }
//! ```

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

use formdesk_core::{
    BlobContent, BlobObject, BlobStore, Error, FormRecord, FormRecordRepository, FormStatus,
    RecordQuery, Result,
};

use crate::file_storage::compute_content_hash;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// BLOB STORE
// =============================================================================

#[derive(Debug, Default)]
struct BlobFaults {
    failing_names: HashSet<String>,
    failing_put_ordinals: HashSet<usize>,
    failing_deletes: HashSet<Uuid>,
    slow_puts: HashMap<String, Duration>,
    puts_unavailable: bool,
}

#[derive(Debug, Default)]
struct BlobState {
    blobs: Mutex<HashMap<Uuid, BlobContent>>,
    faults: Mutex<BlobFaults>,
    unavailable: AtomicBool,
    put_calls: AtomicUsize,
    head_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

/// In-memory blob store with failure injection.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    state: Arc<BlobState>,
}

impl MemoryBlobStore {
    /// Create an empty, available store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `put` of a file with this name.
    pub fn with_failing_put(self, name: impl Into<String>) -> Self {
        lock(&self.state.faults).failing_names.insert(name.into());
        self
    }

    /// Fail the `n`-th `put` call (1-based, counted across the store's life).
    pub fn with_failing_put_call(self, n: usize) -> Self {
        lock(&self.state.faults).failing_put_ordinals.insert(n);
        self
    }

    /// Delay each `put` of a file with this name before it stores anything.
    pub fn with_slow_put(self, name: impl Into<String>, delay: Duration) -> Self {
        lock(&self.state.faults).slow_puts.insert(name.into(), delay);
        self
    }

    /// Fail every `put` as unavailable while `ping` and reads still succeed.
    pub fn fail_puts_as_unavailable(&self) {
        lock(&self.state.faults).puts_unavailable = true;
    }

    /// Make `delete(id)` fail with a transient error while the blob remains.
    pub fn fail_delete_of(&self, id: Uuid) {
        lock(&self.state.faults).failing_deletes.insert(id);
    }

    /// Toggle availability; an unavailable store fails every operation.
    pub fn set_available(&self, available: bool) {
        self.state.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        lock(&self.state.blobs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: Uuid) -> bool {
        lock(&self.state.blobs).contains_key(&id)
    }

    /// Ids of every stored blob.
    pub fn ids(&self) -> HashSet<Uuid> {
        lock(&self.state.blobs).keys().copied().collect()
    }

    /// Insert a blob with an explicit creation time, bypassing `put`.
    pub fn insert_raw(&self, blob: BlobObject, data: Vec<u8>) {
        lock(&self.state.blobs).insert(blob.id, BlobContent { blob, data });
    }

    pub fn put_calls(&self) -> usize {
        self.state.put_calls.load(Ordering::SeqCst)
    }

    pub fn head_calls(&self) -> usize {
        self.state.head_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.state.delete_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.state.unavailable.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable(
                "memory blob store is not initialized".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, name: &str, content_type: &str, data: Vec<u8>) -> Result<BlobObject> {
        let ordinal = self.state.put_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.check_available()?;

        let (delay, fails, unavailable) = {
            let faults = lock(&self.state.faults);
            (
                faults.slow_puts.get(name).copied(),
                faults.failing_names.contains(name) || faults.failing_put_ordinals.contains(&ordinal),
                faults.puts_unavailable,
            )
        };
        if unavailable {
            return Err(Error::StoreUnavailable(
                "memory blob store rejected the write".to_string(),
            ));
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fails {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("injected write failure for {}", name),
            )));
        }

        let blob = BlobObject {
            id: Uuid::now_v7(),
            original_name: name.to_string(),
            content_type: content_type.to_string(),
            size_bytes: data.len() as i64,
            content_hash: compute_content_hash(&data),
            created_at: Utc::now(),
        };
        self.insert_raw(blob.clone(), data);
        Ok(blob)
    }

    async fn head(&self, id: Uuid) -> Result<BlobObject> {
        self.state.head_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        lock(&self.state.blobs)
            .get(&id)
            .map(|c| c.blob.clone())
            .ok_or(Error::BlobNotFound(id))
    }

    async fn get(&self, id: Uuid) -> Result<BlobContent> {
        self.check_available()?;
        lock(&self.state.blobs)
            .get(&id)
            .cloned()
            .ok_or(Error::BlobNotFound(id))
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.state.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        if lock(&self.state.faults).failing_deletes.contains(&id) {
            return Err(Error::Internal(format!("injected delete failure for {}", id)));
        }
        lock(&self.state.blobs)
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::BlobNotFound(id))
    }

    async fn list(&self) -> Result<Vec<BlobObject>> {
        self.check_available()?;
        let mut blobs: Vec<BlobObject> = lock(&self.state.blobs)
            .values()
            .map(|c| c.blob.clone())
            .collect();
        blobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(blobs)
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}

// =============================================================================
// RECORD REPOSITORY
// =============================================================================

#[derive(Debug, Default)]
struct RecordState {
    records: Mutex<HashMap<Uuid, FormRecord>>,
    fail_next_insert: AtomicBool,
    fail_next_update: AtomicBool,
}

/// In-memory form record repository with write-failure injection.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordRepository {
    state: Arc<RecordState>,
}

impl MemoryRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `insert` fail once.
    pub fn fail_next_insert(&self) {
        self.state.fail_next_insert.store(true, Ordering::SeqCst);
    }

    /// Make the next `update` fail once.
    pub fn fail_next_update(&self) {
        self.state.fail_next_update.store(true, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        lock(&self.state.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of a stored record, if present.
    pub fn get(&self, id: Uuid) -> Option<FormRecord> {
        lock(&self.state.records).get(&id).cloned()
    }

    fn injected(flag: &AtomicBool, op: &str) -> Result<()> {
        if flag.swap(false, Ordering::SeqCst) {
            return Err(Error::Internal(format!("injected {} failure", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl FormRecordRepository for MemoryRecordRepository {
    async fn insert(&self, record: &FormRecord) -> Result<()> {
        Self::injected(&self.state.fail_next_insert, "insert")?;
        let mut records = lock(&self.state.records);
        if records.contains_key(&record.id) {
            return Err(Error::InvalidInput(format!(
                "Record {} already exists",
                record.id
            )));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<FormRecord> {
        self.get(id).ok_or(Error::RecordNotFound(id))
    }

    async fn update(&self, record: &FormRecord) -> Result<()> {
        Self::injected(&self.state.fail_next_update, "update")?;
        let mut records = lock(&self.state.records);
        match records.get_mut(&record.id) {
            Some(stored) => {
                stored.status = record.status;
                stored.remarks = record.remarks.clone();
                stored.slots = record.slots.clone();
                stored.payload = record.payload.clone();
                stored.updated_at = record.updated_at;
                Ok(())
            }
            None => Err(Error::RecordNotFound(record.id)),
        }
    }

    async fn list(&self, query: &RecordQuery) -> Result<Vec<FormRecord>> {
        let mut matched: Vec<FormRecord> = lock(&self.state.records)
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(matched)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: FormStatus,
        remarks: Option<String>,
        owner_id: Option<&str>,
    ) -> Result<FormRecord> {
        Self::injected(&self.state.fail_next_update, "update")?;
        let mut records = lock(&self.state.records);
        let record = records
            .get_mut(&id)
            .filter(|r| owner_id.map_or(true, |owner| r.owner_id == owner))
            .ok_or(Error::RecordNotFound(id))?;
        record.status = status;
        record.remarks = remarks;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn referenced_blob_ids(&self) -> Result<HashSet<Uuid>> {
        Ok(lock(&self.state.records)
            .values()
            .flat_map(|r| r.blob_ids())
            .collect())
    }
}
