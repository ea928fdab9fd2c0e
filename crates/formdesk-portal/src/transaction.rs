//! Upload transaction coordinator.
//!
//! An [`UploadTransaction`] drives one request's batch of files through the
//! blob store and remembers every blob it created. It ends in exactly one of
//! [`UploadTransaction::commit`] or [`UploadTransaction::rollback`]; a
//! transaction dropped without either schedules a best-effort rollback of
//! whatever it still holds, so no exit path leaks silently.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use formdesk_core::{
    AttachmentKind, BlobObject, BlobStore, CheckedFile, Error, Result, UploadFailure,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A screened file addressed to a slot, waiting to be written.
#[derive(Debug, Clone)]
pub struct PendingUpload {
    pub slot: String,
    pub file: CheckedFile,
}

impl PendingUpload {
    pub fn new(slot: impl Into<String>, file: CheckedFile) -> Self {
        Self {
            slot: slot.into(),
            file,
        }
    }
}

/// A file that reached the blob store.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedBlob {
    pub slot: String,
    pub kind: AttachmentKind,
    pub blob: BlobObject,
}

/// Outcome of a best-effort batch delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Deleted by this call.
    pub deleted: Vec<Uuid>,
    /// Already gone; not an error.
    pub already_missing: Vec<Uuid>,
    /// Still present after a failed delete, with the cause.
    pub failed: Vec<(Uuid, String)>,
}

impl CleanupReport {
    /// True when nothing was left behind.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.deleted.len() + self.already_missing.len() + self.failed.len()
    }
}

/// Delete `ids` with bounded concurrency, never failing the caller.
///
/// Not-found is downgraded to a warning; other failures are logged and
/// reported but do not stop the remaining deletes.
pub async fn delete_best_effort(
    store: &dyn BlobStore,
    ids: Vec<Uuid>,
    concurrency: usize,
    reason: &'static str,
) -> CleanupReport {
    let mut report = CleanupReport::default();
    if ids.is_empty() {
        return report;
    }

    let outcomes: Vec<(Uuid, Result<()>)> = stream::iter(ids)
        .map(|id| async move { (id, store.delete(id).await) })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    for (id, outcome) in outcomes {
        match outcome {
            Ok(()) => {
                trace!(
                    subsystem = "portal",
                    component = "cleanup",
                    op = reason,
                    blob_id = %id,
                    "Blob deleted"
                );
                report.deleted.push(id);
            }
            Err(e) if e.is_not_found() => {
                warn!(
                    subsystem = "portal",
                    component = "cleanup",
                    op = reason,
                    blob_id = %id,
                    "Blob already missing during cleanup"
                );
                report.already_missing.push(id);
            }
            Err(e) => {
                warn!(
                    subsystem = "portal",
                    component = "cleanup",
                    op = reason,
                    blob_id = %id,
                    error = %e,
                    "Compensating delete failed; blob left in store"
                );
                report.failed.push((id, e.to_string()));
            }
        }
    }
    report
}

/// Starts upload transactions against a shared blob store.
#[derive(Clone)]
pub struct UploadCoordinator {
    store: Arc<dyn BlobStore>,
    max_concurrency: usize,
}

impl UploadCoordinator {
    pub fn new(store: Arc<dyn BlobStore>, max_concurrency: usize) -> Self {
        Self {
            store,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Open a transaction scoped to one request.
    pub fn begin(&self) -> UploadTransaction {
        UploadTransaction {
            id: Uuid::now_v7(),
            store: Arc::clone(&self.store),
            max_concurrency: self.max_concurrency,
            created: Arc::new(Mutex::new(Vec::new())),
            finished: false,
        }
    }
}

/// One request's set of created blobs, pending commit or rollback.
pub struct UploadTransaction {
    id: Uuid,
    store: Arc<dyn BlobStore>,
    max_concurrency: usize,
    created: Arc<Mutex<Vec<Uuid>>>,
    finished: bool,
}

impl UploadTransaction {
    /// Transaction id, for log correlation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Ids created so far, in completion order.
    pub fn created_ids(&self) -> Vec<Uuid> {
        lock(&self.created).clone()
    }

    /// Write every file, with at most `min(files, max_concurrency)` in flight.
    ///
    /// All files are attempted even when some fail, and every created id is
    /// tracked. On any failure this returns `UploadFailed` with one entry per
    /// failed file; the caller must then roll back.
    pub async fn upload_all(&mut self, files: Vec<PendingUpload>) -> Result<Vec<UploadedBlob>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let file_count = files.len();
        let concurrency = file_count.min(self.max_concurrency);
        debug!(
            subsystem = "portal",
            component = "upload_tx",
            op = "upload_all",
            tx_id = %self.id,
            file_count,
            concurrency,
            "Uploading batch"
        );

        let store = &self.store;
        let created = &self.created;
        let mut outcomes: Vec<(usize, PendingUpload, Result<BlobObject>)> =
            stream::iter(files.into_iter().enumerate())
                .map(|(index, mut pending)| async move {
                    let data = std::mem::take(&mut pending.file.data);
                    let outcome = store
                        .put(&pending.file.name, &pending.file.content_type, data)
                        .await;
                    // Record before anything else can observe or cancel.
                    if let Ok(blob) = &outcome {
                        lock(created).push(blob.id);
                        trace!(
                            subsystem = "portal",
                            component = "upload_tx",
                            slot = %pending.slot,
                            blob_id = %blob.id,
                            "Blob written"
                        );
                    }
                    (index, pending, outcome)
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;
        outcomes.sort_by_key(|(index, _, _)| *index);

        let mut uploaded = Vec::with_capacity(file_count);
        let mut failures = Vec::new();
        let mut outage: Option<String> = None;
        let mut only_outages = true;
        for (_, pending, outcome) in outcomes {
            match outcome {
                Ok(blob) => uploaded.push(UploadedBlob {
                    slot: pending.slot,
                    kind: pending.file.kind,
                    blob,
                }),
                Err(e) => {
                    match &e {
                        Error::StoreUnavailable(reason) => {
                            outage.get_or_insert_with(|| reason.clone());
                        }
                        _ => only_outages = false,
                    }
                    failures.push(UploadFailure {
                        slot: pending.slot,
                        name: pending.file.name,
                        cause: e.to_string(),
                    });
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        if failures.is_empty() {
            debug!(
                subsystem = "portal",
                component = "upload_tx",
                op = "upload_all",
                tx_id = %self.id,
                file_count,
                duration_ms,
                "Batch uploaded"
            );
            Ok(uploaded)
        } else {
            warn!(
                subsystem = "portal",
                component = "upload_tx",
                op = "upload_all",
                tx_id = %self.id,
                file_count,
                failed = failures.len(),
                duration_ms,
                "Batch upload partially failed"
            );
            match outage {
                // every failed write hit an unreachable store
                Some(reason) if only_outages => Err(Error::StoreUnavailable(reason)),
                _ => Err(Error::UploadFailed(failures)),
            }
        }
    }

    /// Close the transaction; its blobs now belong to the record.
    pub fn commit(mut self) -> Vec<Uuid> {
        self.finished = true;
        let ids = std::mem::take(&mut *lock(&self.created));
        debug!(
            subsystem = "portal",
            component = "upload_tx",
            op = "commit",
            tx_id = %self.id,
            file_count = ids.len(),
            "Upload transaction committed"
        );
        ids
    }

    /// Delete every blob this transaction created.
    ///
    /// Ids leave the transaction only once their delete has been attempted, so
    /// a rollback that is itself cancelled is finished by the drop guard.
    pub async fn rollback(mut self) -> CleanupReport {
        let ids = self.created_ids();
        let report = delete_best_effort(
            self.store.as_ref(),
            ids,
            self.max_concurrency,
            "rollback",
        )
        .await;
        lock(&self.created).clear();
        self.finished = true;

        if report.is_clean() {
            info!(
                subsystem = "portal",
                component = "upload_tx",
                op = "rollback",
                tx_id = %self.id,
                deleted = report.deleted.len(),
                already_missing = report.already_missing.len(),
                "Upload transaction rolled back"
            );
        } else {
            error!(
                subsystem = "portal",
                component = "upload_tx",
                op = "rollback",
                tx_id = %self.id,
                leaked = ?report.failed.iter().map(|(id, _)| id).collect::<Vec<_>>(),
                "Rollback left unreferenced blobs in store"
            );
        }
        report
    }
}

impl Drop for UploadTransaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let ids = std::mem::take(&mut *lock(&self.created));
        if ids.is_empty() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(
                    subsystem = "portal",
                    component = "upload_tx",
                    op = "drop_guard",
                    tx_id = %self.id,
                    file_count = ids.len(),
                    "Upload transaction dropped unfinished, rolling back"
                );
                let store = Arc::clone(&self.store);
                let concurrency = self.max_concurrency;
                handle.spawn(async move {
                    delete_best_effort(store.as_ref(), ids, concurrency, "drop_guard").await;
                });
            }
            Err(_) => {
                error!(
                    subsystem = "portal",
                    component = "upload_tx",
                    op = "drop_guard",
                    tx_id = %self.id,
                    leaked = ?ids,
                    "Upload transaction dropped outside a runtime; blobs leaked"
                );
            }
        }
    }
}
