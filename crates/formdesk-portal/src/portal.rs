//! Boundary operations exposed to the HTTP layer.
//!
//! Every mutating operation follows the same order: validate with no side
//! effects, check the blob store is reachable, upload inside a transaction,
//! persist the record, commit, and only then delete superseded blobs.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use formdesk_core::{
    check_incoming, BlobContent, BlobObject, BlobRef, BlobStore, Caller, CheckedFile,
    DisplayProjection, Error, FormRecord, FormRecordRepository, FormStatus, FormVariant,
    IncomingFile, Result, SlotFile,
};

use crate::config::PortalConfig;
use crate::normalizer::Normalizer;
use crate::query::{QueryScope, ScopedQuery};
use crate::slots::{self, SlotPlan};
use crate::transaction::{
    delete_best_effort, CleanupReport, PendingUpload, UploadCoordinator, UploadedBlob,
};

/// The forms portal core, wired to its collaborators.
#[derive(Clone)]
pub struct Portal {
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn FormRecordRepository>,
    config: PortalConfig,
    coordinator: UploadCoordinator,
    normalizer: Normalizer,
    query: ScopedQuery,
}

impl Portal {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn FormRecordRepository>,
        config: PortalConfig,
    ) -> Self {
        Self {
            coordinator: UploadCoordinator::new(Arc::clone(&blobs), config.upload_concurrency),
            normalizer: Normalizer::new(Arc::clone(&blobs), &config),
            query: ScopedQuery::new(Arc::clone(&records)),
            blobs,
            records,
            config,
        }
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    /// Create a record with its initial attachments.
    ///
    /// Either the record is stored with every file, or nothing new remains in
    /// the blob store.
    #[instrument(
        skip(self, payload, files),
        fields(subsystem = "portal", component = "portal", op = "submit", variant = %variant, file_count = files.len())
    )]
    pub async fn submit_with_attachments(
        &self,
        owner_id: &str,
        variant: FormVariant,
        payload: JsonValue,
        files: Vec<SlotFile>,
    ) -> Result<FormRecord> {
        let start = Instant::now();
        if !payload.is_object() {
            return Err(Error::InvalidInput(
                "Form payload must be a JSON object".to_string(),
            ));
        }
        if owner_id.trim().is_empty() {
            return Err(Error::InvalidInput("Owner id is required".to_string()));
        }

        let spec = variant.spec();
        let mut grouped: BTreeMap<String, Vec<CheckedFile>> = BTreeMap::new();
        for SlotFile { slot, file } in files {
            grouped.entry(slot).or_default().push(check_incoming(file)?);
        }
        slots::check_submission(spec, &grouped)?;

        let mut record = FormRecord::new(variant, owner_id.trim(), payload);
        let plans = grouped
            .iter()
            .map(|(slot, files)| slots::plan(spec, &record, slot, files, false))
            .collect::<Result<Vec<SlotPlan>>>()?;

        let pending: Vec<PendingUpload> = grouped
            .into_iter()
            .flat_map(|(slot, files)| {
                files
                    .into_iter()
                    .map(move |file| PendingUpload::new(slot.clone(), file))
            })
            .collect();
        let file_count = pending.len();
        if file_count > 0 {
            self.blobs.ping().await?;
        }

        let mut tx = self.coordinator.begin();
        let mut by_slot = match tx.upload_all(pending).await {
            Ok(uploaded) => refs_by_slot(uploaded),
            Err(e) => {
                tx.rollback().await;
                return Err(e);
            }
        };

        for plan in &plans {
            let refs = by_slot.remove(plan.slot).unwrap_or_default();
            slots::apply(&mut record, plan, refs);
        }

        if let Err(e) = self.records.insert(&record).await {
            tx.rollback().await;
            return Err(e.into_persistence());
        }
        tx.commit();

        info!(
            record_id = %record.id,
            owner_id = %record.owner_id,
            file_count,
            duration_ms = start.elapsed().as_millis() as u64,
            "Submission stored"
        );
        Ok(record)
    }

    /// Upload into one slot of an existing record, or clear it.
    ///
    /// Superseded blobs are deleted only after the updated record is
    /// persisted; their deletion is best-effort.
    #[instrument(
        skip(self, files),
        fields(subsystem = "portal", component = "portal", op = "replace_slot", record_id = %record_id, file_count = files.len())
    )]
    pub async fn replace_slot(
        &self,
        record_id: Uuid,
        slot: &str,
        files: Vec<IncomingFile>,
        clear: bool,
    ) -> Result<FormRecord> {
        let start = Instant::now();
        let mut record = self.records.fetch(record_id).await?;
        let spec = record.variant.spec();

        let checked = files
            .into_iter()
            .map(check_incoming)
            .collect::<Result<Vec<CheckedFile>>>()?;
        let plan = slots::plan(spec, &record, slot, &checked, clear)?;
        if plan.is_no_change() {
            debug!(slot = plan.slot, "No files and no clear flag; slot unchanged");
            return Ok(record);
        }

        self.blobs.ping().await?;

        let pending: Vec<PendingUpload> = checked
            .into_iter()
            .map(|file| PendingUpload::new(plan.slot, file))
            .collect();
        let file_count = pending.len();

        let mut tx = self.coordinator.begin();
        let new_refs = match tx.upload_all(pending).await {
            Ok(uploaded) => uploaded
                .into_iter()
                .map(|u| BlobRef::new(u.blob.id, u.kind))
                .collect(),
            Err(e) => {
                tx.rollback().await;
                return Err(e);
            }
        };

        slots::apply(&mut record, &plan, new_refs);
        record.updated_at = Utc::now();

        if let Err(e) = self.records.update(&record).await {
            tx.rollback().await;
            return Err(e.into_persistence());
        }
        tx.commit();

        let superseded: Vec<Uuid> = plan.superseded.iter().map(|r| r.id).collect();
        let cleanup = delete_best_effort(
            self.blobs.as_ref(),
            superseded,
            self.config.upload_concurrency,
            "delete_superseded",
        )
        .await;

        info!(
            slot = plan.slot,
            mode = ?plan.mode,
            file_count,
            superseded = cleanup.attempted(),
            cleanup_failed = cleanup.failed.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Slot updated"
        );
        Ok(record)
    }

    /// Fetch a blob's bytes by its textual id.
    pub async fn fetch_blob(&self, blob_id: &str) -> Result<BlobContent> {
        let id = Uuid::parse_str(blob_id.trim())
            .map_err(|_| Error::InvalidInput(format!("Invalid blob id: {}", blob_id)))?;
        self.blobs.get(id).await
    }

    /// Projections of one owner's records, newest first.
    pub async fn list_by_owner(
        &self,
        owner_id: &str,
        status: Option<FormStatus>,
    ) -> Result<Vec<DisplayProjection>> {
        self.list(&QueryScope::Owner(owner_id.to_string()), status, None)
            .await
    }

    /// Projections of every record, newest first. For elevated callers.
    pub async fn list_all(&self, status: Option<FormStatus>) -> Result<Vec<DisplayProjection>> {
        self.list(&QueryScope::All, status, None).await
    }

    /// Projections visible to `caller`, with the caller's branch applied.
    pub async fn list_for_caller(
        &self,
        caller: &Caller,
        status: Option<FormStatus>,
    ) -> Result<Vec<DisplayProjection>> {
        let scope = QueryScope::for_caller(caller, &self.config.elevated_roles);
        self.list(&scope, status, caller.branch.as_deref()).await
    }

    async fn list(
        &self,
        scope: &QueryScope,
        status: Option<FormStatus>,
        branch_hint: Option<&str>,
    ) -> Result<Vec<DisplayProjection>> {
        let records = self.query.fetch(scope, status).await?;
        Ok(self.normalizer.normalize_all(&records, branch_hint).await)
    }

    /// Single-record view, owner-scoped unless the caller is elevated.
    pub async fn get_application(&self, caller: &Caller, record_id: Uuid) -> Result<DisplayProjection> {
        let scope = QueryScope::for_caller(caller, &self.config.elevated_roles);
        let record = self.query.fetch_one(&scope, record_id).await?;
        Ok(self
            .normalizer
            .normalize(&record, caller.branch.as_deref())
            .await)
    }

    /// Set a record's review status.
    ///
    /// `status` accepts `accepted`/`declined` as aliases. Non-elevated callers
    /// may only touch their own records; anything else is not found.
    #[instrument(
        skip(self, caller, remarks),
        fields(subsystem = "portal", component = "portal", op = "update_status", record_id = %record_id)
    )]
    pub async fn update_status(
        &self,
        caller: &Caller,
        record_id: Uuid,
        status: &str,
        remarks: Option<String>,
    ) -> Result<FormRecord> {
        let status: FormStatus = status.parse().map_err(Error::InvalidInput)?;
        let remarks = remarks
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let owner = if caller.is_elevated(&self.config.elevated_roles) {
            None
        } else {
            Some(caller.owner_id.as_str())
        };

        let record = self
            .records
            .update_status(record_id, status, remarks, owner)
            .await?;
        info!(status = %record.status, "Status updated");
        Ok(record)
    }

    /// Blobs no record references, at least `min_age` old, oldest first.
    pub async fn find_orphaned_blobs(&self, min_age: Duration) -> Result<Vec<BlobObject>> {
        let cutoff = Utc::now() - min_age;
        let referenced = self.records.referenced_blob_ids().await?;
        let orphans: Vec<BlobObject> = self
            .blobs
            .list()
            .await?
            .into_iter()
            .filter(|b| !referenced.contains(&b.id) && b.created_at <= cutoff)
            .collect();

        debug!(
            subsystem = "portal",
            component = "reconcile",
            op = "find_orphans",
            referenced = referenced.len(),
            result_count = orphans.len(),
            "Orphan scan complete"
        );
        Ok(orphans)
    }

    /// Delete every orphan found by [`Portal::find_orphaned_blobs`].
    pub async fn purge_orphaned_blobs(&self, min_age: Duration) -> Result<CleanupReport> {
        let ids = self
            .find_orphaned_blobs(min_age)
            .await?
            .into_iter()
            .map(|b| b.id)
            .collect();
        let report = delete_best_effort(
            self.blobs.as_ref(),
            ids,
            self.config.upload_concurrency,
            "purge_orphans",
        )
        .await;

        info!(
            subsystem = "portal",
            component = "reconcile",
            op = "purge_orphans",
            deleted = report.deleted.len(),
            already_missing = report.already_missing.len(),
            failed = report.failed.len(),
            "Orphan purge complete"
        );
        Ok(report)
    }
}

fn refs_by_slot(uploaded: Vec<UploadedBlob>) -> BTreeMap<String, Vec<BlobRef>> {
    let mut by_slot: BTreeMap<String, Vec<BlobRef>> = BTreeMap::new();
    for u in uploaded {
        by_slot
            .entry(u.slot)
            .or_default()
            .push(BlobRef::new(u.blob.id, u.kind));
    }
    by_slot
}
