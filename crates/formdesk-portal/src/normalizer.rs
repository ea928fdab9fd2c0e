//! Aggregation normalizer.
//!
//! Turns raw records of any variant into [`DisplayProjection`]s. Attachment
//! references are resolved through blob metadata only, with bounded
//! concurrency; a reference that cannot be resolved becomes a `null` entry
//! and never fails the projection.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use formdesk_core::{
    AttachmentDescriptor, BlobObject, BlobStore, DisplayProjection, FormRecord, CANONICAL_SLOTS,
};

use crate::config::PortalConfig;

type Resolved = HashMap<Uuid, Option<AttachmentDescriptor>>;

/// Produces display projections from raw records.
#[derive(Clone)]
pub struct Normalizer {
    store: Arc<dyn BlobStore>,
    config: PortalConfig,
}

impl Normalizer {
    pub fn new(store: Arc<dyn BlobStore>, config: &PortalConfig) -> Self {
        Self {
            store,
            config: config.clone(),
        }
    }

    /// Normalize one record. `branch_hint` overrides the extracted branch.
    pub async fn normalize(
        &self,
        record: &FormRecord,
        branch_hint: Option<&str>,
    ) -> DisplayProjection {
        let resolved = self.resolve(declared_ids(record)).await;
        self.project(record, &resolved, branch_hint)
    }

    /// Normalize a batch, preserving input order.
    ///
    /// Blob ids shared between records are looked up once.
    pub async fn normalize_all(
        &self,
        records: &[FormRecord],
        branch_hint: Option<&str>,
    ) -> Vec<DisplayProjection> {
        let start = Instant::now();
        let mut seen = HashSet::new();
        let ids: Vec<Uuid> = records
            .iter()
            .flat_map(declared_ids)
            .filter(|id| seen.insert(*id))
            .collect();

        let resolved = self.resolve(ids).await;
        let projections: Vec<_> = records
            .iter()
            .map(|record| self.project(record, &resolved, branch_hint))
            .collect();

        debug!(
            subsystem = "portal",
            component = "normalizer",
            op = "normalize_all",
            result_count = projections.len(),
            blob_count = resolved.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Normalized records"
        );
        projections
    }

    async fn resolve(&self, ids: Vec<Uuid>) -> Resolved {
        if ids.is_empty() {
            return Resolved::new();
        }
        let concurrency = self.config.resolve_concurrency.clamp(1, ids.len());

        stream::iter(ids)
            .map(|id| async move {
                match self.store.head(id).await {
                    Ok(blob) => (id, Some(self.descriptor(blob))),
                    Err(e) if e.is_not_found() => {
                        warn!(
                            subsystem = "portal",
                            component = "normalizer",
                            blob_id = %id,
                            "Attachment references a missing blob"
                        );
                        (id, None)
                    }
                    Err(e) => {
                        warn!(
                            subsystem = "portal",
                            component = "normalizer",
                            blob_id = %id,
                            error = %e,
                            "Attachment lookup failed"
                        );
                        (id, None)
                    }
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await
    }

    fn descriptor(&self, blob: BlobObject) -> AttachmentDescriptor {
        AttachmentDescriptor {
            url: self.config.blob_url(blob.id),
            id: blob.id,
            original_name: blob.original_name,
            content_type: blob.content_type,
            size_bytes: blob.size_bytes,
        }
    }

    fn project(
        &self,
        record: &FormRecord,
        resolved: &Resolved,
        branch_hint: Option<&str>,
    ) -> DisplayProjection {
        let spec = record.variant.spec();
        let common = spec.extract(record);

        let mut attachments: BTreeMap<String, Vec<Option<AttachmentDescriptor>>> =
            CANONICAL_SLOTS
                .iter()
                .map(|slot| (slot.to_string(), Vec::new()))
                .collect();
        for slot in spec.slot_names() {
            let entries = record
                .slot(slot)
                .iter()
                .map(|r| resolved.get(&r.id).cloned().flatten())
                .collect();
            attachments.insert(slot.to_string(), entries);
        }
        for (alias, source) in spec.display_aliases {
            let mirrored = attachments.get(*source).cloned().unwrap_or_default();
            attachments.insert(alias.to_string(), mirrored);
        }

        let branch = branch_hint
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string)
            .unwrap_or(common.branch);

        trace!(
            subsystem = "portal",
            component = "normalizer",
            record_id = %record.id,
            variant = %record.variant,
            "Projected record"
        );

        DisplayProjection {
            id: record.id,
            variant: record.variant,
            owner_id: record.owner_id.clone(),
            topic: common.topic,
            applicant_name: common.applicant_name,
            branch,
            submitted_at: common.submitted_at,
            status: common.status,
            remarks: record.remarks.clone(),
            attachments,
            details: record.payload.clone(),
        }
    }
}

/// Blob ids in the slots the record's variant declares.
fn declared_ids(record: &FormRecord) -> Vec<Uuid> {
    record
        .variant
        .spec()
        .slot_names()
        .flat_map(|slot| record.slot(slot).iter().map(|r| r.id))
        .collect()
}
