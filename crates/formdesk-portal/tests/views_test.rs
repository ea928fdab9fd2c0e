//! Read paths: scoped listing, projections, status updates and orphan
//! reconciliation.

use std::sync::Arc;

use chrono::{Duration, Utc};
use formdesk_core::{
    BlobObject, BlobStore, Caller, Error, FormRecord, FormRecordRepository, FormStatus,
    FormVariant, IncomingFile, SlotFile, CANONICAL_SLOTS,
};
use formdesk_db::{compute_content_hash, MemoryBlobStore, MemoryRecordRepository};
use formdesk_portal::{Portal, PortalConfig};
use serde_json::json;
use uuid::Uuid;

fn portal(store: &MemoryBlobStore, repo: &MemoryRecordRepository) -> Portal {
    Portal::new(
        Arc::new(store.clone()),
        Arc::new(repo.clone()),
        PortalConfig::default(),
    )
}

fn pdf(name: &str) -> IncomingFile {
    IncomingFile::new(name, "application/pdf", b"%PDF-1.7\n%%EOF".to_vec())
}

fn student(id: &str) -> Caller {
    Caller::new(id, "student")
}

async fn seed(
    repo: &MemoryRecordRepository,
    variant: FormVariant,
    owner: &str,
    age_minutes: i64,
) -> FormRecord {
    let mut record = FormRecord::new(variant, owner, json!({}));
    record.created_at = Utc::now() - Duration::minutes(age_minutes);
    record.updated_at = record.created_at;
    repo.insert(&record).await.unwrap();
    record
}

fn raw_blob(store: &MemoryBlobStore, age: Duration) -> BlobObject {
    let data = b"%PDF-1.7".to_vec();
    let blob = BlobObject {
        id: Uuid::now_v7(),
        original_name: "stray.pdf".to_string(),
        content_type: "application/pdf".to_string(),
        size_bytes: data.len() as i64,
        content_hash: compute_content_hash(&data),
        created_at: Utc::now() - age,
    };
    store.insert_raw(blob.clone(), data);
    blob
}

#[tokio::test]
async fn test_projection_defaults_for_every_variant() {
    let store = MemoryBlobStore::new();
    let repo = MemoryRecordRepository::new();
    for (i, variant) in FormVariant::ALL.into_iter().enumerate() {
        seed(&repo, variant, "student-1", i as i64).await;
    }

    let listed = portal(&store, &repo)
        .list_by_owner("student-1", None)
        .await
        .unwrap();

    assert_eq!(listed.len(), 8);
    for p in &listed {
        assert_eq!(p.topic, "Untitled Project");
        assert_eq!(p.applicant_name, "N/A");
        assert_eq!(p.branch, "N/A");
        assert_eq!(p.status, FormStatus::Pending);
        assert_eq!(p.attachments.len(), CANONICAL_SLOTS.len());
    }
    // newest first: the variant seeded with age 0 leads
    assert_eq!(listed[0].variant, FormVariant::Ug1);
    assert_eq!(listed[7].variant, FormVariant::R1);
}

#[tokio::test]
async fn test_broken_reference_renders_as_null() {
    let store = MemoryBlobStore::new();
    let repo = MemoryRecordRepository::new();
    let portal = portal(&store, &repo);
    let record = portal
        .submit_with_attachments(
            "student-1",
            FormVariant::Ug3B,
            json!({"paperTitle": "Graphs"}),
            vec![
                SlotFile::new("documents", pdf("a.pdf")),
                SlotFile::new("documents", pdf("b.pdf")),
            ],
        )
        .await
        .unwrap();
    let gone = record.slot("documents")[1].id;
    store.delete(gone).await.unwrap();

    let listed = portal.list_by_owner("student-1", None).await.unwrap();
    let docs = listed[0].slot("documents");
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].as_ref().unwrap().original_name, "a.pdf");
    assert!(docs[1].is_none());
    assert_eq!(listed[0].topic, "Graphs");
}

#[tokio::test]
async fn test_projection_carries_details_and_remarks() {
    let store = MemoryBlobStore::new();
    let repo = MemoryRecordRepository::new();
    let portal = portal(&store, &repo);
    let payload = json!({
        "sttpTitle": "Edge AI",
        "studentName": "Meera",
        "department": "EXTC",
        "amountClaimed": 1200
    });
    let record = portal
        .submit_with_attachments("student-1", FormVariant::Pg1, payload.clone(), Vec::new())
        .await
        .unwrap();
    portal
        .update_status(
            &Caller::new("v1", "validator"),
            record.id,
            "approved",
            Some("  looks good ".to_string()),
        )
        .await
        .unwrap();

    let p = portal
        .get_application(&student("student-1"), record.id)
        .await
        .unwrap();
    assert_eq!(p.topic, "Edge AI");
    assert_eq!(p.applicant_name, "Meera");
    assert_eq!(p.branch, "EXTC");
    assert_eq!(p.status, FormStatus::Approved);
    assert_eq!(p.remarks.as_deref(), Some("looks good"));
    assert_eq!(p.details, payload);
}

#[tokio::test]
async fn test_scope_follows_caller_role() {
    let store = MemoryBlobStore::new();
    let repo = MemoryRecordRepository::new();
    let mine = seed(&repo, FormVariant::Ug1, "student-1", 10).await;
    let theirs = seed(&repo, FormVariant::R1, "student-2", 5).await;
    let portal = portal(&store, &repo);

    let own = portal
        .list_for_caller(&student("student-1"), None)
        .await
        .unwrap();
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].id, mine.id);

    let all = portal
        .list_for_caller(&Caller::new("c1", "Coordinator"), None)
        .await
        .unwrap();
    let ids: Vec<_> = all.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![theirs.id, mine.id]);

    assert_eq!(portal.list_all(None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_status_filter_applies_across_variants() {
    let store = MemoryBlobStore::new();
    let repo = MemoryRecordRepository::new();
    let a = seed(&repo, FormVariant::Ug2, "student-1", 3).await;
    seed(&repo, FormVariant::Pg2B, "student-1", 2).await;
    let portal = portal(&store, &repo);
    let admin = Caller::new("a1", "admin");

    portal
        .update_status(&admin, a.id, "Accepted", None)
        .await
        .unwrap();

    let approved = portal.list_all(Some(FormStatus::Approved)).await.unwrap();
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0].id, a.id);
    assert_eq!(
        portal
            .list_by_owner("student-1", Some(FormStatus::Pending))
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_branch_hint_overrides_record_branch() {
    let store = MemoryBlobStore::new();
    let repo = MemoryRecordRepository::new();
    let portal = portal(&store, &repo);
    let record = portal
        .submit_with_attachments("student-1", FormVariant::Ug1, json!({"branch": "Civil"}), Vec::new())
        .await
        .unwrap();

    let caller = student("student-1").with_branch("Computer");
    let listed = portal.list_for_caller(&caller, None).await.unwrap();
    assert_eq!(listed[0].branch, "Computer");

    let single = portal.get_application(&caller, record.id).await.unwrap();
    assert_eq!(single.branch, "Computer");

    let plain = portal.list_by_owner("student-1", None).await.unwrap();
    assert_eq!(plain[0].branch, "Civil");
}

#[tokio::test]
async fn test_get_application_is_owner_scoped() {
    let store = MemoryBlobStore::new();
    let repo = MemoryRecordRepository::new();
    let record = seed(&repo, FormVariant::Ug3A, "student-1", 1).await;
    let portal = portal(&store, &repo);

    let err = portal
        .get_application(&student("student-2"), record.id)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);

    assert!(portal
        .get_application(&Caller::new("v1", "validator"), record.id)
        .await
        .is_ok());
    assert!(portal
        .get_application(&student("student-1"), Uuid::now_v7())
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_update_status_rules() {
    let store = MemoryBlobStore::new();
    let repo = MemoryRecordRepository::new();
    let record = seed(&repo, FormVariant::R1, "student-1", 1).await;
    let portal = portal(&store, &repo);

    let err = portal
        .update_status(&Caller::new("v1", "validator"), record.id, "maybe", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let err = portal
        .update_status(&student("student-2"), record.id, "approved", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RecordNotFound(id) if id == record.id));
    assert_eq!(repo.get(record.id).unwrap().status, FormStatus::Pending);

    let updated = portal
        .update_status(
            &Caller::new("v1", "validator"),
            record.id,
            "DECLINED",
            Some("missing proof".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(updated.status, FormStatus::Rejected);
    assert_eq!(updated.remarks.as_deref(), Some("missing proof"));

    let err = portal
        .update_status(&Caller::new("v1", "validator"), Uuid::now_v7(), "pending", None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_orphan_scan_and_purge() {
    let store = MemoryBlobStore::new();
    let repo = MemoryRecordRepository::new();
    let portal = portal(&store, &repo);
    let record = portal
        .submit_with_attachments(
            "student-1",
            FormVariant::Ug2,
            json!({}),
            vec![SlotFile::new("uploadedFiles", pdf("kept.pdf"))],
        )
        .await
        .unwrap();
    let kept = record.slot("uploadedFiles")[0].id;
    let old_orphan = raw_blob(&store, Duration::hours(48));
    let fresh_orphan = raw_blob(&store, Duration::minutes(5));

    let found = portal.find_orphaned_blobs(Duration::hours(24)).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, old_orphan.id);

    let report = portal.purge_orphaned_blobs(Duration::hours(24)).await.unwrap();
    assert_eq!(report.deleted, vec![old_orphan.id]);
    assert!(report.is_clean());

    assert!(store.contains(kept));
    assert!(store.contains(fresh_orphan.id));
    assert!(!store.contains(old_orphan.id));

    let report = portal.purge_orphaned_blobs(Duration::zero()).await.unwrap();
    assert_eq!(report.deleted, vec![fresh_orphan.id]);
    assert!(store.contains(kept));
}
