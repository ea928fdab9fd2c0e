//! Attachment slot manager.
//!
//! Decides, before any blob is written, how a slot changes: which blobs the
//! new upload supersedes, whether it appends or replaces, and whether the
//! mutation is allowed at all. Applying the plan only edits the in-memory
//! record; superseded blobs are deleted by the caller after the record is
//! persisted.

use std::collections::{BTreeMap, HashSet};

use formdesk_core::{
    AttachmentKind, BlobRef, Cardinality, CheckedFile, Error, FormRecord, Result, SlotSpec,
    VariantSpec,
};

/// How a slot's contents change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotMode {
    /// No files and no clear flag.
    NoChange,
    /// Empty the slot.
    Clear,
    /// New blobs take the place of the current ones.
    Replace,
    /// New blobs are added after the current ones.
    Append,
}

/// A computed slot transition.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotPlan {
    pub slot: &'static str,
    pub partner: Option<&'static str>,
    pub mode: SlotMode,
    /// Blobs referenced now that will no longer be referenced after `apply`.
    pub superseded: Vec<BlobRef>,
}

impl SlotPlan {
    pub fn is_no_change(&self) -> bool {
        self.mode == SlotMode::NoChange
    }
}

fn invalid(msg: String) -> Error {
    Error::InvalidInput(msg)
}

/// Look up a slot the variant declares.
pub fn slot_spec(spec: &VariantSpec, slot: &str) -> Result<&'static SlotSpec> {
    spec.slot(slot).ok_or_else(|| {
        invalid(format!(
            "Unknown slot '{}' for variant {}",
            slot, spec.tag
        ))
    })
}

/// Per-slot batch rules: accepted kinds, no archive mixed with other files,
/// unique filenames, and the batch alone within the slot's bound.
pub fn check_batch(slot: &SlotSpec, files: &[CheckedFile]) -> Result<()> {
    for file in files {
        if !slot.accepts(file.kind) {
            return Err(invalid(format!(
                "{}: {} files are not accepted in slot '{}'",
                file.name, file.kind, slot.name
            )));
        }
    }

    let has_archive = files.iter().any(|f| f.kind == AttachmentKind::Archive);
    if has_archive && files.len() > 1 {
        return Err(invalid(format!(
            "Slot '{}': an archive must be uploaded on its own",
            slot.name
        )));
    }

    let mut seen = HashSet::new();
    for file in files {
        if !seen.insert(file.name.as_str()) {
            return Err(invalid(format!(
                "Slot '{}': duplicate file name '{}'",
                slot.name, file.name
            )));
        }
    }

    let max = slot.cardinality.max();
    if files.len() > max {
        return Err(invalid(format!(
            "Slot '{}' accepts at most {} file(s), got {}",
            slot.name,
            max,
            files.len()
        )));
    }
    Ok(())
}

/// Compute the transition of `slot` on `record` for an incoming batch.
///
/// Full replacement happens for single slots, for an explicit clear with
/// files, and whenever an archive enters or leaves a multi slot. Otherwise a
/// multi slot appends, and must stay within its bound. A populated exclusive
/// partner is always superseded by a non-empty upload.
pub fn plan(
    spec: &VariantSpec,
    record: &FormRecord,
    slot: &str,
    files: &[CheckedFile],
    clear: bool,
) -> Result<SlotPlan> {
    let slot_spec = slot_spec(spec, slot)?;
    check_batch(slot_spec, files)?;

    let current = record.slot(slot_spec.name);
    let partner = slot_spec.exclusive_with;

    if files.is_empty() {
        let mode = if clear && !current.is_empty() {
            SlotMode::Clear
        } else {
            SlotMode::NoChange
        };
        let superseded = if mode == SlotMode::Clear {
            current.to_vec()
        } else {
            Vec::new()
        };
        return Ok(SlotPlan {
            slot: slot_spec.name,
            partner,
            mode,
            superseded,
        });
    }

    let archive_involved = files.iter().any(|f| f.kind == AttachmentKind::Archive)
        || current.iter().any(|r| r.kind == AttachmentKind::Archive);
    let replace =
        clear || slot_spec.cardinality == Cardinality::Single || archive_involved;

    let mut superseded = Vec::new();
    let mode = if replace {
        superseded.extend_from_slice(current);
        SlotMode::Replace
    } else {
        let max = slot_spec.cardinality.max();
        if current.len() + files.len() > max {
            return Err(invalid(format!(
                "Slot '{}' holds {} of {} file(s); cannot add {}",
                slot_spec.name,
                current.len(),
                max,
                files.len()
            )));
        }
        SlotMode::Append
    };

    if let Some(partner) = partner {
        superseded.extend_from_slice(record.slot(partner));
    }

    Ok(SlotPlan {
        slot: slot_spec.name,
        partner,
        mode,
        superseded,
    })
}

/// Apply a plan to the in-memory record. The caller persists it.
pub fn apply(record: &mut FormRecord, plan: &SlotPlan, new: Vec<BlobRef>) {
    match plan.mode {
        SlotMode::NoChange => return,
        SlotMode::Clear => record.set_slot(plan.slot, Vec::new()),
        SlotMode::Replace => record.set_slot(plan.slot, new),
        SlotMode::Append => {
            let mut refs = record.slot(plan.slot).to_vec();
            refs.extend(new);
            record.set_slot(plan.slot, refs);
        }
    }
    if plan.mode != SlotMode::Clear {
        if let Some(partner) = plan.partner {
            record.set_slot(partner, Vec::new());
        }
    }
}

/// Whole-request rules for a new submission: every slot is declared, no
/// exclusive pair is populated twice, and required slots are present.
pub fn check_submission(
    spec: &VariantSpec,
    grouped: &BTreeMap<String, Vec<CheckedFile>>,
) -> Result<()> {
    for (slot, files) in grouped {
        let slot_spec = slot_spec(spec, slot)?;
        if files.is_empty() {
            continue;
        }
        if let Some(partner) = slot_spec.exclusive_with {
            if grouped.get(partner).is_some_and(|p| !p.is_empty()) {
                return Err(invalid(format!(
                    "Slots '{}' and '{}' are mutually exclusive",
                    slot_spec.name, partner
                )));
            }
        }
    }

    for slot_spec in spec.slots.iter().filter(|s| s.required) {
        let present = grouped
            .get(slot_spec.name)
            .is_some_and(|files| !files.is_empty());
        let covered_by_partner = slot_spec
            .exclusive_with
            .and_then(|p| grouped.get(p))
            .is_some_and(|files| !files.is_empty());
        if !present && !covered_by_partner {
            return Err(invalid(format!(
                "Missing required attachment '{}' for variant {}",
                slot_spec.name, spec.tag
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use formdesk_core::{BlobRef, FormVariant};
    use serde_json::json;
    use uuid::Uuid;

    fn file(name: &str, kind: AttachmentKind) -> CheckedFile {
        CheckedFile {
            name: name.to_string(),
            content_type: "application/octet-stream".to_string(),
            kind,
            data: vec![1, 2, 3],
        }
    }

    fn refs(n: usize, kind: AttachmentKind) -> Vec<BlobRef> {
        (0..n).map(|_| BlobRef::new(Uuid::now_v7(), kind)).collect()
    }

    fn doc(name: &str) -> CheckedFile {
        file(name, AttachmentKind::Document)
    }

    #[test]
    fn test_unknown_slot_is_rejected() {
        let record = FormRecord::new(FormVariant::Ug1, "u", json!({}));
        let err = plan(FormVariant::Ug1.spec(), &record, "bills", &[doc("a.pdf")], false)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_empty_upload_without_clear_is_no_change() {
        let mut record = FormRecord::new(FormVariant::Ug1, "u", json!({}));
        record.set_slot("documents", refs(2, AttachmentKind::Document));
        let p = plan(FormVariant::Ug1.spec(), &record, "documents", &[], false).unwrap();
        assert!(p.is_no_change());
        assert!(p.superseded.is_empty());
    }

    #[test]
    fn test_clear_supersedes_current_only() {
        let mut record = FormRecord::new(FormVariant::R1, "u", json!({}));
        let current = refs(2, AttachmentKind::Document);
        record.set_slot("documents", current.clone());

        let p = plan(FormVariant::R1.spec(), &record, "documents", &[], true).unwrap();
        assert_eq!(p.mode, SlotMode::Clear);
        assert_eq!(p.superseded, current);

        apply(&mut record, &p, Vec::new());
        assert!(record.slot("documents").is_empty());
    }

    #[test]
    fn test_archive_supersedes_exclusive_partner() {
        let mut record = FormRecord::new(FormVariant::Pg1, "u", json!({}));
        let docs = refs(3, AttachmentKind::Document);
        record.set_slot("documents", docs.clone());

        let p = plan(
            FormVariant::Pg1.spec(),
            &record,
            "archive",
            &[file("all.zip", AttachmentKind::Archive)],
            false,
        )
        .unwrap();
        assert_eq!(p.mode, SlotMode::Replace);
        assert_eq!(p.superseded, docs);

        let archive = BlobRef::new(Uuid::now_v7(), AttachmentKind::Archive);
        apply(&mut record, &p, vec![archive]);
        assert!(record.slot("documents").is_empty());
        assert_eq!(record.slot("archive"), &[archive]);
    }

    #[test]
    fn test_archive_replaces_documents_in_same_slot() {
        let mut record = FormRecord::new(FormVariant::Ug1, "u", json!({}));
        let docs = refs(2, AttachmentKind::Document);
        record.set_slot("documents", docs.clone());

        let p = plan(
            FormVariant::Ug1.spec(),
            &record,
            "documents",
            &[file("bundle.zip", AttachmentKind::Archive)],
            false,
        )
        .unwrap();
        assert_eq!(p.mode, SlotMode::Replace);
        assert_eq!(p.superseded, docs);
    }

    #[test]
    fn test_documents_replace_archive_in_same_slot() {
        let mut record = FormRecord::new(FormVariant::Ug2, "u", json!({}));
        let zip = refs(1, AttachmentKind::Archive);
        record.set_slot("uploadedFiles", zip.clone());

        let p = plan(
            FormVariant::Ug2.spec(),
            &record,
            "uploadedFiles",
            &[doc("a.pdf")],
            false,
        )
        .unwrap();
        assert_eq!(p.mode, SlotMode::Replace);
        assert_eq!(p.superseded, zip);
    }

    #[test]
    fn test_documents_append_within_bound() {
        let mut record = FormRecord::new(FormVariant::Ug3B, "u", json!({}));
        let existing = refs(3, AttachmentKind::Document);
        record.set_slot("documents", existing.clone());

        let p = plan(
            FormVariant::Ug3B.spec(),
            &record,
            "documents",
            &[doc("d.pdf"), doc("e.pdf")],
            false,
        )
        .unwrap();
        assert_eq!(p.mode, SlotMode::Append);
        assert!(p.superseded.is_empty());

        let new = refs(2, AttachmentKind::Document);
        apply(&mut record, &p, new.clone());
        let expected: Vec<_> = existing.into_iter().chain(new).collect();
        assert_eq!(record.slot("documents"), expected.as_slice());
    }

    #[test]
    fn test_append_beyond_bound_is_rejected() {
        let mut record = FormRecord::new(FormVariant::Ug3B, "u", json!({}));
        record.set_slot("documents", refs(4, AttachmentKind::Document));

        let err = plan(
            FormVariant::Ug3B.spec(),
            &record,
            "documents",
            &[doc("e.pdf"), doc("f.pdf")],
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("holds 4 of 5"));
    }

    #[test]
    fn test_clear_with_files_replaces() {
        let mut record = FormRecord::new(FormVariant::Ug3B, "u", json!({}));
        let existing = refs(5, AttachmentKind::Document);
        record.set_slot("documents", existing.clone());

        let p = plan(
            FormVariant::Ug3B.spec(),
            &record,
            "documents",
            &[doc("fresh.pdf")],
            true,
        )
        .unwrap();
        assert_eq!(p.mode, SlotMode::Replace);
        assert_eq!(p.superseded, existing);
    }

    #[test]
    fn test_single_slot_replaces() {
        let mut record = FormRecord::new(FormVariant::Ug1, "u", json!({}));
        let old = refs(1, AttachmentKind::Image);
        record.set_slot("guideSignature", old.clone());

        let p = plan(
            FormVariant::Ug1.spec(),
            &record,
            "guideSignature",
            &[file("sig.png", AttachmentKind::Image)],
            false,
        )
        .unwrap();
        assert_eq!(p.mode, SlotMode::Replace);
        assert_eq!(p.superseded, old);
    }

    #[test]
    fn test_batch_rules() {
        let slot = FormVariant::Ug1.spec().slot("documents").unwrap();
        assert!(check_batch(slot, &[doc("a.pdf"), doc("a.pdf")])
            .unwrap_err()
            .to_string()
            .contains("duplicate"));
        assert!(check_batch(
            slot,
            &[doc("a.pdf"), file("b.zip", AttachmentKind::Archive)]
        )
        .unwrap_err()
        .to_string()
        .contains("on its own"));
        assert!(check_batch(slot, &[file("a.png", AttachmentKind::Image)]).is_err());

        let six: Vec<_> = (0..6).map(|i| doc(&format!("{i}.pdf"))).collect();
        assert!(check_batch(slot, &six).is_err());
    }

    #[test]
    fn test_submission_rejects_both_exclusive_slots() {
        let mut grouped = BTreeMap::new();
        grouped.insert("documents".to_string(), vec![doc("a.pdf")]);
        grouped.insert(
            "archive".to_string(),
            vec![file("b.zip", AttachmentKind::Archive)],
        );
        let err = check_submission(FormVariant::R1.spec(), &grouped).unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn test_submission_requires_required_slots() {
        let mut grouped = BTreeMap::new();
        grouped.insert("bills".to_string(), vec![doc("bill.pdf")]);
        grouped.insert(
            "studentSignature".to_string(),
            vec![file("s.png", AttachmentKind::Image)],
        );
        let err = check_submission(FormVariant::Pg2A.spec(), &grouped).unwrap_err();
        assert!(err.to_string().contains("guideSignature"));

        grouped.insert(
            "guideSignature".to_string(),
            vec![file("g.png", AttachmentKind::Image)],
        );
        assert!(check_submission(FormVariant::Pg2A.spec(), &grouped).is_ok());
    }

    #[test]
    fn test_required_slot_satisfied_by_exclusive_partner() {
        let mut grouped = BTreeMap::new();
        grouped.insert(
            "archive".to_string(),
            vec![file("bills.zip", AttachmentKind::Archive)],
        );
        grouped.insert(
            "studentSignature".to_string(),
            vec![file("s.png", AttachmentKind::Image)],
        );
        grouped.insert(
            "guideSignature".to_string(),
            vec![file("g.png", AttachmentKind::Image)],
        );
        assert!(check_submission(FormVariant::Pg2A.spec(), &grouped).is_ok());
    }
}
