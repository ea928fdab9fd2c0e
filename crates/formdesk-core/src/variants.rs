//! Form variant registry.
//!
//! A static, variant-indexed table: each entry declares the attachment slots of
//! one record shape and the field sources used to build its [`CommonFields`].
//! Lookups go through [`FormVariant::spec`], never through string matching.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::defaults::{NOT_AVAILABLE, UNTITLED_TOPIC};
use crate::models::{AttachmentKind, CommonFields, FormRecord};

/// The eight record shapes, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FormVariant {
    #[serde(rename = "UG_1")]
    Ug1,
    #[serde(rename = "UG_2")]
    Ug2,
    #[serde(rename = "UG_3_A")]
    Ug3A,
    #[serde(rename = "UG_3_B")]
    Ug3B,
    #[serde(rename = "PG_1")]
    Pg1,
    #[serde(rename = "PG_2_A")]
    Pg2A,
    #[serde(rename = "PG_2_B")]
    Pg2B,
    #[serde(rename = "R1")]
    R1,
}

impl FormVariant {
    /// All variants in declaration order.
    pub const ALL: [FormVariant; 8] = [
        FormVariant::Ug1,
        FormVariant::Ug2,
        FormVariant::Ug3A,
        FormVariant::Ug3B,
        FormVariant::Pg1,
        FormVariant::Pg2A,
        FormVariant::Pg2B,
        FormVariant::R1,
    ];

    /// Wire tag as stored and exchanged with clients.
    pub fn tag(&self) -> &'static str {
        self.spec().tag
    }

    /// Position in declaration order.
    pub fn ordinal(&self) -> usize {
        *self as usize
    }

    /// Registry entry for this variant.
    pub fn spec(&self) -> &'static VariantSpec {
        &REGISTRY[self.ordinal()]
    }
}

impl std::fmt::Display for FormVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

impl std::str::FromStr for FormVariant {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        FormVariant::ALL
            .into_iter()
            .find(|v| v.tag().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown form variant: {}", s))
    }
}

/// How many blobs a slot may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Zero or one blob.
    Single,
    /// Zero up to `max` blobs.
    Multi { max: usize },
}

impl Cardinality {
    pub fn max(&self) -> usize {
        match self {
            Cardinality::Single => 1,
            Cardinality::Multi { max } => *max,
        }
    }
}

/// Policy of one attachment slot within a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSpec {
    pub name: &'static str,
    pub cardinality: Cardinality,
    pub accepts: &'static [AttachmentKind],
    /// Partner slot that must be empty whenever this one is populated.
    pub exclusive_with: Option<&'static str>,
    /// Must be populated at submission.
    pub required: bool,
}

impl SlotSpec {
    pub fn accepts(&self, kind: AttachmentKind) -> bool {
        self.accepts.contains(&kind)
    }
}

/// Registry entry for one variant.
#[derive(Debug)]
pub struct VariantSpec {
    pub variant: FormVariant,
    pub tag: &'static str,
    pub slots: &'static [SlotSpec],
    /// JSON pointers into the payload, tried in order.
    pub topic_sources: &'static [&'static str],
    pub applicant_sources: &'static [&'static str],
    pub branch_sources: &'static [&'static str],
    pub submitted_sources: &'static [&'static str],
    /// Projection-only slots that mirror a declared slot, as `(alias, source)`.
    pub display_aliases: &'static [(&'static str, &'static str)],
}

impl VariantSpec {
    /// Slot policy by name, if the variant declares it.
    pub fn slot(&self, name: &str) -> Option<&'static SlotSpec> {
        self.slots.iter().find(|s| s.name == name)
    }

    pub fn slot_names(&self) -> impl Iterator<Item = &'static str> {
        self.slots.iter().map(|s| s.name)
    }

    /// Map the record's heterogeneous fields onto the common projection fields.
    ///
    /// Pure: absent sources fall back to fixed defaults, and the submission
    /// time falls back to the record's stored creation time.
    pub fn extract(&self, record: &FormRecord) -> CommonFields {
        let payload = &record.payload;
        CommonFields {
            topic: first_text(payload, self.topic_sources)
                .unwrap_or_else(|| UNTITLED_TOPIC.to_string()),
            applicant_name: first_text(payload, self.applicant_sources)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            branch: first_text(payload, self.branch_sources)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            submitted_at: first_timestamp(payload, self.submitted_sources)
                .unwrap_or(record.created_at),
            status: record.status,
        }
    }
}

/// First non-blank string (or number) found at any of `pointers`.
fn first_text(payload: &JsonValue, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|p| match payload.pointer(p)? {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn first_timestamp(payload: &JsonValue, pointers: &[&str]) -> Option<DateTime<Utc>> {
    pointers.iter().find_map(|p| {
        let raw = payload.pointer(p)?.as_str()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

/// Every slot name any variant declares, in stable order.
///
/// Projections carry all of these so consumers never branch on presence.
pub const CANONICAL_SLOTS: &[&str] = &[
    "documents",
    "archive",
    "uploadedFiles",
    "bills",
    "additionalDocuments",
    "uploadedImage",
    "paperCopy",
    "proofDocument",
    "groupLeaderSignature",
    "studentSignature",
    "guideSignature",
    "hodSignature",
    "sdcChairpersonSignature",
];

// ─── Slot policies ─────────────────────────────────────────────────────────

const DOC: &[AttachmentKind] = &[AttachmentKind::Document];
const DOC_OR_ARCHIVE: &[AttachmentKind] = &[AttachmentKind::Document, AttachmentKind::Archive];
const DOC_OR_IMAGE: &[AttachmentKind] = &[AttachmentKind::Document, AttachmentKind::Image];
const ARCHIVE: &[AttachmentKind] = &[AttachmentKind::Archive];
const IMAGE: &[AttachmentKind] = &[AttachmentKind::Image];

const fn single(name: &'static str, accepts: &'static [AttachmentKind]) -> SlotSpec {
    SlotSpec {
        name,
        cardinality: Cardinality::Single,
        accepts,
        exclusive_with: None,
        required: false,
    }
}

const fn multi(name: &'static str, max: usize, accepts: &'static [AttachmentKind]) -> SlotSpec {
    SlotSpec {
        name,
        cardinality: Cardinality::Multi { max },
        accepts,
        exclusive_with: None,
        required: false,
    }
}

const fn signature(name: &'static str) -> SlotSpec {
    single(name, DOC_OR_IMAGE)
}

const fn exclusive(mut slot: SlotSpec, partner: &'static str) -> SlotSpec {
    slot.exclusive_with = Some(partner);
    slot
}

const fn required(mut slot: SlotSpec) -> SlotSpec {
    slot.required = true;
    slot
}

const DOCUMENTS_OR_ARCHIVE: [SlotSpec; 2] = [
    exclusive(multi("documents", 5, DOC), "archive"),
    exclusive(single("archive", ARCHIVE), "documents"),
];

const UG1_SLOTS: &[SlotSpec] = &[
    multi("documents", 5, DOC_OR_ARCHIVE),
    signature("groupLeaderSignature"),
    signature("guideSignature"),
];

const UG2_SLOTS: &[SlotSpec] = &[
    multi("uploadedFiles", 10, DOC_OR_ARCHIVE),
    signature("groupLeaderSignature"),
    signature("guideSignature"),
];

const UG3A_SLOTS: &[SlotSpec] = &[
    single("uploadedImage", IMAGE),
    DOCUMENTS_OR_ARCHIVE[0],
    DOCUMENTS_OR_ARCHIVE[1],
];

const UG3B_SLOTS: &[SlotSpec] = &[
    DOCUMENTS_OR_ARCHIVE[0],
    DOCUMENTS_OR_ARCHIVE[1],
    signature("groupLeaderSignature"),
    signature("guideSignature"),
    single("paperCopy", DOC),
    multi("additionalDocuments", 5, DOC),
];

const PG1_SLOTS: &[SlotSpec] = &[
    DOCUMENTS_OR_ARCHIVE[0],
    DOCUMENTS_OR_ARCHIVE[1],
    signature("studentSignature"),
    signature("guideSignature"),
    multi("additionalDocuments", 5, DOC),
];

const PG2A_SLOTS: &[SlotSpec] = &[
    required(exclusive(multi("bills", 10, DOC_OR_IMAGE), "archive")),
    exclusive(single("archive", ARCHIVE), "bills"),
    required(signature("studentSignature")),
    required(signature("guideSignature")),
    signature("groupLeaderSignature"),
];

const PG2B_SLOTS: &[SlotSpec] = &[
    single("paperCopy", DOC),
    signature("groupLeaderSignature"),
    signature("guideSignature"),
    multi("additionalDocuments", 5, DOC),
];

const R1_SLOTS: &[SlotSpec] = &[
    DOCUMENTS_OR_ARCHIVE[0],
    DOCUMENTS_OR_ARCHIVE[1],
    single("proofDocument", DOC_OR_IMAGE),
    signature("studentSignature"),
    signature("guideSignature"),
    signature("hodSignature"),
    signature("sdcChairpersonSignature"),
];

// ─── Field sources ─────────────────────────────────────────────────────────

const TOPIC: &[&str] = &["/projectTitle", "/paperTitle", "/topic"];
const TOPIC_STTP_FIRST: &[&str] = &["/sttpTitle", "/projectTitle", "/paperTitle", "/topic"];
const APPLICANT: &[&str] = &[
    "/studentName",
    "/applicantName",
    "/students/0/name",
    "/studentDetails/0/studentName",
];
const APPLICANT_STUDENT_NAME: &[&str] = &["/studentName"];
const APPLICANT_STUDENT_DETAILS: &[&str] = &["/studentDetails/0/name"];
const BRANCH: &[&str] = &[
    "/branch",
    "/department",
    "/students/0/branch",
    "/studentDetails/0/branch",
];
const SUBMITTED: &[&str] = &["/createdAt", "/submittedAt"];

const fn entry(
    variant: FormVariant,
    tag: &'static str,
    slots: &'static [SlotSpec],
    topic_sources: &'static [&'static str],
    applicant_sources: &'static [&'static str],
) -> VariantSpec {
    VariantSpec {
        variant,
        tag,
        slots,
        topic_sources,
        applicant_sources,
        branch_sources: BRANCH,
        submitted_sources: SUBMITTED,
        display_aliases: &[],
    }
}

/// Indexed by `FormVariant as usize`.
static REGISTRY: [VariantSpec; 8] = [
    entry(FormVariant::Ug1, "UG_1", UG1_SLOTS, TOPIC, APPLICANT),
    entry(FormVariant::Ug2, "UG_2", UG2_SLOTS, TOPIC, APPLICANT),
    entry(FormVariant::Ug3A, "UG_3_A", UG3A_SLOTS, TOPIC, APPLICANT),
    entry(FormVariant::Ug3B, "UG_3_B", UG3B_SLOTS, TOPIC, APPLICANT),
    entry(FormVariant::Pg1, "PG_1", PG1_SLOTS, TOPIC_STTP_FIRST, APPLICANT_STUDENT_NAME),
    entry(FormVariant::Pg2A, "PG_2_A", PG2A_SLOTS, TOPIC, APPLICANT_STUDENT_DETAILS),
    VariantSpec {
        display_aliases: &[("studentSignature", "groupLeaderSignature")],
        ..entry(FormVariant::Pg2B, "PG_2_B", PG2B_SLOTS, TOPIC, APPLICANT_STUDENT_NAME)
    },
    entry(FormVariant::R1, "R1", R1_SLOTS, TOPIC, APPLICANT),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FormStatus;
    use serde_json::json;

    #[test]
    fn test_registry_is_indexed_by_variant() {
        for variant in FormVariant::ALL {
            assert_eq!(variant.spec().variant, variant);
        }
    }

    #[test]
    fn test_tag_roundtrip() {
        for variant in FormVariant::ALL {
            assert_eq!(variant.tag().parse::<FormVariant>(), Ok(variant));
            let json = serde_json::to_value(variant).unwrap();
            assert_eq!(json, variant.tag());
        }
        assert!("UG_9".parse::<FormVariant>().is_err());
    }

    #[test]
    fn test_every_declared_slot_is_canonical() {
        for variant in FormVariant::ALL {
            for name in variant.spec().slot_names() {
                assert!(
                    CANONICAL_SLOTS.contains(&name),
                    "{} declares non-canonical slot {}",
                    variant,
                    name
                );
            }
        }
    }

    #[test]
    fn test_exclusive_pairs_are_symmetric() {
        for variant in FormVariant::ALL {
            let spec = variant.spec();
            for slot in spec.slots {
                if let Some(partner) = slot.exclusive_with {
                    let other = spec
                        .slot(partner)
                        .unwrap_or_else(|| panic!("{}: missing partner {}", variant, partner));
                    assert_eq!(other.exclusive_with, Some(slot.name));
                }
            }
        }
    }

    #[test]
    fn test_display_aliases_mirror_declared_slots() {
        for variant in FormVariant::ALL {
            let spec = variant.spec();
            for (alias, source) in spec.display_aliases {
                assert!(CANONICAL_SLOTS.contains(alias), "{}: {}", variant, alias);
                assert!(spec.slot(alias).is_none(), "{}: {} is declared", variant, alias);
                assert!(spec.slot(source).is_some(), "{}: {} undeclared", variant, source);
            }
        }
        assert_eq!(
            FormVariant::Pg2B.spec().display_aliases,
            &[("studentSignature", "groupLeaderSignature")]
        );
    }

    #[test]
    fn test_extract_defaults_for_every_variant() {
        for variant in FormVariant::ALL {
            let record = FormRecord::new(variant, "owner", json!({}));
            let fields = variant.spec().extract(&record);
            assert_eq!(fields.topic, UNTITLED_TOPIC);
            assert_eq!(fields.applicant_name, NOT_AVAILABLE);
            assert_eq!(fields.branch, NOT_AVAILABLE);
            assert_eq!(fields.submitted_at, record.created_at);
            assert_eq!(fields.status, FormStatus::Pending);
        }
    }

    #[test]
    fn test_extract_fallback_order() {
        let record = FormRecord::new(
            FormVariant::Ug3B,
            "owner",
            json!({
                "paperTitle": "Paper",
                "topic": "Topic",
                "students": [{"name": "Asha", "branch": "COMP"}],
                "department": "IT",
            }),
        );
        let fields = FormVariant::Ug3B.spec().extract(&record);
        assert_eq!(fields.topic, "Paper");
        assert_eq!(fields.applicant_name, "Asha");
        assert_eq!(fields.branch, "IT");
    }

    #[test]
    fn test_extract_pg1_prefers_sttp_title() {
        let record = FormRecord::new(
            FormVariant::Pg1,
            "owner",
            json!({"sttpTitle": "STTP", "projectTitle": "Project", "applicantName": "Ignored"}),
        );
        let fields = FormVariant::Pg1.spec().extract(&record);
        assert_eq!(fields.topic, "STTP");
        assert_eq!(fields.applicant_name, NOT_AVAILABLE);
    }

    #[test]
    fn test_extract_pg2b_uses_student_name_only() {
        let record = FormRecord::new(
            FormVariant::Pg2B,
            "owner",
            json!({"applicantName": "Someone", "students": [{"name": "Other"}]}),
        );
        let fields = FormVariant::Pg2B.spec().extract(&record);
        assert_eq!(fields.applicant_name, NOT_AVAILABLE);

        let record = FormRecord::new(FormVariant::Pg2B, "owner", json!({"studentName": "Kiran"}));
        assert_eq!(FormVariant::Pg2B.spec().extract(&record).applicant_name, "Kiran");
    }

    #[test]
    fn test_extract_pg2a_uses_student_details() {
        let record = FormRecord::new(
            FormVariant::Pg2A,
            "owner",
            json!({"studentDetails": [{"name": "Ravi", "branch": "EXTC"}]}),
        );
        let fields = FormVariant::Pg2A.spec().extract(&record);
        assert_eq!(fields.applicant_name, "Ravi");
        assert_eq!(fields.branch, "EXTC");
    }

    #[test]
    fn test_extract_blank_strings_fall_through() {
        let record = FormRecord::new(
            FormVariant::R1,
            "owner",
            json!({"projectTitle": "   ", "paperTitle": "Real"}),
        );
        assert_eq!(FormVariant::R1.spec().extract(&record).topic, "Real");
    }

    #[test]
    fn test_extract_submitted_at_from_payload() {
        let record = FormRecord::new(
            FormVariant::Ug1,
            "owner",
            json!({"submittedAt": "2025-03-01T10:00:00Z"}),
        );
        let fields = FormVariant::Ug1.spec().extract(&record);
        assert_eq!(fields.submitted_at.to_rfc3339(), "2025-03-01T10:00:00+00:00");
    }

    #[test]
    fn test_pg2a_required_slots() {
        let required: Vec<_> = FormVariant::Pg2A
            .spec()
            .slots
            .iter()
            .filter(|s| s.required)
            .map(|s| s.name)
            .collect();
        assert_eq!(required, vec!["bills", "studentSignature", "guideSignature"]);
    }
}
