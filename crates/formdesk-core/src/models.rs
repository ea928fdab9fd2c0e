//! Core data models for formdesk.
//!
//! These types are shared across all formdesk crates and represent the
//! attachment lifecycle entities: blobs, form records, and their projections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::variants::FormVariant;

// =============================================================================
// BLOB TYPES
// =============================================================================

/// Immutable metadata of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobObject {
    pub id: Uuid,
    pub original_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    /// `blake3:{hex}` digest of the content, for integrity reporting.
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Blob metadata together with its bytes.
#[derive(Debug, Clone)]
pub struct BlobContent {
    pub blob: BlobObject,
    pub data: Vec<u8>,
}

/// Coarse classification of an attachment, decided once at intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    /// PDF-like single document.
    Document,
    /// ZIP archive bundling many documents.
    Archive,
    /// Raster image (JPEG/PNG), typically a signature or photo.
    Image,
    /// Anything else that passed safety checks.
    Other,
}

impl std::fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Document => write!(f, "document"),
            Self::Archive => write!(f, "archive"),
            Self::Image => write!(f, "image"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Reference from a record slot to a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    pub id: Uuid,
    pub kind: AttachmentKind,
}

impl BlobRef {
    pub fn new(id: Uuid, kind: AttachmentKind) -> Self {
        Self { id, kind }
    }
}

// =============================================================================
// RECORD TYPES
// =============================================================================

/// Review status of a form record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FormStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for FormStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for FormStatus {
    type Err = String;

    /// Case-insensitive; "accepted" and "declined" are accepted as aliases.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" | "accepted" => Ok(Self::Approved),
            "rejected" | "declined" => Ok(Self::Rejected),
            _ => Err(format!("Invalid form status: {}", s)),
        }
    }
}

/// Slot name → current blob references.
pub type SlotMap = BTreeMap<String, Vec<BlobRef>>;

/// A submitted application of one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormRecord {
    pub id: Uuid,
    pub variant: FormVariant,
    pub owner_id: String,
    pub status: FormStatus,
    pub remarks: Option<String>,
    pub slots: SlotMap,
    /// Variant-specific fields, opaque to the attachment core.
    pub payload: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FormRecord {
    /// Create a pending record with empty slots.
    pub fn new(variant: FormVariant, owner_id: impl Into<String>, payload: JsonValue) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            variant,
            owner_id: owner_id.into(),
            status: FormStatus::Pending,
            remarks: None,
            slots: SlotMap::new(),
            payload,
            created_at: now,
            updated_at: now,
        }
    }

    /// Blobs currently held by `slot` (empty when the slot is unset).
    pub fn slot(&self, slot: &str) -> &[BlobRef] {
        self.slots.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replace the contents of `slot`; an empty list removes the key.
    pub fn set_slot(&mut self, slot: &str, refs: Vec<BlobRef>) {
        if refs.is_empty() {
            self.slots.remove(slot);
        } else {
            self.slots.insert(slot.to_string(), refs);
        }
    }

    /// Every blob id referenced by any slot.
    pub fn blob_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.slots.values().flatten().map(|r| r.id)
    }
}

/// A file received from a client, not yet stored.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl IncomingFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// An incoming file addressed to a slot.
#[derive(Debug, Clone)]
pub struct SlotFile {
    pub slot: String,
    pub file: IncomingFile,
}

impl SlotFile {
    pub fn new(slot: impl Into<String>, file: IncomingFile) -> Self {
        Self {
            slot: slot.into(),
            file,
        }
    }
}

// =============================================================================
// CALLER
// =============================================================================

/// Identity of whoever is calling into the portal, resolved by the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub owner_id: String,
    pub role: String,
    /// Branch of the logged-in user; overrides the branch found on records.
    pub branch: Option<String>,
}

impl Caller {
    pub fn new(owner_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            role: role.into(),
            branch: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Whether the caller's role is in `elevated` (case-insensitive).
    pub fn is_elevated(&self, elevated: &[String]) -> bool {
        let role = self.role.trim().to_lowercase();
        elevated.iter().any(|r| r.eq_ignore_ascii_case(&role))
    }
}

// =============================================================================
// PROJECTION TYPES
// =============================================================================

/// Normalized fields shared by every variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonFields {
    pub topic: String,
    pub applicant_name: String,
    pub branch: String,
    pub submitted_at: DateTime<Utc>,
    pub status: FormStatus,
}

/// A resolved attachment, ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDescriptor {
    pub id: Uuid,
    pub original_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub url: String,
}

/// Uniform, display-ready view of a record of any variant.
///
/// `attachments` holds every known slot name; slots the variant does not
/// declare are empty arrays, and broken references are `null` entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayProjection {
    pub id: Uuid,
    pub variant: FormVariant,
    pub owner_id: String,
    pub topic: String,
    pub applicant_name: String,
    pub branch: String,
    pub submitted_at: DateTime<Utc>,
    pub status: FormStatus,
    pub remarks: Option<String>,
    pub attachments: BTreeMap<String, Vec<Option<AttachmentDescriptor>>>,
    pub details: JsonValue,
}

impl DisplayProjection {
    /// Attachments of `slot`, empty for unknown slots.
    pub fn slot(&self, slot: &str) -> &[Option<AttachmentDescriptor>] {
        self.attachments
            .get(slot)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_form_status_aliases() {
        assert_eq!("Approved".parse::<FormStatus>(), Ok(FormStatus::Approved));
        assert_eq!("accepted".parse::<FormStatus>(), Ok(FormStatus::Approved));
        assert_eq!("DECLINED".parse::<FormStatus>(), Ok(FormStatus::Rejected));
        assert_eq!(" pending ".parse::<FormStatus>(), Ok(FormStatus::Pending));
        assert!("archived".parse::<FormStatus>().is_err());
    }

    #[test]
    fn test_form_status_serde_roundtrip_is_lowercase() {
        let json = serde_json::to_string(&FormStatus::Rejected).unwrap();
        assert_eq!(json, "\"rejected\"");
    }

    #[test]
    fn test_set_slot_empty_removes_key() {
        let mut record = FormRecord::new(FormVariant::Ug1, "u1", json!({}));
        let blob = BlobRef::new(Uuid::now_v7(), AttachmentKind::Document);
        record.set_slot("documents", vec![blob]);
        assert_eq!(record.slot("documents"), &[blob]);

        record.set_slot("documents", vec![]);
        assert!(!record.slots.contains_key("documents"));
        assert!(record.slot("documents").is_empty());
    }

    #[test]
    fn test_blob_ids_spans_all_slots() {
        let mut record = FormRecord::new(FormVariant::R1, "u1", json!({}));
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        record.set_slot("documents", vec![BlobRef::new(a, AttachmentKind::Document)]);
        record.set_slot("guideSignature", vec![BlobRef::new(b, AttachmentKind::Image)]);

        let mut ids: Vec<Uuid> = record.blob_ids().collect();
        ids.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_caller_elevation_is_case_insensitive() {
        let elevated = vec!["validator".to_string(), "admin".to_string()];
        assert!(Caller::new("x", "Admin").is_elevated(&elevated));
        assert!(!Caller::new("x", "student").is_elevated(&elevated));
    }

    #[test]
    fn test_record_serializes_variant_tag() {
        let record = FormRecord::new(FormVariant::Pg2A, "u1", json!({"projectTitle": "X"}));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["variant"], "PG_2_A");
        assert_eq!(value["ownerId"], "u1");
    }
}
