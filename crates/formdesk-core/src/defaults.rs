//! Centralized default constants for formdesk.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic numbers.

// =============================================================================
// UPLOADS
// =============================================================================

/// Upper bound on concurrent blob writes within one upload transaction.
pub const UPLOAD_MAX_CONCURRENCY: usize = 8;

/// Maximum size of a single document (PDF) attachment.
pub const MAX_DOCUMENT_BYTES: u64 = 5 * 1024 * 1024;

/// Maximum size of an image attachment (signatures, photos).
pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum size of an archive attachment.
pub const MAX_ARCHIVE_BYTES: u64 = 25 * 1024 * 1024;

/// Maximum size of any other accepted attachment.
pub const MAX_OTHER_BYTES: u64 = 10 * 1024 * 1024;

/// Content type recorded when the client supplies none.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

// =============================================================================
// AGGREGATION
// =============================================================================

/// Upper bound on concurrent metadata lookups while normalizing records.
pub const RESOLVE_MAX_CONCURRENCY: usize = 8;

/// Base URL under which blobs are served to clients.
pub const BLOB_URL_BASE: &str = "/api/application/file";

/// Roles allowed to bypass the owner filter.
pub const ELEVATED_ROLES: &[&str] = &["validator", "admin", "coordinator"];

/// Fallback topic when no title field is present.
pub const UNTITLED_TOPIC: &str = "Untitled Project";

/// Fallback for absent applicant name and branch.
pub const NOT_AVAILABLE: &str = "N/A";

// =============================================================================
// STORAGE
// =============================================================================

/// Default filesystem root for blob content.
pub const FILE_STORAGE_PATH: &str = "/var/lib/formdesk/files";

/// Orphaned blobs younger than this are left alone by the purge.
pub const ORPHAN_MIN_AGE_HOURS: i64 = 24;
