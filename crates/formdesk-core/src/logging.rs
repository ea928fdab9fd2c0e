//! Structured logging schema and field name constants for formdesk.
//!
//! All crates use these names for structured `tracing` fields so log
//! aggregation can query the attachment lifecycle across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service or leaked blobs, requires operator attention |
//! | WARN  | Recoverable issue, compensating action applied (rollback, stale reference) |
//! | INFO  | Lifecycle events (startup, submission, replacement completions) |
//! | DEBUG | Decision points (slot plans, scopes, concurrency chosen) |
//! | TRACE | Per-item iteration (single blob puts, single resolutions) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "portal", "storage", "database"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "upload_tx", "cleanup", "normalizer", "query", "reconcile", "blob_store", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "submit", "replace_slot", "rollback", "delete_superseded", "purge_orphans"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Form record UUID being operated on.
pub const RECORD_ID: &str = "record_id";

/// Blob UUID being written, read or deleted.
pub const BLOB_ID: &str = "blob_id";

/// Attachment slot name.
pub const SLOT: &str = "slot";

/// Form variant wire tag ("UG_1", "R1", ...).
pub const VARIANT: &str = "variant";

/// Owner identity of a record.
pub const OWNER_ID: &str = "owner_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of files in an upload batch.
pub const FILE_COUNT: &str = "file_count";

/// Number of records returned by a query.
pub const RESULT_COUNT: &str = "result_count";

/// Parallelism bound used for a fan-out.
pub const CONCURRENCY: &str = "concurrency";

/// Payload size in bytes.
pub const SIZE_BYTES: &str = "size_bytes";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
