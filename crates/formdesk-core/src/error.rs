//! Error types for formdesk.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using formdesk's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// A single file that could not be written to the blob store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    /// Slot the file was destined for.
    pub slot: String,
    /// Original filename as supplied by the client.
    pub name: String,
    /// Rendered cause of the failed write.
    pub cause: String,
}

impl fmt::Display for UploadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}: {}", self.slot, self.name, self.cause)
    }
}

fn render_failures(failures: &[UploadFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Core error type for formdesk operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Form record not found (or not visible to the caller)
    #[error("Record not found: {0}")]
    RecordNotFound(Uuid),

    /// Blob not found in the store
    #[error("Blob not found: {0}")]
    BlobNotFound(Uuid),

    /// Invalid input (malformed id, unknown slot, rejected file, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Blob store not initialized or unreachable
    #[error("Blob store unavailable: {0}")]
    StoreUnavailable(String),

    /// One or more file writes failed during an upload transaction
    #[error("Upload failed for {} file(s): {}", .0.len(), render_failures(.0))]
    UploadFailed(Vec<UploadFailure>),

    /// Record write failed after its attachments were uploaded
    #[error("Persistence failed: {0}")]
    Persistence(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    /// True for every "absent" flavour: generic, record, and blob.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::RecordNotFound(_) | Error::BlobNotFound(_)
        )
    }

    /// HTTP-equivalent status code for the boundary collaborator.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidInput(_) => 400,
            Error::NotFound(_) | Error::RecordNotFound(_) | Error::BlobNotFound(_) => 404,
            Error::StoreUnavailable(_) => 503,
            Error::UploadFailed(_)
            | Error::Persistence(_)
            | Error::Database(_)
            | Error::Serialization(_)
            | Error::Config(_)
            | Error::Internal(_)
            | Error::Io(_) => 500,
        }
    }

    /// Reclassify a failed record write.
    ///
    /// Not-found and validation errors keep their meaning; anything else becomes
    /// `Persistence` so callers can tell it apart from upload failures.
    pub fn into_persistence(self) -> Self {
        match self {
            e @ (Error::RecordNotFound(_) | Error::NotFound(_) | Error::InvalidInput(_)) => e,
            e @ Error::Persistence(_) => e,
            other => Error::Persistence(other.to_string()),
        }
    }
}
