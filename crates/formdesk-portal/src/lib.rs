//! # formdesk-portal
//!
//! Core services of the forms portal:
//! - Upload transactions with compensating rollback
//! - Attachment slot rules (cardinality, exclusivity, supersession)
//! - Aggregation into uniform display projections
//! - Owner-scoped queries across every form variant
//!
//! [`Portal`] wires these together behind the boundary operations the HTTP
//! layer calls.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use formdesk_portal::{Portal, PortalConfig};
//! use formdesk_db::{Database, FilesystemBackend};
//!
//! let db = Database::connect(&url, FilesystemBackend::new("/var/lib/formdesk/files")).await?;
//! let portal = Portal::new(db.blobs.clone(), db.records.clone(), PortalConfig::from_env());
//!
//! let record = portal
//!     .submit_with_attachments("user-1", FormVariant::Ug1, payload, files)
//!     .await?;
//! ```

pub mod config;
pub mod normalizer;
pub mod portal;
pub mod query;
pub mod slots;
pub mod transaction;

pub use config::PortalConfig;
pub use normalizer::Normalizer;
pub use portal::Portal;
pub use query::{QueryScope, ScopedQuery};
pub use slots::{SlotMode, SlotPlan};
pub use transaction::{
    delete_best_effort, CleanupReport, PendingUpload, UploadCoordinator, UploadTransaction,
    UploadedBlob,
};
