//! # formdesk-core
//!
//! Core types, traits, and the form variant registry for formdesk.
//!
//! This crate provides the foundational data structures and collaborator
//! traits that the storage and portal crates depend on.

pub mod defaults;
pub mod error;
pub mod file_safety;
pub mod logging;
pub mod models;
pub mod traits;
pub mod variants;

// Re-export commonly used types at crate root
pub use error::{Error, Result, UploadFailure};
pub use file_safety::{
    check_incoming, classify, max_size_for, sanitize_filename, validate_file, CheckedFile,
    ValidationResult,
};
pub use models::*;
pub use traits::*;
pub use variants::{Cardinality, FormVariant, SlotSpec, VariantSpec, CANONICAL_SLOTS};
