//! Intake checks for incoming attachments.
//!
//! Every file is classified and screened here exactly once, before any blob is
//! written:
//! 1. Kind classification (content type, then magic bytes, then extension)
//! 2. Per-kind size limits, empty files rejected
//! 3. Executable detection by magic bytes and extension blocklist
//! 4. Filename sanitisation

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::defaults::{
    FALLBACK_CONTENT_TYPE, MAX_ARCHIVE_BYTES, MAX_DOCUMENT_BYTES, MAX_IMAGE_BYTES, MAX_OTHER_BYTES,
};
use crate::models::{AttachmentKind, IncomingFile};
use crate::{Error, Result};

/// Magic byte signatures for executable files
pub const MAGIC_SIGNATURES: &[(&str, &[u8])] = &[
    ("Windows PE/MZ", &[0x4D, 0x5A]),
    ("ELF", &[0x7F, 0x45, 0x4C, 0x46]),
    ("Mach-O 32", &[0xFE, 0xED, 0xFA, 0xCE]),
    ("Mach-O 64", &[0xFE, 0xED, 0xFA, 0xCF]),
    ("Mach-O Fat / Java Class", &[0xCA, 0xFE, 0xBA, 0xBE]),
    ("WebAssembly", &[0x00, 0x61, 0x73, 0x6D]),
];

/// Blocked file extensions (case-insensitive)
static BLOCKED_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // Windows executables
        "exe", "dll", "scr", "pif", "com", "msi", "bat", "cmd", "ps1", "vbs",
        // Unix and JVM binaries
        "so", "dylib", "out", "jar", "class",
        // Installers
        "deb", "rpm", "apk", "app", "dmg", "pkg",
        // Office macros
        "xlsm", "docm", "pptm",
        // Other dangerous
        "reg", "lnk", "hta",
    ]
    .into_iter()
    .collect()
});

const ARCHIVE_TYPES: &[&str] = &[
    "application/zip",
    "application/x-zip-compressed",
    "application/x-zip",
    "multipart/x-zip",
];

/// Lowercased extension of `filename`, if it has one.
fn extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Classify an attachment.
///
/// The declared content type wins when it is specific; a generic or missing
/// type falls back to magic bytes, then to the filename extension.
pub fn classify(filename: &str, content_type: &str, data: &[u8]) -> AttachmentKind {
    let declared = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    if let Some(kind) = kind_from_mime(&declared) {
        return kind;
    }
    if let Some(kind) = infer::get(data).and_then(|t| kind_from_mime(t.mime_type())) {
        return kind;
    }
    match extension(filename).as_deref() {
        Some("pdf") => AttachmentKind::Document,
        Some("zip") => AttachmentKind::Archive,
        Some("jpg" | "jpeg" | "png") => AttachmentKind::Image,
        _ => AttachmentKind::Other,
    }
}

fn kind_from_mime(mime: &str) -> Option<AttachmentKind> {
    if mime == "application/pdf" {
        Some(AttachmentKind::Document)
    } else if ARCHIVE_TYPES.contains(&mime) {
        Some(AttachmentKind::Archive)
    } else if matches!(mime, "image/jpeg" | "image/jpg" | "image/png") {
        Some(AttachmentKind::Image)
    } else {
        None
    }
}

/// Size ceiling for an attachment kind.
pub fn max_size_for(kind: AttachmentKind) -> u64 {
    match kind {
        AttachmentKind::Document => MAX_DOCUMENT_BYTES,
        AttachmentKind::Image => MAX_IMAGE_BYTES,
        AttachmentKind::Archive => MAX_ARCHIVE_BYTES,
        AttachmentKind::Other => MAX_OTHER_BYTES,
    }
}

/// Result of file safety validation
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub allowed: bool,
    pub block_reason: Option<String>,
    pub detected_type: Option<String>,
}

impl ValidationResult {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            block_reason: None,
            detected_type: None,
        }
    }

    pub fn blocked(reason: impl Into<String>, detected: impl Into<String>) -> Self {
        Self {
            allowed: false,
            block_reason: Some(reason.into()),
            detected_type: Some(detected.into()),
        }
    }
}

/// Validate file safety for an already-classified attachment.
pub fn validate_file(filename: &str, data: &[u8], kind: AttachmentKind) -> ValidationResult {
    if data.is_empty() {
        return ValidationResult::blocked("File is empty", "empty");
    }

    let max = max_size_for(kind);
    if data.len() as u64 > max {
        return ValidationResult::blocked(
            format!("File exceeds maximum size of {} bytes for {} attachments", max, kind),
            "oversized",
        );
    }

    if let Some(ext) = extension(filename) {
        if BLOCKED_EXTENSIONS.contains(ext.as_str()) {
            return ValidationResult::blocked(
                format!("File extension .{} is not allowed", ext),
                format!("blocked_extension:{}", ext),
            );
        }
    }

    for (name, magic) in MAGIC_SIGNATURES {
        if data.starts_with(magic) {
            return ValidationResult::blocked(
                format!("Executable file detected: {}", name),
                format!("executable:{}", name.to_lowercase().replace(' ', "_")),
            );
        }
    }

    ValidationResult::allowed()
}

/// Sanitize filename for safe storage
pub fn sanitize_filename(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let sanitized = sanitized.trim();
    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        return "unnamed_file".to_string();
    }

    if sanitized.len() > 255 {
        let ext = sanitized
            .rfind('.')
            .map(|pos| &sanitized[pos..])
            .filter(|ext| ext.len() < 16)
            .unwrap_or("");
        let mut cut = 255 - ext.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        return format!("{}{}", &sanitized[..cut], ext);
    }

    sanitized.to_string()
}

/// An incoming file that passed intake, ready to be written.
#[derive(Debug, Clone)]
pub struct CheckedFile {
    pub name: String,
    pub content_type: String,
    pub kind: AttachmentKind,
    pub data: Vec<u8>,
}

/// Classify, screen, and normalise one incoming file.
///
/// Rejections are `InvalidInput` so they surface as validation errors with no
/// side effects attempted.
pub fn check_incoming(file: IncomingFile) -> Result<CheckedFile> {
    let name = sanitize_filename(&file.name);
    let content_type = if file.content_type.trim().is_empty() {
        FALLBACK_CONTENT_TYPE.to_string()
    } else {
        file.content_type.trim().to_string()
    };
    let kind = classify(&name, &content_type, &file.data);

    let verdict = validate_file(&name, &file.data, kind);
    if !verdict.allowed {
        return Err(Error::InvalidInput(format!(
            "{}: {}",
            name,
            verdict.block_reason.unwrap_or_default()
        )));
    }

    Ok(CheckedFile {
        name,
        content_type,
        kind,
        data: file.data,
    })
}
