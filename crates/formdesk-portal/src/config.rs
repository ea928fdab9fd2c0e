//! Portal configuration.

use formdesk_core::defaults;

/// Configuration for the portal services.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Upper bound on concurrent blob writes per upload transaction.
    pub upload_concurrency: usize,
    /// Upper bound on concurrent metadata lookups per aggregation.
    pub resolve_concurrency: usize,
    /// Roles that bypass the owner filter (lowercase).
    pub elevated_roles: Vec<String>,
    /// Base URL under which blobs are served; descriptors get `{base}/{id}`.
    pub blob_url_base: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            upload_concurrency: defaults::UPLOAD_MAX_CONCURRENCY,
            resolve_concurrency: defaults::RESOLVE_MAX_CONCURRENCY,
            elevated_roles: defaults::ELEVATED_ROLES
                .iter()
                .map(|r| r.to_string())
                .collect(),
            blob_url_base: defaults::BLOB_URL_BASE.to_string(),
        }
    }
}

impl PortalConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `FORMDESK_UPLOAD_CONCURRENCY` | `8` | Max parallel blob writes per request |
    /// | `FORMDESK_RESOLVE_CONCURRENCY` | `8` | Max parallel metadata lookups per read |
    /// | `FORMDESK_ELEVATED_ROLES` | `validator,admin,coordinator` | Roles that see every record |
    /// | `FORMDESK_BLOB_URL_BASE` | `/api/application/file` | Prefix of attachment URLs |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let upload_concurrency = std::env::var("FORMDESK_UPLOAD_CONCURRENCY")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(defaults.upload_concurrency)
            .max(1);

        let resolve_concurrency = std::env::var("FORMDESK_RESOLVE_CONCURRENCY")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(defaults.resolve_concurrency)
            .max(1);

        let elevated_roles = std::env::var("FORMDESK_ELEVATED_ROLES")
            .ok()
            .map(|v| parse_roles(&v))
            .filter(|roles| !roles.is_empty())
            .unwrap_or(defaults.elevated_roles);

        let blob_url_base = std::env::var("FORMDESK_BLOB_URL_BASE")
            .ok()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.blob_url_base);

        Self {
            upload_concurrency,
            resolve_concurrency,
            elevated_roles,
            blob_url_base,
        }
    }

    /// Set the upload concurrency bound.
    pub fn with_upload_concurrency(mut self, n: usize) -> Self {
        self.upload_concurrency = n.max(1);
        self
    }

    /// Set the resolution concurrency bound.
    pub fn with_resolve_concurrency(mut self, n: usize) -> Self {
        self.resolve_concurrency = n.max(1);
        self
    }

    /// Replace the elevated role set.
    pub fn with_elevated_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.elevated_roles = roles
            .into_iter()
            .map(|r| r.as_ref().trim().to_lowercase())
            .filter(|r| !r.is_empty())
            .collect();
        self
    }

    /// Set the attachment URL prefix.
    pub fn with_blob_url_base(mut self, base: impl Into<String>) -> Self {
        self.blob_url_base = base.into().trim_end_matches('/').to_string();
        self
    }

    /// URL at which a blob is served.
    pub fn blob_url(&self, id: uuid::Uuid) -> String {
        format!("{}/{}", self.blob_url_base, id)
    }
}

fn parse_roles(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|r| r.trim().to_lowercase())
        .filter(|r| !r.is_empty())
        .collect()
}
