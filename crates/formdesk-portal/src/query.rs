//! Scoped query layer: records across every variant, filtered by owner
//! unless the caller holds an elevated role.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;
use uuid::Uuid;

use formdesk_core::{
    Caller, Error, FormRecord, FormRecordRepository, FormStatus, FormVariant, RecordQuery, Result,
};

/// Which records a caller may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryScope {
    /// Only records owned by this identity.
    Owner(String),
    /// Every record.
    All,
}

impl QueryScope {
    /// Elevated callers see everything, everyone else sees their own.
    pub fn for_caller(caller: &Caller, elevated_roles: &[String]) -> Self {
        if caller.is_elevated(elevated_roles) {
            QueryScope::All
        } else {
            QueryScope::Owner(caller.owner_id.clone())
        }
    }

    pub fn owner(&self) -> Option<&str> {
        match self {
            QueryScope::Owner(owner) => Some(owner),
            QueryScope::All => None,
        }
    }

    fn permits(&self, record: &FormRecord) -> bool {
        self.owner().map_or(true, |owner| record.owner_id == owner)
    }
}

#[derive(Clone)]
pub struct ScopedQuery {
    records: Arc<dyn FormRecordRepository>,
}

impl ScopedQuery {
    pub fn new(records: Arc<dyn FormRecordRepository>) -> Self {
        Self { records }
    }

    /// Fetch records of all variants visible in `scope`, newest first.
    ///
    /// Per-variant queries run concurrently; results are concatenated in
    /// variant declaration order and then stably sorted, so equal timestamps
    /// keep that order.
    pub async fn fetch(
        &self,
        scope: &QueryScope,
        status: Option<FormStatus>,
    ) -> Result<Vec<FormRecord>> {
        let start = Instant::now();

        let per_variant: Vec<Vec<FormRecord>> = stream::iter(FormVariant::ALL)
            .map(|variant| {
                let mut query = RecordQuery::new(variant).with_status(status);
                if let Some(owner) = scope.owner() {
                    query = query.with_owner(owner);
                }
                async move { self.records.list(&query).await }
            })
            .buffered(FormVariant::ALL.len())
            .try_collect()
            .await?;

        let mut records: Vec<FormRecord> = per_variant.into_iter().flatten().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        debug!(
            subsystem = "portal",
            component = "query",
            op = "fetch",
            scope = ?scope,
            status = ?status,
            result_count = records.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Scoped query complete"
        );
        Ok(records)
    }

    /// Fetch one record visible in `scope`. Records outside the scope are
    /// reported as not found.
    pub async fn fetch_one(&self, scope: &QueryScope, id: Uuid) -> Result<FormRecord> {
        let record = self.records.fetch(id).await?;
        if scope.permits(&record) {
            Ok(record)
        } else {
            Err(Error::RecordNotFound(id))
        }
    }
}
