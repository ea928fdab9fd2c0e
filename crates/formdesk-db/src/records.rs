//! Form record repository implementation.

use async_trait::async_trait;
use sqlx::{types::Json, PgPool, Row};
use std::collections::HashSet;
use uuid::Uuid;

use formdesk_core::{
    Error, FormRecord, FormRecordRepository, FormStatus, FormVariant, RecordQuery, Result, SlotMap,
};

const RECORD_COLUMNS: &str =
    "id, variant, owner_id, status, remarks, slots, payload, created_at, updated_at";

/// PostgreSQL implementation of FormRecordRepository.
///
/// Slot maps and variant payloads are stored as JSONB.
pub struct PgFormRecordRepository {
    pool: PgPool,
}

impl PgFormRecordRepository {
    /// Create a new PgFormRecordRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FormRecordRepository for PgFormRecordRepository {
    async fn insert(&self, record: &FormRecord) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO form_record
               (id, variant, owner_id, status, remarks, slots, payload, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(record.id)
        .bind(record.variant.tag())
        .bind(&record.owner_id)
        .bind(record.status.to_string())
        .bind(&record.remarks)
        .bind(Json(&record.slots))
        .bind(&record.payload)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<FormRecord> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM form_record WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::RecordNotFound(id))?;
        record_from_row(&row)
    }

    async fn update(&self, record: &FormRecord) -> Result<()> {
        let result = sqlx::query(
            r#"UPDATE form_record
               SET status = $2, remarks = $3, slots = $4, payload = $5, updated_at = $6
               WHERE id = $1"#,
        )
        .bind(record.id)
        .bind(record.status.to_string())
        .bind(&record.remarks)
        .bind(Json(&record.slots))
        .bind(&record.payload)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::RecordNotFound(record.id));
        }
        Ok(())
    }

    async fn list(&self, query: &RecordQuery) -> Result<Vec<FormRecord>> {
        let rows = sqlx::query(&format!(
            r#"SELECT {RECORD_COLUMNS} FROM form_record
               WHERE variant = $1
                 AND ($2::TEXT IS NULL OR owner_id = $2)
                 AND ($3::TEXT IS NULL OR status = $3)
               ORDER BY created_at DESC, id DESC"#
        ))
        .bind(query.variant.tag())
        .bind(query.owner_id.as_deref())
        .bind(query.status.map(|s| s.to_string()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: FormStatus,
        remarks: Option<String>,
        owner_id: Option<&str>,
    ) -> Result<FormRecord> {
        let row = sqlx::query(&format!(
            r#"UPDATE form_record
               SET status = $2, remarks = $3, updated_at = NOW()
               WHERE id = $1 AND ($4::TEXT IS NULL OR owner_id = $4)
               RETURNING {RECORD_COLUMNS}"#
        ))
        .bind(id)
        .bind(status.to_string())
        .bind(remarks)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::RecordNotFound(id))?;
        record_from_row(&row)
    }

    async fn referenced_blob_ids(&self) -> Result<HashSet<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"SELECT DISTINCT (elem->>'id')::UUID
               FROM form_record,
                    jsonb_each(slots) AS slot(name, refs),
                    jsonb_array_elements(slot.refs) AS elem"#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().collect())
    }
}

/// Convert a database row to a FormRecord.
fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<FormRecord> {
    let variant: String = row.try_get("variant")?;
    let status: String = row.try_get("status")?;
    let Json(slots): Json<SlotMap> = row.try_get("slots")?;

    Ok(FormRecord {
        id: row.try_get("id")?,
        variant: variant.parse::<FormVariant>().map_err(Error::Serialization)?,
        owner_id: row.try_get("owner_id")?,
        status: status.parse::<FormStatus>().map_err(Error::Serialization)?,
        remarks: row.try_get("remarks")?,
        slots,
        payload: row.try_get("payload")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
