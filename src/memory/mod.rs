//! Zone-scoped patient memory records and their SQLite store.
//!
//! A [`Memory`] belongs to exactly one zone for its whole life. It is created
//! by an external write path, mutated only by redaction, and never deleted.
//! Tags are encoded as JSON text only inside this module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::{decode_time, encode_time, now};
use crate::error::{require_name, CoreError};

/// A stored unit of patient-related content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identity.
    pub id: Uuid,
    /// Trust zone, fixed at creation.
    pub zone: String,
    /// Content tags (non-empty, de-duplicated, insertion order kept).
    pub tags: Vec<String>,
    /// Opaque content text.
    pub content: String,
    /// Lowercase hex SHA-256 of the content, recomputed on redaction.
    pub content_hash: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Whether the content has been redacted. Only ever goes false → true.
    pub redacted: bool,
}

impl Memory {
    /// Whether any of this memory's tags appears in `allowed`.
    pub fn has_any_tag(&self, allowed: &[String]) -> bool {
        self.tags.iter().any(|t| allowed.contains(t))
    }
}

/// Hex SHA-256 of `content`.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash recorded on redaction, chained from the pre-redaction hash.
pub fn redaction_hash(original_hash: &str, redacted_at: &str) -> String {
    content_hash(&format!("redacted:{original_hash}:{redacted_at}"))
}

type MemoryRow = (String, String, String, String, String, String, bool);

const MEMORY_COLUMNS: &str = "id, zone, tags, content, content_hash, created_at, redacted";

fn memory_from_row(row: MemoryRow) -> Result<Memory, CoreError> {
    let id = Uuid::parse_str(&row.0)
        .map_err(|e| CoreError::PersistenceFailure(format!("bad stored memory id: {e}")))?;
    Ok(Memory {
        id,
        zone: row.1,
        tags: serde_json::from_str(&row.2)?,
        content: row.3,
        content_hash: row.4,
        created_at: decode_time(&row.5)?,
        redacted: row.6,
    })
}

/// Validate and normalise a tag list: trimmed, non-empty, de-duplicated.
fn normalize_tags(tags: &[String]) -> Result<Vec<String>, CoreError> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = require_name("tag", tag)?;
        if !out.iter().any(|t| t == tag) {
            out.push(tag.to_owned());
        }
    }
    Ok(out)
}

/// SQLite-backed memory store. Cheap to clone (shares the pool).
#[derive(Debug, Clone)]
pub struct MemoryStore {
    db: SqlitePool,
}

impl MemoryStore {
    /// Create a store backed by the given pool.
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Persist a new memory.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidIdentifier`] for a blank zone or tag and
    /// [`CoreError::PersistenceFailure`] on storage failure.
    pub async fn create(
        &self,
        zone: &str,
        tags: &[String],
        content: &str,
    ) -> Result<Memory, CoreError> {
        let zone = require_name("zone", zone)?;
        let memory = Memory {
            id: Uuid::new_v4(),
            zone: zone.to_owned(),
            tags: normalize_tags(tags)?,
            content: content.to_owned(),
            content_hash: content_hash(content),
            created_at: now(),
            redacted: false,
        };

        sqlx::query(
            "INSERT INTO memories (id, zone, tags, content, content_hash, created_at, redacted) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
        )
        .bind(memory.id.to_string())
        .bind(&memory.zone)
        .bind(serde_json::to_string(&memory.tags)?)
        .bind(&memory.content)
        .bind(&memory.content_hash)
        .bind(encode_time(&memory.created_at))
        .execute(&self.db)
        .await?;

        debug!(memory_id = %memory.id, zone = %memory.zone, tags = memory.tags.len(), "memory created");
        Ok(memory)
    }

    /// Fetch a memory by id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no such memory exists.
    pub async fn get(&self, id: Uuid) -> Result<Memory, CoreError> {
        self.find(id).await?.ok_or_else(|| CoreError::NotFound {
            kind: "memory",
            id: id.to_string(),
        })
    }

    /// Fetch a memory by id, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PersistenceFailure`] on storage failure.
    pub async fn find(&self, id: Uuid) -> Result<Option<Memory>, CoreError> {
        let row: Option<MemoryRow> = sqlx::query_as(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.db)
        .await?;
        row.map(memory_from_row).transpose()
    }

    /// Non-redacted memories stored in `zone`, oldest first.
    ///
    /// This is the raw zone query; tag policy is applied by the access filter.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PersistenceFailure`] on storage failure.
    pub async fn list_in_zone(&self, zone: &str) -> Result<Vec<Memory>, CoreError> {
        let rows: Vec<MemoryRow> = sqlx::query_as(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memories \
             WHERE zone = ?1 AND redacted = 0 \
             ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(zone)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(memory_from_row).collect()
    }

    /// Every non-redacted memory across all zones, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PersistenceFailure`] on storage failure.
    pub async fn list_unredacted(&self) -> Result<Vec<Memory>, CoreError> {
        let rows: Vec<MemoryRow> = sqlx::query_as(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memories \
             WHERE redacted = 0 \
             ORDER BY created_at ASC, rowid ASC"
        ))
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(memory_from_row).collect()
    }

    /// Redact a memory: replace its content, set the flag, re-hash.
    ///
    /// Identity and zone are unchanged. Redacting an already-redacted memory
    /// is a no-op that returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no such memory exists.
    pub async fn redact(&self, id: Uuid, reason: Option<&str>) -> Result<Memory, CoreError> {
        let current = self.get(id).await?;
        if current.redacted {
            debug!(memory_id = %id, "memory already redacted");
            return Ok(current);
        }

        let redacted_at = encode_time(&now());
        let placeholder = format!("[REDACTED - {redacted_at}]");
        let new_hash = redaction_hash(&current.content_hash, &redacted_at);

        // The redacted = 0 guard makes concurrent redactions race-free: the
        // loser matches no row and re-reads the winner's result.
        let result = sqlx::query(
            "UPDATE memories SET content = ?1, content_hash = ?2, redacted = 1 \
             WHERE id = ?3 AND redacted = 0",
        )
        .bind(&placeholder)
        .bind(&new_hash)
        .bind(id.to_string())
        .execute(&self.db)
        .await?;

        if result.rows_affected() > 0 {
            info!(memory_id = %id, zone = %current.zone, reason = reason.unwrap_or("unspecified"), "memory redacted");
        }
        self.get(id).await
    }
}
