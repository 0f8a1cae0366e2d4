//! Audit Chain: append-only, provenance-hashed inference records.
//!
//! Each record carries a SHA-256 digest over a canonical JSON payload of
//! `{memory_ids (sorted), prompt, response, timestamp}`. The exact timestamp
//! string fed to the digest is persisted in `hashed_at`, so any record can be
//! re-verified later from its stored fields alone.
//!
//! There is no update or delete path; the schema rejects both.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::{decode_time, encode_time, now};
use crate::error::CoreError;

/// One immutable inference record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    /// Unique identity.
    pub id: Uuid,
    /// Session the inference ran in.
    pub session_id: Uuid,
    /// When the record was written.
    pub timestamp: DateTime<Utc>,
    /// User message.
    pub prompt: String,
    /// Model response (or placeholder on upstream failure).
    pub response: String,
    /// Memory ids offered as context, sorted and de-duplicated.
    pub used_memory_ids: Vec<Uuid>,
    /// Hex SHA-256 over the canonical provenance payload.
    pub provenance_hash: String,
    /// Timestamp string embedded in the hashed payload.
    pub hashed_at: String,
    /// Whether the post-hook flagged a violation.
    pub policy_violation: bool,
    /// Violation reason when `policy_violation` is set.
    pub violation_reason: Option<String>,
}

/// Fields supplied by the caller of [`AuditChain::append`].
#[derive(Debug, Clone, Copy)]
pub struct AuditEntry<'a> {
    /// User message.
    pub prompt: &'a str,
    /// Model response.
    pub response: &'a str,
    /// Memory ids offered as context, in any order.
    pub used_memory_ids: &'a [Uuid],
    /// Violation reason; `Some` marks the record as a violation.
    pub violation: Option<&'a str>,
}

/// Canonical hash input. Field order is the serialisation order and is kept
/// alphabetical.
#[derive(Serialize)]
struct ProvenancePayload<'a> {
    memory_ids: Vec<String>,
    prompt: &'a str,
    response: &'a str,
    timestamp: &'a str,
}

/// Digest binding prompt, response, memory references and generation time.
///
/// Memory ids are sorted lexicographically by their hyphenated text form
/// before hashing, so caller order does not matter.
pub fn provenance_hash(prompt: &str, response: &str, memory_ids: &[Uuid], timestamp: &str) -> String {
    let mut ids: Vec<String> = memory_ids.iter().map(Uuid::to_string).collect();
    ids.sort();
    ids.dedup();
    let payload = ProvenancePayload {
        memory_ids: ids,
        prompt,
        response,
        timestamp,
    };
    // Infallible for a struct of strings.
    let canonical = serde_json::to_string(&payload).unwrap_or_else(|_| {
        format!(
            "{:?}|{prompt:?}|{response:?}|{timestamp:?}",
            payload.memory_ids
        )
    });
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

type AuditRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    bool,
    Option<String>,
);

const AUDIT_COLUMNS: &str = "id, session_id, timestamp, prompt, response, used_memory_ids, \
                             provenance_hash, hashed_at, policy_violation, violation_reason";

fn audit_from_row(row: AuditRow) -> Result<AuditRecord, CoreError> {
    let parse = |raw: &str, what: &str| {
        Uuid::parse_str(raw)
            .map_err(|e| CoreError::PersistenceFailure(format!("bad stored {what} id: {e}")))
    };
    Ok(AuditRecord {
        id: parse(&row.0, "audit")?,
        session_id: parse(&row.1, "session")?,
        timestamp: decode_time(&row.2)?,
        prompt: row.3,
        response: row.4,
        used_memory_ids: serde_json::from_str(&row.5)?,
        provenance_hash: row.6,
        hashed_at: row.7,
        policy_violation: row.8,
        violation_reason: row.9,
    })
}

/// SQLite-backed audit ledger.
#[derive(Debug, Clone)]
pub struct AuditChain {
    db: SqlitePool,
}

impl AuditChain {
    /// Create a ledger backed by the given pool.
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Append a record for one inference attempt.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the session does not exist and
    /// [`CoreError::PersistenceFailure`] if the insert fails.
    pub async fn append(
        &self,
        session_id: Uuid,
        entry: AuditEntry<'_>,
    ) -> Result<AuditRecord, CoreError> {
        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM sessions WHERE id = ?1")
            .bind(session_id.to_string())
            .fetch_optional(&self.db)
            .await?;
        if exists.is_none() {
            return Err(CoreError::NotFound {
                kind: "session",
                id: session_id.to_string(),
            });
        }

        let mut used_memory_ids = entry.used_memory_ids.to_vec();
        used_memory_ids.sort_by_key(|id| id.to_string());
        used_memory_ids.dedup();

        let timestamp = now();
        let hashed_at = encode_time(&timestamp);
        let record = AuditRecord {
            id: Uuid::new_v4(),
            session_id,
            timestamp,
            prompt: entry.prompt.to_owned(),
            response: entry.response.to_owned(),
            provenance_hash: provenance_hash(
                entry.prompt,
                entry.response,
                &used_memory_ids,
                &hashed_at,
            ),
            used_memory_ids,
            hashed_at,
            policy_violation: entry.violation.is_some(),
            violation_reason: entry.violation.map(str::to_owned),
        };

        sqlx::query(
            "INSERT INTO audit_records (id, session_id, timestamp, prompt, response, \
             used_memory_ids, provenance_hash, hashed_at, policy_violation, violation_reason) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(record.id.to_string())
        .bind(record.session_id.to_string())
        .bind(&record.hashed_at)
        .bind(&record.prompt)
        .bind(&record.response)
        .bind(serde_json::to_string(&record.used_memory_ids)?)
        .bind(&record.provenance_hash)
        .bind(&record.hashed_at)
        .bind(record.policy_violation)
        .bind(&record.violation_reason)
        .execute(&self.db)
        .await?;

        debug!(
            audit_id = %record.id,
            session_id = %record.session_id,
            memories = record.used_memory_ids.len(),
            violation = record.policy_violation,
            "audit record appended"
        );
        Ok(record)
    }

    /// Records newest first, optionally restricted to one session.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PersistenceFailure`] on storage failure.
    pub async fn list(&self, session_id: Option<Uuid>) -> Result<Vec<AuditRecord>, CoreError> {
        let rows: Vec<AuditRow> = match session_id {
            Some(id) => {
                sqlx::query_as(&format!(
                    "SELECT {AUDIT_COLUMNS} FROM audit_records \
                     WHERE session_id = ?1 ORDER BY seq DESC"
                ))
                .bind(id.to_string())
                .fetch_all(&self.db)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {AUDIT_COLUMNS} FROM audit_records ORDER BY seq DESC"
                ))
                .fetch_all(&self.db)
                .await?
            }
        };
        rows.into_iter().map(audit_from_row).collect()
    }

    /// Fetch a record by id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no such record exists.
    pub async fn get(&self, id: Uuid) -> Result<AuditRecord, CoreError> {
        let row: Option<AuditRow> = sqlx::query_as(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_records WHERE id = ?1"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.db)
        .await?;
        match row {
            Some(row) => audit_from_row(row),
            None => Err(CoreError::NotFound {
                kind: "audit record",
                id: id.to_string(),
            }),
        }
    }

    /// Recompute a record's digest from its stored fields.
    pub fn verify(record: &AuditRecord) -> bool {
        let expected = provenance_hash(
            &record.prompt,
            &record.response,
            &record.used_memory_ids,
            &record.hashed_at,
        );
        let ok = expected == record.provenance_hash;
        if !ok {
            warn!(audit_id = %record.id, "provenance hash mismatch");
        }
        ok
    }
}
