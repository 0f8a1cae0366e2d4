//! Session Lifecycle: `Active` → `Revoked`, nothing else.
//!
//! A session is bound to one zone and one user for life. Revocation sets
//! `revoked_at` and records the reason in metadata under
//! [`REVOCATION_REASON_KEY`]; the row is immutable afterwards (enforced by a
//! schema trigger as well as by the conditional update here).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::{decode_time, encode_time, now};
use crate::error::{require_name, CoreError};

/// Reserved metadata key holding the revocation reason.
pub const REVOCATION_REASON_KEY: &str = "revocation_reason";

/// Reason recorded when revocation is requested without one.
pub const DEFAULT_REVOCATION_REASON: &str = "Policy violation";

/// Session metadata, ordered for stable JSON output.
pub type Metadata = BTreeMap<String, Value>;

/// A zone- and user-bound interaction context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    /// Unique identity.
    pub id: Uuid,
    /// Zone, fixed at creation.
    pub zone: String,
    /// User, fixed at creation.
    pub user_id: String,
    /// Creation time.
    pub started_at: DateTime<Utc>,
    /// Revocation time; `Some` means the session is terminal.
    pub revoked_at: Option<DateTime<Utc>>,
    /// Free-form metadata.
    pub metadata: Metadata,
}

impl Session {
    /// Whether the session has been revoked.
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Recorded revocation reason, if any.
    pub fn revocation_reason(&self) -> Option<&str> {
        self.metadata
            .get(REVOCATION_REASON_KEY)
            .and_then(Value::as_str)
    }
}

type SessionRow = (String, String, String, String, Option<String>, String);

fn session_from_row(row: SessionRow) -> Result<Session, CoreError> {
    let id = Uuid::parse_str(&row.0)
        .map_err(|e| CoreError::PersistenceFailure(format!("bad stored session id: {e}")))?;
    Ok(Session {
        id,
        zone: row.1,
        user_id: row.2,
        started_at: decode_time(&row.3)?,
        revoked_at: row.4.as_deref().map(decode_time).transpose()?,
        metadata: serde_json::from_str(&row.5)?,
    })
}

/// SQLite-backed session manager.
#[derive(Debug, Clone)]
pub struct SessionLifecycle {
    db: SqlitePool,
}

impl SessionLifecycle {
    /// Create a manager backed by the given pool.
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Open a new active session.
    ///
    /// A caller-supplied [`REVOCATION_REASON_KEY`] entry is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidIdentifier`] for a blank zone or user.
    pub async fn create(
        &self,
        zone: &str,
        user_id: &str,
        mut metadata: Metadata,
    ) -> Result<Session, CoreError> {
        let zone = require_name("zone", zone)?;
        let user_id = require_name("user", user_id)?;
        metadata.remove(REVOCATION_REASON_KEY);

        let session = Session {
            id: Uuid::new_v4(),
            zone: zone.to_owned(),
            user_id: user_id.to_owned(),
            started_at: now(),
            revoked_at: None,
            metadata,
        };

        sqlx::query(
            "INSERT INTO sessions (id, zone, user_id, started_at, revoked_at, metadata) \
             VALUES (?1, ?2, ?3, ?4, NULL, ?5)",
        )
        .bind(session.id.to_string())
        .bind(&session.zone)
        .bind(&session.user_id)
        .bind(encode_time(&session.started_at))
        .bind(serde_json::to_string(&session.metadata)?)
        .execute(&self.db)
        .await?;

        info!(session_id = %session.id, zone = %session.zone, user_id = %session.user_id, "session created");
        Ok(session)
    }

    /// Fetch a session, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PersistenceFailure`] on storage failure.
    pub async fn find(&self, id: Uuid) -> Result<Option<Session>, CoreError> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT id, zone, user_id, started_at, revoked_at, metadata \
             FROM sessions WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.db)
        .await?;
        row.map(session_from_row).transpose()
    }

    /// Fetch a session.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no such session exists.
    pub async fn get(&self, id: Uuid) -> Result<Session, CoreError> {
        self.find(id).await?.ok_or_else(|| CoreError::NotFound {
            kind: "session",
            id: id.to_string(),
        })
    }

    /// Whether the session is revoked.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no such session exists.
    pub async fn is_revoked(&self, id: Uuid) -> Result<bool, CoreError> {
        Ok(self.get(id).await?.is_revoked())
    }

    /// Revoke a session. Idempotent.
    ///
    /// Returns `false` only when the session does not exist. Revoking an
    /// already-revoked session succeeds and leaves its timestamp and reason
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PersistenceFailure`] on storage failure.
    pub async fn revoke(&self, id: Uuid, reason: Option<&str>) -> Result<bool, CoreError> {
        let Some(session) = self.find(id).await? else {
            return Ok(false);
        };
        if session.is_revoked() {
            debug!(session_id = %id, "session already revoked");
            return Ok(true);
        }

        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REVOCATION_REASON);
        let mut metadata = session.metadata;
        metadata.insert(
            REVOCATION_REASON_KEY.to_owned(),
            Value::String(reason.to_owned()),
        );

        // Losing a race to another revoker matches no row; the winner's
        // timestamp and reason stand.
        let result = sqlx::query(
            "UPDATE sessions SET revoked_at = ?1, metadata = ?2 \
             WHERE id = ?3 AND revoked_at IS NULL",
        )
        .bind(encode_time(&now()))
        .bind(serde_json::to_string(&metadata)?)
        .bind(id.to_string())
        .execute(&self.db)
        .await?;

        if result.rows_affected() > 0 {
            info!(session_id = %id, zone = %session.zone, user_id = %session.user_id, reason, "session revoked");
        }
        Ok(true)
    }
}
