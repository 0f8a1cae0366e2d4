//! Trust Ledger: per-user bounded reputation scores.
//!
//! Rows are created lazily with an explicit `INSERT … ON CONFLICT DO NOTHING`
//! upsert. Every adjustment is a single `UPDATE … RETURNING` that computes the
//! clamp in SQL, so concurrent updates for one user never lose an increment.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::TrustConfig;
use crate::db::{decode_time, encode_time, now};
use crate::error::{require_name, CoreError};

/// A user's trust standing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrustScore {
    /// User identity.
    pub user_id: String,
    /// Current score within the configured bounds.
    pub score: f64,
    /// Violations recorded since creation or the last reset.
    pub violation_count: u64,
    /// Successful inferences recorded since creation or the last reset.
    pub successful_inferences: u64,
    /// Time of the last change.
    pub last_updated: DateTime<Utc>,
}

type TrustRow = (String, f64, i64, i64, String);

const TRUST_RETURNING: &str =
    "RETURNING user_id, score, violation_count, successful_inferences, last_updated";

fn decode_counter(name: &str, raw: i64) -> Result<u64, CoreError> {
    u64::try_from(raw)
        .map_err(|e| CoreError::PersistenceFailure(format!("bad stored {name} {raw}: {e}")))
}

fn trust_from_row(row: TrustRow) -> Result<TrustScore, CoreError> {
    Ok(TrustScore {
        violation_count: decode_counter("violation_count", row.2)?,
        successful_inferences: decode_counter("successful_inferences", row.3)?,
        last_updated: decode_time(&row.4)?,
        user_id: row.0,
        score: row.1,
    })
}

/// SQLite-backed trust ledger.
#[derive(Debug, Clone)]
pub struct TrustLedger {
    db: SqlitePool,
    config: TrustConfig,
}

impl TrustLedger {
    /// Create a ledger with the given bounds and adjustments.
    pub fn new(db: SqlitePool, config: TrustConfig) -> Self {
        Self { db, config }
    }

    /// The bounds and adjustments in force.
    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    async fn ensure_row(&self, user_id: &str) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO trust_scores \
             (user_id, score, violation_count, successful_inferences, last_updated) \
             VALUES (?1, ?2, 0, 0, ?3) \
             ON CONFLICT(user_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(self.config.initial)
        .bind(encode_time(&now()))
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Fetch the user's score, creating it with the initial value if absent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidIdentifier`] for a blank user id.
    pub async fn get_or_create(&self, user_id: &str) -> Result<TrustScore, CoreError> {
        let user_id = require_name("user", user_id)?;
        self.ensure_row(user_id).await?;
        let row: TrustRow = sqlx::query_as(
            "SELECT user_id, score, violation_count, successful_inferences, last_updated \
             FROM trust_scores WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;
        trust_from_row(row)
    }

    /// Apply the violation penalty, clamped at the minimum.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidIdentifier`] for a blank user id and
    /// [`CoreError::PersistenceFailure`] on storage failure.
    pub async fn record_violation(&self, user_id: &str) -> Result<TrustScore, CoreError> {
        let user_id = require_name("user", user_id)?;
        self.ensure_row(user_id).await?;
        let row: TrustRow = sqlx::query_as(&format!(
            "UPDATE trust_scores \
             SET score = MAX(?1, score - ?2), \
                 violation_count = violation_count + 1, \
                 last_updated = ?3 \
             WHERE user_id = ?4 {TRUST_RETURNING}"
        ))
        .bind(self.config.min)
        .bind(self.config.violation_penalty)
        .bind(encode_time(&now()))
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;
        let score = trust_from_row(row)?;
        info!(
            user_id,
            score = score.score,
            violations = score.violation_count,
            "trust penalised"
        );
        Ok(score)
    }

    /// Apply the success bonus, clamped at the maximum.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidIdentifier`] for a blank user id and
    /// [`CoreError::PersistenceFailure`] on storage failure.
    pub async fn record_success(&self, user_id: &str) -> Result<TrustScore, CoreError> {
        let user_id = require_name("user", user_id)?;
        self.ensure_row(user_id).await?;
        let row: TrustRow = sqlx::query_as(&format!(
            "UPDATE trust_scores \
             SET score = MIN(?1, score + ?2), \
                 successful_inferences = successful_inferences + 1, \
                 last_updated = ?3 \
             WHERE user_id = ?4 {TRUST_RETURNING}"
        ))
        .bind(self.config.max)
        .bind(self.config.success_bonus)
        .bind(encode_time(&now()))
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;
        let score = trust_from_row(row)?;
        debug!(user_id, score = score.score, "trust rewarded");
        Ok(score)
    }

    /// Apply the success bonus only while `session_id` is still active.
    ///
    /// The liveness check and the update are one statement, so a revocation
    /// committed by any connection before it runs leaves the score untouched.
    /// Returns `None` when the session is revoked or gone.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidIdentifier`] for a blank user id and
    /// [`CoreError::PersistenceFailure`] on storage failure.
    pub async fn record_success_in_session(
        &self,
        user_id: &str,
        session_id: Uuid,
    ) -> Result<Option<TrustScore>, CoreError> {
        let user_id = require_name("user", user_id)?;
        self.ensure_row(user_id).await?;
        let row: Option<TrustRow> = sqlx::query_as(&format!(
            "UPDATE trust_scores \
             SET score = MIN(?1, score + ?2), \
                 successful_inferences = successful_inferences + 1, \
                 last_updated = ?3 \
             WHERE user_id = ?4 \
               AND EXISTS (SELECT 1 FROM sessions WHERE id = ?5 AND revoked_at IS NULL) \
             {TRUST_RETURNING}"
        ))
        .bind(self.config.max)
        .bind(self.config.success_bonus)
        .bind(encode_time(&now()))
        .bind(user_id)
        .bind(session_id.to_string())
        .fetch_optional(&self.db)
        .await?;
        let Some(row) = row else {
            debug!(user_id, session_id = %session_id, "success not credited, session inactive");
            return Ok(None);
        };
        let score = trust_from_row(row)?;
        debug!(user_id, score = score.score, "trust rewarded");
        Ok(Some(score))
    }

    /// Restore the initial score and zero both counters.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidIdentifier`] for a blank user id and
    /// [`CoreError::PersistenceFailure`] on storage failure.
    pub async fn reset(&self, user_id: &str) -> Result<TrustScore, CoreError> {
        let user_id = require_name("user", user_id)?;
        self.ensure_row(user_id).await?;
        let row: TrustRow = sqlx::query_as(&format!(
            "UPDATE trust_scores \
             SET score = ?1, violation_count = 0, successful_inferences = 0, last_updated = ?2 \
             WHERE user_id = ?3 {TRUST_RETURNING}"
        ))
        .bind(self.config.initial)
        .bind(encode_time(&now()))
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;
        info!(user_id, "trust reset");
        trust_from_row(row)
    }
}
