//! Error taxonomy shared by every caller-facing operation.
//!
//! Each variant is one of the six kinds a transport layer maps to a response.
//! `PolicyViolation` is an expected pipeline outcome, not a crash: it is
//! reported to the caller and never swallowed.

use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the access-control core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Unknown session, memory, or audit reference.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Which kind of record was looked up.
        kind: &'static str,
        /// The identifier that was not found.
        id: String,
    },

    /// Malformed identifier (unparseable UUID, empty zone or user, empty tag).
    #[error("invalid {kind} identifier: {value:?}")]
    InvalidIdentifier {
        /// Which kind of identifier was malformed.
        kind: &'static str,
        /// The rejected raw value.
        value: String,
    },

    /// Content or memory-access check failed.
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    /// A revoked session was used.
    #[error("session {0} has been revoked")]
    SessionRevoked(Uuid),

    /// The model collaborator failed or timed out.
    #[error("upstream model failure: {0}")]
    UpstreamFailure(String),

    /// The storage collaborator failed.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        CoreError::PersistenceFailure(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::PersistenceFailure(format!("stored field encoding: {e}"))
    }
}

/// Parse a textual UUID, mapping failure to [`CoreError::InvalidIdentifier`].
///
/// # Errors
///
/// Returns [`CoreError::InvalidIdentifier`] if `raw` is not a UUID.
pub fn parse_id(kind: &'static str, raw: &str) -> Result<Uuid, CoreError> {
    Uuid::parse_str(raw.trim()).map_err(|_| CoreError::InvalidIdentifier {
        kind,
        value: raw.to_owned(),
    })
}

/// Reject empty or whitespace-only names (zones, users, tags).
///
/// Returns the trimmed name on success.
///
/// # Errors
///
/// Returns [`CoreError::InvalidIdentifier`] if `raw` is blank.
pub fn require_name<'a>(kind: &'static str, raw: &'a str) -> Result<&'a str, CoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidIdentifier {
            kind,
            value: raw.to_owned(),
        });
    }
    Ok(trimmed)
}
