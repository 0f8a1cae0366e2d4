//! Caller-facing operations.
//!
//! [`LcacService`] wires the kernel together over one pool and exposes the
//! operations a transport layer (or the bundled CLI) calls. Raw identifiers
//! arrive as strings and are parsed here, so malformed ids surface as
//! [`CoreError::InvalidIdentifier`] before any lookup.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{parse_id, require_name, CoreError};
use crate::kernel::access::AccessFilter;
use crate::kernel::audit::{AuditChain, AuditRecord};
use crate::kernel::pipeline::{HookPipeline, InferenceOutcome};
use crate::kernel::policy::ZonePolicy;
use crate::kernel::session::{Metadata, Session, SessionLifecycle};
use crate::kernel::trust::{TrustLedger, TrustScore};
use crate::memory::{Memory, MemoryStore};
use crate::providers::LlmProvider;

/// Outcome of verifying one audit record.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AuditVerification {
    /// The record checked.
    pub audit_id: Uuid,
    /// Whether the stored hash matches the recomputed one.
    pub valid: bool,
}

/// The access-control core behind one database.
pub struct LcacService {
    memories: MemoryStore,
    access: AccessFilter,
    sessions: SessionLifecycle,
    trust: TrustLedger,
    audit: AuditChain,
    pipeline: HookPipeline,
    timeout: Duration,
}

impl LcacService {
    /// Build the service from a migrated pool, config, and model provider.
    pub fn new(pool: SqlitePool, config: &Config, provider: Arc<dyn LlmProvider>) -> Self {
        let policy = Arc::new(ZonePolicy::from_config(config.policy.as_ref()));
        Self::with_policy(pool, config, policy, provider)
    }

    /// Build the service with an explicit zone policy.
    pub fn with_policy(
        pool: SqlitePool,
        config: &Config,
        policy: Arc<ZonePolicy>,
        provider: Arc<dyn LlmProvider>,
    ) -> Self {
        let memories = MemoryStore::new(pool.clone());
        let access = AccessFilter::new(policy, memories.clone());
        let sessions = SessionLifecycle::new(pool.clone());
        let trust = TrustLedger::new(pool.clone(), config.trust);
        let audit = AuditChain::new(pool);
        let pipeline = HookPipeline::new(
            sessions.clone(),
            access.clone(),
            memories.clone(),
            trust.clone(),
            audit.clone(),
            provider,
        )
        .with_max_tokens(config.model.max_tokens);

        Self {
            memories,
            access,
            sessions,
            trust,
            audit,
            pipeline,
            timeout: Duration::from_secs(config.model.timeout_secs),
        }
    }

    /// Default model timeout applied by [`LcacService::ask`].
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    // -- memories -----------------------------------------------------------

    /// Store a new memory.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidIdentifier`] for a blank zone or tag.
    pub async fn create_memory(
        &self,
        zone: &str,
        tags: &[String],
        content: &str,
    ) -> Result<Memory, CoreError> {
        self.memories.create(zone, tags, content).await
    }

    /// List memories. With a zone, only what that zone may see; without one,
    /// every non-redacted memory.
    ///
    /// # Errors
    ///
    /// [`CoreError::PersistenceFailure`] on storage failure.
    pub async fn list_memories(&self, zone: Option<&str>) -> Result<Vec<Memory>, CoreError> {
        match zone {
            Some(zone) => {
                let zone = require_name("zone", zone)?;
                self.access.allowed_memories(zone).await
            }
            None => self.memories.list_unredacted().await,
        }
    }

    /// Fetch one memory.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidIdentifier`] or [`CoreError::NotFound`].
    pub async fn get_memory(&self, memory_id: &str) -> Result<Memory, CoreError> {
        self.memories.get(parse_id("memory", memory_id)?).await
    }

    /// Redact a memory.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidIdentifier`] or [`CoreError::NotFound`].
    pub async fn redact_memory(
        &self,
        memory_id: &str,
        reason: Option<&str>,
    ) -> Result<Memory, CoreError> {
        self.memories
            .redact(parse_id("memory", memory_id)?, reason)
            .await
    }

    // -- sessions -----------------------------------------------------------

    /// Open a session bound to `zone` and `user_id`.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidIdentifier`] for a blank zone or user.
    pub async fn create_session(
        &self,
        zone: &str,
        user_id: &str,
        metadata: Metadata,
    ) -> Result<Session, CoreError> {
        self.sessions.create(zone, user_id, metadata).await
    }

    /// Fetch one session.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidIdentifier`] or [`CoreError::NotFound`].
    pub async fn get_session(&self, session_id: &str) -> Result<Session, CoreError> {
        self.sessions.get(parse_id("session", session_id)?).await
    }

    /// Revoke a session and return its final state. Idempotent.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidIdentifier`] or [`CoreError::NotFound`].
    pub async fn revoke_session(
        &self,
        session_id: &str,
        reason: Option<&str>,
    ) -> Result<Session, CoreError> {
        let id = parse_id("session", session_id)?;
        if !self.sessions.revoke(id, reason).await? {
            return Err(CoreError::NotFound {
                kind: "session",
                id: id.to_string(),
            });
        }
        self.sessions.get(id).await
    }

    // -- inference ----------------------------------------------------------

    /// Submit an inference request with the configured timeout.
    ///
    /// # Errors
    ///
    /// See [`HookPipeline::run`].
    pub async fn ask(&self, session_id: &str, message: &str) -> Result<InferenceOutcome, CoreError> {
        self.pipeline.run(session_id, message, self.timeout).await
    }

    /// Submit an inference request with an explicit timeout.
    ///
    /// # Errors
    ///
    /// See [`HookPipeline::run`].
    pub async fn ask_with_timeout(
        &self,
        session_id: &str,
        message: &str,
        timeout: Duration,
    ) -> Result<InferenceOutcome, CoreError> {
        self.pipeline.run(session_id, message, timeout).await
    }

    // -- audit --------------------------------------------------------------

    /// Audit trail, newest first, optionally for one session.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidIdentifier`] for a malformed session filter.
    pub async fn audit_trail(&self, session_id: Option<&str>) -> Result<Vec<AuditRecord>, CoreError> {
        let filter = session_id.map(|s| parse_id("session", s)).transpose()?;
        self.audit.list(filter).await
    }

    /// Recompute the provenance hash of one record.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidIdentifier`] or [`CoreError::NotFound`].
    pub async fn verify_audit(&self, audit_id: &str) -> Result<AuditVerification, CoreError> {
        let record = self.audit.get(parse_id("audit", audit_id)?).await?;
        Ok(AuditVerification {
            audit_id: record.id,
            valid: AuditChain::verify(&record),
        })
    }

    // -- trust --------------------------------------------------------------

    /// A user's trust score, created on first reference.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidIdentifier`] for a blank user id.
    pub async fn trust_score(&self, user_id: &str) -> Result<TrustScore, CoreError> {
        self.trust.get_or_create(user_id).await
    }

    /// Restore a user's initial trust score and clear the counters.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidIdentifier`] for a blank user id.
    pub async fn reset_trust(&self, user_id: &str) -> Result<TrustScore, CoreError> {
        self.trust.reset(user_id).await
    }

    /// The memory store, for seeding.
    pub fn memory_store(&self) -> &MemoryStore {
        &self.memories
    }
}
