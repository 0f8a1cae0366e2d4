//! Hook pipeline: one inference request end to end.
//!
//! Phases:
//! 1. Resolve: parse the session id, fail on unknown or revoked sessions
//! 2. Pre-hook: gather zone-allowed memories and render the context
//! 3. Model call: bounded by the caller's timeout, failures become placeholders
//! 4. Post-hook: lexical leakage scan plus a re-check of every memory used,
//!    then trust update and revocation on violation
//! 5. Audit: always appended; a failed write is a warning, not an error
//!
//! The whole run holds the session's key lock, so two requests on one
//! session are serialised and the later one sees any revocation. The lock
//! is per process; the success credit re-checks liveness in the same SQL
//! statement, so a revocation from another process or a manual revoke
//! mid-run still wins.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{parse_id, CoreError};
use crate::kernel::access::AccessFilter;
use crate::kernel::audit::{AuditChain, AuditEntry};
use crate::kernel::locks::KeyedLocks;
use crate::kernel::session::SessionLifecycle;
use crate::kernel::trust::TrustLedger;
use crate::memory::{Memory, MemoryStore};
use crate::providers::{CompletionRequest, LlmProvider, Message};

/// Context text used when no memory is visible.
pub const EMPTY_CONTEXT: &str = "No relevant patient history available.";

const TRIAGE_INSTRUCTION: &str = "You are a clinical triage assistant. Your role is to:
1. Ask clarifying questions about the patient's symptoms
2. Assess the urgency of the situation
3. Provide triage recommendations (urgent, non-urgent, emergency)
4. Only use information from the provided patient context

Important: You must NOT reference information outside of the provided context.
Do not mention radiology results, billing information, or other restricted data.";

const TELECONSULT_INSTRUCTION: &str = "You are a teleconsultation assistant. Your role is to:
1. Conduct a virtual consultation
2. Gather patient history and symptoms
3. Provide preliminary recommendations
4. Only use information from the provided patient context.";

const BILLING_INSTRUCTION: &str = "You are a billing assistant. Your role is to:
1. Help with billing codes and insurance questions
2. Only use information from the provided patient context.";

const DEFAULT_INSTRUCTION: &str =
    "You are a clinical assistant. Use only the provided context.";

/// System instruction for a zone.
pub fn system_instruction(zone: &str) -> &'static str {
    match zone {
        "triage" => TRIAGE_INSTRUCTION,
        "teleconsult" => TELECONSULT_INSTRUCTION,
        "billing" => BILLING_INSTRUCTION,
        _ => DEFAULT_INSTRUCTION,
    }
}

/// Render memories as the model's context block.
///
/// Never empty: no memories renders [`EMPTY_CONTEXT`].
pub fn render_context(memories: &[Memory]) -> String {
    if memories.is_empty() {
        return EMPTY_CONTEXT.to_owned();
    }
    memories
        .iter()
        .map(|m| format!("- {} (tags: {})", m.content, m.tags.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// User turn sent to the model.
pub fn user_turn(context: &str, message: &str) -> String {
    format!(
        "Patient Context:\n{context}\n\nUser Query: {message}\n\n\
         Please provide a helpful response based on the patient context above. \
         Do not reference any information outside of the provided context."
    )
}

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceOutcome {
    /// Session the request ran in.
    pub session_id: Uuid,
    /// `true` when the post-hook found no violation.
    pub success: bool,
    /// Model response, or a placeholder if the model failed.
    pub response: String,
    /// Audit record id; `None` when the audit write failed.
    pub audit_id: Option<Uuid>,
    /// Memory ids offered to the model as context.
    pub used_memory_ids: Vec<Uuid>,
    /// Whether this run revoked the session.
    pub session_revoked: bool,
    /// Violation reason, if the post-hook flagged one.
    pub violation: Option<String>,
    /// Model failure or timeout behind a placeholder response.
    pub upstream_error: Option<String>,
    /// Audit write failure, surfaced alongside the result.
    pub audit_warning: Option<String>,
}

impl InferenceOutcome {
    /// Convert a flagged outcome into [`CoreError::PolicyViolation`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PolicyViolation`] if the run found a violation.
    pub fn ensure_compliant(self) -> Result<Self, CoreError> {
        match self.violation {
            Some(reason) => Err(CoreError::PolicyViolation(reason)),
            None => Ok(self),
        }
    }
}

/// Orchestrates pre-hook, model call, post-hook and audit.
pub struct HookPipeline {
    sessions: SessionLifecycle,
    access: AccessFilter,
    memories: MemoryStore,
    trust: TrustLedger,
    audit: AuditChain,
    provider: Arc<dyn LlmProvider>,
    locks: KeyedLocks<Uuid>,
    max_tokens: Option<u32>,
}

impl HookPipeline {
    /// Wire a pipeline from its collaborators.
    pub fn new(
        sessions: SessionLifecycle,
        access: AccessFilter,
        memories: MemoryStore,
        trust: TrustLedger,
        audit: AuditChain,
        provider: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            sessions,
            access,
            memories,
            trust,
            audit,
            provider,
            locks: KeyedLocks::new(),
            max_tokens: None,
        }
    }

    /// Cap response length.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Run one inference request.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidIdentifier`] for a malformed session id
    /// - [`CoreError::NotFound`] for an unknown session
    /// - [`CoreError::SessionRevoked`] for a revoked session (nothing is written),
    ///   or for one revoked elsewhere while the model call was in flight (the
    ///   audit record is written, trust is not credited)
    /// - [`CoreError::PersistenceFailure`] when context loading or trust/session
    ///   bookkeeping fails; the audit record is still attempted first
    pub async fn run(
        &self,
        session_id: &str,
        message: &str,
        timeout: Duration,
    ) -> Result<InferenceOutcome, CoreError> {
        let id = parse_id("session", session_id)?;
        let _guard = self.locks.lock(&id).await;

        let session = self.sessions.get(id).await?;
        if session.is_revoked() {
            warn!(session_id = %id, "request on revoked session rejected");
            return Err(CoreError::SessionRevoked(id));
        }

        // Pre-hook
        let memories = self.access.allowed_memories(&session.zone).await?;
        let used_memory_ids: Vec<Uuid> = memories.iter().map(|m| m.id).collect();
        let request = CompletionRequest {
            system: Some(system_instruction(&session.zone).to_owned()),
            messages: vec![Message::user(user_turn(&render_context(&memories), message))],
            max_tokens: self.max_tokens,
        };

        // Model call
        let (response, upstream_error) =
            match tokio::time::timeout(timeout, self.provider.complete(request)).await {
                Ok(Ok(completion)) => (completion.text, None),
                Ok(Err(e)) => {
                    let reason = e.to_string();
                    warn!(session_id = %id, model = self.provider.model_id(), error = %reason, "model call failed");
                    (format!("[model unavailable: {reason}]"), Some(reason))
                }
                Err(_) => {
                    let reason = format!("model call timed out after {timeout:?}");
                    warn!(session_id = %id, model = self.provider.model_id(), "model call timed out");
                    (format!("[{reason}]"), Some(reason))
                }
            };

        // Post-hook
        let mut bookkeeping_error: Option<CoreError> = None;
        let mut session_revoked = false;
        let violation = match self
            .post_hook(&session.zone, &response, &used_memory_ids)
            .await
        {
            Ok(violation) => violation,
            Err(e) => {
                let reason = format!("Post-inference validation failed: {e}");
                bookkeeping_error = Some(e);
                Some(reason)
            }
        };

        let mut revoked_in_flight = false;
        if bookkeeping_error.is_none() {
            match &violation {
                Some(reason) => {
                    warn!(session_id = %id, zone = %session.zone, user_id = %session.user_id, reason = %reason, "policy violation");
                    let revoked = self.sessions.revoke(id, Some(reason.as_str())).await;
                    let penalised = self.trust.record_violation(&session.user_id).await;
                    match revoked {
                        Ok(revoked) => session_revoked = revoked,
                        Err(e) => bookkeeping_error = Some(e),
                    }
                    bookkeeping_error = bookkeeping_error.or(penalised.err());
                }
                None => match self
                    .trust
                    .record_success_in_session(&session.user_id, id)
                    .await
                {
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        warn!(session_id = %id, user_id = %session.user_id, "session revoked during inference, no trust credit");
                        revoked_in_flight = true;
                    }
                    Err(e) => bookkeeping_error = Some(e),
                },
            }
        }

        // Audit, regardless of outcome
        let entry = AuditEntry {
            prompt: message,
            response: &response,
            used_memory_ids: &used_memory_ids,
            violation: violation.as_deref(),
        };
        let (audit_id, audit_warning) = match self.audit.append(id, entry).await {
            Ok(record) => (Some(record.id), None),
            Err(e) => {
                warn!(session_id = %id, error = %e, "audit record not written");
                (None, Some(format!("audit record not written: {e}")))
            }
        };

        if let Some(e) = bookkeeping_error {
            return Err(e);
        }
        if revoked_in_flight {
            return Err(CoreError::SessionRevoked(id));
        }

        info!(
            session_id = %id,
            zone = %session.zone,
            memories = used_memory_ids.len(),
            success = violation.is_none(),
            session_revoked,
            "inference completed"
        );

        Ok(InferenceOutcome {
            session_id: id,
            success: violation.is_none(),
            response,
            audit_id,
            used_memory_ids,
            session_revoked,
            violation,
            upstream_error,
            audit_warning,
        })
    }

    /// Validate a response and the memories it was built from.
    ///
    /// Returns the first violation reason found.
    async fn post_hook(
        &self,
        zone: &str,
        response: &str,
        used_memory_ids: &[Uuid],
    ) -> Result<Option<String>, CoreError> {
        if let Some(reason) = self.access.policy().content_violation(zone, response) {
            return Ok(Some(reason));
        }
        for id in used_memory_ids {
            let Some(memory) = self.memories.find(*id).await? else {
                return Ok(Some(format!("Memory {id} not found")));
            };
            if let Err(denial) = self.access.check_access(zone, &memory) {
                return Ok(Some(format!("Memory {id}: {denial}")));
            }
        }
        Ok(None)
    }
}
