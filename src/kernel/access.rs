//! Access Filter: the single point of truth for "can this memory be seen
//! from this zone".
//!
//! Both the listing path ([`AccessFilter::allowed_memories`]) and the
//! per-memory check ([`AccessFilter::check_access`]) route through
//! [`evaluate`], so they cannot drift apart.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::error::CoreError;
use crate::kernel::policy::ZonePolicy;
use crate::memory::{Memory, MemoryStore};

/// Why a memory is not visible from a zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDenial {
    /// The memory has been redacted.
    Redacted,
    /// The memory lives in another zone.
    ZoneMismatch {
        /// Zone the memory belongs to.
        memory_zone: String,
        /// Zone the access was attempted from.
        zone: String,
    },
    /// None of the memory's tags is allowed in the zone.
    NoAllowedTag {
        /// Zone the access was attempted from.
        zone: String,
    },
}

impl fmt::Display for AccessDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redacted => write!(f, "Memory has been redacted"),
            Self::ZoneMismatch { memory_zone, zone } => {
                write!(f, "Memory zone '{memory_zone}' does not match session zone '{zone}'")
            }
            Self::NoAllowedTag { zone } => {
                write!(f, "Memory has no tags allowed in zone '{zone}'")
            }
        }
    }
}

/// Pure access decision for one memory.
pub fn evaluate(policy: &ZonePolicy, zone: &str, memory: &Memory) -> Result<(), AccessDenial> {
    if memory.redacted {
        return Err(AccessDenial::Redacted);
    }
    if memory.zone != zone {
        return Err(AccessDenial::ZoneMismatch {
            memory_zone: memory.zone.clone(),
            zone: zone.to_owned(),
        });
    }
    if !memory.has_any_tag(policy.allowed_tags(zone)) {
        return Err(AccessDenial::NoAllowedTag {
            zone: zone.to_owned(),
        });
    }
    Ok(())
}

/// Zone-scoped view over the memory store.
#[derive(Debug, Clone)]
pub struct AccessFilter {
    policy: Arc<ZonePolicy>,
    memories: MemoryStore,
}

impl AccessFilter {
    /// Create a filter over `memories` enforcing `policy`.
    pub fn new(policy: Arc<ZonePolicy>, memories: MemoryStore) -> Self {
        Self { policy, memories }
    }

    /// The policy this filter enforces.
    pub fn policy(&self) -> &ZonePolicy {
        &self.policy
    }

    /// Memories visible from `zone`, oldest first.
    ///
    /// A zone with no policy entry sees nothing.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PersistenceFailure`] on storage failure.
    pub async fn allowed_memories(&self, zone: &str) -> Result<Vec<Memory>, CoreError> {
        let candidates = self.memories.list_in_zone(zone).await?;
        let total = candidates.len();
        let allowed: Vec<Memory> = candidates
            .into_iter()
            .filter(|m| self.check_access(zone, m).is_ok())
            .collect();
        trace!(zone, total, allowed = allowed.len(), "access filter applied");
        Ok(allowed)
    }

    /// Whether `memory` may be seen from `zone`.
    ///
    /// # Errors
    ///
    /// Returns the [`AccessDenial`] explaining the refusal.
    pub fn check_access(&self, zone: &str, memory: &Memory) -> Result<(), AccessDenial> {
        evaluate(&self.policy, zone, memory)
    }
}
