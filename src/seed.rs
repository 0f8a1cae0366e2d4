//! Sample clinical memories for demos (`lcac init --seed`).

use tracing::info;

use crate::error::CoreError;
use crate::memory::{Memory, MemoryStore};

/// One sample memory.
#[derive(Debug, Clone, Copy)]
pub struct SampleMemory {
    /// Zone the memory belongs to.
    pub zone: &'static str,
    /// Content tags.
    pub tags: &'static [&'static str],
    /// Content text.
    pub content: &'static str,
}

/// Two triage notes, one radiology report, one billing entry.
pub const SAMPLE_MEMORIES: &[SampleMemory] = &[
    SampleMemory {
        zone: "triage",
        tags: &["symptoms", "vitals"],
        content: "Patient reports chest pain for 2 days. Blood pressure: 140/90. Heart rate: 88 bpm.",
    },
    SampleMemory {
        zone: "triage",
        tags: &["symptoms"],
        content: "Patient reports persistent cough for 1 week.",
    },
    SampleMemory {
        zone: "radiology",
        tags: &["imaging_results", "radiology_report"],
        content: "Chest X-ray shows no acute disease. Lungs are clear.",
    },
    SampleMemory {
        zone: "billing",
        tags: &["billing_code", "procedure"],
        content: "Procedure code: 99213. Insurance: Blue Cross Blue Shield.",
    },
];

/// Insert every sample memory.
///
/// # Errors
///
/// Returns [`CoreError::PersistenceFailure`] on storage failure.
pub async fn seed(store: &MemoryStore) -> Result<Vec<Memory>, CoreError> {
    let mut created = Vec::with_capacity(SAMPLE_MEMORIES.len());
    for sample in SAMPLE_MEMORIES {
        let tags: Vec<String> = sample.tags.iter().map(|t| (*t).to_owned()).collect();
        created.push(store.create(sample.zone, &tags, sample.content).await?);
    }
    info!(count = created.len(), "sample memories created");
    Ok(created)
}
