//! Demo seed data.

use lcac::seed::{seed, SAMPLE_MEMORIES};

use crate::common::{self, FixedProvider};

#[tokio::test]
async fn seed_inserts_every_sample() {
    let service = common::service(common::pool().await, FixedProvider::new("ok"));
    let created = seed(service.memory_store()).await.expect("seed");
    assert_eq!(created.len(), SAMPLE_MEMORIES.len());

    let all = service.list_memories(None).await.expect("list");
    assert_eq!(all.len(), SAMPLE_MEMORIES.len());
}

#[tokio::test]
async fn seeded_triage_sees_only_triage_notes() {
    let service = common::service(common::pool().await, FixedProvider::new("ok"));
    seed(service.memory_store()).await.expect("seed");

    let triage = service.list_memories(Some("triage")).await.expect("list");
    assert_eq!(triage.len(), 2);
    assert!(triage.iter().all(|m| m.zone == "triage"));
    assert!(triage.iter().all(|m| !m.content.contains("X-ray")));

    let research = service.list_memories(Some("research")).await.expect("list");
    assert!(research.is_empty());
}
