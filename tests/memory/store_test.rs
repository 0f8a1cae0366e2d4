//! Memory store: creation, listing, redaction.

use lcac::error::CoreError;
use lcac::memory::{content_hash, redaction_hash, MemoryStore};

use crate::common;

fn tags(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_owned()).collect()
}

#[tokio::test]
async fn create_then_get_round_trips() {
    let store = MemoryStore::new(common::pool().await);
    let created = store
        .create(" triage ", &tags(&["symptoms", " vitals", "symptoms"]), "Fever 38.5C.")
        .await
        .expect("create");

    assert_eq!(created.zone, "triage");
    assert_eq!(created.tags, vec!["symptoms".to_owned(), "vitals".to_owned()]);
    assert_eq!(created.content_hash, content_hash("Fever 38.5C."));
    assert!(!created.redacted);

    let loaded = store.get(created.id).await.expect("get");
    assert_eq!(loaded, created);
}

#[tokio::test]
async fn blank_zone_and_tags_are_rejected() {
    let store = MemoryStore::new(common::pool().await);
    assert!(matches!(
        store.create("  ", &tags(&["symptoms"]), "x").await,
        Err(CoreError::InvalidIdentifier { kind: "zone", .. })
    ));
    assert!(matches!(
        store.create("triage", &tags(&["symptoms", ""]), "x").await,
        Err(CoreError::InvalidIdentifier { kind: "tag", .. })
    ));
}

#[tokio::test]
async fn unknown_memory_is_not_found() {
    let store = MemoryStore::new(common::pool().await);
    let id = uuid::Uuid::new_v4();
    assert!(store.find(id).await.expect("find").is_none());
    assert!(matches!(
        store.get(id).await,
        Err(CoreError::NotFound { kind: "memory", .. })
    ));
}

#[tokio::test]
async fn zone_listing_is_oldest_first_and_skips_redacted() {
    let store = MemoryStore::new(common::pool().await);
    let first = store.create("triage", &tags(&["symptoms"]), "one").await.expect("create");
    let second = store.create("triage", &tags(&["symptoms"]), "two").await.expect("create");
    let third = store.create("triage", &tags(&["symptoms"]), "three").await.expect("create");
    store.create("billing", &tags(&["procedure"]), "other").await.expect("create");
    store.redact(second.id, None).await.expect("redact");

    let ids: Vec<_> = store
        .list_in_zone("triage")
        .await
        .expect("list")
        .iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(ids, vec![first.id, third.id]);

    assert_eq!(store.list_unredacted().await.expect("list all").len(), 3);
}

#[tokio::test]
async fn redaction_replaces_content_and_chains_hash() {
    let store = MemoryStore::new(common::pool().await);
    let memory = store
        .create("radiology", &tags(&["imaging_results"]), "Chest X-ray clear.")
        .await
        .expect("create");

    let redacted = store.redact(memory.id, Some("wrong patient")).await.expect("redact");

    assert!(redacted.redacted);
    assert_eq!(redacted.id, memory.id);
    assert_eq!(redacted.zone, memory.zone);
    assert_eq!(redacted.tags, memory.tags);
    assert_eq!(redacted.created_at, memory.created_at);
    assert!(redacted.content.starts_with("[REDACTED - "));
    assert!(!redacted.content.contains("X-ray"));
    assert_ne!(redacted.content_hash, memory.content_hash);

    let stamp = redacted
        .content
        .trim_start_matches("[REDACTED - ")
        .trim_end_matches(']');
    assert_eq!(
        redacted.content_hash,
        redaction_hash(&memory.content_hash, stamp)
    );
}

#[tokio::test]
async fn second_redaction_is_a_no_op() {
    let store = MemoryStore::new(common::pool().await);
    let memory = store.create("triage", &tags(&["symptoms"]), "note").await.expect("create");
    let once = store.redact(memory.id, None).await.expect("redact");
    let twice = store.redact(memory.id, Some("again")).await.expect("redact again");
    assert_eq!(once, twice);
}

#[tokio::test]
async fn redacting_unknown_memory_is_not_found() {
    let store = MemoryStore::new(common::pool().await);
    assert!(matches!(
        store.redact(uuid::Uuid::new_v4(), None).await,
        Err(CoreError::NotFound { kind: "memory", .. })
    ));
}
