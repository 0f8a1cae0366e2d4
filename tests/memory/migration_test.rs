//! Schema guards on the memories table.

use lcac::memory::MemoryStore;

use crate::common;

#[tokio::test]
async fn migrations_are_idempotent() {
    let pool = common::pool().await;
    lcac::db::migrate(&pool).await.expect("second migrate");
    lcac::db::migrate(&pool).await.expect("third migrate");
}

#[tokio::test]
async fn file_database_persists_across_reopen() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("nested").join("lcac.db");

    let id = {
        let pool = lcac::db::open(&path).await.expect("open");
        let store = MemoryStore::new(pool.clone());
        let memory = store
            .create("triage", &["symptoms".to_owned()], "persisted")
            .await
            .expect("create");
        pool.close().await;
        memory.id
    };

    let pool = lcac::db::open(&path).await.expect("reopen");
    let memory = MemoryStore::new(pool).get(id).await.expect("get");
    assert_eq!(memory.content, "persisted");
}

#[tokio::test]
async fn zone_cannot_change_and_rows_cannot_be_deleted() {
    let pool = common::pool().await;
    let memory = MemoryStore::new(pool.clone())
        .create("triage", &["symptoms".to_owned()], "note")
        .await
        .expect("create");

    let rezone = sqlx::query("UPDATE memories SET zone = 'billing' WHERE id = ?1")
        .bind(memory.id.to_string())
        .execute(&pool)
        .await;
    assert!(rezone.is_err());

    let delete = sqlx::query("DELETE FROM memories WHERE id = ?1")
        .bind(memory.id.to_string())
        .execute(&pool)
        .await;
    assert!(delete.is_err());
}

#[tokio::test]
async fn redaction_cannot_be_undone() {
    let pool = common::pool().await;
    let store = MemoryStore::new(pool.clone());
    let memory = store
        .create("triage", &["symptoms".to_owned()], "note")
        .await
        .expect("create");
    store.redact(memory.id, None).await.expect("redact");

    let undo = sqlx::query("UPDATE memories SET redacted = 0 WHERE id = ?1")
        .bind(memory.id.to_string())
        .execute(&pool)
        .await;
    assert!(undo.is_err());
}
