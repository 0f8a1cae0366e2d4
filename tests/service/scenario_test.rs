//! End-to-end flows through `LcacService`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use lcac::config::Config;
use lcac::error::CoreError;
use lcac::kernel::policy::ZonePolicy;
use lcac::service::LcacService;

use crate::common::{self, add_memory, no_metadata, FixedProvider, GatedProvider};

#[tokio::test]
async fn triage_consult_round_trip() {
    let provider = FixedProvider::new("Chest pain for 2 days warrants same-day review.");
    let service = common::service(common::pool().await, provider.clone());
    let note = add_memory(&service, "triage", &["symptoms"], "Chest pain for 2 days.").await;
    add_memory(&service, "radiology", &["imaging_results"], "CT angiogram normal.").await;

    let session = service
        .create_session("triage", "nurse-7", no_metadata())
        .await
        .expect("session");
    let outcome = service
        .ask(&session.id.to_string(), "How urgent is this?")
        .await
        .expect("ask");

    assert!(outcome.success);
    assert_eq!(outcome.used_memory_ids, vec![note.id]);

    let trail = service
        .audit_trail(Some(&session.id.to_string()))
        .await
        .expect("trail");
    assert_eq!(trail.len(), 1);
    let verification = service
        .verify_audit(&trail[0].id.to_string())
        .await
        .expect("verify");
    assert!(verification.valid);

    let trust = service.trust_score("nurse-7").await.expect("trust");
    assert_eq!(trust.successful_inferences, 1);
}

#[tokio::test]
async fn leak_revokes_and_later_requests_fail() {
    let service = common::service(
        common::pool().await,
        FixedProvider::new("The radiology report shows no acute disease."),
    );
    let session = service
        .create_session("triage", "nurse-7", no_metadata())
        .await
        .expect("session");
    let id = session.id.to_string();

    let outcome = service.ask(&id, "Anything else?").await.expect("ask");
    assert!(outcome.session_revoked);
    assert!(matches!(
        outcome.clone().ensure_compliant(),
        Err(CoreError::PolicyViolation(reason)) if reason.contains("radiology")
    ));

    let stored = service.get_session(&id).await.expect("session");
    assert!(stored.is_revoked());
    assert_eq!(stored.revocation_reason(), outcome.violation.as_deref());

    assert!(matches!(
        service.ask(&id, "Hello?").await,
        Err(CoreError::SessionRevoked(_))
    ));
    assert_eq!(service.audit_trail(Some(&id)).await.expect("trail").len(), 1);

    let trust = service.trust_score("nurse-7").await.expect("trust");
    assert_eq!(trust.violation_count, 1);
    let reset = service.reset_trust("nurse-7").await.expect("reset");
    assert_eq!(reset.violation_count, 0);
}

#[tokio::test]
async fn redaction_after_listing_hides_memory() {
    let service = common::service(common::pool().await, FixedProvider::new("ok"));
    let memory = add_memory(&service, "billing", &["billing_code"], "Code 99213.").await;
    assert_eq!(service.list_memories(Some("billing")).await.expect("list").len(), 1);

    let redacted = service
        .redact_memory(&memory.id.to_string(), Some("entered in error"))
        .await
        .expect("redact");
    assert!(redacted.redacted);
    assert!(service.list_memories(Some("billing")).await.expect("list").is_empty());

    let fetched = service.get_memory(&memory.id.to_string()).await.expect("get");
    assert_eq!(fetched, redacted);
}

#[tokio::test]
async fn manual_revocation_is_idempotent() {
    let service = common::service(common::pool().await, FixedProvider::new("ok"));
    let session = service
        .create_session("teleconsult", "dr-lee", no_metadata())
        .await
        .expect("session");
    let id = session.id.to_string();

    let first = service.revoke_session(&id, Some("shift ended")).await.expect("revoke");
    let second = service.revoke_session(&id, None).await.expect("revoke again");
    assert_eq!(first, second);
    assert_eq!(second.revocation_reason(), Some("shift ended"));
}

#[tokio::test]
async fn malformed_and_unknown_ids_map_to_distinct_errors() {
    let service = common::service(common::pool().await, FixedProvider::new("ok"));
    assert!(matches!(
        service.get_session("nope").await,
        Err(CoreError::InvalidIdentifier { kind: "session", .. })
    ));
    assert!(matches!(
        service.get_memory("nope").await,
        Err(CoreError::InvalidIdentifier { kind: "memory", .. })
    ));
    assert!(matches!(
        service.verify_audit(&uuid::Uuid::new_v4().to_string()).await,
        Err(CoreError::NotFound { .. })
    ));
    assert!(matches!(
        service.revoke_session(&uuid::Uuid::new_v4().to_string(), None).await,
        Err(CoreError::NotFound { kind: "session", .. })
    ));
    assert!(matches!(
        service.audit_trail(Some("bad")).await,
        Err(CoreError::InvalidIdentifier { .. })
    ));
}

#[tokio::test]
async fn custom_policy_changes_visibility_and_patterns() {
    let mut zones = BTreeMap::new();
    zones.insert("oncology".to_owned(), vec!["staging".to_owned()]);
    let policy = Arc::new(ZonePolicy::new(zones, vec!["genome".to_owned()]));
    let service = LcacService::with_policy(
        common::pool().await,
        &Config::default(),
        policy,
        FixedProvider::new("Genome panel pending."),
    );
    add_memory(&service, "oncology", &["staging"], "Stage II.").await;
    let session = service
        .create_session("oncology", "dr-ng", no_metadata())
        .await
        .expect("session");

    let outcome = service
        .ask_with_timeout(&session.id.to_string(), "Status?", Duration::from_secs(5))
        .await
        .expect("ask");
    assert_eq!(outcome.used_memory_ids.len(), 1);
    assert_eq!(
        outcome.violation.as_deref(),
        Some("Content contains disallowed pattern: genome")
    );
}

#[tokio::test]
async fn default_timeout_comes_from_config() {
    let mut config = Config::default();
    config.model.timeout_secs = 7;
    let service = LcacService::new(common::pool().await, &config, FixedProvider::new("ok"));
    assert_eq!(service.timeout(), Duration::from_secs(7));
}

#[tokio::test]
async fn zones_only_policy_still_scans_for_leaks() {
    let config = Config::from_toml("[policy.zones]\ntriage = [\"symptoms\"]").expect("config");
    config.validate().expect("valid");
    let service = LcacService::new(
        common::pool().await,
        &config,
        FixedProvider::new("The x-ray from radiology shows imaging"),
    );
    let session = service
        .create_session("triage", "nurse-7", no_metadata())
        .await
        .expect("session");

    let outcome = service
        .ask(&session.id.to_string(), "Any results?")
        .await
        .expect("ask");
    assert!(!outcome.success);
    assert!(outcome.session_revoked);
    assert!(outcome.violation.is_some());
}

#[tokio::test]
async fn revocation_from_another_service_blocks_trust_credit() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("shared.db");
    let leaking = common::service(
        lcac::db::open(&path).await.expect("open first"),
        FixedProvider::new("The x-ray is clear."),
    );
    let gated = GatedProvider::new("Rest and fluids.");
    let slow = common::service(
        lcac::db::open(&path).await.expect("open second"),
        gated.clone(),
    );
    let session = leaking
        .create_session("triage", "dr-grey", no_metadata())
        .await
        .expect("session");
    let id = session.id.to_string();

    let leak = async {
        gated.entered().await;
        let outcome = leaking.ask(&id, "Any imaging?").await;
        gated.release();
        outcome
    };
    let (clean, leaked) = tokio::join!(slow.ask(&id, "How urgent?"), leak);

    assert!(leaked.expect("leaking ask").session_revoked);
    assert!(matches!(clean, Err(CoreError::SessionRevoked(sid)) if sid == session.id));

    let trust = slow.trust_score("dr-grey").await.expect("trust");
    assert_eq!(trust.violation_count, 1);
    assert_eq!(trust.successful_inferences, 0);
    assert_eq!(slow.audit_trail(Some(&id)).await.expect("trail").len(), 2);
}
