//! Provider selection from model config.

use std::collections::HashMap;

use lcac::config::ModelConfig;
use lcac::providers::router::{build_provider, RouterError};
use lcac::providers::{CompletionRequest, Message, ProviderError};

fn config(spec: &str) -> ModelConfig {
    ModelConfig {
        default: spec.to_owned(),
        ..ModelConfig::default()
    }
}

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

fn request() -> CompletionRequest {
    CompletionRequest {
        messages: vec![Message::user("hi")],
        ..CompletionRequest::default()
    }
}

#[test]
fn openai_with_key_builds_real_provider() {
    let provider = build_provider(
        &config("openai/gpt-3.5-turbo"),
        env_from(&[("OPENAI_API_KEY", "sk-test")]),
    )
    .expect("provider");
    assert_eq!(provider.model_id(), "openai/gpt-3.5-turbo");
}

#[tokio::test]
async fn openai_without_key_reports_configuration_hint() {
    let provider = build_provider(&config("openai/gpt-3.5-turbo"), env_from(&[])).expect("provider");
    let err = provider
        .complete(request())
        .await
        .expect_err("unconfigured provider always fails");
    match err {
        ProviderError::Unavailable(hint) => {
            assert_eq!(
                hint,
                "LLM not configured. Please set the OPENAI_API_KEY environment variable."
            );
        }
        other => panic!("expected Unavailable, got {other}"),
    }
}

#[tokio::test]
async fn blank_key_counts_as_missing() {
    let provider = build_provider(
        &config("openai/gpt-3.5-turbo"),
        env_from(&[("OPENAI_API_KEY", "   ")]),
    )
    .expect("provider");
    assert!(matches!(
        provider.complete(request()).await,
        Err(ProviderError::Unavailable(_))
    ));
}

#[test]
fn custom_key_variable_is_honoured() {
    let mut cfg = config("openai/gpt-4o-mini");
    cfg.api_key_env = "CLINIC_OPENAI_KEY".to_owned();
    let provider = build_provider(&cfg, env_from(&[("CLINIC_OPENAI_KEY", "sk-test")]))
        .expect("provider");
    assert_eq!(provider.model_id(), "openai/gpt-4o-mini");
}

#[test]
fn ollama_needs_no_key() {
    let provider = build_provider(&config("ollama/llama3"), env_from(&[])).expect("provider");
    assert_eq!(provider.model_id(), "ollama/llama3");
}

#[test]
fn unknown_provider_is_rejected() {
    let result = build_provider(&config("bard/palm"), env_from(&[]));
    assert!(matches!(
        result,
        Err(RouterError::UnsupportedProvider { provider }) if provider == "bard"
    ));
}

#[test]
fn malformed_spec_is_rejected() {
    for spec in ["gpt-3.5-turbo", "openai/", "/gpt"] {
        assert!(
            matches!(
                build_provider(&config(spec), env_from(&[])),
                Err(RouterError::InvalidModelSpec { .. })
            ),
            "spec {spec}"
        );
    }
}
