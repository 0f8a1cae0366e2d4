//! Provider selection from the `[model]` config section.
//!
//! The model spec has the form `<provider>/<model>`. A known provider whose
//! credential is missing resolves to an [`UnconfiguredProvider`] rather than
//! an error, so the pipeline still runs and reports a visible placeholder.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::ModelConfig;

use super::ollama::OllamaProvider;
use super::openai::OpenAiProvider;
use super::{CompletionRequest, CompletionResponse, LlmProvider, ProviderError};

/// Provider routing errors.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Model spec is not in `<provider>/<model>` format.
    #[error("invalid model spec '{spec}', expected '<provider>/<model>'")]
    InvalidModelSpec {
        /// Invalid raw spec.
        spec: String,
    },
    /// Unsupported provider type in spec prefix.
    #[error("unsupported provider '{provider}' (expected 'openai' or 'ollama')")]
    UnsupportedProvider {
        /// Unsupported provider prefix.
        provider: String,
    },
    /// The shared HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Provider that always fails, used when credentials are missing.
#[derive(Debug, Clone)]
pub struct UnconfiguredProvider {
    model_spec: String,
    hint: String,
}

impl UnconfiguredProvider {
    /// Create a provider that reports `hint` on every call.
    pub fn new(model_spec: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            model_spec: model_spec.into(),
            hint: hint.into(),
        }
    }
}

#[async_trait]
impl LlmProvider for UnconfiguredProvider {
    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        Err(ProviderError::Unavailable(self.hint.clone()))
    }

    fn model_id(&self) -> &str {
        &self.model_spec
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedModelSpec {
    provider: String,
    model: String,
}

fn parse_model_spec(spec: &str) -> Result<ParsedModelSpec, RouterError> {
    let (provider, model) = spec.split_once('/').unwrap_or_default();
    if provider.is_empty() || model.is_empty() {
        return Err(RouterError::InvalidModelSpec {
            spec: spec.to_owned(),
        });
    }
    Ok(ParsedModelSpec {
        provider: provider.to_owned(),
        model: model.to_owned(),
    })
}

/// Build the configured provider.
///
/// `env` resolves environment variables (injectable for tests).
///
/// # Errors
///
/// Returns [`RouterError`] for a malformed spec or an unknown provider.
pub fn build_provider(
    config: &ModelConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn LlmProvider>, RouterError> {
    let spec = config.default.trim();
    let parsed = parse_model_spec(spec)?;
    // The pipeline enforces its own deadline; this one only bounds a
    // connection that hangs after the pipeline has given up on it.
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs.saturating_mul(2)))
        .build()?;

    match parsed.provider.as_str() {
        "openai" => match env(&config.api_key_env).filter(|k| !k.trim().is_empty()) {
            Some(key) => Ok(Arc::new(OpenAiProvider::new(
                spec.to_owned(),
                parsed.model,
                key.trim().to_owned(),
                client,
            ))),
            None => {
                warn!(
                    model = spec,
                    env_var = %config.api_key_env,
                    "model API key missing; responses will be placeholders"
                );
                Ok(Arc::new(UnconfiguredProvider::new(
                    spec,
                    format!(
                        "LLM not configured. Please set the {} environment variable.",
                        config.api_key_env
                    ),
                )))
            }
        },
        "ollama" => Ok(Arc::new(OllamaProvider::new(
            spec.to_owned(),
            parsed.model,
            config.ollama_url.clone(),
            client,
        ))),
        other => Err(RouterError::UnsupportedProvider {
            provider: other.to_owned(),
        }),
    }
}
