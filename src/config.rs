//! Configuration loading and validation.
//!
//! Loads `config.toml` from `$LCAC_CONFIG_PATH` or `~/.lcac/config.toml`.
//! A missing file yields defaults. Environment variables override file
//! values; file values override defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database location.
    pub database: DatabaseConfig,

    /// Model collaborator settings.
    pub model: ModelConfig,

    /// Trust score bounds and adjustments.
    pub trust: TrustConfig,

    /// Optional replacement for the built-in zone policy table.
    pub policy: Option<PolicyConfig>,
}

/// Database settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite file. `None` resolves to `~/.lcac/lcac.db`.
    pub path: Option<PathBuf>,
}

/// Model collaborator settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model spec in `<provider>/<model>` form (e.g. `openai/gpt-3.5-turbo`).
    pub default: String,

    /// Name of the environment variable holding the provider API key.
    pub api_key_env: String,

    /// Maximum tokens in a model response.
    pub max_tokens: u32,

    /// Upper bound on a single model call, in seconds.
    pub timeout_secs: u64,

    /// Base URL for the Ollama backend.
    pub ollama_url: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            ollama_url: default_ollama_url(),
        }
    }
}

/// Trust score bounds and per-outcome adjustments.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Score assigned on first reference and on reset.
    pub initial: f64,
    /// Amount subtracted per violation.
    pub violation_penalty: f64,
    /// Amount added per successful inference.
    pub success_bonus: f64,
    /// Lower bound.
    pub min: f64,
    /// Upper bound.
    pub max: f64,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            initial: 1.0,
            violation_penalty: 0.2,
            success_bonus: 0.05,
            min: 0.0,
            max: 1.0,
        }
    }
}

/// Zone policy override.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Zone name to allowed content tags.
    pub zones: HashMap<String, Vec<String>>,
    /// Lexical patterns that indicate cross-zone leakage. Absent means the
    /// built-in list.
    pub disallowed_patterns: Option<Vec<String>>,
}

// Default value functions for serde

fn default_model() -> String {
    "openai/gpt-3.5-turbo".to_owned()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_owned()
}
fn default_max_tokens() -> u32 {
    500
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_ollama_url() -> String {
    "http://127.0.0.1:11434".to_owned()
}

impl Config {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or if
    /// the resulting configuration fails validation.
    pub fn load() -> anyhow::Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        let path = config_path_with(env)?;
        let mut config = Self::load_from(&path)?;
        config.apply_overrides(env);
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file only. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("failed to parse config at {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config at {}: {e}",
                path.display()
            )),
        }
    }

    /// Parse a TOML string into config.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed.
    pub fn from_toml(toml_str: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver so tests never have to mutate the process environment.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("LCAC_DATABASE_PATH") {
            self.database.path = Some(PathBuf::from(v));
        }
        if let Some(v) = env("LCAC_MODEL") {
            self.model.default = v;
        }
        if let Some(v) = env("LCAC_OLLAMA_URL") {
            self.model.ollama_url = v;
        }
        if let Some(v) = env("LCAC_MODEL_TIMEOUT_SECS") {
            match v.parse() {
                Ok(n) => self.model.timeout_secs = n,
                Err(_) => tracing::warn!(
                    var = "LCAC_MODEL_TIMEOUT_SECS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first constraint that does not hold.
    pub fn validate(&self) -> anyhow::Result<()> {
        let t = &self.trust;
        let all_finite = [t.initial, t.violation_penalty, t.success_bonus, t.min, t.max]
            .iter()
            .all(|v| v.is_finite());
        if !all_finite {
            anyhow::bail!("trust settings must be finite numbers");
        }
        if t.min > t.max {
            anyhow::bail!("trust.min ({}) exceeds trust.max ({})", t.min, t.max);
        }
        if t.initial < t.min || t.initial > t.max {
            anyhow::bail!(
                "trust.initial ({}) must lie within [{}, {}]",
                t.initial,
                t.min,
                t.max
            );
        }
        if t.violation_penalty < 0.0 || t.success_bonus < 0.0 {
            anyhow::bail!("trust adjustments must be non-negative");
        }
        if self.model.timeout_secs == 0 {
            anyhow::bail!("model.timeout_secs must be greater than zero");
        }
        if let Some(patterns) = self
            .policy
            .as_ref()
            .and_then(|p| p.disallowed_patterns.as_ref())
        {
            if patterns.iter().all(|p| p.trim().is_empty()) {
                anyhow::bail!(
                    "policy.disallowed_patterns must name at least one pattern; \
                     omit it to keep the built-in list"
                );
            }
        }
        Ok(())
    }

    /// Resolve the database path, falling back to `~/.lcac/lcac.db`.
    ///
    /// # Errors
    ///
    /// Returns an error if no path is configured and the home directory
    /// cannot be determined.
    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        match &self.database.path {
            Some(p) => Ok(p.clone()),
            None => Ok(config_dir()?.join("lcac.db")),
        }
    }
}

/// Resolve the default config directory (`~/.lcac/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".lcac"))
}

/// Resolve the config file path using a custom env resolver.
///
/// # Errors
///
/// Returns an error if `$LCAC_CONFIG_PATH` is unset and the home directory
/// cannot be determined.
pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> anyhow::Result<PathBuf> {
    if let Some(p) = env("LCAC_CONFIG_PATH") {
        return Ok(PathBuf::from(p));
    }
    Ok(config_dir()?.join("config.toml"))
}
