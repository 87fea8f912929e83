//! Endpoint/model selection helpers.
//!
//! No concrete provider wire adapter lives in this crate, but choosing
//! *which* model and endpoint a caller's own [`crate::model::Model`]
//! adapter should talk to is still an ambient concern every caller faces,
//! so this module keeps the base's environment-variable-override pattern,
//! generalized away from any one vendor's API shape.

use std::env;

/// A named runtime a caller's [`crate::model::Model`] adapter talks to.
/// Each variant carries its own conventional default endpoint; `Custom`
/// covers anything else (a remote provider, a bespoke in-house gateway).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    LmStudio,
    Ollama,
    LlamaCpp,
    Vllm,
    Custom(String),
}

impl Provider {
    /// The conventional default base URL for this provider, or `None` for
    /// `Custom` (the caller must supply one).
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Provider::LmStudio => Some("http://localhost:1234/v1"),
            Provider::Ollama => Some("http://localhost:11434/v1"),
            Provider::LlamaCpp => Some("http://localhost:8080/v1"),
            Provider::Vllm => Some("http://localhost:8000/v1"),
            Provider::Custom(_) => None,
        }
    }
}

/// Resolve the base URL to use, checking `env_var` first, then
/// `provider`'s conventional default, then `fallback`.
///
/// Priority: environment variable > provider default > fallback parameter.
pub fn get_base_url(env_var: &str, provider: &Provider, fallback: &str) -> String {
    if let Ok(value) = env::var(env_var) {
        if !value.is_empty() {
            return value;
        }
    }
    provider
        .default_base_url()
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}

/// Resolve the model name to use: `env_var`'s value if `prefer_env` is set
/// and the variable is present and non-empty, otherwise `fallback`.
pub fn get_model(env_var: &str, fallback: &str, prefer_env: bool) -> String {
    if prefer_env {
        if let Ok(value) = env::var(env_var) {
            if !value.is_empty() {
                return value;
            }
        }
    }
    fallback.to_string()
}
