//! LLM integration.
//!
//! The bot only needs phrasing: every call site has a literal fallback, so
//! the provider is optional and its failures never reach the workflow.

pub mod gemini;
pub mod generator;
pub mod provider;

pub use gemini::GeminiProvider;
pub use generator::{GeneratorConfig, TextGenerator};
pub use provider::*;

use std::sync::Arc;

use secrecy::SecretString;

/// Configuration for the text-generation backend.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// `None` disables generation; every reply uses its fallback.
    pub api_key: Option<SecretString>,
    pub model: String,
}

/// Build the text generator for a configuration.
pub fn create_generator(config: &LlmConfig) -> TextGenerator {
    match &config.api_key {
        Some(key) => {
            tracing::info!("Using Gemini (model: {})", config.model);
            TextGenerator::new(Arc::new(GeminiProvider::new(key.clone(), &config.model)))
        }
        None => {
            tracing::warn!("GEMINI_API_KEY is missing; replies use fallback text");
            TextGenerator::disabled()
        }
    }
}
