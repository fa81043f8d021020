//! Text generator — turns a semantic instruction into user-facing prose.
//!
//! Generation is best-effort: one attempt per call, no retries. Any failure
//! (no credential, transport error, empty or malformed response) yields
//! `None`, and `generate_or` substitutes the caller's literal fallback.

use std::sync::Arc;

use tracing::{debug, warn};

use super::provider::{ChatMessage, CompletionRequest, LlmProvider};

/// System prompt wrapped around every instruction.
const SYSTEM_PROMPT: &str = "You write the replies of a Telegram bot, in English. \
You are an assistant who helps people issue car insurance from their documents. \
Use a friendly and professional tone and include 0-2 relevant emoji. \
Do not greet the user unless the instruction asks for it, and do not thank them \
unless the instruction clearly requires it. \
Return only the reply text: no preamble, no Markdown, no code.";

/// System prompt for filling in the policy template.
const POLICY_SYSTEM_PROMPT: &str = "You generate car insurance policies. \
Populate the template you are given with the provided data, keeping every \
field name and all formatting exactly as in the template. Return only the \
completed policy without additional commentary.";

/// Settings for generated replies.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

/// Generate-or-default text capability.
#[derive(Clone)]
pub struct TextGenerator {
    llm: Option<Arc<dyn LlmProvider>>,
    config: GeneratorConfig,
}

impl TextGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm: Some(llm),
            config: GeneratorConfig::default(),
        }
    }

    /// A generator with no backend: every call falls back.
    pub fn disabled() -> Self {
        Self {
            llm: None,
            config: GeneratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: GeneratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Phrase an instruction as a reply. `None` on any failure.
    pub async fn generate(&self, instruction: &str) -> Option<String> {
        self.complete(SYSTEM_PROMPT, instruction).await
    }

    /// Phrase an instruction, or return `fallback` if generation fails.
    pub async fn generate_or(&self, instruction: &str, fallback: impl Into<String>) -> String {
        match self.generate(instruction).await {
            Some(text) => text,
            None => fallback.into(),
        }
    }

    /// Fill a policy template. `None` on any failure.
    pub async fn generate_policy(&self, template: &str) -> Option<String> {
        self.complete(POLICY_SYSTEM_PROMPT, template).await
    }

    async fn complete(&self, system: &str, prompt: &str) -> Option<String> {
        let Some(llm) = &self.llm else {
            debug!("Text generation disabled; using fallback");
            return None;
        };

        let request = CompletionRequest::new(vec![
            ChatMessage::system(system),
            ChatMessage::user(prompt),
        ])
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        match llm.complete(request).await {
            Ok(response) => {
                let text = response.content.trim();
                if text.is_empty() {
                    warn!(model = llm.model_name(), "LLM returned an empty reply");
                    None
                } else {
                    Some(text.to_string())
                }
            }
            Err(e) => {
                warn!(model = llm.model_name(), "Text generation failed: {}", e);
                None
            }
        }
    }
}
