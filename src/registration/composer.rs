//! Step message composer.
//!
//! Read-only: produces the prompt for the user's current step and never
//! touches progress. Removing progress at `Finished` is the engine's call.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::llm::TextGenerator;

use super::UserId;
use super::prompts;
use super::step::Step;
use super::store::ProgressStore;

pub struct StepMessageComposer {
    store: Arc<ProgressStore>,
    generator: TextGenerator,
    price: Decimal,
}

impl StepMessageComposer {
    pub fn new(store: Arc<ProgressStore>, generator: TextGenerator, price: Decimal) -> Self {
        Self {
            store,
            generator,
            price,
        }
    }

    /// Prompt for the user's current step; `None` when no registration is
    /// in progress, meaning nothing should be sent.
    pub async fn compose(&self, user_id: UserId) -> Option<String> {
        let step = self.store.current_step(user_id).await?;

        let summary = match step {
            Step::ConfirmData => self
                .store
                .document_data(user_id)
                .await
                .map(|data| data.confirmation_summary())
                .unwrap_or_default(),
            _ => String::new(),
        };

        let prompt = prompts::step_prompt(step, &summary, self.price);
        Some(prompt.render(&self.generator).await)
    }
}
