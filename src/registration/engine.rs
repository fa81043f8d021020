//! Registration engine — the per-user step state machine.
//!
//! Every event runs under the user's turn, so events from one user never
//! interleave. Step handlers return a [`StepOutcome`] whose [`Flow`] tells the
//! dispatch loop whether to stop, settle after one prompt, or cascade into
//! the next step with the same event.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::channels::{Keyboard, OutgoingMessage};
use crate::error::Result;
use crate::extraction::DocumentExtractor;
use crate::llm::TextGenerator;
use crate::storage::BlobStore;

use super::UserId;
use super::buttons::{self, Button};
use super::composer::StepMessageComposer;
use super::intake::PhotoIntakeDispatcher;
use super::prompts::{self, Prompt};
use super::step::Step;
use super::store::ProgressStore;
use super::turns::UserTurns;

const POLICY_NUMBERS: std::ops::RangeInclusive<u32> = 10_000..=99_999;

/// What the dispatch loop does after a step handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// The event means nothing at this step: no prompt, stop.
    Ignore,
    /// Send the prompt for the resulting step, then stop.
    Settle,
    /// Send the prompt for the resulting step, then dispatch the same event
    /// against it.
    Cascade,
}

/// Result of one step handler.
#[derive(Debug)]
struct StepOutcome {
    /// Sent before the step prompt.
    replies: Vec<OutgoingMessage>,
    /// Attached to the step prompt.
    keyboard: Keyboard,
    flow: Flow,
}

impl StepOutcome {
    fn new(flow: Flow) -> Self {
        Self {
            replies: Vec::new(),
            keyboard: Keyboard::Unchanged,
            flow,
        }
    }

    fn ignore() -> Self {
        Self::new(Flow::Ignore)
    }

    fn settle() -> Self {
        Self::new(Flow::Settle)
    }

    fn cascade() -> Self {
        Self::new(Flow::Cascade)
    }

    fn reply(mut self, message: OutgoingMessage) -> Self {
        self.replies.push(message);
        self
    }

    fn keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = keyboard;
        self
    }
}

/// A photo event as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoUpload {
    /// The message carried no photo.
    Missing,
    /// The message carried a photo but fetching it failed.
    Unavailable,
    /// The downloaded image.
    Image(Vec<u8>),
}

pub struct RegistrationEngine {
    store: Arc<ProgressStore>,
    turns: UserTurns,
    composer: StepMessageComposer,
    intake: PhotoIntakeDispatcher,
    blobs: Arc<dyn BlobStore>,
    generator: TextGenerator,
    price: Decimal,
}

impl RegistrationEngine {
    pub fn new(
        generator: TextGenerator,
        extractor: Arc<dyn DocumentExtractor>,
        blobs: Arc<dyn BlobStore>,
        price: Decimal,
    ) -> Self {
        let store = Arc::new(ProgressStore::new());
        Self {
            composer: StepMessageComposer::new(Arc::clone(&store), generator.clone(), price),
            intake: PhotoIntakeDispatcher::new(Arc::clone(&store), extractor, Arc::clone(&blobs)),
            turns: UserTurns::new(),
            store,
            blobs,
            generator,
            price,
        }
    }

    pub fn store(&self) -> &Arc<ProgressStore> {
        &self.store
    }

    pub fn turns(&self) -> &UserTurns {
        &self.turns
    }

    async fn say(&self, prompt: Prompt, keyboard: Keyboard) -> OutgoingMessage {
        OutgoingMessage::text(prompt.render(&self.generator).await).with_keyboard(keyboard)
    }

    // ── Control events ──────────────────────────────────────────────

    /// Handle a reply-keyboard press.
    pub async fn handle_button(&self, user_id: UserId, text: &str) -> Result<Vec<OutgoingMessage>> {
        let _turn = self.turns.acquire(user_id).await;
        let button = Button::from_label(text);
        debug!(user_id, ?button, "Control event");

        match button {
            Some(Button::Cancel) => {
                self.store.remove(user_id).await;
                info!(user_id, "Registration cancelled");
                return Ok(vec![self.say(prompts::cancelled(), buttons::main_menu()).await]);
            }
            Some(Button::Start) => {
                self.store.remove(user_id).await;
                self.store.begin(user_id).await;
                info!(user_id, "Registration restarted");
            }
            _ => {}
        }

        self.dispatch(user_id, button).await
    }

    /// Run step handlers until one stops the cascade. Each pass either
    /// advances strictly or hits a step without a handler, so the loop is
    /// bounded by the number of steps.
    async fn dispatch(
        &self,
        user_id: UserId,
        button: Option<Button>,
    ) -> Result<Vec<OutgoingMessage>> {
        let mut replies = Vec::new();

        for _ in 0..Step::ALL.len() {
            let Some(step) = self.store.current_step(user_id).await else {
                break;
            };
            let Some(outcome) = self.handle_step(user_id, step, button).await? else {
                debug!(user_id, %step, "No handler for control event at this step");
                break;
            };

            replies.extend(outcome.replies);
            if outcome.flow == Flow::Ignore {
                break;
            }
            if let Some(text) = self.composer.compose(user_id).await {
                replies.push(OutgoingMessage::text(text).with_keyboard(outcome.keyboard));
            }
            if outcome.flow != Flow::Cascade {
                break;
            }
        }

        Ok(replies)
    }

    /// `None` means the step has no handler for control events.
    async fn handle_step(
        &self,
        user_id: UserId,
        step: Step,
        button: Option<Button>,
    ) -> Result<Option<StepOutcome>> {
        let outcome = match step {
            Step::Start => {
                self.store.advance(user_id).await?;
                StepOutcome::settle().keyboard(buttons::cancel_only())
            }
            Step::ConfirmData => self.confirm_data(user_id, button).await?,
            Step::CostCalculation => self.cost_calculation(user_id, button).await?,
            Step::IssuancePending => self.issue_policy(user_id).await?,
            Step::Finished => {
                self.store.remove(user_id).await;
                info!(user_id, "Registration finished");
                StepOutcome::settle()
            }
            Step::IdCardUpload | Step::VehicleFrontUpload | Step::VehicleBackUpload => {
                return Ok(None);
            }
        };
        Ok(Some(outcome))
    }

    async fn confirm_data(&self, user_id: UserId, button: Option<Button>) -> Result<StepOutcome> {
        match button {
            Some(Button::Yes) => {
                self.store.advance(user_id).await?;
                Ok(StepOutcome::settle())
            }
            Some(Button::No) => {
                self.store.set_step(user_id, Step::IdCardUpload).await?;
                let notice = self.say(prompts::upload_again(), Keyboard::Remove).await;
                Ok(StepOutcome::cascade()
                    .reply(notice)
                    .keyboard(buttons::cancel_only()))
            }
            _ => Ok(StepOutcome::ignore()),
        }
    }

    async fn cost_calculation(
        &self,
        user_id: UserId,
        button: Option<Button>,
    ) -> Result<StepOutcome> {
        match button {
            Some(Button::Yes) => {
                self.store.advance(user_id).await?;
                let ack = OutgoingMessage::text(prompts::PRICE_ACCEPTED).with_keyboard(Keyboard::Remove);
                Ok(StepOutcome::cascade().reply(ack))
            }
            Some(Button::No) => {
                self.store.remove(user_id).await;
                info!(user_id, "Quoted price rejected");
                let notice = self
                    .say(prompts::price_rejected(self.price), buttons::main_menu())
                    .await;
                Ok(StepOutcome::settle().reply(notice))
            }
            _ => Ok(StepOutcome::ignore()),
        }
    }

    async fn issue_policy(&self, user_id: UserId) -> Result<StepOutcome> {
        let Some(mut data) = self.store.document_data(user_id).await else {
            warn!(user_id, "Insurance data is not available");
            let notice = self
                .say(prompts::data_unavailable(), buttons::main_menu())
                .await;
            self.store.remove(user_id).await;
            return Ok(StepOutcome::settle().reply(notice));
        };

        let number = rand::thread_rng().gen_range(POLICY_NUMBERS);
        let issued_at = Utc::now();
        data.issue_policy(number, issued_at);
        self.store
            .update_documents(user_id, |d| d.issue_policy(number, issued_at))
            .await?;

        let template = data.policy_document();
        let policy = self
            .generator
            .generate_policy(&template)
            .await
            .unwrap_or(template);

        self.store.advance(user_id).await?;
        info!(user_id, policy_number = number, "Policy issued");

        Ok(StepOutcome::cascade()
            .reply(OutgoingMessage::text(policy).with_keyboard(buttons::main_menu())))
    }

    // ── Document events ─────────────────────────────────────────────

    /// Handle an uploaded photo (or a message that should have carried one).
    pub async fn handle_photo(
        &self,
        user_id: UserId,
        upload: PhotoUpload,
    ) -> Result<Vec<OutgoingMessage>> {
        let _turn = self.turns.acquire(user_id).await;

        if !self.store.exists(user_id).await {
            return Ok(vec![self.say(prompts::not_started(), buttons::main_menu()).await]);
        }

        let bytes = match upload {
            PhotoUpload::Image(bytes) if !bytes.is_empty() => Some(bytes),
            PhotoUpload::Unavailable => None,
            PhotoUpload::Missing | PhotoUpload::Image(_) => {
                return Ok(vec![self.say(prompts::no_photo(), Keyboard::Unchanged).await]);
            }
        };

        let mut replies = vec![self.say(prompts::processing(), buttons::cancel_only()).await];

        let saved = match bytes {
            Some(bytes) => match self.blobs.save(&bytes).await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(user_id, "Failed to save photo: {}", e);
                    None
                }
            },
            None => None,
        };
        let Some(path) = saved else {
            replies.push(self.say(prompts::load_failed(), buttons::cancel_only()).await);
            return Ok(replies);
        };

        if self.store.document_data(user_id).await.is_none() {
            if let Err(e) = self.blobs.delete(&path).await {
                warn!(user_id, "Failed to delete uploaded photo: {}", e);
            }
            replies.push(self.say(prompts::start_over(), buttons::main_menu()).await);
            self.store.remove(user_id).await;
            return Ok(replies);
        }

        let outcome = match self.intake.process(user_id, &path).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(user_id, "Photo processing failed: {}", e);
                replies.push(
                    self.say(prompts::processing_failed(), buttons::cancel_only())
                        .await,
                );
                if let Some(step) = self.store.current_step(user_id).await {
                    if let Some(text) = self.composer.compose(user_id).await {
                        replies.push(OutgoingMessage::text(text).with_keyboard(step_keyboard(step)));
                    }
                }
                return Ok(replies);
            }
        };

        debug!(user_id, step = %outcome.step, "Photo accepted");
        match self.composer.compose(user_id).await {
            Some(text) => {
                let keyboard = if outcome.needs_confirmation {
                    buttons::confirmation()
                } else {
                    buttons::cancel_only()
                };
                replies.push(OutgoingMessage::text(text).with_keyboard(keyboard));
            }
            None => {
                replies.push(
                    self.say(prompts::something_went_wrong(), buttons::main_menu())
                        .await,
                );
                self.store.remove(user_id).await;
            }
        }

        Ok(replies)
    }
}

/// Keyboard matching what a step expects next.
fn step_keyboard(step: Step) -> Keyboard {
    match step {
        Step::IdCardUpload | Step::VehicleFrontUpload | Step::VehicleBackUpload => {
            buttons::cancel_only()
        }
        Step::ConfirmData | Step::CostCalculation => buttons::confirmation(),
        Step::Start | Step::IssuancePending | Step::Finished => Keyboard::Unchanged,
    }
}
