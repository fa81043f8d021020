//! Intake bot — routes inbound messages to the registration engine.
//!
//! Routing: a message carrying a photo is a document event. Otherwise text
//! starting with `/` is a command, emoji-prefixed text is a control event,
//! and any other text is a document event while the user is at an upload
//! step (so the user is told a photo is expected) and ignored otherwise.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::channels::{Channel, IncomingMessage, OutgoingMessage};
use crate::error::Result;
use crate::llm::TextGenerator;
use crate::registration::engine::PhotoUpload;
use crate::registration::{InputKind, RegistrationEngine, buttons, classify, prompts};

/// How often idle per-user locks are dropped.
const PRUNE_INTERVAL: Duration = Duration::from_secs(600);

pub struct IntakeBot {
    engine: Arc<RegistrationEngine>,
    generator: TextGenerator,
}

impl IntakeBot {
    pub fn new(engine: Arc<RegistrationEngine>, generator: TextGenerator) -> Self {
        Self { engine, generator }
    }

    pub fn engine(&self) -> &Arc<RegistrationEngine> {
        &self.engine
    }

    /// Replies for one inbound message. Never fails: any error is logged and
    /// answered with a generic notice and the main menu. Progress is left as
    /// it was at the point of failure.
    pub async fn handle(
        &self,
        channel: &dyn Channel,
        message: &IncomingMessage,
    ) -> Vec<OutgoingMessage> {
        or_generic_error(message, self.route(channel, message).await)
    }

    async fn route(
        &self,
        channel: &dyn Channel,
        message: &IncomingMessage,
    ) -> Result<Vec<OutgoingMessage>> {
        let user_id = message.user_id;

        if message.photo.is_some() {
            let upload = self.fetch_photo(channel, message).await;
            return self.engine.handle_photo(user_id, upload).await;
        }

        let text = message.text();
        match classify(text) {
            InputKind::Command => Ok(self.command(text).await),
            InputKind::Control => self.engine.handle_button(user_id, text).await,
            InputKind::Plain if self.engine.store().is_expecting_upload(user_id).await => {
                self.engine.handle_photo(user_id, PhotoUpload::Missing).await
            }
            InputKind::Plain => {
                debug!(user_id, "Ignoring plain text outside an upload step");
                Ok(Vec::new())
            }
        }
    }

    async fn command(&self, text: &str) -> Vec<OutgoingMessage> {
        // Group chats address commands as `/start@botname`.
        let command = text
            .split_whitespace()
            .next()
            .and_then(|word| word.split('@').next())
            .unwrap_or_default();

        match command {
            "/start" => {
                let welcome = prompts::welcome().render(&self.generator).await;
                vec![OutgoingMessage::text(welcome).with_keyboard(buttons::main_menu())]
            }
            other => {
                debug!(command = other, "Unknown command");
                Vec::new()
            }
        }
    }

    async fn fetch_photo(&self, channel: &dyn Channel, message: &IncomingMessage) -> PhotoUpload {
        let Some(photo) = &message.photo else {
            return PhotoUpload::Missing;
        };
        match channel.download_photo(photo).await {
            Ok(bytes) => PhotoUpload::Image(bytes),
            Err(e) => {
                warn!(user_id = message.user_id, file_id = %photo.file_id, "Photo download failed: {}", e);
                PhotoUpload::Unavailable
            }
        }
    }

    async fn respond(&self, channel: &dyn Channel, message: IncomingMessage) {
        for reply in self.handle(channel, &message).await {
            if let Err(e) = channel.send(message.chat_id, reply).await {
                error!(chat_id = message.chat_id, "Failed to send reply: {}", e);
            }
        }
    }

    /// Serve a channel until Ctrl+C or until its stream ends. Each message
    /// is handled on its own task.
    pub async fn run(self: Arc<Self>, channel: Arc<dyn Channel>) -> Result<()> {
        let mut messages = channel.start().await?;

        let engine = Arc::clone(&self.engine);
        let pruning_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(PRUNE_INTERVAL);
            interval.tick().await; // Skip immediate first tick
            loop {
                interval.tick().await;
                engine.turns().prune().await;
                let registrations = engine.store().len().await;
                let locks = engine.turns().tracked().await;
                debug!(
                    registrations,
                    locks,
                    "Pruned idle user locks"
                );
            }
        });

        info!(channel = channel.name(), "Intake bot ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl+C received, shutting down...");
                    break;
                }
                msg = messages.next() => match msg {
                    Some(m) => m,
                    None => {
                        info!("Channel stream ended, shutting down...");
                        break;
                    }
                }
            };

            debug!(
                user_id = message.user_id,
                chat_id = message.chat_id,
                channel = %message.channel,
                "Received message"
            );

            let bot = Arc::clone(&self);
            let channel = Arc::clone(&channel);
            tokio::spawn(async move {
                bot.respond(channel.as_ref(), message).await;
            });
        }

        pruning_handle.abort();
        channel.shutdown().await?;
        Ok(())
    }
}

fn or_generic_error(
    message: &IncomingMessage,
    result: Result<Vec<OutgoingMessage>>,
) -> Vec<OutgoingMessage> {
    match result {
        Ok(replies) => replies,
        Err(e) => {
            error!(user_id = message.user_id, "Error handling message: {}", e);
            vec![OutgoingMessage::text(prompts::GENERIC_ERROR).with_keyboard(buttons::main_menu())]
        }
    }
}
