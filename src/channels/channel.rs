//! Channel trait and the message types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use uuid::Uuid;

use crate::error::ChannelError;
use crate::registration::UserId;

/// Stream of inbound messages produced by a started channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// Reference to a photo held by the messaging gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRef {
    /// Gateway-specific file handle (a Telegram `file_id`, a local path for the CLI).
    pub file_id: String,
}

impl PhotoRef {
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
        }
    }
}

/// An inbound chat event.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Name of the channel that received it.
    pub channel: String,
    pub user_id: UserId,
    /// Where replies go.
    pub chat_id: i64,
    pub user_name: Option<String>,
    pub text: Option<String>,
    pub photo: Option<PhotoRef>,
    pub received_at: DateTime<Utc>,
    /// Channel-specific extras.
    pub metadata: serde_json::Value,
}

impl IncomingMessage {
    pub fn new(channel: impl Into<String>, user_id: UserId, chat_id: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            user_id,
            chat_id,
            user_name: None,
            text: None,
            photo: None,
            received_at: Utc::now(),
            metadata: serde_json::json!({}),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_photo(mut self, photo: PhotoRef) -> Self {
        self.photo = Some(photo);
        self
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Text content, or empty when the message has none.
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

/// Reply keyboard attached to an outbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Keyboard {
    /// Send no markup; the client keeps whatever keyboard it shows.
    #[default]
    Unchanged,
    /// Replace the keyboard with these rows of button labels.
    Buttons(Vec<Vec<String>>),
    /// Hide the keyboard.
    Remove,
}

impl Keyboard {
    /// Build a keyboard from rows of labels.
    pub fn rows<R, L>(rows: impl IntoIterator<Item = R>) -> Self
    where
        R: IntoIterator<Item = L>,
        L: ToString,
    {
        Self::Buttons(
            rows.into_iter()
                .map(|row| row.into_iter().map(|l| l.to_string()).collect())
                .collect(),
        )
    }

    /// A keyboard without any button is sent as `Unchanged`.
    pub fn normalized(self) -> Self {
        match self {
            Self::Buttons(rows) if rows.iter().all(Vec::is_empty) => Self::Unchanged,
            other => other,
        }
    }
}

/// An outbound reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub keyboard: Keyboard,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Keyboard::Unchanged,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = keyboard.normalized();
        self
    }
}

/// A messaging gateway.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name, used in logs and on inbound messages.
    fn name(&self) -> &str;

    /// Start receiving. Messages arrive on the returned stream.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Deliver one reply to a chat.
    async fn send(&self, chat_id: i64, message: OutgoingMessage) -> Result<(), ChannelError>;

    /// Fetch the bytes of a photo referenced by an inbound message.
    async fn download_photo(&self, photo: &PhotoRef) -> Result<Vec<u8>, ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
