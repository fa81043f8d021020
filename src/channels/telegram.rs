//! Telegram channel — long-polls the Bot API for updates.
//!
//! Native Rust Telegram Bot API implementation: text and photo messages in,
//! text with reply keyboards out, photo download via `getFile`.

use async_trait::async_trait;
use serde_json::Value;

use crate::channels::{
    Channel, IncomingMessage, Keyboard, MessageStream, OutgoingMessage, PhotoRef,
};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API, in characters.
const TELEGRAM_MAX_MESSAGE_CHARS: usize = 4096;

/// Long-poll timeout for getUpdates, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Telegram channel — connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: String,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: String, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "https://api.telegram.org/file/bot{}/{file_path}",
            self.bot_token
        )
    }

    /// Send a reply, one `sendMessage` call per chunk.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<(), ChannelError> {
        for (chunk, markup) in outgoing_chunks(text, keyboard) {
            self.send_message_chunk(chat_id, &chunk, markup.as_ref())
                .await?;
        }
        Ok(())
    }

    /// Send a single message chunk, Markdown-first with plain text fallback.
    async fn send_message_chunk(
        &self,
        chat_id: i64,
        text: &str,
        markup: Option<&Value>,
    ) -> Result<(), ChannelError> {
        let mut markdown_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });
        if let Some(markup) = markup {
            markdown_body["reply_markup"] = markup.clone();
        }

        let markdown_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&markdown_body)
            .send()
            .await
            .map_err(|e| send_failed(e.to_string()))?;

        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            chat_id,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let mut plain_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(markup) = markup {
            plain_body["reply_markup"] = markup.clone();
        }
        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&plain_body)
            .send()
            .await
            .map_err(|e| send_failed(e.to_string()))?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(send_failed(format!(
                "sendMessage failed (markdown: {markdown_status}, plain: {plain_err})"
            )));
        }

        Ok(())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let updates_url = self.api_url("getUpdates");
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message"]
                });

                let resp = match client.post(&updates_url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    continue;
                };

                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(incoming) = parse_update(update, &allowed_users) else {
                        continue;
                    };

                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send(&self, chat_id: i64, message: OutgoingMessage) -> Result<(), ChannelError> {
        self.send_message(chat_id, &message.text, &message.keyboard)
            .await
    }

    async fn download_photo(&self, photo: &PhotoRef) -> Result<Vec<u8>, ChannelError> {
        let resp = self
            .client
            .post(self.api_url("getFile"))
            .json(&serde_json::json!({ "file_id": photo.file_id }))
            .send()
            .await
            .map_err(|e| download_failed(e.to_string()))?;

        let data: Value = resp
            .json()
            .await
            .map_err(|e| download_failed(e.to_string()))?;
        let file_path = data
            .get("result")
            .and_then(|r| r.get("file_path"))
            .and_then(Value::as_str)
            .ok_or_else(|| download_failed(format!("getFile returned no file_path: {data}")))?;

        let file_resp = self
            .client
            .get(self.file_url(file_path))
            .send()
            .await
            .map_err(|e| download_failed(e.to_string()))?;
        if !file_resp.status().is_success() {
            return Err(download_failed(format!(
                "file download returned {}",
                file_resp.status()
            )));
        }

        let bytes = file_resp
            .bytes()
            .await
            .map_err(|e| download_failed(e.to_string()))?;
        tracing::debug!(file_id = %photo.file_id, size = bytes.len(), "Telegram photo downloaded");
        Ok(bytes.to_vec())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn send_failed(reason: String) -> ChannelError {
    ChannelError::SendFailed {
        name: "telegram".into(),
        reason,
    }
}

fn download_failed(reason: String) -> ChannelError {
    ChannelError::DownloadFailed {
        name: "telegram".into(),
        reason,
    }
}

/// Turn one `getUpdates` entry into an inbound message.
///
/// Returns `None` for non-message updates, messages without text or photo,
/// and senders outside the allowlist.
fn parse_update(update: &Value, allowed_users: &[String]) -> Option<IncomingMessage> {
    let message = update.get("message")?;

    let text = message
        .get("text")
        .or_else(|| message.get("caption"))
        .and_then(Value::as_str);
    // Sizes are listed smallest first; keep the largest.
    let photo = message
        .get("photo")
        .and_then(Value::as_array)
        .and_then(|sizes| sizes.last())
        .and_then(|p| p.get("file_id"))
        .and_then(Value::as_str);

    if text.is_none() && photo.is_none() {
        return None;
    }

    let from = message.get("from");
    let username = from
        .and_then(|f| f.get("username"))
        .and_then(Value::as_str);
    let user_id = from.and_then(|f| f.get("id")).and_then(Value::as_i64)?;

    if !sender_allowed(allowed_users, username, user_id) {
        tracing::warn!(
            user_id,
            username = username.unwrap_or("-"),
            "Telegram: ignoring message from unauthorized user"
        );
        return None;
    }

    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)
        .unwrap_or(user_id);

    let first_name = from
        .and_then(|f| f.get("first_name"))
        .and_then(Value::as_str)
        .or(username)
        .unwrap_or("unknown");

    let mut incoming = IncomingMessage::new("telegram", user_id, chat_id)
        .with_user_name(first_name)
        .with_metadata(serde_json::json!({ "username": username }));
    if let Some(text) = text {
        incoming = incoming.with_text(text);
    }
    if let Some(file_id) = photo {
        incoming = incoming.with_photo(PhotoRef::new(file_id));
    }
    Some(incoming)
}

/// Bot API `reply_markup` for a keyboard, or `None` to leave it untouched.
fn reply_markup(keyboard: &Keyboard) -> Option<Value> {
    match keyboard {
        Keyboard::Unchanged => None,
        Keyboard::Remove => Some(serde_json::json!({ "remove_keyboard": true })),
        Keyboard::Buttons(rows) => {
            let rows: Vec<Vec<Value>> = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|label| serde_json::json!({ "text": label }))
                        .collect()
                })
                .collect();
            Some(serde_json::json!({ "keyboard": rows, "resize_keyboard": true }))
        }
    }
}

/// Whether the sender is on the allowlist, by username or numeric id.
/// A `*` entry admits everyone; a sender without a username can only match
/// by id.
fn sender_allowed(allowed_users: &[String], username: Option<&str>, user_id: i64) -> bool {
    let user_id = user_id.to_string();
    allowed_users
        .iter()
        .any(|entry| entry == "*" || *entry == user_id || Some(entry.as_str()) == username)
}

/// Chunks of a reply ready for `sendMessage`. The keyboard markup rides on
/// the last chunk so it shows up under the final piece of text.
fn outgoing_chunks(text: &str, keyboard: &Keyboard) -> Vec<(String, Option<Value>)> {
    let mut chunks: Vec<(String, Option<Value>)> =
        chunk_reply(text, TELEGRAM_MAX_MESSAGE_CHARS)
            .into_iter()
            .map(|chunk| (chunk, None))
            .collect();
    if let Some(last) = chunks.last_mut() {
        last.1 = reply_markup(keyboard);
    }
    chunks
}

/// Split a reply into pieces of at most `max_chars` characters. Cuts on a
/// blank line when the window has one, else on a line break, else on a
/// space, else mid-word.
fn chunk_reply(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;
    // `limit` is the byte offset of the first character past the window.
    while let Some((limit, _)) = rest.char_indices().nth(max_chars) {
        let window = &rest[..limit];
        let cut = ["\n\n", "\n", " "]
            .iter()
            .filter_map(|sep| window.rfind(sep))
            .find(|&at| at > 0)
            .unwrap_or(limit);
        let piece = window[..cut].trim_end();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }
        rest = rest[cut..].trim_start();
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
