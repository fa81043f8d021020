//! CLI channel — stdin/stdout REPL for local testing.
//!
//! Lines are sent as text messages from a single local user. `photo <path>`
//! submits a local image file, and a bare number presses the matching button
//! of the last keyboard shown.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

use crate::channels::{
    Channel, IncomingMessage, Keyboard, MessageStream, OutgoingMessage, PhotoRef,
};
use crate::error::ChannelError;

/// User and chat id of the local CLI user.
pub const CLI_USER_ID: i64 = 1;

/// A simple CLI channel that reads from stdin and writes to stdout.
#[derive(Default)]
pub struct CliChannel {
    /// Labels of the keyboard currently shown, in display order.
    buttons: Arc<Mutex<Vec<String>>>,
}

impl CliChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Turn one input line into a message, resolving button numbers and the
/// `photo` prefix.
fn parse_line(line: &str, buttons: &[String]) -> IncomingMessage {
    let msg = IncomingMessage::new("cli", CLI_USER_ID, CLI_USER_ID).with_user_name("local-user");

    if let Some(path) = line.strip_prefix("photo ") {
        return msg.with_photo(PhotoRef::new(path.trim()));
    }

    let pressed = line
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| buttons.get(i));
    match pressed {
        Some(label) => msg.with_text(label.clone()),
        None => msg.with_text(line),
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let buttons = Arc::clone(&self.buttons);

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            // Print prompt
            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        let msg = parse_line(&line, &buttons.lock().await);
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send(&self, _chat_id: i64, message: OutgoingMessage) -> Result<(), ChannelError> {
        println!("\n{}", message.text);
        match message.keyboard {
            Keyboard::Buttons(rows) => {
                let labels: Vec<String> = rows.into_iter().flatten().collect();
                for (i, label) in labels.iter().enumerate() {
                    println!("  [{}] {}", i + 1, label);
                }
                *self.buttons.lock().await = labels;
            }
            Keyboard::Remove => self.buttons.lock().await.clear(),
            Keyboard::Unchanged => {}
        }
        println!();
        eprint!("> ");
        Ok(())
    }

    async fn download_photo(&self, photo: &PhotoRef) -> Result<Vec<u8>, ChannelError> {
        tokio::fs::read(&photo.file_id)
            .await
            .map_err(|e| ChannelError::DownloadFailed {
                name: "cli".into(),
                reason: format!("{}: {e}", photo.file_id),
            })
    }
}
