//! Control labels, reply keyboards and inbound text classification.

use std::sync::LazyLock;

use regex::Regex;

use crate::channels::Keyboard;

/// A reply-keyboard button. Labels must round-trip byte-identical through
/// the messaging gateway, since inbound text is matched against them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Start,
    Cancel,
    No,
    Yes,
}

impl Button {
    pub const ALL: [Button; 4] = [Button::Start, Button::Cancel, Button::No, Button::Yes];

    /// The exact label shown on the keyboard.
    pub fn label(&self) -> &'static str {
        match self {
            // The "С" in "Сancel" is Cyrillic; clients echo it back as-is.
            Self::Start => "✍️Start",
            Self::Cancel => "🏁Сancel processing",
            Self::No => "❌No",
            Self::Yes => "✅Yes",
        }
    }

    /// Match inbound text against the known labels.
    pub fn from_label(text: &str) -> Option<Button> {
        Self::ALL.into_iter().find(|b| b.label() == text)
    }
}

impl std::fmt::Display for Button {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Main menu: a single Start button.
pub fn main_menu() -> Keyboard {
    Keyboard::rows([[Button::Start]])
}

/// Shown while a document upload is pending.
pub fn cancel_only() -> Keyboard {
    Keyboard::rows([[Button::Cancel]])
}

/// Shown when the user must confirm the extracted data.
pub fn confirmation() -> Keyboard {
    Keyboard::Buttons(vec![
        vec![Button::Cancel.label().to_string()],
        vec![Button::No.label().to_string(), Button::Yes.label().to_string()],
    ])
}

static CONTROL_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\p{So}\p{Sm}\p{Sk}\x{200B}]").expect("control prefix pattern is valid")
});

/// How an inbound text should be routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Slash-prefixed text, e.g. `/start`.
    Command,
    /// Emoji- or symbol-prefixed text, i.e. a reply-keyboard press.
    Control,
    /// Anything else.
    Plain,
}

/// Classify inbound text.
pub fn classify(text: &str) -> InputKind {
    if text.starts_with('/') {
        InputKind::Command
    } else if CONTROL_PREFIX.is_match(text) {
        InputKind::Control
    } else {
        InputKind::Plain
    }
}
