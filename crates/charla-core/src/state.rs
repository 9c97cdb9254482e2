//! UI-agnostic conversation types
//!
//! These are shared by the controller, the store, and any front-end that
//! renders the conversation.

use serde::{Deserialize, Serialize};

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Bot => "bot",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Sender::User),
            "bot" => Some(Sender::Bot),
            _ => None,
        }
    }
}

/// A single chat message.
///
/// `id` is `None` until the store has written the message and reported the
/// id it assigned. Sender and text never change after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Option<i64>,
    pub sender: Sender,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: None,
            sender: Sender::User,
            text: text.into(),
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            id: None,
            sender: Sender::Bot,
            text: text.into(),
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_round_trips_through_str() {
        for sender in [Sender::User, Sender::Bot] {
            assert_eq!(Sender::from_str(sender.as_str()), Some(sender));
        }
        assert_eq!(Sender::from_str("assistant"), None);
    }

    #[test]
    fn test_new_messages_are_not_persisted() {
        let msg = Message::user("hi");
        assert!(!msg.is_persisted());
        assert_eq!(msg.sender, Sender::User);
        assert_eq!(Message::bot("hello").sender, Sender::Bot);
    }
}
