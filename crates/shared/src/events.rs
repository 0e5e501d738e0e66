//! Event types a session emits for front ends.

use serde::{Deserialize, Serialize};

use crate::message::ChatMessage;

/// Session event for real-time rendering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// A message was appended to the conversation
    MessageAppended(ChatMessage),
    /// The model suggested a runnable command
    CommandSuggested { command: String },
    /// Capture session started or stopped
    CaptureChanged { active: bool },
    /// Autonomous mode flag flipped
    AutonomousChanged { enabled: bool },
}

impl SessionEvent {
    pub fn message(&self) -> Option<&ChatMessage> {
        match self {
            SessionEvent::MessageAppended(msg) => Some(msg),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_accessor() {
        let event = SessionEvent::MessageAppended(ChatMessage::bot("hello"));
        assert_eq!(event.message().map(|m| m.content.as_str()), Some("hello"));

        let event = SessionEvent::CaptureChanged { active: true };
        assert!(event.message().is_none());
    }
}
