//! Conversation log shared by manual and proactive paths.

use shared::events::SessionEvent;
use shared::message::ChatMessage;
use tokio::sync::mpsc::UnboundedSender;

/// Ordered, append-only message log
#[derive(Default)]
pub struct ConversationState {
    messages: Vec<ChatMessage>,
    event_sender: Option<UnboundedSender<SessionEvent>>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a conversation with a bot greeting already in place
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::bot(greeting)],
            event_sender: None,
        }
    }

    /// Forward every appended message to a front end
    pub fn set_event_sender(&mut self, sender: UnboundedSender<SessionEvent>) {
        self.event_sender = Some(sender);
    }

    pub fn append(&mut self, message: ChatMessage) {
        if let Some(tx) = &self.event_sender {
            // A closed receiver only means nobody is rendering
            let _ = tx.send(SessionEvent::MessageAppended(message.clone()));
        }
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Flatten the log into `You: ...` / `Assistant: ...` lines
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.role.transcript_label(), m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
