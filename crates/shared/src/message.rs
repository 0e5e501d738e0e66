//! Chat message types shared between the session logic and front ends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Bot => "bot",
        }
    }

    /// Speaker label used when a conversation is flattened into a transcript
    pub fn transcript_label(&self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Bot => "Assistant",
        }
    }
}

/// Whether a message came from a user-driven exchange or the proactive loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageOrigin {
    #[default]
    Normal,
    Proactive,
}

/// One entry in the conversation log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub origin: MessageOrigin,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into(), MessageOrigin::Normal)
    }

    pub fn bot(content: impl Into<String>) -> Self {
        Self::new(Role::Bot, content.into(), MessageOrigin::Normal)
    }

    /// Bot message produced by the proactive analysis loop
    pub fn proactive(content: impl Into<String>) -> Self {
        Self::new(Role::Bot, content.into(), MessageOrigin::Proactive)
    }

    fn new(role: Role, content: String, origin: MessageOrigin) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            origin,
            timestamp: Utc::now(),
        }
    }

    pub fn is_proactive(&self) -> bool {
        self.origin == MessageOrigin::Proactive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_tag_role_and_origin() {
        let msg = ChatMessage::proactive("Try `git stash` first");
        assert_eq!(msg.role, Role::Bot);
        assert!(msg.is_proactive());

        let msg = ChatMessage::user("list my files");
        assert_eq!(msg.role, Role::User);
        assert!(!msg.is_proactive());
    }

    #[test]
    fn test_origin_defaults_to_normal_when_missing() {
        let json = r#"{
            "id": "00000000-0000-0000-0000-000000000000",
            "role": "bot",
            "content": "hi",
            "timestamp": "2024-01-01T00:00:00Z"
        }"#;
        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.origin, MessageOrigin::Normal);
        assert_eq!(msg.role.transcript_label(), "Assistant");
    }
}
