use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Who authored a message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Text typed by the person using the interface.
    User,

    /// Text produced by the chatbot.
    Agent,
}

/// One entry in a conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// The author of the message.
    pub role: MessageRole,

    /// The text of the message.
    pub content: String,

    /// When the message was created.
    #[serde(with = "crate::utils::time")]
    pub timestamp: OffsetDateTime,

    /// Set while an agent response is still being assembled or displayed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub streaming: bool,
}

impl Message {
    /// Create a new, finalized `Message`.
    pub fn new(role: MessageRole, content: impl Into<String>, timestamp: OffsetDateTime) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp,
            streaming: false,
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>, timestamp: OffsetDateTime) -> Self {
        Self::new(MessageRole::User, content, timestamp)
    }

    /// Create a finalized agent message.
    pub fn agent(content: impl Into<String>, timestamp: OffsetDateTime) -> Self {
        Self::new(MessageRole::Agent, content, timestamp)
    }

    /// Create an agent message that is still streaming.
    pub fn streaming_agent(content: impl Into<String>, timestamp: OffsetDateTime) -> Self {
        Self {
            streaming: true,
            ..Self::agent(content, timestamp)
        }
    }

    /// Returns true for agent messages.
    pub fn is_agent(&self) -> bool {
        self.role == MessageRole::Agent
    }
}
