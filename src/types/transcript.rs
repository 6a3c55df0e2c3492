use time::OffsetDateTime;

use crate::types::{Conversation, Message};

/// The agent response currently being assembled.
#[derive(Debug, Clone, PartialEq)]
struct PendingMessage {
    message: Message,
    /// Set once a completion frame has supplied the authoritative text.
    message_id: Option<String>,
}

/// The resident transcript of the open conversation.
///
/// Finalized messages are kept apart from the single in-progress agent message, which
/// always reads as the tail of the transcript. This makes "at most one streaming
/// message, and only at the end" a property of the type instead of a convention.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    conversation_id: String,
    messages: Vec<Message>,
    pending: Option<PendingMessage>,
}

impl Transcript {
    /// Create an empty transcript for a conversation.
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            messages: Vec::new(),
            pending: None,
        }
    }

    /// The conversation this transcript belongs to.
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// All messages in order, the in-progress agent message last.
    pub fn messages(&self) -> impl Iterator<Item = &Message> + '_ {
        self.messages
            .iter()
            .chain(self.pending.as_ref().map(|p| &p.message))
    }

    /// Owned copy of [`Transcript::messages`].
    pub fn to_vec(&self) -> Vec<Message> {
        self.messages().cloned().collect()
    }

    /// Number of messages, including the in-progress one.
    pub fn len(&self) -> usize {
        self.messages.len() + usize::from(self.pending.is_some())
    }

    /// Returns true when there are no messages at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The tail message.
    pub fn last(&self) -> Option<&Message> {
        self.pending
            .as_ref()
            .map(|p| &p.message)
            .or_else(|| self.messages.last())
    }

    /// The in-progress agent message, if any.
    pub fn streaming(&self) -> Option<&Message> {
        self.pending.as_ref().map(|p| &p.message)
    }

    /// The server id of the in-progress message once its completion frame arrived.
    pub fn completed_message_id(&self) -> Option<&str> {
        self.pending.as_ref().and_then(|p| p.message_id.as_deref())
    }

    /// Append a user message, finalizing any in-progress agent message first.
    pub fn push_user(&mut self, content: impl Into<String>, timestamp: OffsetDateTime) {
        self.finalize_streaming();
        self.messages.push(Message::user(content, timestamp));
    }

    /// Append a chunk to the in-progress agent message, starting one if needed.
    ///
    /// A chunk that arrives after the in-progress message was completed belongs to a
    /// new response; the completed message is finalized and a new one is started. This
    /// holds even while the completed message still carries its streaming marker: a
    /// completed message's content is final and never receives further chunks.
    pub fn append_chunk(&mut self, chunk: &str, now: OffsetDateTime) {
        if self
            .pending
            .as_ref()
            .is_some_and(|p| p.message_id.is_some())
        {
            self.finalize_streaming();
        }
        match &mut self.pending {
            Some(pending) => pending.message.content.push_str(chunk),
            None => {
                self.pending = Some(PendingMessage {
                    message: Message::streaming_agent(chunk, now),
                    message_id: None,
                });
            }
        }
    }

    /// Replace the in-progress message's content and timestamp with the final values.
    ///
    /// The streaming marker stays set until [`Transcript::finalize_streaming`].
    pub fn complete_streaming(
        &mut self,
        message_id: impl Into<String>,
        full_text: impl Into<String>,
        timestamp: OffsetDateTime,
    ) {
        let message_id = Some(message_id.into());
        match &mut self.pending {
            Some(pending) if pending.message_id.is_none() => {
                pending.message.content = full_text.into();
                pending.message.timestamp = timestamp;
                pending.message_id = message_id;
            }
            _ => {
                self.finalize_streaming();
                self.pending = Some(PendingMessage {
                    message: Message::streaming_agent(full_text, timestamp),
                    message_id,
                });
            }
        }
    }

    /// Clear the streaming marker on the tail message, moving it into history.
    ///
    /// Returns false when there was no in-progress message.
    pub fn finalize_streaming(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                let mut message = pending.message;
                message.streaming = false;
                self.messages.push(message);
                true
            }
            None => false,
        }
    }
}

impl From<Conversation> for Transcript {
    fn from(conversation: Conversation) -> Self {
        let messages = conversation
            .messages
            .into_iter()
            .map(|mut message| {
                message.streaming = false;
                message
            })
            .collect();
        Self {
            conversation_id: conversation.id,
            messages,
            pending: None,
        }
    }
}
