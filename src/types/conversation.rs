use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::Message;

/// A history-index entry for one conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationSummary {
    /// Conversation identifier.
    pub id: String,

    /// Display title.
    pub title: String,

    /// When the conversation was created.
    #[serde(with = "crate::utils::time")]
    pub created_at: OffsetDateTime,

    /// The user who owns the conversation.
    pub user_id: String,

    /// The chatbot the conversation belongs to.
    pub chatbot_id: String,
}

/// A full conversation as delivered by the session collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    /// Conversation identifier.
    pub id: String,

    /// Messages in chronological order.
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Create a conversation with no messages.
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
        }
    }

    /// Create a conversation from existing messages.
    pub fn with_messages(id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            id: id.into(),
            messages,
        }
    }
}

/// Orders summaries newest first, breaking ties by id so the order is stable.
pub fn sort_by_recency(summaries: &mut [ConversationSummary]) {
    summaries.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn summary(id: &str, created_at: OffsetDateTime) -> ConversationSummary {
        ConversationSummary {
            id: id.to_string(),
            title: id.to_uppercase(),
            created_at,
            user_id: "u1".to_string(),
            chatbot_id: "bot1".to_string(),
        }
    }

    #[test]
    fn recency_order() {
        let mut summaries = vec![
            summary("old", datetime!(2023-01-01 0:00 UTC)),
            summary("new", datetime!(2024-06-01 0:00 UTC)),
            summary("b", datetime!(2024-01-01 0:00 UTC)),
            summary("a", datetime!(2024-01-01 0:00 UTC)),
        ];
        sort_by_recency(&mut summaries);
        let ids: Vec<_> = summaries.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "a", "b", "old"]);
    }

    #[test]
    fn summary_wire_format() {
        let summary: ConversationSummary = serde_json::from_str(
            r#"{"id":"c1","title":"Billing","created_at":"2024-01-01T00:00:00Z","user_id":"u1","chatbot_id":"bot1"}"#,
        )
        .unwrap();
        assert_eq!(summary.created_at, datetime!(2024-01-01 0:00 UTC));
        assert_eq!(summary.title, "Billing");
    }
}
