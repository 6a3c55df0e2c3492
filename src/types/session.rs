use serde::{Deserialize, Serialize};

use crate::types::Conversation;

/// A capability for opening exactly one streaming connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    /// Identifier used to address the streaming endpoint.
    pub id: String,

    /// The chatbot the session talks to.
    pub chatbot_id: String,

    /// The conversation the session was opened for.
    pub conversation_id: String,
}

/// What the session collaborator hands back for a session request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionGrant {
    /// The new session identifier.
    pub session_id: String,

    /// The conversation's full transcript.
    pub conversation: Conversation,
}

/// A started session together with the transcript to install.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStart {
    /// The session to connect with.
    pub session: Session,

    /// The transcript of the conversation the session belongs to.
    pub conversation: Conversation,
}
