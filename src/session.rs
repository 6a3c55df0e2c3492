//! Session creation against the session collaborator.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::observability::{SESSION_FAILURES, SESSIONS_STARTED};
use crate::{ConversationSummary, Error, Result, Session, SessionGrant, SessionStart};

/// The collaborator that creates sessions and lists conversations.
///
/// [`HttpSessionService`](crate::HttpSessionService) talks to a REST backend;
/// [`MemorySessionService`](crate::memory::MemorySessionService) serves canned data.
#[async_trait::async_trait]
pub trait SessionService: Send + Sync {
    /// Create a session for an existing conversation.
    async fn create_session(&self, chatbot_id: &str, conversation_id: &str)
    -> Result<SessionGrant>;

    /// Create a session for a fresh, empty conversation.
    async fn create_new_session(&self, chatbot_id: &str) -> Result<SessionGrant>;

    /// List the conversations that belong to a chatbot.
    async fn list_conversations(&self, chatbot_id: &str) -> Result<Vec<ConversationSummary>>;
}

/// Obtains sessions for the connection manager.
///
/// Failures are reported as [`Error::SessionCreation`] and never retried here.
#[derive(Clone)]
pub struct SessionManager {
    service: Arc<dyn SessionService>,
}

impl SessionManager {
    /// Wrap a session service.
    pub fn new(service: Arc<dyn SessionService>) -> Self {
        Self { service }
    }

    /// Start a session for an existing conversation.
    pub async fn start_session(
        &self,
        conversation_id: &str,
        chatbot_id: &str,
    ) -> Result<SessionStart> {
        debug!(chatbot_id, conversation_id, "starting session");
        let grant = self
            .service
            .create_session(chatbot_id, conversation_id)
            .await
            .map_err(|err| failed("failed to start session", err))?;
        let mut start = accept(chatbot_id, grant)?;
        if start.conversation.id.is_empty() {
            start.conversation.id = conversation_id.to_string();
            start.session.conversation_id = conversation_id.to_string();
        }
        Ok(start)
    }

    /// Start a session for a new conversation; its transcript is empty.
    pub async fn start_new_session(&self, chatbot_id: &str) -> Result<SessionStart> {
        debug!(chatbot_id, "starting session for new conversation");
        let grant = self
            .service
            .create_new_session(chatbot_id)
            .await
            .map_err(|err| failed("failed to start new session", err))?;
        if grant.conversation.id.is_empty() {
            SESSION_FAILURES.click();
            return Err(Error::session_creation(
                "session service returned no conversation id",
                None,
            ));
        }
        let mut start = accept(chatbot_id, grant)?;
        start.conversation.messages.clear();
        Ok(start)
    }

    /// The chatbot's conversations, newest first.
    pub async fn list_conversations(&self, chatbot_id: &str) -> Result<Vec<ConversationSummary>> {
        let mut summaries = self
            .service
            .list_conversations(chatbot_id)
            .await
            .map_err(|err| failed("failed to list conversations", err))?;
        crate::sort_by_recency(&mut summaries);
        Ok(summaries)
    }
}

fn accept(chatbot_id: &str, grant: SessionGrant) -> Result<SessionStart> {
    if grant.session_id.trim().is_empty() {
        SESSION_FAILURES.click();
        return Err(Error::session_creation(
            "session service returned an empty session id",
            None,
        ));
    }
    SESSIONS_STARTED.click();
    Ok(SessionStart {
        session: Session {
            id: grant.session_id,
            chatbot_id: chatbot_id.to_string(),
            conversation_id: grant.conversation.id.clone(),
        },
        conversation: grant.conversation,
    })
}

fn failed(context: &str, err: Error) -> Error {
    SESSION_FAILURES.click();
    warn!(error = %err, "{context}");
    if err.is_session_creation() {
        err
    } else {
        Error::session_creation(format!("{context}: {err}"), Some(Box::new(err)))
    }
}
