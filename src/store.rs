//! The conversation store.
//!
//! [`ConversationStore`] is the single owner of client-side chat state: the loaded
//! chatbot, its conversation index, the resident transcript, the current session, the
//! thinking flag, and the live connection. Interfaces drive it through intent methods
//! (`set_loaded_chatbot`, `open_conversation`, `send_message`, ...) and feed it
//! connection events through [`ConversationStore::next_event`].
//!
//! All state sits behind one lock that is never held across an `.await`. The two
//! suspension points, session creation and transport open, are fenced by an epoch:
//! every chatbot switch, reset, disconnect, and newer open bumps it, and a result that
//! comes back under an older epoch is discarded with [`Error::Superseded`].

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::aggregator::{Applied, StreamAggregator};
use crate::connection::{
    ConnectionConfig, ConnectionEvent, ConnectionEventKind, ConnectionEvents, ConnectionManager,
    ConnectionState,
};
use crate::credentials::CredentialProvider;
use crate::notify::{ErrorSink, Severity};
use crate::observability::{CONNECTIONS_CLOSED_REMOTELY, STALE_EVENTS, STALE_RESULTS};
use crate::session::{SessionManager, SessionService};
use crate::transport::Connector;
use crate::{
    ConversationSummary, Error, InboundFrame, LoadedChatbot, Message, OutboundFrame, Result,
    Session, SessionStart, Transcript,
};

/// Store behavior switches.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// Clear the streaming marker as soon as a completion frame is applied instead of
    /// waiting for [`ConversationStore::mark_streaming_complete`].
    pub finalize_on_complete: bool,
}

impl StoreConfig {
    /// Creates a StoreConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether completion frames finalize the streaming message.
    pub fn with_finalize_on_complete(mut self, finalize: bool) -> Self {
        self.finalize_on_complete = finalize;
        self
    }
}

/// The observable effect of one connection event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreUpdate {
    /// Text was appended to the streaming agent message.
    Chunk {
        /// The appended text.
        text: String,
    },
    /// The agent response finished and thinking was cleared.
    Completed {
        /// Server id of the finished message.
        message_id: String,
    },
    /// Something was reported to the error sink.
    Reported {
        /// How bad it was.
        severity: Severity,
        /// What was reported.
        message: String,
    },
    /// The live connection ended.
    Disconnected {
        /// Why, if known.
        reason: Option<String>,
    },
    /// The event was stale or not understood.
    Ignored,
}

/// A consistent copy of the store's observable state.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    /// The loaded chatbot.
    pub chatbot: Option<LoadedChatbot>,
    /// The chatbot's conversations, newest first.
    pub history: Vec<ConversationSummary>,
    /// The resident transcript.
    pub transcript: Option<Transcript>,
    /// The current session.
    pub session: Option<Session>,
    /// Whether an agent response is pending.
    pub thinking: bool,
    /// State of the live connection.
    pub connection: ConnectionState,
}

#[derive(Debug, Default)]
struct StoreState {
    chatbot: Option<LoadedChatbot>,
    history: Vec<ConversationSummary>,
    transcript: Option<Transcript>,
    session: Option<Session>,
    thinking: bool,
    epoch: u64,
    chatbot_epoch: u64,
}

impl StoreState {
    fn clear_conversation(&mut self) {
        self.transcript = None;
        self.session = None;
        self.thinking = false;
    }
}

/// The authoritative client-side chat state.
pub struct ConversationStore {
    state: Mutex<StoreState>,
    connection: ConnectionManager,
    events: tokio::sync::Mutex<ConnectionEvents>,
    sessions: SessionManager,
    aggregator: StreamAggregator,
    sink: Arc<dyn ErrorSink>,
    config: StoreConfig,
}

impl ConversationStore {
    /// Create a store with default connection and store configuration.
    pub fn new(
        service: Arc<dyn SessionService>,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialProvider>,
        sink: Arc<dyn ErrorSink>,
    ) -> Self {
        Self::with_config(
            service,
            connector,
            credentials,
            sink,
            ConnectionConfig::default(),
            StoreConfig::default(),
        )
    }

    /// Create a store.
    pub fn with_config(
        service: Arc<dyn SessionService>,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialProvider>,
        sink: Arc<dyn ErrorSink>,
        connection_config: ConnectionConfig,
        config: StoreConfig,
    ) -> Self {
        let (connection, events) =
            ConnectionManager::new(connector, credentials, connection_config);
        Self {
            state: Mutex::new(StoreState::default()),
            connection,
            events: tokio::sync::Mutex::new(events),
            sessions: SessionManager::new(service),
            aggregator: StreamAggregator::new(),
            sink,
            config,
        }
    }

    /// The store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    ////////////////////////////////////////// intents //////////////////////////////////////////

    /// Replace the loaded chatbot.
    ///
    /// The live connection is closed and history, transcript, session, and thinking
    /// are cleared in one step; nobody observes the new chatbot next to the old
    /// chatbot's conversation. Pending opens and history refreshes are superseded.
    pub fn set_loaded_chatbot(&self, chatbot: LoadedChatbot) {
        let mut state = self.state.lock();
        self.connection.disconnect();
        state.epoch += 1;
        state.chatbot_epoch += 1;
        info!(chatbot_id = %chatbot.id, "loaded chatbot");
        state.chatbot = Some(chatbot);
        state.history.clear();
        state.clear_conversation();
    }

    /// Open an existing conversation of the loaded chatbot.
    ///
    /// Obtains a session, installs the conversation's transcript, and connects.
    /// Returns the session on success.
    pub async fn open_conversation(&self, conversation_id: &str) -> Result<Session> {
        let (epoch, chatbot_id) = self.begin_open()?;
        info!(chatbot_id = %chatbot_id, conversation_id, "opening conversation");
        let start = self
            .sessions
            .start_session(conversation_id, &chatbot_id)
            .await;
        self.finish_open(epoch, start).await
    }

    /// Open a fresh conversation of the loaded chatbot with an empty transcript.
    pub async fn open_new_conversation(&self) -> Result<Session> {
        let (epoch, chatbot_id) = self.begin_open()?;
        info!(chatbot_id = %chatbot_id, "opening new conversation");
        let start = self.sessions.start_new_session(&chatbot_id).await;
        self.finish_open(epoch, start).await
    }

    /// Send a user message on the live connection.
    ///
    /// Blank text and a connection that is not open are rejected without touching any
    /// state. Otherwise the message is appended to the transcript and thinking is set
    /// before the frame is written; the echo stays even when the write fails.
    pub fn send_message(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(Error::validation("message text is blank"));
        }
        let mut state = self.state.lock();
        if !self.connection.is_open() {
            return Err(Error::not_connected("no open connection to send on"));
        }
        let Some(transcript) = state.transcript.as_mut() else {
            return Err(Error::not_connected("no conversation is open"));
        };
        let now = crate::utils::time::now();
        transcript.push_user(text, now);
        state.thinking = true;
        if let Err(err) = self.connection.send(&OutboundFrame::new(text, now)) {
            state.thinking = false;
            return Err(err);
        }
        Ok(())
    }

    /// Clear the streaming marker on the tail message.
    ///
    /// Returns false, and changes nothing, when no message is streaming.
    pub fn mark_streaming_complete(&self) -> bool {
        let mut state = self.state.lock();
        state
            .transcript
            .as_mut()
            .is_some_and(Transcript::finalize_streaming)
    }

    /// Fetch the loaded chatbot's conversation index.
    ///
    /// The result is installed only if the chatbot was not replaced meanwhile.
    pub async fn refresh_history(&self) -> Result<Vec<ConversationSummary>> {
        let (chatbot_epoch, chatbot_id) = {
            let state = self.state.lock();
            let chatbot = state
                .chatbot
                .as_ref()
                .ok_or_else(|| Error::validation("no chatbot is loaded"))?;
            (state.chatbot_epoch, chatbot.id.clone())
        };
        let summaries = self.sessions.list_conversations(&chatbot_id).await?;
        let mut state = self.state.lock();
        if state.chatbot_epoch != chatbot_epoch {
            STALE_RESULTS.click();
            debug!(chatbot_id = %chatbot_id, "discarding history of replaced chatbot");
            return Err(Error::superseded("chatbot changed while listing conversations"));
        }
        state.history = summaries.clone();
        Ok(summaries)
    }

    /// Close the live connection. The transcript stays visible; thinking is cleared.
    pub fn disconnect(&self) {
        let mut state = self.state.lock();
        self.connection.disconnect();
        state.epoch += 1;
        state.session = None;
        state.thinking = false;
    }

    /// Disconnect and clear everything, including the loaded chatbot. Idempotent.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        self.connection.disconnect();
        state.epoch += 1;
        state.chatbot_epoch += 1;
        state.chatbot = None;
        state.history.clear();
        state.clear_conversation();
        debug!("store reset");
    }

    /////////////////////////////////////////// events ///////////////////////////////////////////

    /// Wait for the next connection event and apply it.
    pub async fn next_event(&self) -> Option<StoreUpdate> {
        let event = {
            let mut events = self.events.lock().await;
            events.recv().await?
        };
        Some(self.handle_event(event))
    }

    /// Apply every event that is already queued.
    ///
    /// Returns nothing when another task is inside [`ConversationStore::next_event`].
    pub fn drain_events(&self) -> Vec<StoreUpdate> {
        let Ok(mut events) = self.events.try_lock() else {
            return Vec::new();
        };
        let mut updates = Vec::new();
        while let Some(event) = events.try_recv() {
            updates.push(self.handle_event(event));
        }
        updates
    }

    /// Apply one connection event.
    ///
    /// Events from any connection other than the current one are ignored. Server error
    /// frames and connection loss are reported to the error sink; neither panics nor
    /// returns an error.
    pub fn handle_event(&self, event: ConnectionEvent) -> StoreUpdate {
        let (update, report) = self.apply_event(event);
        if let Some((severity, message)) = report {
            self.sink.report(severity, &message);
        }
        update
    }

    fn apply_event(&self, event: ConnectionEvent) -> (StoreUpdate, Option<(Severity, String)>) {
        let mut guard = self.state.lock();
        let generation = event.generation;
        if generation != self.connection.generation() {
            STALE_EVENTS.click();
            debug!(generation, "ignoring event from superseded connection");
            return (StoreUpdate::Ignored, None);
        }
        let state = &mut *guard;
        match event.kind {
            ConnectionEventKind::Frame(frame) => {
                let applied = match state.transcript.as_mut() {
                    Some(transcript) => self.aggregator.apply(transcript, frame),
                    None => match frame {
                        InboundFrame::Error(error) => Applied::Error(error.message),
                        frame => {
                            debug!(kind = frame.kind(), "no transcript for frame");
                            Applied::Dropped
                        }
                    },
                };
                match applied {
                    Applied::Chunk(text) => (StoreUpdate::Chunk { text }, None),
                    Applied::Completed { message_id } => {
                        state.thinking = false;
                        if self.config.finalize_on_complete {
                            if let Some(transcript) = state.transcript.as_mut() {
                                transcript.finalize_streaming();
                            }
                        }
                        (StoreUpdate::Completed { message_id }, None)
                    }
                    Applied::Error(message) => reported(Severity::Error, message),
                    Applied::Dropped => (StoreUpdate::Ignored, None),
                }
            }
            ConnectionEventKind::Closed { reason } => {
                if !self.connection.mark_closed(generation) {
                    return (StoreUpdate::Ignored, None);
                }
                CONNECTIONS_CLOSED_REMOTELY.click();
                state.thinking = false;
                info!(generation, ?reason, "connection closed by server");
                let message = match &reason {
                    Some(reason) => format!("connection closed by server: {reason}"),
                    None => "connection closed by server".to_string(),
                };
                (
                    StoreUpdate::Disconnected { reason },
                    Some((Severity::Warning, message)),
                )
            }
            ConnectionEventKind::Failed(err) => {
                if !self.connection.mark_closed(generation) {
                    return (StoreUpdate::Ignored, None);
                }
                state.thinking = false;
                let message = err.to_string();
                (
                    StoreUpdate::Disconnected {
                        reason: Some(message.clone()),
                    },
                    Some((Severity::Error, message)),
                )
            }
        }
    }

    ////////////////////////////////////////// accessors //////////////////////////////////////////

    /// The loaded chatbot.
    pub fn chatbot(&self) -> Option<LoadedChatbot> {
        self.state.lock().chatbot.clone()
    }

    /// The loaded chatbot's conversations, newest first.
    pub fn history(&self) -> Vec<ConversationSummary> {
        self.state.lock().history.clone()
    }

    /// The resident transcript.
    pub fn transcript(&self) -> Option<Transcript> {
        self.state.lock().transcript.clone()
    }

    /// The resident transcript's messages; empty when none is resident.
    pub fn messages(&self) -> Vec<Message> {
        self.state
            .lock()
            .transcript
            .as_ref()
            .map(Transcript::to_vec)
            .unwrap_or_default()
    }

    /// The current session.
    pub fn session(&self) -> Option<Session> {
        self.state.lock().session.clone()
    }

    /// Whether an agent response is pending.
    pub fn is_thinking(&self) -> bool {
        self.state.lock().thinking
    }

    /// State of the live connection.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// A consistent copy of all observable state.
    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.lock();
        StoreSnapshot {
            chatbot: state.chatbot.clone(),
            history: state.history.clone(),
            transcript: state.transcript.clone(),
            session: state.session.clone(),
            thinking: state.thinking,
            connection: self.connection.state(),
        }
    }

    /////////////////////////////////////////// opening ///////////////////////////////////////////

    fn begin_open(&self) -> Result<(u64, String)> {
        let mut state = self.state.lock();
        let chatbot_id = state
            .chatbot
            .as_ref()
            .map(|chatbot| chatbot.id.clone())
            .ok_or_else(|| Error::validation("no chatbot is loaded"))?;
        self.connection.disconnect();
        state.epoch += 1;
        state.clear_conversation();
        Ok((state.epoch, chatbot_id))
    }

    async fn finish_open(&self, epoch: u64, start: Result<SessionStart>) -> Result<Session> {
        let attempt = {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                STALE_RESULTS.click();
                debug!(epoch, "discarding superseded session");
                return Err(Error::superseded("conversation open was superseded"));
            }
            let SessionStart {
                session,
                conversation,
            } = start?;
            state.transcript = Some(Transcript::from(conversation));
            let attempt = self.connection.begin_connect(&session.id)?;
            state.session = Some(session.clone());
            (attempt, session)
        };
        let (attempt, session) = attempt;
        let generation = match self.connection.finish_connect(attempt).await {
            Ok(generation) => generation,
            Err(err) => {
                let mut state = self.state.lock();
                if state.epoch == epoch {
                    state.session = None;
                }
                return Err(err);
            }
        };

        let state = self.state.lock();
        if state.epoch != epoch {
            self.connection.close_generation(generation);
            STALE_RESULTS.click();
            debug!(epoch, generation, "closing connection opened for superseded request");
            return Err(Error::superseded("conversation open was superseded"));
        }
        info!(
            session_id = %session.id,
            conversation_id = %session.conversation_id,
            generation,
            "conversation open"
        );
        Ok(session)
    }
}

fn reported(severity: Severity, message: String) -> (StoreUpdate, Option<(Severity, String)>) {
    (
        StoreUpdate::Reported {
            severity,
            message: message.clone(),
        },
        Some((severity, message)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticToken;
    use crate::memory::{MemoryConnector, MemorySessionService};
    use crate::notify::CollectingSink;
    use crate::{Conversation, MessageRole};
    use serde_json::json;
    use time::macros::datetime;

    struct Harness {
        store: Arc<ConversationStore>,
        connector: Arc<MemoryConnector>,
        service: Arc<MemorySessionService>,
        sink: Arc<CollectingSink>,
    }

    fn harness_with(config: StoreConfig) -> Harness {
        let connector = Arc::new(MemoryConnector::new());
        let service = Arc::new(MemorySessionService::new());
        let sink = Arc::new(CollectingSink::new());
        service.insert_conversation(Conversation::with_messages(
            "c1",
            vec![Message::user("earlier", datetime!(2023-12-31 0:00 UTC))],
        ));
        let store = Arc::new(ConversationStore::with_config(
            service.clone(),
            connector.clone(),
            Arc::new(StaticToken::new("tok")),
            sink.clone(),
            ConnectionConfig::new().with_ws_base("ws://chat.test/ws/chat/"),
            config,
        ));
        Harness {
            store,
            connector,
            service,
            sink,
        }
    }

    fn harness() -> Harness {
        harness_with(StoreConfig::new())
    }

    fn chunk(text: &str) -> serde_json::Value {
        json!({"type": "response_chunk", "chunk": text})
    }

    fn complete(id: &str, text: &str) -> serde_json::Value {
        json!({
            "type": "response_complete",
            "message_id": id,
            "timestamp": "2024-01-01T00:00:00Z",
            "full_response": text,
        })
    }

    #[tokio::test]
    async fn open_installs_transcript_and_connects() {
        let h = harness();
        h.store.set_loaded_chatbot(LoadedChatbot::new("bot1", "Bot"));
        let session = h.store.open_conversation("c1").await.unwrap();

        assert_eq!(session.conversation_id, "c1");
        assert_eq!(h.store.session(), Some(session.clone()));
        assert_eq!(h.store.connection_state(), ConnectionState::Open);
        assert_eq!(h.store.messages().len(), 1);
        assert_eq!(
            h.connector.last_peer().unwrap().url().as_str(),
            format!("ws://chat.test/ws/chat/{}?token=tok", session.id)
        );
    }

    #[tokio::test]
    async fn open_requires_chatbot() {
        let h = harness();
        let err = h.store.open_conversation("c1").await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(h.connector.attempts(), 0);
    }

    #[tokio::test]
    async fn streamed_response_then_mark_complete() {
        let h = harness();
        h.store.set_loaded_chatbot(LoadedChatbot::new("bot1", "Bot"));
        h.store.open_new_conversation().await.unwrap();
        h.store.send_message("hi").unwrap();
        assert!(h.store.is_thinking());

        let peer = h.connector.last_peer().unwrap();
        peer.push_json(chunk("A"));
        peer.push_json(chunk("B"));
        peer.push_json(complete("m1", "AB"));
        assert_eq!(
            h.store.next_event().await,
            Some(StoreUpdate::Chunk {
                text: "A".to_string()
            })
        );
        h.store.next_event().await;
        assert_eq!(
            h.store.next_event().await,
            Some(StoreUpdate::Completed {
                message_id: "m1".to_string()
            })
        );

        let tail = h.store.transcript().unwrap().last().cloned().unwrap();
        assert_eq!(tail.content, "AB");
        assert!(tail.streaming);
        assert!(!h.store.is_thinking());

        assert!(h.store.mark_streaming_complete());
        assert!(!h.store.messages().iter().any(|m| m.streaming));
        assert!(!h.store.mark_streaming_complete());
    }

    #[tokio::test]
    async fn finalize_on_complete_clears_marker() {
        let h = harness_with(StoreConfig::new().with_finalize_on_complete(true));
        h.store.set_loaded_chatbot(LoadedChatbot::new("bot1", "Bot"));
        h.store.open_new_conversation().await.unwrap();
        let peer = h.connector.last_peer().unwrap();
        peer.push_json(complete("m1", "done"));
        h.store.next_event().await;

        let messages = h.store.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "done");
        assert!(!messages[0].streaming);
    }

    #[tokio::test]
    async fn blank_messages_change_nothing() {
        let h = harness();
        h.store.set_loaded_chatbot(LoadedChatbot::new("bot1", "Bot"));
        h.store.open_new_conversation().await.unwrap();
        let before = h.store.snapshot();

        assert!(h.store.send_message("").unwrap_err().is_validation());
        assert!(h.store.send_message("   ").unwrap_err().is_validation());
        assert_eq!(h.store.snapshot(), before);
        assert!(h.connector.last_peer().unwrap().sent().is_empty());
    }

    #[tokio::test]
    async fn send_without_connection_changes_nothing() {
        let h = harness();
        h.store.set_loaded_chatbot(LoadedChatbot::new("bot1", "Bot"));
        h.store.open_conversation("c1").await.unwrap();
        h.store.disconnect();
        let before = h.store.snapshot();

        assert!(h.store.send_message("hello").unwrap_err().is_not_connected());
        assert_eq!(h.store.snapshot(), before);
    }

    #[tokio::test]
    async fn disconnect_clears_thinking_and_keeps_transcript() {
        let h = harness();
        h.store.set_loaded_chatbot(LoadedChatbot::new("bot1", "Bot"));
        h.store.open_conversation("c1").await.unwrap();
        h.store.send_message("still there?").unwrap();
        assert!(h.store.is_thinking());

        h.store.disconnect();
        assert!(!h.store.is_thinking());
        assert!(h.store.session().is_none());
        assert_eq!(h.store.connection_state(), ConnectionState::Closed);
        assert!(h.connector.last_peer().unwrap().is_closed());
        let messages = h.store.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "still there?");
        assert_eq!(h.store.transcript().unwrap().conversation_id(), "c1");
    }

    #[tokio::test]
    async fn disconnect_during_connect_supersedes_open() {
        let h = harness();
        h.store.set_loaded_chatbot(LoadedChatbot::new("bot1", "Bot"));
        h.connector.pause();
        let open = tokio::spawn({
            let store = Arc::clone(&h.store);
            async move { store.open_conversation("c1").await }
        });
        while h.connector.attempts() == 0 {
            tokio::task::yield_now().await;
        }
        h.store.disconnect();
        h.connector.resume();

        let err = open.await.unwrap().unwrap_err();
        assert!(err.is_superseded());
        assert!(h.store.session().is_none());
        assert!(h.connector.last_peer().unwrap().is_closed());
        assert_ne!(h.store.connection_state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn agent_only_response_yields_one_message() {
        let h = harness();
        h.service.insert_conversation(Conversation::empty("fresh"));
        h.store.set_loaded_chatbot(LoadedChatbot::new("bot1", "Bot"));
        h.store.open_conversation("fresh").await.unwrap();

        let peer = h.connector.last_peer().unwrap();
        peer.push_json(chunk("Hel"));
        peer.push_json(chunk("lo"));
        peer.push_json(complete("m1", "Hello"));
        for _ in 0..3 {
            h.store.next_event().await;
        }
        assert!(h.store.mark_streaming_complete());

        let messages = h.store.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, MessageRole::Agent);
        assert_eq!(messages[0].content, "Hello");
        assert_eq!(messages[0].timestamp, datetime!(2024-01-01 0:00 UTC));
        assert!(!messages[0].streaming);
    }

    #[tokio::test]
    async fn failed_connect_discards_session() {
        let h = harness();
        h.connector
            .refuse_next(Error::connection("connection refused", None));
        h.store.set_loaded_chatbot(LoadedChatbot::new("bot1", "Bot"));

        let err = h.store.open_conversation("c1").await.unwrap_err();
        assert!(err.is_connection());
        assert!(h.store.session().is_none());
        assert_eq!(h.store.messages().len(), 1);
        assert_ne!(h.store.connection_state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn failed_send_keeps_echo() {
        let h = harness();
        h.connector.sever_outbound_next();
        h.store.set_loaded_chatbot(LoadedChatbot::new("bot1", "Bot"));
        h.store.open_new_conversation().await.unwrap();

        let err = h.store.send_message("hi").unwrap_err();
        assert!(err.is_connection());
        let messages = h.store.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].content, "hi");
        assert!(!h.store.is_thinking());
    }

    #[tokio::test]
    async fn sent_frame_matches_echo() {
        let h = harness();
        h.store.set_loaded_chatbot(LoadedChatbot::new("bot1", "Bot"));
        h.store.open_new_conversation().await.unwrap();
        h.store.send_message("what is up").unwrap();

        let sent = h.connector.last_peer().unwrap().sent();
        assert_eq!(sent.len(), 1);
        let frame: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(frame["message"], "what is up");
        let echo = h.store.messages().pop().unwrap();
        assert_eq!(
            crate::utils::time::parse(frame["timestamp"].as_str().unwrap()).unwrap(),
            echo.timestamp
        );
    }

    #[tokio::test]
    async fn chatbot_switch_tears_down() {
        let h = harness();
        h.store.set_loaded_chatbot(LoadedChatbot::new("bot1", "Bot"));
        h.store.open_conversation("c1").await.unwrap();
        h.store.send_message("hi").unwrap();
        let first_peer = h.connector.last_peer().unwrap();

        h.store.set_loaded_chatbot(LoadedChatbot::new("bot2", "Other"));
        let snapshot = h.store.snapshot();
        assert_eq!(snapshot.chatbot.unwrap().id, "bot2");
        assert!(snapshot.transcript.is_none());
        assert!(snapshot.session.is_none());
        assert!(!snapshot.thinking);
        assert_eq!(snapshot.connection, ConnectionState::Closed);
        assert!(first_peer.is_closed());

        // Late frames from the old connection are ignored.
        first_peer.push_json(chunk("late"));
        assert!(h.store.drain_events().iter().all(|u| *u == StoreUpdate::Ignored));
        assert!(h.store.transcript().is_none());
    }

    #[tokio::test]
    async fn switch_during_session_creation_supersedes_open() {
        let h = harness();
        h.store.set_loaded_chatbot(LoadedChatbot::new("bot1", "Bot"));
        h.service.pause();
        let open = tokio::spawn({
            let store = Arc::clone(&h.store);
            async move { store.open_conversation("c1").await }
        });
        while h.service.requests() == 0 {
            tokio::task::yield_now().await;
        }
        h.store.set_loaded_chatbot(LoadedChatbot::new("bot2", "Other"));
        h.service.resume();

        let err = open.await.unwrap().unwrap_err();
        assert!(err.is_superseded());
        assert!(h.store.transcript().is_none());
        assert_eq!(h.connector.attempts(), 0);
    }

    #[tokio::test]
    async fn switch_during_connect_closes_new_connection() {
        let h = harness();
        h.store.set_loaded_chatbot(LoadedChatbot::new("bot1", "Bot"));
        h.connector.pause();
        let open = tokio::spawn({
            let store = Arc::clone(&h.store);
            async move { store.open_conversation("c1").await }
        });
        while h.connector.attempts() == 0 {
            tokio::task::yield_now().await;
        }
        h.store.set_loaded_chatbot(LoadedChatbot::new("bot2", "Other"));
        h.connector.resume();

        let err = open.await.unwrap().unwrap_err();
        assert!(err.is_superseded());
        assert!(h.connector.last_peer().unwrap().is_closed());
        assert_eq!(h.store.connection_state(), ConnectionState::Closed);
        assert!(h.store.transcript().is_none());
    }

    #[tokio::test]
    async fn remote_close_clears_thinking_and_reports() {
        let h = harness();
        h.store.set_loaded_chatbot(LoadedChatbot::new("bot1", "Bot"));
        h.store.open_new_conversation().await.unwrap();
        h.store.send_message("hi").unwrap();
        h.connector.last_peer().unwrap().close(Some("server restart"));

        assert_eq!(
            h.store.next_event().await,
            Some(StoreUpdate::Disconnected {
                reason: Some("server restart".to_string())
            })
        );
        assert!(!h.store.is_thinking());
        assert_eq!(h.store.connection_state(), ConnectionState::Closed);
        let reports = h.sink.take();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, Severity::Warning);
        assert!(reports[0].1.contains("server restart"));
    }

    #[tokio::test]
    async fn transport_failure_is_reported() {
        let h = harness();
        h.store.set_loaded_chatbot(LoadedChatbot::new("bot1", "Bot"));
        h.store.open_new_conversation().await.unwrap();
        h.connector.last_peer().unwrap().fail("reset by peer");

        let update = h.store.next_event().await.unwrap();
        assert!(matches!(update, StoreUpdate::Disconnected { reason: Some(_) }));
        assert_eq!(h.sink.take()[0].0, Severity::Error);
        assert!(h.store.send_message("hi").unwrap_err().is_not_connected());
    }

    #[tokio::test]
    async fn server_error_frame_keeps_connection() {
        let h = harness();
        h.store.set_loaded_chatbot(LoadedChatbot::new("bot1", "Bot"));
        h.store.open_new_conversation().await.unwrap();
        h.store.send_message("hi").unwrap();
        h.connector
            .last_peer()
            .unwrap()
            .push_json(json!({"type": "error", "message": "model overloaded"}));

        assert_eq!(
            h.store.next_event().await,
            Some(StoreUpdate::Reported {
                severity: Severity::Error,
                message: "model overloaded".to_string()
            })
        );
        assert_eq!(h.store.connection_state(), ConnectionState::Open);
        assert_eq!(h.store.messages().len(), 1);
        assert_eq!(h.sink.take().len(), 1);
    }

    #[tokio::test]
    async fn reset_is_idempotent() {
        let h = harness();
        h.store.set_loaded_chatbot(LoadedChatbot::new("bot1", "Bot"));
        h.store.open_conversation("c1").await.unwrap();
        h.store.reset();
        let once = h.store.snapshot();
        h.store.reset();
        assert_eq!(h.store.snapshot(), once);
        assert!(once.chatbot.is_none());
        assert!(once.transcript.is_none());
        assert_eq!(once.connection, ConnectionState::Closed);
    }

    #[tokio::test]
    async fn refresh_history_discards_result_for_replaced_chatbot() {
        let h = harness();
        h.service.insert_summary(ConversationSummary {
            id: "c1".to_string(),
            title: "first".to_string(),
            created_at: datetime!(2024-01-01 0:00 UTC),
            user_id: "u1".to_string(),
            chatbot_id: "bot1".to_string(),
        });
        h.store.set_loaded_chatbot(LoadedChatbot::new("bot1", "Bot"));
        assert_eq!(h.store.refresh_history().await.unwrap().len(), 1);
        assert_eq!(h.store.history().len(), 1);

        h.service.pause();
        let refresh = tokio::spawn({
            let store = Arc::clone(&h.store);
            async move { store.refresh_history().await }
        });
        while h.service.requests() < 2 {
            tokio::task::yield_now().await;
        }
        h.store.set_loaded_chatbot(LoadedChatbot::new("bot2", "Other"));
        h.service.resume();
        assert!(refresh.await.unwrap().unwrap_err().is_superseded());
        assert!(h.store.history().is_empty());
    }
}
