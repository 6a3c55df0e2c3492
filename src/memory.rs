//! In-process collaborators.
//!
//! [`MemoryConnector`] and [`MemorySessionService`] stand in for the WebSocket
//! transport and the REST backend. They let a caller play the server side of a
//! conversation by hand: push frames, close or fail a link, refuse or stall an open.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use futures::StreamExt;
use futures::channel::mpsc as stream_channel;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use url::Url;

use crate::session::SessionService;
use crate::transport::{Connector, Outgoing, TransportEvent, TransportLink};
use crate::{Conversation, ConversationSummary, Error, Result, SessionGrant};

////////////////////////////////////////////// Gate //////////////////////////////////////////////

/// Holds async calls until released.
#[derive(Debug)]
struct Gate {
    paused: watch::Sender<bool>,
}

impl Gate {
    fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self { paused }
    }

    fn set(&self, paused: bool) {
        self.paused.send_replace(paused);
    }

    async fn pass(&self) {
        let mut rx = self.paused.subscribe();
        // The sender lives as long as self, so this cannot fail.
        let _ = rx.wait_for(|paused| !*paused).await;
    }
}

////////////////////////////////////////// MemoryPeer //////////////////////////////////////////

#[derive(Debug)]
struct PeerState {
    outbound: Option<mpsc::UnboundedReceiver<Outgoing>>,
    sent: Vec<String>,
    closed: bool,
}

impl PeerState {
    fn drain(&mut self) {
        let Some(outbound) = self.outbound.as_mut() else {
            self.closed = true;
            return;
        };
        loop {
            match outbound.try_recv() {
                Ok(Outgoing::Text(text)) => self.sent.push(text),
                Ok(Outgoing::Close) | Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.closed = true;
                    self.outbound = None;
                    return;
                }
                Err(mpsc::error::TryRecvError::Empty) => return,
            }
        }
    }
}

/// The server side of one in-memory link.
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    url: Url,
    inbound: stream_channel::UnboundedSender<TransportEvent>,
    state: Arc<Mutex<PeerState>>,
}

impl MemoryPeer {
    /// The URL the link was opened for.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Deliver a raw text frame to the client.
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.inbound.unbounded_send(TransportEvent::Text(text.into()));
    }

    /// Deliver a JSON frame to the client.
    pub fn push_json(&self, frame: Value) {
        self.push_text(frame.to_string());
    }

    /// Close the link from the server side.
    pub fn close(&self, reason: Option<&str>) {
        let _ = self.inbound.unbounded_send(TransportEvent::Closed {
            reason: reason.map(str::to_string),
        });
        self.inbound.close_channel();
    }

    /// Fail the link with a transport error.
    pub fn fail(&self, message: &str) {
        let _ = self
            .inbound
            .unbounded_send(TransportEvent::Failed(Error::connection(message, None)));
        self.inbound.close_channel();
    }

    /// Text frames the client has written so far.
    pub fn sent(&self) -> Vec<String> {
        let mut state = self.state.lock();
        state.drain();
        state.sent.clone()
    }

    /// Returns true once the client closed or dropped its end.
    pub fn is_closed(&self) -> bool {
        let mut state = self.state.lock();
        state.drain();
        state.closed
    }
}

//////////////////////////////////////// MemoryConnector ////////////////////////////////////////

#[derive(Debug, Default)]
struct ConnectorState {
    peers: Vec<MemoryPeer>,
    refusals: VecDeque<Error>,
    sever_next: bool,
    attempts: usize,
}

/// A [`Connector`] whose links are driven through [`MemoryPeer`] handles.
#[derive(Debug)]
pub struct MemoryConnector {
    state: Mutex<ConnectorState>,
    gate: Gate,
}

impl MemoryConnector {
    /// Create a connector that opens every link immediately.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ConnectorState::default()),
            gate: Gate::new(),
        }
    }

    /// Fail the next open with `err`.
    pub fn refuse_next(&self, err: Error) {
        self.state.lock().refusals.push_back(err);
    }

    /// Open the next link with its outbound half already gone, so every send fails.
    pub fn sever_outbound_next(&self) {
        self.state.lock().sever_next = true;
    }

    /// Hold opens until [`MemoryConnector::resume`].
    pub fn pause(&self) {
        self.gate.set(true);
    }

    /// Release held opens.
    pub fn resume(&self) {
        self.gate.set(false);
    }

    /// Number of opens requested so far, including held and refused ones.
    pub fn attempts(&self) -> usize {
        self.state.lock().attempts
    }

    /// Every link opened so far, oldest first.
    pub fn peers(&self) -> Vec<MemoryPeer> {
        self.state.lock().peers.clone()
    }

    /// The most recently opened link.
    pub fn last_peer(&self) -> Option<MemoryPeer> {
        self.state.lock().peers.last().cloned()
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, url: &Url) -> Result<TransportLink> {
        self.state.lock().attempts += 1;
        self.gate.pass().await;

        let mut state = self.state.lock();
        if let Some(err) = state.refusals.pop_front() {
            return Err(err);
        }
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = stream_channel::unbounded();
        let severed = std::mem::take(&mut state.sever_next);
        let peer = MemoryPeer {
            url: url.clone(),
            inbound: inbound_tx,
            state: Arc::new(Mutex::new(PeerState {
                outbound: if severed { None } else { Some(outbound_rx) },
                sent: Vec::new(),
                closed: false,
            })),
        };
        state.peers.push(peer);
        Ok(TransportLink {
            outbound,
            inbound: inbound.boxed(),
        })
    }
}

///////////////////////////////////// MemorySessionService /////////////////////////////////////

#[derive(Debug, Default)]
struct SessionState {
    conversations: HashMap<String, Conversation>,
    summaries: Vec<ConversationSummary>,
    failures: VecDeque<Error>,
    requests: usize,
    sessions_issued: u64,
    conversations_created: u64,
}

impl SessionState {
    fn grant(&mut self, conversation: Conversation) -> SessionGrant {
        self.sessions_issued += 1;
        SessionGrant {
            session_id: format!("session-{}", self.sessions_issued),
            conversation,
        }
    }
}

/// A [`SessionService`] backed by in-memory conversations.
///
/// Session ids are `session-1`, `session-2`, ... in issue order.
#[derive(Debug)]
pub struct MemorySessionService {
    state: Mutex<SessionState>,
    gate: Gate,
}

impl MemorySessionService {
    /// Create a service with no conversations.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::default()),
            gate: Gate::new(),
        }
    }

    /// Make a conversation available to `create_session`.
    pub fn insert_conversation(&self, conversation: Conversation) {
        self.state
            .lock()
            .conversations
            .insert(conversation.id.clone(), conversation);
    }

    /// Add an entry to the history index.
    pub fn insert_summary(&self, summary: ConversationSummary) {
        self.state.lock().summaries.push(summary);
    }

    /// Fail the next call with `err`.
    pub fn fail_next(&self, err: Error) {
        self.state.lock().failures.push_back(err);
    }

    /// Hold calls until [`MemorySessionService::resume`].
    pub fn pause(&self) {
        self.gate.set(true);
    }

    /// Release held calls.
    pub fn resume(&self) {
        self.gate.set(false);
    }

    /// Number of calls received so far, including held and failed ones.
    pub fn requests(&self) -> usize {
        self.state.lock().requests
    }

    /// Number of sessions issued so far.
    pub fn sessions_issued(&self) -> u64 {
        self.state.lock().sessions_issued
    }
}

impl Default for MemorySessionService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SessionService for MemorySessionService {
    async fn create_session(
        &self,
        _chatbot_id: &str,
        conversation_id: &str,
    ) -> Result<SessionGrant> {
        self.state.lock().requests += 1;
        self.gate.pass().await;
        let mut state = self.state.lock();
        if let Some(err) = state.failures.pop_front() {
            return Err(err);
        }
        let Some(conversation) = state.conversations.get(conversation_id).cloned() else {
            return Err(Error::api(
                404,
                format!("conversation '{conversation_id}' not found"),
            ));
        };
        Ok(state.grant(conversation))
    }

    async fn create_new_session(&self, _chatbot_id: &str) -> Result<SessionGrant> {
        self.state.lock().requests += 1;
        self.gate.pass().await;
        let mut state = self.state.lock();
        if let Some(err) = state.failures.pop_front() {
            return Err(err);
        }
        state.conversations_created += 1;
        let conversation = Conversation::empty(format!(
            "conversation-{}",
            state.conversations_created
        ));
        state
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(state.grant(conversation))
    }

    async fn list_conversations(&self, chatbot_id: &str) -> Result<Vec<ConversationSummary>> {
        self.state.lock().requests += 1;
        self.gate.pass().await;
        let mut state = self.state.lock();
        if let Some(err) = state.failures.pop_front() {
            return Err(err);
        }
        Ok(state
            .summaries
            .iter()
            .filter(|s| s.chatbot_id == chatbot_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn peer_sees_sent_frames_and_close() {
        let connector = MemoryConnector::new();
        let url = Url::parse("ws://chat.test/ws/s-1").unwrap();
        let mut link = connector.open(&url).await.unwrap();
        let peer = connector.last_peer().unwrap();

        link.outbound.send(Outgoing::Text("one".to_string())).unwrap();
        assert_eq!(peer.sent(), vec!["one".to_string()]);
        assert!(!peer.is_closed());

        peer.push_text("hello");
        peer.close(None);
        assert!(matches!(link.inbound.next().await, Some(TransportEvent::Text(t)) if t == "hello"));
        assert!(matches!(
            link.inbound.next().await,
            Some(TransportEvent::Closed { reason: None })
        ));
        assert!(link.inbound.next().await.is_none());

        link.outbound.send(Outgoing::Close).unwrap();
        assert!(peer.is_closed());
    }

    #[tokio::test]
    async fn refusal_applies_once() {
        let connector = MemoryConnector::new();
        connector.refuse_next(Error::connection("nope", None));
        let url = Url::parse("ws://chat.test/ws/s-1").unwrap();
        assert!(connector.open(&url).await.is_err());
        assert!(connector.open(&url).await.is_ok());
        assert_eq!(connector.attempts(), 2);
        assert_eq!(connector.peers().len(), 1);
    }

    #[tokio::test]
    async fn severed_link_rejects_writes() {
        let connector = MemoryConnector::new();
        connector.sever_outbound_next();
        let url = Url::parse("ws://chat.test/ws/s-1").unwrap();
        let link = connector.open(&url).await.unwrap();
        assert!(link.outbound.send(Outgoing::Text("x".to_string())).is_err());
    }

    #[tokio::test]
    async fn new_sessions_get_fresh_ids() {
        let service = MemorySessionService::new();
        let first = service.create_new_session("bot1").await.unwrap();
        let second = service.create_new_session("bot1").await.unwrap();
        assert_eq!(first.session_id, "session-1");
        assert_eq!(second.session_id, "session-2");
        assert_ne!(first.conversation.id, second.conversation.id);
        assert_eq!(service.sessions_issued(), 2);

        // A created conversation can be reopened.
        let reopened = service
            .create_session("bot1", &first.conversation.id)
            .await
            .unwrap();
        assert_eq!(reopened.conversation.id, first.conversation.id);
    }
}
