//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and the resolved
//! configuration the binary builds its store from.

use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::connection::ConnectionConfig;
use crate::store::StoreConfig;

/// Default REST API base.
const DEFAULT_API_BASE: &str = "http://localhost:8000/api/";

/// Default WebSocket base.
const DEFAULT_WS_BASE: &str = "ws://localhost:8000/ws/chat/";

/// Default connect timeout, in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Command-line arguments for the parley-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// REST API base URL.
    #[arrrg(optional, "REST API base (default: http://localhost:8000/api/)", "URL")]
    pub api_base: Option<String>,

    /// WebSocket base URL.
    #[arrrg(optional, "WebSocket base (default: ws://localhost:8000/ws/chat/)", "URL")]
    pub ws_base: Option<String>,

    /// Chatbot to load at startup.
    #[arrrg(optional, "Chatbot id to load at startup", "ID")]
    pub chatbot: Option<String>,

    /// Connect timeout in seconds.
    #[arrrg(optional, "Connect timeout in seconds (default: 10)", "SECS")]
    pub connect_timeout: Option<u64>,

    /// Finalize agent messages as soon as they complete.
    #[arrrg(flag, "Finalize agent messages on completion")]
    pub finalize_on_complete: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Resolved configuration for a chat run.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Base URL of the REST API.
    pub api_base: String,

    /// Streaming endpoint configuration.
    pub connection: ConnectionConfig,

    /// Store behavior.
    pub store: StoreConfig,

    /// Chatbot to load at startup.
    pub chatbot: Option<String>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - API base: http://localhost:8000/api/
    /// - WebSocket base: ws://localhost:8000/ws/chat/
    /// - Connect timeout: 10 seconds
    /// - Finalize on complete: disabled
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            connection: ConnectionConfig::new()
                .with_ws_base(DEFAULT_WS_BASE)
                .with_connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)),
            store: StoreConfig::new(),
            chatbot: None,
            use_color: true,
        }
    }

    /// Sets the REST API base.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Sets the WebSocket base.
    pub fn with_ws_base(mut self, ws_base: impl Into<String>) -> Self {
        self.connection = self.connection.with_ws_base(ws_base);
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connection = self.connection.with_connect_timeout(timeout);
        self
    }

    /// Sets the chatbot loaded at startup.
    pub fn with_chatbot(mut self, chatbot: Option<String>) -> Self {
        self.chatbot = chatbot;
        self
    }

    /// Sets whether completion frames finalize agent messages.
    pub fn with_finalize_on_complete(mut self, finalize: bool) -> Self {
        self.store = self.store.with_finalize_on_complete(finalize);
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        let mut config = ChatConfig::new()
            .with_chatbot(args.chatbot)
            .with_finalize_on_complete(args.finalize_on_complete);
        if let Some(api_base) = args.api_base {
            config = config.with_api_base(api_base);
        }
        if let Some(ws_base) = args.ws_base {
            config = config.with_ws_base(ws_base);
        }
        if let Some(secs) = args.connect_timeout {
            config = config.with_connect_timeout(Duration::from_secs(secs));
        }
        if args.no_color {
            config = config.without_color();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ChatConfig::new();
        assert_eq!(config.api_base, "http://localhost:8000/api/");
        assert_eq!(config.connection.ws_base, "ws://localhost:8000/ws/chat/");
        assert_eq!(config.connection.connect_timeout, Duration::from_secs(10));
        assert!(!config.store.finalize_on_complete);
        assert!(config.chatbot.is_none());
        assert!(config.use_color);
    }

    #[test]
    fn config_from_args_defaults() {
        let config = ChatConfig::from(ChatArgs::default());
        assert_eq!(config.api_base, "http://localhost:8000/api/");
        assert!(config.use_color);
    }

    #[test]
    fn config_from_args_custom() {
        let args = ChatArgs {
            api_base: Some("https://chat.test/api/".to_string()),
            ws_base: Some("wss://chat.test/ws/chat/".to_string()),
            chatbot: Some("bot1".to_string()),
            connect_timeout: Some(3),
            finalize_on_complete: true,
            no_color: true,
        };
        let config = ChatConfig::from(args);
        assert_eq!(config.api_base, "https://chat.test/api/");
        assert_eq!(config.connection.ws_base, "wss://chat.test/ws/chat/");
        assert_eq!(config.connection.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.chatbot.as_deref(), Some("bot1"));
        assert!(config.store.finalize_on_complete);
        assert!(!config.use_color);
    }
}
