use serde::{Deserialize, Serialize};

/// Retrieval settings of a chatbot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatbotConfig {
    /// Embedding model used to index attached files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,

    /// Chunk size, in tokens, used when splitting attached files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u32>,

    /// Overlap, in tokens, between adjacent chunks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_overlap: Option<u32>,

    /// Names of the files attached to the chatbot.
    #[serde(default)]
    pub files: Vec<String>,
}

/// The chatbot the interface is currently talking to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadedChatbot {
    /// Unique identifier of the chatbot.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Optional display description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Retrieval configuration.
    #[serde(default)]
    pub config: ChatbotConfig,

    /// Whether the chatbot accepts conversations.
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl LoadedChatbot {
    /// Create an active chatbot with default configuration.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            config: ChatbotConfig::default(),
            is_active: true,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the retrieval configuration.
    pub fn with_config(mut self, config: ChatbotConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the active flag.
    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }
}
