// Public modules
pub mod chatbot;
pub mod conversation;
pub mod frame;
pub mod message;
pub mod session;
pub mod transcript;

// Re-exports
pub use chatbot::{ChatbotConfig, LoadedChatbot};
pub use conversation::{Conversation, ConversationSummary, sort_by_recency};
pub use frame::{ChunkFrame, CompleteFrame, ErrorFrame, InboundFrame, OutboundFrame};
pub use message::{Message, MessageRole};
pub use session::{Session, SessionGrant, SessionStart};
pub use transcript::Transcript;
