use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A piece of an agent response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkFrame {
    /// Text to append to the in-progress response.
    pub chunk: String,
}

/// The authoritative end of an agent response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompleteFrame {
    /// Server-side identifier of the finished message.
    pub message_id: String,

    /// Server-side timestamp of the finished message.
    #[serde(with = "crate::utils::time")]
    pub timestamp: OffsetDateTime,

    /// The full response text. This may differ from the concatenated chunks.
    pub full_response: String,
}

/// An error reported by the server over the streaming connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorFrame {
    /// Human-readable error message.
    pub message: String,
}

/// A decoded inbound frame.
///
/// Frames are tagged by their `type` field. Frames with a `type` this crate does not
/// understand decode to [`InboundFrame::Unknown`] so that callers can log and skip them.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// `{"type":"response_chunk", ...}`
    ResponseChunk(ChunkFrame),

    /// `{"type":"response_complete", ...}`
    ResponseComplete(CompleteFrame),

    /// `{"type":"error", ...}`
    Error(ErrorFrame),

    /// A well-formed frame with an unrecognized `type`.
    Unknown {
        /// The unrecognized `type` value.
        kind: String,
    },
}

impl InboundFrame {
    /// The wire `type` of this frame.
    pub fn kind(&self) -> &str {
        match self {
            InboundFrame::ResponseChunk(_) => "response_chunk",
            InboundFrame::ResponseComplete(_) => "response_complete",
            InboundFrame::Error(_) => "error",
            InboundFrame::Unknown { kind } => kind,
        }
    }
}

/// A user message sent to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundFrame {
    /// The text the user typed.
    pub message: String,

    /// When the user sent it.
    #[serde(with = "crate::utils::time")]
    pub timestamp: OffsetDateTime,
}

impl OutboundFrame {
    /// Create an outbound frame.
    pub fn new(message: impl Into<String>, timestamp: OffsetDateTime) -> Self {
        Self {
            message: message.into(),
            timestamp,
        }
    }
}
