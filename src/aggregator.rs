//! Folding decoded frames into a transcript.

use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::{InboundFrame, Transcript};

/// What applying one frame did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// A chunk was appended to the in-progress agent message.
    Chunk(String),
    /// The in-progress agent message received its final text.
    Completed {
        /// Server id of the finished message.
        message_id: String,
    },
    /// The server reported an error; the transcript is unchanged.
    Error(String),
    /// The frame was not understood and was skipped.
    Dropped,
}

/// Applies the partial/complete lifecycle of agent responses to a transcript.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamAggregator;

impl StreamAggregator {
    /// Create an aggregator.
    pub fn new() -> Self {
        Self
    }

    /// Apply one frame to `transcript`.
    pub fn apply(&self, transcript: &mut Transcript, frame: InboundFrame) -> Applied {
        self.apply_at(transcript, frame, crate::utils::time::now())
    }

    /// Apply one frame, stamping newly started messages with `now`.
    pub fn apply_at(
        &self,
        transcript: &mut Transcript,
        frame: InboundFrame,
        now: OffsetDateTime,
    ) -> Applied {
        match frame {
            InboundFrame::ResponseChunk(chunk) => {
                transcript.append_chunk(&chunk.chunk, now);
                Applied::Chunk(chunk.chunk)
            }
            InboundFrame::ResponseComplete(complete) => {
                debug!(message_id = %complete.message_id, "agent response complete");
                transcript.complete_streaming(
                    complete.message_id.clone(),
                    complete.full_response,
                    complete.timestamp,
                );
                Applied::Completed {
                    message_id: complete.message_id,
                }
            }
            InboundFrame::Error(error) => Applied::Error(error.message),
            InboundFrame::Unknown { kind } => {
                warn!(kind = %kind, "ignoring frame of unknown type");
                Applied::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChunkFrame, CompleteFrame, ErrorFrame};
    use time::macros::datetime;

    fn chunk(text: &str) -> InboundFrame {
        InboundFrame::ResponseChunk(ChunkFrame {
            chunk: text.to_string(),
        })
    }

    #[test]
    fn chunks_then_complete() {
        let aggregator = StreamAggregator::new();
        let mut transcript = Transcript::new("c1");
        let now = datetime!(2024-01-01 0:00 UTC);

        assert_eq!(
            aggregator.apply_at(&mut transcript, chunk("A"), now),
            Applied::Chunk("A".to_string())
        );
        aggregator.apply_at(&mut transcript, chunk("B"), now);
        assert_eq!(transcript.last().unwrap().content, "AB");

        let done = aggregator.apply(
            &mut transcript,
            InboundFrame::ResponseComplete(CompleteFrame {
                message_id: "m1".to_string(),
                timestamp: datetime!(2024-01-01 0:00:05 UTC),
                full_response: "AB".to_string(),
            }),
        );
        assert_eq!(
            done,
            Applied::Completed {
                message_id: "m1".to_string()
            }
        );
        let tail = transcript.last().unwrap();
        assert_eq!(tail.content, "AB");
        assert_eq!(tail.timestamp, datetime!(2024-01-01 0:00:05 UTC));
        assert!(tail.streaming);
    }

    #[test]
    fn error_and_unknown_leave_transcript_alone() {
        let aggregator = StreamAggregator::new();
        let mut transcript = Transcript::new("c1");
        transcript.append_chunk("partial", datetime!(2024-01-01 0:00 UTC));
        let before = transcript.clone();

        let applied = aggregator.apply(
            &mut transcript,
            InboundFrame::Error(ErrorFrame {
                message: "rate limited".to_string(),
            }),
        );
        assert_eq!(applied, Applied::Error("rate limited".to_string()));
        let applied = aggregator.apply(
            &mut transcript,
            InboundFrame::Unknown {
                kind: "typing".to_string(),
            },
        );
        assert_eq!(applied, Applied::Dropped);
        assert_eq!(transcript, before);
    }
}
