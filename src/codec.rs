//! JSON frame codec for the streaming connection.
//!
//! Inbound text frames are decoded into the closed [`InboundFrame`] type here, at the
//! transport boundary, so nothing downstream inspects raw JSON.

use serde_json::Value;

use crate::{
    ChunkFrame, CompleteFrame, Error, ErrorFrame, InboundFrame, OutboundFrame, Result,
};

/// Decode one inbound text frame.
///
/// Unrecognized `type` values decode to [`InboundFrame::Unknown`]. Text that is not a
/// JSON object, lacks a string `type`, or has a known `type` with a malformed body is a
/// protocol error.
pub fn decode_frame(text: &str) -> Result<InboundFrame> {
    let value: Value = serde_json::from_str(text).map_err(|e| {
        Error::protocol(format!("frame is not valid JSON: {e}"), Some(Box::new(e)))
    })?;
    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return Err(Error::protocol(
            format!("frame has no string 'type' field: {}", truncate(text)),
            None,
        ));
    };
    let kind = kind.to_string();
    parse_frame_type(&kind, value)
}

fn parse_frame_type(kind: &str, value: Value) -> Result<InboundFrame> {
    match kind {
        "response_chunk" => serde_json::from_value::<ChunkFrame>(value)
            .map(InboundFrame::ResponseChunk)
            .map_err(|e| malformed(kind, e)),

        "response_complete" => serde_json::from_value::<CompleteFrame>(value)
            .map(InboundFrame::ResponseComplete)
            .map_err(|e| malformed(kind, e)),

        "error" => serde_json::from_value::<ErrorFrame>(value)
            .map(InboundFrame::Error)
            .map_err(|e| malformed(kind, e)),

        _ => Ok(InboundFrame::Unknown {
            kind: kind.to_string(),
        }),
    }
}

/// Encode an outbound frame as JSON text.
pub fn encode_frame(frame: &OutboundFrame) -> Result<String> {
    serde_json::to_string(frame).map_err(|e| {
        Error::serialization(
            format!("failed to encode outbound frame: {e}"),
            Some(Box::new(e)),
        )
    })
}

fn malformed(kind: &str, err: serde_json::Error) -> Error {
    Error::protocol(
        format!("malformed '{kind}' frame: {err}"),
        Some(Box::new(err)),
    )
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(120) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn decode_chunk() {
        let frame = decode_frame(r#"{"type":"response_chunk","chunk":"Hel"}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::ResponseChunk(ChunkFrame {
                chunk: "Hel".to_string()
            })
        );
    }

    #[test]
    fn decode_complete() {
        let frame = decode_frame(
            r#"{"type":"response_complete","message_id":"m1","timestamp":"2024-01-01T00:00:00Z","full_response":"Hello world"}"#,
        )
        .unwrap();
        match frame {
            InboundFrame::ResponseComplete(complete) => {
                assert_eq!(complete.message_id, "m1");
                assert_eq!(complete.timestamp, datetime!(2024-01-01 0:00 UTC));
                assert_eq!(complete.full_response, "Hello world");
            }
            other => panic!("Expected ResponseComplete, got {other:?}"),
        }
    }

    #[test]
    fn decode_error_frame() {
        let frame = decode_frame(r#"{"type":"error","message":"rate limited"}"#).unwrap();
        assert_eq!(frame.kind(), "error");
        assert_eq!(
            frame,
            InboundFrame::Error(ErrorFrame {
                message: "rate limited".to_string()
            })
        );
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let frame = decode_frame(r#"{"type":"typing_indicator","on":true}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Unknown {
                kind: "typing_indicator".to_string()
            }
        );
    }

    #[test]
    fn invalid_json_is_protocol_error() {
        let err = decode_frame("{\"type\":").unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn missing_type_is_protocol_error() {
        let err = decode_frame(r#"{"chunk":"x"}"#).unwrap_err();
        assert!(err.is_protocol());
        let err = decode_frame(r#"{"type":7}"#).unwrap_err();
        assert!(err.is_protocol());
        let err = decode_frame("[1,2,3]").unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn known_type_with_bad_body_is_protocol_error() {
        let err = decode_frame(r#"{"type":"response_chunk"}"#).unwrap_err();
        assert!(err.is_protocol());
        assert!(err.to_string().contains("response_chunk"));

        let err = decode_frame(
            r#"{"type":"response_complete","message_id":"m1","timestamp":"not a time","full_response":""}"#,
        )
        .unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn encode_outbound() {
        let frame = OutboundFrame::new("hi", datetime!(2024-01-01 0:00 UTC));
        assert_eq!(
            encode_frame(&frame).unwrap(),
            r#"{"message":"hi","timestamp":"2024-01-01T00:00:00Z"}"#
        );
    }
}
