//! Framed IPC messages exchanged with adapter processes.
//!
//! One JSON object per line over the child's stdin/stdout. Compact JSON
//! never contains a raw newline (string escapes cover it), so a line is
//! always exactly one message. Each message carries a correlation id: the
//! gateway matches a response to its request by id, never by arrival
//! order, because a process may answer out of submission order.

use crate::{AdapterRequest, AdapterResponse};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from message framing.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// A correlated IPC message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcMessage {
    /// Correlation id, unique per in-flight call within one process
    /// lifetime.
    pub id: String,
    #[serde(flatten)]
    pub kind: IpcMessageKind,
}

/// Direction of an IPC message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcMessageKind {
    #[serde(rename = "request")]
    Request(AdapterRequest),
    #[serde(rename = "response")]
    Response(AdapterResponse),
}

impl IpcMessage {
    /// Wrap a request with a fresh uuid-v4 correlation id.
    pub fn request(request: AdapterRequest) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: IpcMessageKind::Request(request),
        }
    }

    /// Wrap a response echoing the request's correlation id.
    pub fn response(id: impl Into<String>, response: AdapterResponse) -> Self {
        Self {
            id: id.into(),
            kind: IpcMessageKind::Response(response),
        }
    }
}

/// Encode a message as one newline-terminated JSON line.
pub fn encode_line(msg: &IpcMessage) -> Result<String, FrameError> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    Ok(line)
}

/// Decode a single line back into a message.
pub fn decode_line(line: &str) -> Result<IpcMessage, FrameError> {
    Ok(serde_json::from_str(line.trim_end())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_line_roundtrip() {
        let msg = IpcMessage::request(AdapterRequest::GetManifest);
        let line = encode_line(&msg).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        let decoded = decode_line(&line).unwrap();
        assert_eq!(decoded.id, msg.id);
        assert!(matches!(
            decoded.kind,
            IpcMessageKind::Request(AdapterRequest::GetManifest)
        ));
    }

    #[test]
    fn embedded_newlines_stay_on_one_line() {
        let msg = IpcMessage::request(AdapterRequest::Create {
            resource: "post".into(),
            payload: serde_json::json!({"body": "line one\nline two"}),
        });
        let line = encode_line(&msg).unwrap();
        assert_eq!(line.matches('\n').count(), 1);
        let decoded = decode_line(&line).unwrap();
        match decoded.kind {
            IpcMessageKind::Request(AdapterRequest::Create { payload, .. }) => {
                assert_eq!(payload["body"], "line one\nline two");
            }
            other => panic!("expected Create, got {other:?}"),
        }
    }

    #[test]
    fn response_echoes_correlation_id() {
        let msg = IpcMessage::response("abc-123", AdapterResponse::Configured);
        let line = encode_line(&msg).unwrap();
        let decoded = decode_line(&line).unwrap();
        assert_eq!(decoded.id, "abc-123");
    }

    #[test]
    fn garbage_line_is_a_frame_error() {
        assert!(decode_line("not json at all").is_err());
        assert!(decode_line(r#"{"id":"x"}"#).is_err());
    }

    #[test]
    fn fresh_ids_are_unique() {
        let a = IpcMessage::request(AdapterRequest::GetManifest);
        let b = IpcMessage::request(AdapterRequest::GetManifest);
        assert_ne!(a.id, b.id);
    }
}
