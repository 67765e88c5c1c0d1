// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! JSON-RPC message definitions and classification.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Invalid JSON was received.
pub const PARSE_ERROR: i64 = -32700;
/// The JSON sent is not a valid request object.
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Internal error.
pub const INTERNAL_ERROR: i64 = -32603;
/// A request arrived before `initialize`.
pub const SERVER_NOT_INITIALIZED: i64 = -32002;
/// The request was cancelled by the client.
pub const REQUEST_CANCELLED: i64 = -32800;

const JSONRPC_VERSION: &str = "2.0";

fn default_null() -> Value {
    Value::Null
}

/// A request expecting exactly one response.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RequestMessage {
    /// The JSON-RPC version.
    pub jsonrpc: String,
    /// The request id.
    pub id: RequestId,
    /// The method name.
    pub method: String,
    /// The request parameters.
    #[serde(default = "default_null")]
    pub params: Value,
}

/// A response to a request.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResponseMessage {
    /// The JSON-RPC version.
    pub jsonrpc: String,
    /// The id of the answered request; `null` if it could not be determined.
    pub id: Option<RequestId>,
    /// The result, if successful.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error, if the request failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

/// A message expecting no response.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotificationMessage {
    /// The JSON-RPC version.
    pub jsonrpc: String,
    /// The method name.
    pub method: String,
    /// The notification parameters.
    #[serde(default = "default_null")]
    pub params: Value,
}

/// Request ids can be numbers or strings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    /// A numeric id.
    Number(i64),
    /// A string id.
    String(String),
}

/// Error object carried by a failed response.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ResponseError {
    /// The error code.
    pub code: i64,
    /// The error message.
    pub message: String,
    /// Additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl RequestMessage {
    /// Creates a request.
    pub fn new(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

impl NotificationMessage {
    /// Creates a notification.
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

impl ResponseMessage {
    /// Creates a successful response. A `null` result is sent as `"result": null`.
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error response.
    pub fn error(id: Option<RequestId>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(ResponseError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// Payload that is not a usable JSON-RPC message.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The payload is JSON but not a request, notification or response.
    #[error("not a JSON-RPC message: {message}")]
    Invalid {
        /// The message id, when it could still be read.
        id: Option<RequestId>,
        /// What was wrong with the message.
        message: String,
    },
}

impl DecodeError {
    /// JSON-RPC error code to report for this failure.
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            Self::Json(_) => PARSE_ERROR,
            Self::Invalid { .. } => INVALID_REQUEST,
        }
    }

    /// Id to answer the failed message with.
    #[must_use]
    pub fn id(&self) -> Option<RequestId> {
        match self {
            Self::Json(_) => None,
            Self::Invalid { id, .. } => id.clone(),
        }
    }
}

/// A decoded inbound message.
#[derive(Debug, Clone)]
pub enum Incoming {
    /// Has a method and an id.
    Request(RequestMessage),
    /// Has a method and no id.
    Notification(NotificationMessage),
    /// Has an id and no method.
    Response(ResponseMessage),
}

impl Incoming {
    /// Decodes and classifies a frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the payload is not JSON or has neither a
    /// method nor an id.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(payload)?;

        let has_method = value.get("method").is_some_and(Value::is_string);
        let has_id = value.get("id").is_some_and(|id| !id.is_null());
        let id = value
            .get("id")
            .and_then(|id| RequestId::deserialize(id).ok());

        let message = match (has_method, has_id) {
            (true, true) => Self::Request(structured(value, id)?),
            (true, false) => Self::Notification(structured(value, id)?),
            (false, _) if value.get("id").is_some() => Self::Response(structured(value, id)?),
            (false, _) => {
                return Err(DecodeError::Invalid {
                    id,
                    message: "message has neither method nor id".to_string(),
                });
            }
        };

        Ok(message)
    }
}

fn structured<T: serde::de::DeserializeOwned>(
    value: Value,
    id: Option<RequestId>,
) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|e| DecodeError::Invalid {
        id,
        message: e.to_string(),
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::panic,
    reason = "Tests use unwrap and panic for clear failure messages"
)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_number() {
        let json = r#"{"jsonrpc":"2.0","id":42,"method":"test"}"#;
        let msg: RequestMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, RequestId::Number(42));
        assert!(msg.params.is_null());
    }

    #[test]
    fn test_request_id_string() {
        let json = r#"{"jsonrpc":"2.0","id":"abc-123","method":"test"}"#;
        let msg: RequestMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, RequestId::String("abc-123".to_string()));
    }

    #[test]
    fn test_null_result_is_serialized() {
        let response = ResponseMessage::success(RequestId::Number(7), Value::Null);
        let json: Value = serde_json::to_value(&response).unwrap();
        assert_eq!(json, serde_json::json!({"jsonrpc":"2.0","id":7,"result":null}));
    }

    #[test]
    fn test_error_without_id_serializes_null_id() {
        let response = ResponseMessage::error(None, PARSE_ERROR, "bad");
        let json: Value = serde_json::to_value(&response).unwrap();
        assert!(json["id"].is_null());
        assert_eq!(json["error"]["code"], PARSE_ERROR);
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_classify_request() {
        let msg = Incoming::decode(br#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .unwrap();
        let Incoming::Request(req) = msg else {
            panic!("expected request, got {msg:?}");
        };
        assert_eq!(req.method, "initialize");
    }

    #[test]
    fn test_classify_notification() {
        let msg = Incoming::decode(br#"{"jsonrpc":"2.0","method":"initialized","params":{}}"#)
            .unwrap();
        assert!(matches!(msg, Incoming::Notification(n) if n.method == "initialized"));
    }

    #[test]
    fn test_classify_response() {
        let msg = Incoming::decode(br#"{"jsonrpc":"2.0","id":3,"result":{"ok":true}}"#).unwrap();
        let Incoming::Response(resp) = msg else {
            panic!("expected response, got {msg:?}");
        };
        assert_eq!(resp.id, Some(RequestId::Number(3)));
        assert!(resp.result.is_some());
    }

    #[test]
    fn test_response_with_error() {
        let json =
            br#"{"jsonrpc":"2.0","id":1,"error":{"code":-32600,"message":"Invalid Request"}}"#;
        let Incoming::Response(resp) = Incoming::decode(json).unwrap() else {
            panic!("expected response");
        };
        assert!(resp.result.is_none());
        assert_eq!(resp.error.unwrap().code, INVALID_REQUEST);
    }

    #[test]
    fn test_decode_errors_map_to_codes() {
        let err = Incoming::decode(b"{not json").unwrap_err();
        assert_eq!(err.code(), PARSE_ERROR);

        let err = Incoming::decode(br#"{"jsonrpc":"2.0"}"#).unwrap_err();
        assert_eq!(err.code(), INVALID_REQUEST);

        let err = Incoming::decode(br#"{"jsonrpc":"2.0","id":{"x":1},"method":"m"}"#).unwrap_err();
        assert_eq!(err.code(), INVALID_REQUEST);
        assert_eq!(err.id(), None);
    }

    #[test]
    fn test_invalid_request_keeps_readable_id() {
        // Missing jsonrpc field
        let err = Incoming::decode(br#"{"id":5,"method":"shutdown"}"#).unwrap_err();
        assert_eq!(err.code(), INVALID_REQUEST);
        assert_eq!(err.id(), Some(RequestId::Number(5)));

        let err = Incoming::decode(br#"{"jsonrpc":"2.0","id":"r-1","method":7}"#).unwrap_err();
        assert_eq!(err.id(), Some(RequestId::String("r-1".to_string())));

        let err = Incoming::decode(b"[1, 2]").unwrap_err();
        assert_eq!(err.id(), None);
    }
}
