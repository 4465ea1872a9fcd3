//! RPC frame shapes.
//!
//! Every frame is a JSON object. A frame with a `method` key is a request;
//! any other frame is a response. Requests without an `id` are
//! notifications and never get a reply. Errors travel flattened to a
//! `{type, message}` pair and are rebuilt into [`ProtocolError`] values on
//! arrival.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use trustline_core::error::ProtocolError;

use crate::method::Method;

/// An outgoing or incoming method invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: Method,
    #[serde(default)]
    pub params: Value,
    /// Correlation id; `None` marks a notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
}

/// The answer to a correlated request: exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
    pub id: Option<Uuid>,
}

/// Flattened error as it crosses the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

impl RpcErrorBody {
    pub fn from_error(err: &ProtocolError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    pub fn into_error(self) -> ProtocolError {
        ProtocolError::from_wire(&self.kind, self.message)
    }
}

/// A frame in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcMessage {
    Request(RpcRequest),
    Response(RpcResponse),
}

impl RpcMessage {
    /// Classify a raw frame by the presence of a `method` key, then parse
    /// it strictly as that shape.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(raw)?;
        if value.get("method").is_some() {
            Ok(Self::Request(serde_json::from_value(value)?))
        } else {
            Ok(Self::Response(serde_json::from_value(value)?))
        }
    }
}
