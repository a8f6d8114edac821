use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::types::RequestId;

/// Result type for caller-facing engine operations
pub type RpcResult<T> = Result<T, RpcError>;

/// Error codes this engine puts on the wire. Codes received from the peer
/// that are not among them are carried as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRpcErrorCode {
    /// Params were neither positional nor keyword (-32602)
    InvalidParams,
    /// Uncaught failure inside a dispatched method (-31000)
    ServerError,
    Other(i64),
}

impl JsonRpcErrorCode {
    pub fn code(&self) -> i64 {
        match self {
            JsonRpcErrorCode::InvalidParams => crate::error_codes::INVALID_PARAMS,
            JsonRpcErrorCode::ServerError => crate::error_codes::SERVER_ERROR,
            JsonRpcErrorCode::Other(code) => *code,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            JsonRpcErrorCode::InvalidParams => "Invalid params",
            JsonRpcErrorCode::ServerError => "Server Error",
            JsonRpcErrorCode::Other(_) => "Unknown error",
        }
    }
}

impl From<i64> for JsonRpcErrorCode {
    fn from(code: i64) -> Self {
        match code {
            crate::error_codes::INVALID_PARAMS => JsonRpcErrorCode::InvalidParams,
            crate::error_codes::SERVER_ERROR => JsonRpcErrorCode::ServerError,
            other => JsonRpcErrorCode::Other(other),
        }
    }
}

impl fmt::Display for JsonRpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

/// The `error` member of an error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: JsonRpcErrorCode, message: Option<String>, data: Option<Value>) -> Self {
        Self {
            code: code.code(),
            message: message.unwrap_or_else(|| code.message().to_string()),
            data,
        }
    }

    pub fn invalid_params() -> Self {
        Self::new(JsonRpcErrorCode::InvalidParams, None, None)
    }

    /// Server error carrying `message`, or the generic text when it is empty
    pub fn server_error(message: impl Into<String>) -> Self {
        let message = message.into();
        let message = (!message.is_empty()).then_some(message);
        Self::new(JsonRpcErrorCode::ServerError, message, None)
    }

    pub fn kind(&self) -> JsonRpcErrorCode {
        JsonRpcErrorCode::from(self.code)
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JSON-RPC Error {}: {}", self.code, self.message)
    }
}

/// Caller-facing failures of outbound operations
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("No transport is bound to the engine")]
    TransportUnavailable,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Remote error (code {code}): {message}")]
    Remote {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("Call was cancelled before a response arrived")]
    Cancelled,

    #[error("Call timed out")]
    Timeout,

    #[error("Failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Batch item {} ({}) failed: {}", .0.index, .0.method, .0.error)]
    BatchItem(Box<BatchItemError>),
}

impl RpcError {
    /// The remote error code, if this is an error reply from the peer
    pub fn code(&self) -> Option<i64> {
        match self {
            RpcError::Remote { code, .. } => Some(*code),
            RpcError::BatchItem(item) => item.error.code(),
            _ => None,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, RpcError::Remote { .. })
    }
}

impl From<ErrorObject> for RpcError {
    fn from(error: ErrorObject) -> Self {
        RpcError::Remote {
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }
}

/// A failed request inside a batch, re-correlated by its position
#[derive(Debug)]
pub struct BatchItemError {
    pub method: String,
    pub index: usize,
    pub error: RpcError,
}

impl From<BatchItemError> for RpcError {
    fn from(item: BatchItemError) -> Self {
        RpcError::BatchItem(Box::new(item))
    }
}

/// Conditions raised while decoding or classifying inbound text.
///
/// These never reach application code through the engine; they are logged
/// and the offending frame is dropped.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Protocol mismatch: {0}")]
    ProtocolMismatch(String),

    #[error("Invalid params for method '{method}'")]
    InvalidParams {
        id: Option<RequestId>,
        method: String,
    },
}

/// Failures reported by a transport binding
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Send failed: {0}")]
    Send(String),
}

/// Failure returned by a dispatched method.
///
/// Every variant is reported to the peer as a server error (-31000) carrying
/// the display text, or `"Server Error"` when that text is empty.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("{0}")]
    Panicked(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn to_error_object(&self) -> ErrorObject {
        ErrorObject::server_error(self.to_string())
    }
}
