use serde::Serialize;
use serde_json::Value;

use crate::error::ErrorObject;
use crate::types::{JsonRpcVersion, RequestId};

/// A successful response frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    pub result: Value,
    pub id: Option<RequestId>,
}

impl Response {
    pub fn new(id: Option<RequestId>, result: Value) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            result,
            id,
        }
    }

    pub fn success(id: RequestId, result: Value) -> Self {
        Self::new(Some(id), result)
    }
}

/// An error response frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    pub error: ErrorObject,
    pub id: Option<RequestId>,
}

impl ErrorResponse {
    pub fn new(id: Option<RequestId>, error: ErrorObject) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            error,
            id,
        }
    }
}
