//! Wire codec: typed frames to text and back.
//!
//! Inbound text is decoded in two steps. [`decode`] parses the JSON and
//! separates single frames from batch arrays; [`classify`] then turns each
//! JSON value into a typed [`Frame`] by the keys it carries. The split lets
//! the engine drop one bad element of a batch without losing its siblings.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ErrorObject, FrameError};
use crate::request::{Params, Request};
use crate::response::{ErrorResponse, Response};
use crate::types::{JsonRpcVersion, RequestId};

/// One typed wire frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Frame {
    Request(Request),
    Response(Response),
    Error(ErrorResponse),
}

impl Frame {
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Frame::Request(request) => request.id.as_ref(),
            Frame::Response(response) => response.id.as_ref(),
            Frame::Error(error) => error.id.as_ref(),
        }
    }

    pub fn is_response(&self) -> bool {
        !matches!(self, Frame::Request(_))
    }
}

impl From<Request> for Frame {
    fn from(request: Request) -> Self {
        Frame::Request(request)
    }
}

impl From<Response> for Frame {
    fn from(response: Response) -> Self {
        Frame::Response(response)
    }
}

impl From<ErrorResponse> for Frame {
    fn from(error: ErrorResponse) -> Self {
        Frame::Error(error)
    }
}

/// Decoded inbound text, before classification
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Single(Value),
    Batch(Vec<Value>),
}

/// Encode one frame
pub fn encode(frame: &Frame) -> Result<String, serde_json::Error> {
    serde_json::to_string(frame)
}

/// Encode several frames as one batch array
pub fn encode_batch(frames: &[Frame]) -> Result<String, serde_json::Error> {
    serde_json::to_string(frames)
}

/// Parse inbound text into a single frame value or a batch of them
pub fn decode(text: &str) -> Result<Incoming, FrameError> {
    match serde_json::from_str::<Value>(text)? {
        Value::Array(items) => Ok(Incoming::Batch(items)),
        value => Ok(Incoming::Single(value)),
    }
}

/// Decode text that must hold exactly one frame
pub fn decode_frame(text: &str) -> Result<Frame, FrameError> {
    match decode(text)? {
        Incoming::Single(value) => classify(value),
        Incoming::Batch(_) => Err(FrameError::ProtocolMismatch(
            "expected a single frame, found a batch".to_string(),
        )),
    }
}

/// Classify one decoded value by the keys it carries.
///
/// A non-null `error` wins over `result`; either makes the frame a
/// response. Otherwise a `method` key makes it a request or notification.
pub fn classify(value: Value) -> Result<Frame, FrameError> {
    let Value::Object(mut obj) = value else {
        return Err(mismatch("frame is not a JSON object"));
    };

    let version: JsonRpcVersion = match obj.remove("jsonrpc") {
        Some(tag) => serde_json::from_value(tag).map_err(|e| mismatch(e.to_string()))?,
        None => return Err(mismatch("missing protocol tag")),
    };

    let id = take_id(&mut obj)?;

    if let Some(error) = obj.remove("error").filter(|e| !e.is_null()) {
        let error: ErrorObject = serde_json::from_value(error)
            .map_err(|e| mismatch(format!("malformed error object: {}", e)))?;
        return Ok(Frame::Error(ErrorResponse::new(id, error)));
    }

    if let Some(result) = obj.remove("result") {
        return Ok(Frame::Response(Response::new(id, result)));
    }

    match obj.remove("method") {
        Some(Value::String(method)) => {
            let params = match obj.remove("params") {
                None | Some(Value::Null) => None,
                Some(raw) => match Params::from_value(raw) {
                    Ok(params) => Some(params),
                    Err(_) => return Err(FrameError::InvalidParams { id, method }),
                },
            };
            Ok(Frame::Request(Request {
                version,
                method,
                id,
                params,
            }))
        }
        Some(_) => Err(mismatch("method is not a string")),
        None => Err(mismatch("frame is neither a response nor a request")),
    }
}

fn take_id(obj: &mut Map<String, Value>) -> Result<Option<RequestId>, FrameError> {
    match obj.remove("id") {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => serde_json::from_value(raw)
            .map(Some)
            .map_err(|_| mismatch("identifier must be a string or an integer")),
    }
}

fn mismatch(reason: impl Into<String>) -> FrameError {
    FrameError::ProtocolMismatch(reason.into())
}
