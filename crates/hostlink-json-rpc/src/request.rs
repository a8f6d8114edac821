use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{JsonRpcVersion, RequestId};

/// Parameters of a request, tagged by calling convention
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Params {
    /// Applied as positional arguments
    Positional(Vec<Value>),
    /// Applied as a single structured argument
    Keyword(Map<String, Value>),
}

impl Default for Params {
    fn default() -> Self {
        Params::Positional(Vec::new())
    }
}

impl Params {
    /// Positional params, or `None` when there are no arguments to send
    pub fn from_args(args: Vec<Value>) -> Option<Self> {
        (!args.is_empty()).then_some(Params::Positional(args))
    }

    /// Keyword params, or `None` when the mapping is empty
    pub fn from_kwargs(kwargs: Map<String, Value>) -> Option<Self> {
        (!kwargs.is_empty()).then_some(Params::Keyword(kwargs))
    }

    /// Classify a raw `params` member. Anything other than an array or an
    /// object is handed back unchanged.
    pub fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Array(args) => Ok(Params::Positional(args)),
            Value::Object(kwargs) => Ok(Params::Keyword(kwargs)),
            other => Err(other),
        }
    }

    /// Positional argument at `index`
    pub fn arg(&self, index: usize) -> Option<&Value> {
        match self {
            Params::Positional(args) => args.get(index),
            Params::Keyword(_) => None,
        }
    }

    /// Keyword argument named `key`
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Params::Keyword(kwargs) => kwargs.get(key),
            Params::Positional(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Params::Positional(args) => args.len(),
            Params::Keyword(kwargs) => kwargs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_keyword(&self) -> bool {
        matches!(self, Params::Keyword(_))
    }

    pub fn into_value(self) -> Value {
        match self {
            Params::Positional(args) => Value::Array(args),
            Params::Keyword(kwargs) => Value::Object(kwargs),
        }
    }

    /// Deserialize the arguments into a typed value: a tuple or sequence for
    /// positional params, a struct or map for keyword params.
    pub fn parse<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.into_value())
    }
}

impl From<Vec<Value>> for Params {
    fn from(args: Vec<Value>) -> Self {
        Params::Positional(args)
    }
}

impl From<Map<String, Value>> for Params {
    fn from(kwargs: Map<String, Value>) -> Self {
        Params::Keyword(kwargs)
    }
}

/// A request frame. Without an `id` it is a notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
}

impl Request {
    pub fn new(id: Option<RequestId>, method: impl Into<String>, params: Option<Params>) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            method: method.into(),
            id,
            params: params.filter(|p| !p.is_empty()),
        }
    }

    /// A request expecting a response correlated by `id`
    pub fn call(id: RequestId, method: impl Into<String>, params: Option<Params>) -> Self {
        Self::new(Some(id), method, params)
    }

    /// A fire-and-forget request
    pub fn notification(method: impl Into<String>, params: Option<Params>) -> Self {
        Self::new(None, method, params)
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}
