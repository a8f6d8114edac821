//! Identifier and protocol tag shared by every frame

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Correlation identifier of a request.
///
/// The engine only ever allocates decimal strings (`"0"`, `"1"`, ...). A
/// peer may use integers instead; those are kept as-is so the reply echoes
/// exactly what was received.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl RequestId {
    /// Identifier for the `n`th allocation of an engine
    pub fn sequential(n: u64) -> Self {
        RequestId::String(n.to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RequestId::String(s) => Some(s),
            RequestId::Number(_) => None,
        }
    }

    /// Integer value, reading string identifiers as decimal
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            RequestId::String(s) => s.parse().ok(),
            RequestId::Number(n) => u64::try_from(*n).ok(),
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::String(s) => f.write_str(s),
            RequestId::Number(n) => n.fmt(f),
        }
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_owned())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

/// The `jsonrpc` member. Only `"2.0"` is spoken; anything else fails to
/// deserialize, which the codec reports as a protocol mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonRpcVersion {
    #[default]
    V2_0,
}

impl JsonRpcVersion {
    pub fn as_str(&self) -> &'static str {
        crate::JSONRPC_VERSION
    }
}

impl fmt::Display for JsonRpcVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for JsonRpcVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = serde_json::Value::deserialize(deserializer)?;
        match tag.as_str() {
            Some(crate::JSONRPC_VERSION) => Ok(JsonRpcVersion::V2_0),
            _ => Err(serde::de::Error::custom(format!(
                "unsupported protocol tag {}",
                tag
            ))),
        }
    }
}
