//! Configuration types for the engine and the stream transport

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deadline for correlated calls. `None` waits indefinitely; a pending
    /// entry then lives until its response arrives or it is cancelled.
    #[serde(with = "option_duration_serde")]
    pub call_timeout: Option<Duration>,
}

impl EngineConfig {
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

/// Framing configuration for delimiter-separated byte streams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Largest accepted inbound frame, in bytes
    pub max_frame_len: usize,

    /// Byte terminating every frame
    pub delimiter: u8,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_frame_len: 20 * 1024 * 1024,
            delimiter: 0x03,
        }
    }
}

// Durations are written as milliseconds
mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
