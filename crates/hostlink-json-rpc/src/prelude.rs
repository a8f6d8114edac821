//! # JSON-RPC Engine Prelude
//!
//! Convenient re-exports of the most commonly used types.
//!
//! ```rust
//! use hostlink_json_rpc::prelude::*;
//! ```

pub use crate::batch::{BatchItem, BatchKind, BatchResponse};
pub use crate::config::{EngineConfig, StreamConfig};
pub use crate::dispatch::{FunctionHandler, MethodHandler};
pub use crate::engine::JsonRpcEngine;
pub use crate::error::{ErrorObject, HandlerError, RpcError, RpcResult};
pub use crate::request::Params;
#[cfg(feature = "stream")]
pub use crate::stream::StreamTransport;
pub use crate::transport::{ChannelTransport, InboundSink, Transport};
pub use crate::types::RequestId;

pub use crate::error_codes::*;
