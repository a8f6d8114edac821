//! # Bidirectional JSON-RPC 2.0 Engine
//!
//! A transport-agnostic JSON-RPC 2.0 core for long-lived, message-oriented
//! connections where both peers may call each other. The crate covers the
//! protocol state only; connecting, reconnecting and authenticating belong
//! to whoever supplies the [`Transport`].
//!
//! ## Features
//! - Outbound calls correlated to inbound responses by identifier
//! - Positional and keyword calls, notifications and atomic batches
//! - Inbound method dispatch with errors reported as JSON-RPC error frames
//! - Silent, logged handling of malformed or unroutable inbound traffic
//! - Optional delimiter-framed stream transport (`stream` feature)
//!
//! ```rust,no_run
//! use hostlink_json_rpc::prelude::*;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = JsonRpcEngine::new();
//! let (transport, _outbound) = ChannelTransport::new();
//! engine.register_transport(transport);
//!
//! engine.register_fn("notify_status_update", |params| async move {
//!     tracing::info!(?params, "status update");
//!     Ok(serde_json::Value::Null)
//! });
//!
//! let info = engine.call("server.info", vec![]).await?;
//! engine.notify("client.ping", vec![json!(1)])?;
//! # let _ = info;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod registry;
pub mod request;
pub mod response;
#[cfg(feature = "stream")]
pub mod stream;
pub mod transport;
pub mod types;

pub mod prelude;

// Re-export main types
pub use batch::{BatchItem, BatchKind, BatchResponse};
pub use codec::{Frame, Incoming};
pub use config::{EngineConfig, StreamConfig};
pub use dispatch::{DispatchTable, FunctionHandler, MethodHandler};
pub use engine::{BatchFuture, JsonRpcEngine, ResponseFuture};
pub use error::{
    BatchItemError, ErrorObject, FrameError, HandlerError, JsonRpcErrorCode, RpcError, RpcResult,
    TransportError,
};
pub use registry::CorrelationRegistry;
pub use request::{Params, Request};
pub use response::{ErrorResponse, Response};
#[cfg(feature = "stream")]
pub use stream::StreamTransport;
pub use transport::{ChannelTransport, InboundSink, Transport};
pub use types::{JsonRpcVersion, RequestId};

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Error codes used on the wire
pub mod error_codes {
    /// Inbound params were neither an array nor an object
    pub const INVALID_PARAMS: i64 = -32602;

    /// Uncaught failure inside a dispatched method
    pub const SERVER_ERROR: i64 = -31000;
}
