//! The bidirectional JSON-RPC engine
//!
//! [`JsonRpcEngine`] owns one correlation registry and one dispatch table and
//! borrows a [`Transport`]. Outbound operations encode and send their frame
//! synchronously, so frames leave in the order the operations are invoked;
//! correlated calls hand back a future that settles when the matching
//! response is routed through [`JsonRpcEngine::process_received`].
//!
//! Inbound frames from a bound transport are taken one at a time, in
//! delivery order, by a pump task. Responses settle their pending call right
//! there. Requests and notifications start their method handler on a task of
//! its own, in the same order, so a handler is free to await calls on the
//! engine while the pump keeps routing.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

use crate::batch::{BatchItem, BatchKind, BatchResponse};
use crate::codec::{self, Frame, Incoming};
use crate::config::EngineConfig;
use crate::dispatch::{self, DispatchTable, FunctionHandler, MethodHandler};
use crate::error::{BatchItemError, ErrorObject, FrameError, HandlerError, RpcError, RpcResult};
use crate::registry::{Completion, CorrelationRegistry};
use crate::request::{Params, Request};
use crate::response::{ErrorResponse, Response};
use crate::transport::{InboundSink, Transport};
use crate::types::RequestId;

/// Settles with the result of one correlated call
pub type ResponseFuture = BoxFuture<'static, RpcResult<Value>>;

/// Settles once every request of a batch has settled, or with the first failure
pub type BatchFuture = BoxFuture<'static, RpcResult<Vec<BatchResponse>>>;

/// Handle to one engine instance. Clones share the same state; separate
/// engines share nothing.
#[derive(Clone)]
pub struct JsonRpcEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    registry: Mutex<CorrelationRegistry>,
    dispatch: RwLock<DispatchTable>,
    binding: Mutex<Option<Binding>>,
}

struct Binding {
    transport: Arc<dyn Transport>,
    pump: JoinHandle<()>,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Some(binding) = self.binding.get_mut().take() {
            binding.pump.abort();
        }
    }
}

impl JsonRpcEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                registry: Mutex::new(CorrelationRegistry::new()),
                dispatch: RwLock::new(DispatchTable::new()),
                binding: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // ---- transport binding ----

    /// Bind `transport`, replacing any earlier binding.
    ///
    /// Installs the engine's inbound sink on the transport and starts the
    /// task that processes inbound frames. Must be called within a Tokio
    /// runtime.
    pub fn register_transport(&self, transport: Arc<dyn Transport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        transport.bind(InboundSink::new(tx));
        let pump = tokio::spawn(pump_inbound(Arc::downgrade(&self.inner), rx));

        let previous = self
            .inner
            .binding
            .lock()
            .replace(Binding { transport, pump });
        match previous {
            Some(previous) => {
                previous.pump.abort();
                info!("replaced transport binding");
            }
            None => info!("transport bound"),
        }
    }

    /// Release the current transport. Returns false if none was bound.
    pub fn unregister_transport(&self) -> bool {
        match self.inner.binding.lock().take() {
            Some(binding) => {
                binding.pump.abort();
                info!("transport unbound");
                true
            }
            None => false,
        }
    }

    pub fn has_transport(&self) -> bool {
        self.inner.binding.lock().is_some()
    }

    // ---- dispatch table ----

    /// Register a callable for inbound invocations of `name`. The last
    /// registration for a name wins.
    pub fn register_method<H>(&self, name: impl Into<String>, handler: H)
    where
        H: MethodHandler + 'static,
    {
        self.inner.dispatch.write().register_method(name, handler);
    }

    /// Register an async closure for inbound invocations of `name`
    pub fn register_fn<F, Fut>(&self, name: impl Into<String>, handler_fn: F)
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.register_method(name, FunctionHandler::new(handler_fn));
    }

    pub fn unregister_method(&self, name: &str) -> bool {
        self.inner.dispatch.write().unregister_method(name)
    }

    pub fn registered_methods(&self) -> Vec<String> {
        self.inner.dispatch.read().registered_methods()
    }

    // ---- outbound ----

    /// Call `method` with positional arguments
    pub fn call(&self, method: &str, args: Vec<Value>) -> ResponseFuture {
        self.call_with_params(method, Params::from_args(args))
    }

    /// Call `method` with keyword arguments
    pub fn call_with_kwargs(&self, method: &str, kwargs: Map<String, Value>) -> ResponseFuture {
        self.call_with_params(method, Params::from_kwargs(kwargs))
    }

    /// Call `method` with already-built params. The request frame is sent
    /// before this returns.
    pub fn call_with_params(&self, method: &str, params: Option<Params>) -> ResponseFuture {
        if !self.has_transport() {
            return future::ready(Err(RpcError::TransportUnavailable)).boxed();
        }

        let (id, completion) = {
            let mut registry = self.inner.registry.lock();
            let id = registry.next_id();
            let completion = registry.register(id.clone());
            (id, completion)
        };

        let request = Request::call(id.clone(), method, params);
        if let Err(e) = self.send_frame(&Frame::Request(request)) {
            self.inner.registry.lock().cancel(&id);
            return future::ready(Err(e)).boxed();
        }
        self.await_completion(id, completion)
    }

    /// Send a notification with positional arguments. No completion is
    /// registered and nothing is awaited.
    pub fn notify(&self, method: &str, args: Vec<Value>) -> RpcResult<()> {
        self.send_frame(&Frame::Request(Request::notification(
            method,
            Params::from_args(args),
        )))
    }

    /// Send a notification with keyword arguments
    pub fn notify_with_kwargs(&self, method: &str, kwargs: Map<String, Value>) -> RpcResult<()> {
        self.send_frame(&Frame::Request(Request::notification(
            method,
            Params::from_kwargs(kwargs),
        )))
    }

    /// Send `items` as one batch frame.
    ///
    /// Only request entries get identifiers. The returned future resolves
    /// with one [`BatchResponse`] per request entry, in batch order, once all
    /// of them have settled; it fails with the first request that fails,
    /// wrapped in [`RpcError::BatchItem`].
    pub fn send_batch(&self, items: Vec<BatchItem>) -> BatchFuture {
        if items.is_empty() {
            return future::ready(Ok(Vec::new())).boxed();
        }
        if !self.has_transport() {
            return future::ready(Err(RpcError::TransportUnavailable)).boxed();
        }

        let mut frames = Vec::with_capacity(items.len());
        let mut waiting = Vec::new();
        {
            let mut registry = self.inner.registry.lock();
            for (index, item) in items.into_iter().enumerate() {
                let id = match item.kind {
                    BatchKind::Request => {
                        let id = registry.next_id();
                        let completion = registry.register(id.clone());
                        waiting.push((index, item.method.clone(), id.clone(), completion));
                        Some(id)
                    }
                    BatchKind::Notification => None,
                };
                frames.push(Frame::Request(Request::new(id, item.method, item.params)));
            }
        }

        let sent = codec::encode_batch(&frames)
            .map_err(RpcError::from)
            .and_then(|text| {
                debug!(frames = frames.len(), "sending batch");
                self.send_text(text)
            });
        if let Err(e) = sent {
            let mut registry = self.inner.registry.lock();
            for (_, _, id, _) in &waiting {
                registry.cancel(id);
            }
            return future::ready(Err(e)).boxed();
        }

        let settled = waiting
            .into_iter()
            .map(|(index, method, id, completion)| {
                self.await_completion(id, completion)
                    .map(move |outcome| match outcome {
                        Ok(result) => Ok(BatchResponse {
                            method,
                            index,
                            result,
                        }),
                        Err(error) => Err(RpcError::from(BatchItemError {
                            method,
                            index,
                            error,
                        })),
                    })
            });
        future::try_join_all(settled).boxed()
    }

    /// Drop the pending completion for `id`. Its caller observes
    /// [`RpcError::Cancelled`]; a late response becomes an orphan.
    pub fn cancel(&self, id: &RequestId) -> bool {
        self.inner.registry.lock().cancel(id)
    }

    /// Number of calls still waiting for a response
    pub fn pending_calls(&self) -> usize {
        self.inner.registry.lock().len()
    }

    // ---- inbound ----

    /// Process one inbound text frame (single or batch).
    ///
    /// Only undecodable text is reported as an error. Frames that decode but
    /// are not valid JSON-RPC, responses without a pending call, and calls to
    /// unregistered methods are logged and dropped. Resolves once every
    /// handler started by `text` has finished and replied.
    pub async fn process_received(&self, text: &str) -> Result<(), FrameError> {
        let handlers = self.receive(text)?;
        future::join_all(handlers).await;
        Ok(())
    }

    /// Route `text` without waiting for the handlers it starts
    fn receive(&self, text: &str) -> Result<Vec<JoinHandle<()>>, FrameError> {
        let mut handlers = Vec::new();
        match codec::decode(text)? {
            Incoming::Single(value) => handlers.extend(self.route(value)),
            Incoming::Batch(values) => {
                debug!(items = values.len(), "processing inbound batch");
                for value in values {
                    handlers.extend(self.route(value));
                }
            }
        }
        Ok(handlers)
    }

    fn route(&self, value: Value) -> Option<JoinHandle<()>> {
        match codec::classify(value) {
            Ok(Frame::Response(response)) => self.complete(response.id, Ok(response.result)),
            Ok(Frame::Error(response)) => self.complete(response.id, Err(response.error)),
            Ok(Frame::Request(request)) => return self.serve(request),
            Err(FrameError::InvalidParams { id, method }) => self.reject_params(id, method),
            Err(e) => warn!(error = %e, "dropping invalid inbound frame"),
        }
        None
    }

    fn complete(&self, id: Option<RequestId>, outcome: Result<Value, ErrorObject>) {
        let Some(id) = id else {
            warn!("dropping response without identifier");
            return;
        };
        debug!(id = %id, error = outcome.is_err(), "routing response");
        let mut registry = self.inner.registry.lock();
        match outcome {
            Ok(result) => registry.resolve(&id, result),
            Err(error) => registry.reject(&id, error.into()),
        };
    }

    fn serve(&self, request: Request) -> Option<JoinHandle<()>> {
        let handler = self.inner.dispatch.read().lookup(&request.method);
        let Some(handler) = handler else {
            warn!(method = %request.method, "no method registered; ignoring inbound call");
            return None;
        };
        debug!(method = %request.method, notification = request.is_notification(), "dispatching");

        let engine = self.clone();
        let task = async move {
            let outcome =
                dispatch::call_handler(handler.as_ref(), &request.method, request.params).await;
            engine.reply(request.id, &request.method, outcome);
        };
        Some(tokio::spawn(task.in_current_span()))
    }

    fn reject_params(&self, id: Option<RequestId>, method: String) {
        if !self.inner.dispatch.read().contains(&method) {
            warn!(method = %method, "no method registered; ignoring inbound call");
            return;
        }
        warn!(method = %method, "inbound params are neither positional nor keyword");
        self.reply(id, &method, Err(ErrorObject::invalid_params()));
    }

    fn reply(&self, id: Option<RequestId>, method: &str, outcome: Result<Value, ErrorObject>) {
        let Some(id) = id else {
            if let Err(error) = outcome {
                debug!(method = %method, error = %error, "notification handler failed");
            }
            return;
        };
        let frame = match outcome {
            Ok(result) => Frame::Response(Response::new(Some(id), result)),
            Err(error) => Frame::Error(ErrorResponse::new(Some(id), error)),
        };
        if let Err(e) = self.send_frame(&frame) {
            warn!(method = %method, error = %e, "failed to send reply");
        }
    }

    // ---- plumbing ----

    fn send_frame(&self, frame: &Frame) -> RpcResult<()> {
        let text = codec::encode(frame)?;
        debug!(frame = %text, "sending frame");
        self.send_text(text)
    }

    fn send_text(&self, text: String) -> RpcResult<()> {
        let binding = self.inner.binding.lock();
        let binding = binding.as_ref().ok_or(RpcError::TransportUnavailable)?;
        binding.transport.send(text)?;
        Ok(())
    }

    fn await_completion(&self, id: RequestId, completion: Completion) -> ResponseFuture {
        let inner = Arc::downgrade(&self.inner);
        let timeout = self.inner.config.call_timeout;
        async move {
            let settled = match timeout {
                None => completion.await,
                Some(limit) => match tokio::time::timeout(limit, completion).await {
                    Ok(settled) => settled,
                    Err(_) => {
                        if let Some(inner) = inner.upgrade() {
                            inner.registry.lock().cancel(&id);
                        }
                        warn!(id = %id, "call timed out");
                        return Err(RpcError::Timeout);
                    }
                },
            };
            settled.unwrap_or(Err(RpcError::Cancelled))
        }
        .boxed()
    }
}

impl Default for JsonRpcEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for JsonRpcEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonRpcEngine")
            .field("config", &self.inner.config)
            .field("pending_calls", &self.pending_calls())
            .field("methods", &self.registered_methods())
            .field("transport_bound", &self.has_transport())
            .finish()
    }
}

async fn pump_inbound(inner: Weak<EngineInner>, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(text) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let engine = JsonRpcEngine { inner };
        if let Err(e) = engine.receive(&text) {
            warn!(error = %e, "dropping undecodable inbound frame");
        }
    }
    debug!("inbound pump stopped");
}
