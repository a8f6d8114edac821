//! Inbound method dispatch

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ErrorObject, HandlerError};
use crate::request::Params;

/// A method callable by the remote peer
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Handle one invocation. Positional params arrive as
    /// [`Params::Positional`] (empty when the frame carried none), keyword
    /// params as [`Params::Keyword`].
    async fn handle(&self, params: Params) -> Result<Value, HandlerError>;
}

/// Adapts an async closure into a [`MethodHandler`]
pub struct FunctionHandler<F> {
    handler_fn: F,
}

impl<F, Fut> FunctionHandler<F>
where
    F: Fn(Params) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    pub fn new(handler_fn: F) -> Self {
        Self { handler_fn }
    }
}

#[async_trait]
impl<F, Fut> MethodHandler for FunctionHandler<F>
where
    F: Fn(Params) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn handle(&self, params: Params) -> Result<Value, HandlerError> {
        (self.handler_fn)(params).await
    }
}

/// Method name to handler mapping. The last registration for a name wins.
#[derive(Default, Clone)]
pub struct DispatchTable {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_method<H>(&mut self, name: impl Into<String>, handler: H)
    where
        H: MethodHandler + 'static,
    {
        let name = name.into();
        if self.handlers.insert(name.clone(), Arc::new(handler)).is_some() {
            debug!(method = %name, "replaced existing method registration");
        }
    }

    pub fn unregister_method(&mut self, name: &str) -> bool {
        self.handlers.remove(name).is_some()
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn MethodHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn registered_methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.handlers.keys().cloned().collect();
        methods.sort();
        methods
    }

    /// Invoke `name` with already-classified params.
    ///
    /// Returns `None` when nothing is registered under `name`; the miss is
    /// logged and no reply must be produced for it.
    pub async fn invoke(
        &self,
        name: &str,
        params: Option<Params>,
    ) -> Option<Result<Value, ErrorObject>> {
        match self.lookup(name) {
            Some(handler) => Some(call_handler(handler.as_ref(), name, params).await),
            None => {
                warn!(method = %name, "no method registered; ignoring inbound call");
                None
            }
        }
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTable")
            .field("methods", &self.registered_methods())
            .finish()
    }
}

/// Run a handler, converting its error or panic into a server error object
pub async fn call_handler(
    handler: &dyn MethodHandler,
    method: &str,
    params: Option<Params>,
) -> Result<Value, ErrorObject> {
    let params = params.unwrap_or_default();
    match AssertUnwindSafe(handler.handle(params)).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            debug!(method = %method, error = %e, "method handler failed");
            Err(e.to_error_object())
        }
        Err(panic) => {
            let message = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                String::new()
            };
            warn!(method = %method, panic = %message, "method handler panicked");
            Err(HandlerError::Panicked(message).to_error_object())
        }
    }
}
