use serde_json::{Map, Value};

use crate::request::Params;

/// Whether a batch entry expects a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Request,
    Notification,
}

/// One entry of an outbound batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub method: String,
    pub kind: BatchKind,
    pub params: Option<Params>,
}

impl BatchItem {
    pub fn request(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            kind: BatchKind::Request,
            params: None,
        }
    }

    pub fn notification(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            kind: BatchKind::Notification,
            params: None,
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.params = Params::from_args(args);
        self
    }

    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.params = Params::from_kwargs(kwargs);
        self
    }

    pub fn expects_response(&self) -> bool {
        self.kind == BatchKind::Request
    }
}

/// Successful outcome of one batch request, re-correlated by position
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResponse {
    pub method: String,
    pub index: usize,
    pub result: Value,
}
