//! Transport binding seam
//!
//! The engine never owns a concrete transport. A collaborator supplies an
//! implementation of [`Transport`]: outbound text goes through
//! [`Transport::send`], and inbound text is handed to the [`InboundSink`]
//! the engine installs through [`Transport::bind`]. Connection, reconnect
//! and close semantics stay with the collaborator.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::TransportError;

/// Capability the engine requires from a message-oriented transport
pub trait Transport: Send + Sync {
    /// Fire-and-forget write of one frame
    fn send(&self, frame: String) -> Result<(), TransportError>;

    /// Install the receive path. A later call replaces the earlier sink.
    fn bind(&self, sink: InboundSink);
}

/// Engine-side entry point for inbound frames
#[derive(Debug, Clone)]
pub struct InboundSink {
    tx: mpsc::UnboundedSender<String>,
}

impl InboundSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }

    /// Hand one inbound frame to the engine. Returns false once the engine
    /// has released this binding.
    pub fn deliver(&self, frame: impl Into<String>) -> bool {
        self.tx.send(frame.into()).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// In-memory binding backed by channels.
///
/// Outbound frames are queued on the receiver returned by
/// [`ChannelTransport::new`]; inbound frames are injected with
/// [`ChannelTransport::inject`]. Useful for wiring two engines together and
/// for observing traffic in tests.
#[derive(Debug)]
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<String>,
    sink: Mutex<Option<InboundSink>>,
}

impl ChannelTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            outbound,
            sink: Mutex::new(None),
        });
        (transport, rx)
    }

    /// Deliver `frame` as if it had arrived from the peer
    pub fn inject(&self, frame: impl Into<String>) -> bool {
        match self.sink.lock().as_ref() {
            Some(sink) => sink.deliver(frame),
            None => {
                debug!("no receive path bound; dropping injected frame");
                false
            }
        }
    }

    pub fn is_bound(&self) -> bool {
        self.sink
            .lock()
            .as_ref()
            .is_some_and(|sink| !sink.is_closed())
    }
}

impl Transport for ChannelTransport {
    fn send(&self, frame: String) -> Result<(), TransportError> {
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }

    fn bind(&self, sink: InboundSink) {
        *self.sink.lock() = Some(sink);
    }
}
