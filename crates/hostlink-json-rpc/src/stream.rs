//! Delimiter-framed transport over a byte stream
//!
//! Each frame on the wire is UTF-8 JSON text followed by a single delimiter
//! byte (ETX, `0x03`, by default), the framing the host uses on its
//! Unix-domain socket.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, FramedRead, FramedWrite};
use tracing::{debug, warn};

use crate::config::StreamConfig;
use crate::error::TransportError;
use crate::transport::{InboundSink, Transport};

/// [`Transport`] over any `AsyncRead + AsyncWrite` stream.
///
/// A writer task drains outbound frames onto the stream; a reader task
/// splits inbound bytes on the delimiter and hands each frame to the bound
/// sink. Reconnecting is left to the owner, which can build a new
/// `StreamTransport` and register it with the engine.
pub struct StreamTransport {
    outbound: mpsc::UnboundedSender<String>,
    sink: Arc<Mutex<Option<InboundSink>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StreamTransport {
    /// Split `stream` and start the reader and writer tasks. Must be called
    /// within a Tokio runtime.
    pub fn spawn<S>(stream: S, config: StreamConfig) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let codec = || {
            AnyDelimiterCodec::new_with_max_length(
                vec![config.delimiter],
                vec![config.delimiter],
                config.max_frame_len,
            )
        };
        let reader = FramedRead::new(read_half, FrameDecoder { inner: codec() });
        let writer = FramedWrite::new(write_half, codec());

        let (outbound, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(Mutex::new(None));

        let tasks = vec![
            tokio::spawn(write_frames(writer, rx)),
            tokio::spawn(read_frames(reader, sink.clone())),
        ];

        Arc::new(Self {
            outbound,
            sink,
            tasks: Mutex::new(tasks),
        })
    }

    /// Stop both tasks. Later sends fail with [`TransportError::Closed`].
    pub fn close(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

impl Transport for StreamTransport {
    fn send(&self, frame: String) -> Result<(), TransportError> {
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }

    fn bind(&self, sink: InboundSink) {
        *self.sink.lock() = Some(sink);
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// One unit produced by the reader
#[derive(Debug, PartialEq)]
enum Chunk {
    Frame(Bytes),
    /// A frame longer than the configured limit; its bytes are discarded up
    /// to the next delimiter
    Oversized,
}

/// Delimiter decoder that reports an over-long frame as a [`Chunk`] rather
/// than an error, so the stream keeps being read past it.
struct FrameDecoder {
    inner: AnyDelimiterCodec,
}

impl Decoder for FrameDecoder {
    type Item = Chunk;
    type Error = AnyDelimiterCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Chunk>, Self::Error> {
        match self.inner.decode(buf) {
            Ok(frame) => Ok(frame.map(Chunk::Frame)),
            Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => Ok(Some(Chunk::Oversized)),
            Err(e) => Err(e),
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Chunk>, Self::Error> {
        match self.inner.decode_eof(buf) {
            Ok(frame) => Ok(frame.map(Chunk::Frame)),
            Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => Ok(Some(Chunk::Oversized)),
            Err(e) => Err(e),
        }
    }
}

async fn write_frames<W>(
    mut writer: FramedWrite<W, AnyDelimiterCodec>,
    mut rx: mpsc::UnboundedReceiver<String>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        if let Err(e) = writer.send(frame).await {
            warn!(error = %e, "stream write failed; stopping writer");
            break;
        }
    }
    debug!("stream writer stopped");
}

async fn read_frames<R>(
    mut reader: FramedRead<R, FrameDecoder>,
    sink: Arc<Mutex<Option<InboundSink>>>,
) where
    R: AsyncRead + Unpin,
{
    while let Some(chunk) = reader.next().await {
        let chunk = match chunk {
            Ok(Chunk::Frame(chunk)) => chunk,
            Ok(Chunk::Oversized) => {
                warn!(
                    max_frame_len = reader.decoder().inner.max_length(),
                    "skipping inbound frame over the length limit"
                );
                continue;
            }
            Err(e) => {
                warn!(error = %e, "stream read failed; stopping reader");
                break;
            }
        };
        let text = match String::from_utf8(chunk.to_vec()) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "skipping frame that is not valid UTF-8");
                continue;
            }
        };
        if text.trim().is_empty() {
            continue;
        }
        let delivered = sink.lock().as_ref().is_some_and(|sink| sink.deliver(text));
        if !delivered {
            debug!("no receive path bound; dropping inbound frame");
        }
    }
    debug!("stream reader stopped");
}
