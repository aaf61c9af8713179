//! Live channel socket over an axum WebSocket.
//!
//! The sink half of the WebSocket is owned by a dedicated writer task; the
//! socket forwards frames to it over a bounded queue and reports each
//! frame's fate back through a per-frame ack. Liveness is a shared flag
//! owned by the connection tasks (the reader flips it when the stream
//! ends, the writer when a send fails), so `is_open` always reflects the
//! connection's actual state rather than a handle-side cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use bytes::Bytes;
use futures::SinkExt;
use futures::stream::SplitSink;
use strand_core::close::CloseCode;
use strand_core::errors::SocketError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

/// Depth of the outbound frame queue per connection.
const OUTBOUND_QUEUE_DEPTH: usize = 64;

enum OutboundFrame {
    Text(String),
    Binary(Bytes),
    Close,
}

struct Outbound {
    frame: OutboundFrame,
    ack: oneshot::Sender<Result<(), SocketError>>,
}

/// `ChannelSocket` implementation over a live axum WebSocket.
pub struct AxumSocket {
    tx: mpsc::Sender<Outbound>,
    open: Arc<AtomicBool>,
}

impl AxumSocket {
    /// Take ownership of the WebSocket's sink half, spawning the writer
    /// task. Returns the socket and the shared liveness flag for the
    /// reader loop to maintain.
    #[must_use]
    pub fn start(sink: SplitSink<WebSocket, Message>) -> (Arc<Self>, Arc<AtomicBool>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let open = Arc::new(AtomicBool::new(true));
        drop(tokio::spawn(run_writer(sink, rx, Arc::clone(&open))));
        (
            Arc::new(Self {
                tx,
                open: Arc::clone(&open),
            }),
            open,
        )
    }

    async fn enqueue(&self, frame: OutboundFrame) -> Result<(), SocketError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(SocketError::Closed);
        }
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Outbound { frame, ack })
            .await
            .map_err(|_| SocketError::Closed)?;
        // A dropped ack means the writer task died mid-frame.
        done.await.unwrap_or(Err(SocketError::Closed))
    }
}

#[async_trait::async_trait]
impl strand_bridge::handle::ChannelSocket for AxumSocket {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn send_text(&self, text: String) -> Result<(), SocketError> {
        self.enqueue(OutboundFrame::Text(text)).await
    }

    async fn send_binary(&self, data: Bytes) -> Result<(), SocketError> {
        self.enqueue(OutboundFrame::Binary(data)).await
    }

    async fn close(&self) -> Result<(), SocketError> {
        // Mark closed first so racing writes no-op instead of queueing
        // behind the close frame.
        self.open.store(false, Ordering::Release);
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Outbound {
                frame: OutboundFrame::Close,
                ack,
            })
            .await
            .map_err(|_| SocketError::Closed)?;
        done.await.unwrap_or(Err(SocketError::Closed))
    }
}

async fn run_writer(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Outbound>,
    open: Arc<AtomicBool>,
) {
    while let Some(outbound) = rx.recv().await {
        let closing = matches!(outbound.frame, OutboundFrame::Close);
        let message = match outbound.frame {
            OutboundFrame::Text(text) => Message::Text(Utf8Bytes::from(text)),
            OutboundFrame::Binary(data) => Message::Binary(data),
            OutboundFrame::Close => Message::Close(Some(CloseFrame {
                code: CloseCode::NORMAL.as_u16(),
                reason: Utf8Bytes::from_static("bye"),
            })),
        };

        let result = sink.send(message).await.map_err(|e| {
            open.store(false, Ordering::Release);
            SocketError::Transport(e.to_string())
        });
        let failed = result.is_err();
        let _ = outbound.ack.send(result);

        if closing || failed {
            break;
        }
    }
    open.store(false, Ordering::Release);
    if let Err(e) = sink.close().await {
        trace!(error = %e, "sink close after writer shutdown failed");
    }
    debug!("channel writer task finished");
}
