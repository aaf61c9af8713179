//! The channel handle: the uniform outbound write/close capability.
//!
//! A [`ChannelHandle`] wraps one open, live connection to a remote peer and
//! owns no protocol knowledge. Liveness always delegates to the underlying
//! socket and is never cached here, which is what keeps a handle from
//! reporting open after a concurrent close.
//!
//! Writes are fire-and-forget: the send runs on a spawned task and failures
//! are logged, never raised, because by the time a write fails the caller
//! has typically moved on. Callers that need delivery confirmation await
//! the returned [`WriteReceipt`] instead.

use std::sync::Arc;

use bytes::Bytes;
use strand_core::errors::SocketError;
use strand_core::payload::MessagePayload;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Transport-side socket capability consumed by the handle.
///
/// Implemented by the live transport (`strand-server`) and by test doubles.
/// `is_open` must reflect the connection's own liveness, not a cached copy.
#[async_trait::async_trait]
pub trait ChannelSocket: Send + Sync {
    /// Whether the underlying connection is currently open.
    fn is_open(&self) -> bool;

    /// Send a text frame.
    async fn send_text(&self, text: String) -> Result<(), SocketError>;

    /// Send a binary frame.
    async fn send_binary(&self, data: Bytes) -> Result<(), SocketError>;

    /// Close the underlying connection.
    async fn close(&self) -> Result<(), SocketError>;
}

/// What became of one fire-and-forget write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Handed to the transport successfully.
    Sent,
    /// The transport reported a failure (already logged).
    Failed,
    /// The channel was closed at call time; nothing was sent.
    Skipped,
}

/// Opt-in completion observation for a write.
///
/// Dropping the receipt is the default fire-and-forget path; awaiting
/// [`WriteReceipt::outcome`] reports what the transport did.
#[derive(Debug)]
pub struct WriteReceipt {
    rx: oneshot::Receiver<WriteOutcome>,
}

impl WriteReceipt {
    fn resolved(outcome: WriteOutcome) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Self { rx }
    }

    /// Wait for the write to complete.
    pub async fn outcome(self) -> WriteOutcome {
        // A dropped sender means the send task died before reporting;
        // indistinguishable from a transport failure for the caller.
        self.rx.await.unwrap_or(WriteOutcome::Failed)
    }
}

/// One open bidirectional channel to a remote peer.
///
/// Cheap to clone; all clones share the same socket.
#[derive(Clone)]
pub struct ChannelHandle {
    id: Arc<str>,
    socket: Arc<dyn ChannelSocket>,
}

impl ChannelHandle {
    /// Wrap a socket in a handle with a fresh channel id.
    #[must_use]
    pub fn new(socket: Arc<dyn ChannelSocket>) -> Self {
        Self {
            id: Arc::from(Uuid::now_v7().to_string()),
            socket,
        }
    }

    /// The channel id (for logs and correlation).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the channel is open. Delegates to the socket every call.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.socket.is_open()
    }

    /// Write a text frame. No-op (not an error) when the channel is closed.
    pub fn write_text(&self, text: impl Into<String>) -> WriteReceipt {
        self.write(MessagePayload::Text(text.into()))
    }

    /// Write a binary frame. No-op (not an error) when the channel is closed.
    pub fn write_binary(&self, data: impl Into<Bytes>) -> WriteReceipt {
        self.write(MessagePayload::Binary(data.into()))
    }

    /// Write a payload. No-op (not an error) when the channel is closed:
    /// a connection may close concurrently with an in-flight send, and
    /// teardown is terminal anyway.
    pub fn write(&self, payload: MessagePayload) -> WriteReceipt {
        if !self.is_open() {
            trace!(channel_id = %self.id, "skipping write on closed channel");
            return WriteReceipt::resolved(WriteOutcome::Skipped);
        }

        let (tx, rx) = oneshot::channel();
        let socket = Arc::clone(&self.socket);
        let id = Arc::clone(&self.id);
        drop(tokio::spawn(async move {
            let result = match payload {
                MessagePayload::Text(text) => socket.send_text(text).await,
                MessagePayload::Binary(data) => socket.send_binary(data).await,
            };
            let outcome = match result {
                Ok(()) => WriteOutcome::Sent,
                Err(e) => {
                    metrics::counter!("channel_write_failures_total").increment(1);
                    warn!(channel_id = %id, error = %e, "write to channel failed");
                    WriteOutcome::Failed
                }
            };
            let _ = tx.send(outcome);
        }));
        WriteReceipt { rx }
    }

    /// Close the channel. Idempotent; failures are logged, never propagated,
    /// since close runs from cleanup paths that must not themselves fail.
    pub async fn close(&self) {
        if !self.is_open() {
            return;
        }
        trace!(channel_id = %self.id, "closing channel");
        if let Err(e) = self.socket.close().await {
            debug!(channel_id = %self.id, error = %e, "channel close failed");
        }
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}
