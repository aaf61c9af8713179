//! Capabilities consumed by the bridge.
//!
//! The bridge does not implement the higher-level realtime protocol or the
//! handshake policy; it consumes both through these seams. The surrounding
//! framework supplies implementations at startup.

use async_trait::async_trait;
use bytes::Bytes;
use strand_core::close::CloseCode;
use strand_core::context::ContextSnapshot;
use strand_core::errors::{BoxError, PredicateError};
use strand_core::payload::MessagePayload;

use crate::handle::{ChannelHandle, WriteReceipt};

/// The higher-level consumer of channel events.
///
/// Receives open/message/close and the channel handle; implements framing,
/// multiplexing, and application dispatch. The bridge's sole job is to
/// deliver events here correctly: in order and exactly once.
#[async_trait]
pub trait ProtocolProcessor: Send + Sync {
    /// A channel opened. `request` is the authoritative post-upgrade
    /// snapshot; `response` is an outbound write view over the same channel.
    ///
    /// An error here is logged by the adapter and the channel stays open,
    /// but the processor is considered uninitialized for this channel.
    async fn open(
        &self,
        channel: ChannelHandle,
        request: ContextSnapshot,
        response: ChannelResponse,
    ) -> Result<(), BoxError>;

    /// An inbound text or binary frame, forwarded verbatim.
    async fn invoke_protocol(&self, channel: &ChannelHandle, payload: MessagePayload);

    /// The channel closed with the given code.
    async fn close(&self, channel: &ChannelHandle, code: CloseCode);
}

/// The handshake policy evaluated during upgrade negotiation.
///
/// Invoked synchronously with the pre-upgrade snapshot. `Ok(false)` rejects
/// the upgrade; `Err` is logged and treated exactly like a rejection.
pub trait HandshakePredicate: Send + Sync {
    /// Decide whether this exchange may upgrade to a channel.
    fn handshake(&self, context: &ContextSnapshot) -> Result<bool, PredicateError>;
}

impl<F> HandshakePredicate for F
where
    F: Fn(&ContextSnapshot) -> Result<bool, PredicateError> + Send + Sync,
{
    fn handshake(&self, context: &ContextSnapshot) -> Result<bool, PredicateError> {
        self(context)
    }
}

/// Outbound write view handed to the processor at open time.
///
/// A thin wrapper over the channel's own handle, so the processor keeps the
/// (handle, request, response) contract without a second socket abstraction.
#[derive(Clone, Debug)]
pub struct ChannelResponse {
    handle: ChannelHandle,
}

impl ChannelResponse {
    /// Build a response view over a channel.
    #[must_use]
    pub fn new(handle: &ChannelHandle) -> Self {
        Self {
            handle: handle.clone(),
        }
    }

    /// Whether the channel behind this view is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.handle.is_open()
    }

    /// Write a text frame. Same soft-failure semantics as the handle.
    pub fn write_text(&self, text: impl Into<String>) -> WriteReceipt {
        self.handle.write_text(text)
    }

    /// Write a binary frame. Same soft-failure semantics as the handle.
    pub fn write_binary(&self, data: impl Into<Bytes>) -> WriteReceipt {
        self.handle.write_binary(data)
    }
}
