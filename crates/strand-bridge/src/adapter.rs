//! Transport event → protocol processor dispatch.
//!
//! The transport delivers events for a single channel strictly
//! sequentially; the adapter translates each into exactly one call into the
//! protocol processor and guarantees symmetric cleanup whether the channel
//! ends normally or abnormally. No locking is added for the per-channel
//! event sequence beyond the atomic markers needed for the exactly-once
//! close guarantee.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use metrics::counter;
use parking_lot::Mutex;
use strand_core::close::CloseCode;
use strand_core::context::ContextSnapshot;
use strand_core::payload::MessagePayload;
use tracing::{trace, warn};

use crate::handle::{ChannelHandle, ChannelSocket};
use crate::negotiator::ChannelCreationDirective;
use crate::processor::ChannelResponse;

/// One inbound transport event for a channel.
pub enum ChannelEvent {
    /// The channel opened; carries the live socket.
    Connect(Arc<dyn ChannelSocket>),
    /// A text frame.
    Text(String),
    /// A binary frame.
    Binary(Bytes),
    /// The peer (or transport) closed the channel.
    Close(CloseCode),
    /// The transport reported an error; treated as abnormal closure.
    Error(String),
}

impl std::fmt::Debug for ChannelEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect(_) => f.write_str("Connect(..)"),
            Self::Text(t) => f.debug_tuple("Text").field(&t.len()).finish(),
            Self::Binary(b) => f.debug_tuple("Binary").field(&b.len()).finish(),
            Self::Close(code) => f.debug_tuple("Close").field(code).finish(),
            Self::Error(e) => f.debug_tuple("Error").field(e).finish(),
        }
    }
}

/// Releases the adapter's snapshot when dropped.
///
/// Constructed around the close dispatch so snapshot resources are released
/// even if the processor's close callback fails or panics.
struct ReleaseGuard<'a> {
    snapshot: &'a Mutex<Option<ContextSnapshot>>,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut snapshot) = self.snapshot.lock().take() {
            snapshot.release();
        }
    }
}

/// Translates transport events into protocol processor calls for one
/// channel.
pub struct ChannelEventAdapter {
    directive: ChannelCreationDirective,
    handle: Mutex<Option<ChannelHandle>>,
    snapshot: Mutex<Option<ContextSnapshot>>,
    opened: AtomicBool,
    closed: AtomicBool,
}

impl ChannelEventAdapter {
    /// Build an adapter from an accepted negotiation's directive.
    #[must_use]
    pub fn new(directive: ChannelCreationDirective) -> Self {
        Self {
            directive,
            handle: Mutex::new(None),
            snapshot: Mutex::new(None),
            opened: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// The channel handle, once the connect event has arrived.
    #[must_use]
    pub fn handle(&self) -> Option<ChannelHandle> {
        self.handle.lock().clone()
    }

    /// Whether the processor's open callback succeeded for this channel.
    #[must_use]
    pub fn processor_initialized(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    /// Whether the close path has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Dispatch one transport event. Events after close are dropped.
    pub async fn dispatch(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connect(socket) => self.on_connect(socket).await,
            ChannelEvent::Text(text) => self.on_message(MessagePayload::Text(text)).await,
            ChannelEvent::Binary(data) => self.on_message(MessagePayload::Binary(data)).await,
            ChannelEvent::Close(code) => self.on_close(code).await,
            ChannelEvent::Error(error) => self.on_error(&error).await,
        }
    }

    async fn on_connect(&self, socket: Arc<dyn ChannelSocket>) {
        let handle = ChannelHandle::new(socket);
        trace!(channel_id = %handle.id(), "channel connect");
        *self.handle.lock() = Some(handle.clone());

        // The authoritative snapshot, captured the moment the channel
        // opens; degrades if the transport already recycled the original.
        let snapshot = self.directive.context().capture_late();
        *self.snapshot.lock() = Some(snapshot.clone());

        let response = ChannelResponse::new(&handle);
        match self
            .directive
            .processor()
            .open(handle.clone(), snapshot, response)
            .await
        {
            Ok(()) => {
                self.opened.store(true, Ordering::Release);
                counter!("channel_opens_total").increment(1);
            }
            Err(e) => {
                // The channel is left open so the peer is not silently
                // dropped; the processor stays uninitialized for it.
                warn!(channel_id = %handle.id(), error = %e, "failed to open channel processor");
            }
        }
    }

    async fn on_message(&self, payload: MessagePayload) {
        if self.is_closed() {
            trace!("dropping message on closed channel");
            return;
        }
        let Some(handle) = self.handle() else {
            warn!("message before connect, dropping");
            return;
        };
        counter!("channel_messages_total").increment(1);
        self.directive
            .processor()
            .invoke_protocol(&handle, payload)
            .await;
    }

    async fn on_close(&self, code: CloseCode) {
        // Exactly once, whether the close came from the peer, the transport,
        // or the error path.
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        counter!("channel_closes_total").increment(1);

        let _release = ReleaseGuard {
            snapshot: &self.snapshot,
        };
        if let Some(handle) = self.handle() {
            trace!(channel_id = %handle.id(), code = %code, "channel close");
            self.directive.processor().close(&handle, code).await;
        }
    }

    async fn on_error(&self, error: &str) {
        warn!(error, "channel transport error");
        self.on_close(CloseCode::ABNORMAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use strand_core::context::{RequestContext, SnapshotOptions};
    use strand_core::errors::{BoxError, SocketError};

    use crate::negotiator::ContextSource;
    use crate::processor::ProtocolProcessor;

    #[derive(Default)]
    struct StubSocket {
        open: AtomicBool,
    }

    impl StubSocket {
        fn open() -> Arc<Self> {
            let s = Self::default();
            s.open.store(true, Ordering::SeqCst);
            Arc::new(s)
        }
    }

    #[async_trait]
    impl ChannelSocket for StubSocket {
        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }
        async fn send_text(&self, _text: String) -> Result<(), SocketError> {
            Ok(())
        }
        async fn send_binary(&self, _data: Bytes) -> Result<(), SocketError> {
            Ok(())
        }
        async fn close(&self) -> Result<(), SocketError> {
            self.open.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Processor double recording every call.
    #[derive(Default)]
    struct RecordingProcessor {
        fail_open: AtomicBool,
        fail_close: AtomicBool,
        opens: AtomicUsize,
        closes: AtomicUsize,
        close_codes: Mutex<Vec<CloseCode>>,
        payloads: Mutex<Vec<MessagePayload>>,
        open_snapshots: Mutex<Vec<ContextSnapshot>>,
    }

    #[async_trait]
    impl ProtocolProcessor for RecordingProcessor {
        async fn open(
            &self,
            _channel: ChannelHandle,
            request: ContextSnapshot,
            _response: ChannelResponse,
        ) -> Result<(), BoxError> {
            let _ = self.opens.fetch_add(1, Ordering::SeqCst);
            self.open_snapshots.lock().push(request);
            if self.fail_open.load(Ordering::SeqCst) {
                return Err("processor open refused".into());
            }
            Ok(())
        }

        async fn invoke_protocol(&self, _channel: &ChannelHandle, payload: MessagePayload) {
            self.payloads.lock().push(payload);
        }

        async fn close(&self, _channel: &ChannelHandle, code: CloseCode) {
            let _ = self.closes.fetch_add(1, Ordering::SeqCst);
            self.close_codes.lock().push(code);
            assert!(
                !self.fail_close.load(Ordering::SeqCst),
                "close callback failure injected"
            );
        }
    }

    fn adapter_for(
        processor: Arc<RecordingProcessor>,
        request: RequestContext,
    ) -> ChannelEventAdapter {
        let source = ContextSource::new(Arc::new(request), SnapshotOptions::post_upgrade());
        ChannelEventAdapter::new(ChannelCreationDirective::new(processor, source))
    }

    fn chat_request() -> RequestContext {
        RequestContext::new("GET", "/chat")
            .with_header("Connection", "Upgrade")
            .with_header("Upgrade", "websocket")
            .with_body(&b"queued body"[..])
    }

    #[tokio::test]
    async fn connect_opens_processor_with_full_snapshot() {
        let processor = Arc::new(RecordingProcessor::default());
        let adapter = adapter_for(Arc::clone(&processor), chat_request());

        adapter.dispatch(ChannelEvent::Connect(StubSocket::open())).await;

        assert_eq!(processor.opens.load(Ordering::SeqCst), 1);
        assert!(adapter.processor_initialized());
        let snapshots = processor.open_snapshots.lock();
        assert!(!snapshots[0].is_degraded());
        assert_eq!(snapshots[0].body().unwrap().as_ref(), b"queued body");
    }

    #[tokio::test]
    async fn connect_with_recycled_request_degrades() {
        let processor = Arc::new(RecordingProcessor::default());
        let request = chat_request();
        let request = Arc::new(request);
        let source = ContextSource::new(Arc::clone(&request), SnapshotOptions::post_upgrade());
        let adapter = ChannelEventAdapter::new(ChannelCreationDirective::new(
            Arc::clone(&processor) as Arc<dyn ProtocolProcessor>,
            source,
        ));

        // Transport recycled the request before the connect callback.
        request.destroy();
        adapter.dispatch(ChannelEvent::Connect(StubSocket::open())).await;

        // open() is still called, with a degraded-flagged snapshot.
        assert_eq!(processor.opens.load(Ordering::SeqCst), 1);
        assert!(processor.open_snapshots.lock()[0].is_degraded());
    }

    #[tokio::test]
    async fn open_failure_leaves_channel_open() {
        let processor = Arc::new(RecordingProcessor::default());
        processor.fail_open.store(true, Ordering::SeqCst);
        let adapter = adapter_for(Arc::clone(&processor), chat_request());

        let socket = StubSocket::open();
        adapter
            .dispatch(ChannelEvent::Connect(Arc::clone(&socket) as Arc<dyn ChannelSocket>))
            .await;

        assert!(!adapter.processor_initialized());
        // The peer is not silently dropped.
        assert!(socket.is_open());

        // Subsequent messages still reach invoke_protocol.
        adapter.dispatch(ChannelEvent::Text("still here".into())).await;
        assert_eq!(processor.payloads.lock().len(), 1);
    }

    #[tokio::test]
    async fn text_forwarded_verbatim_exactly_once() {
        let processor = Arc::new(RecordingProcessor::default());
        let adapter = adapter_for(Arc::clone(&processor), chat_request());

        adapter.dispatch(ChannelEvent::Connect(StubSocket::open())).await;
        adapter.dispatch(ChannelEvent::Text("ping".into())).await;

        let payloads = processor.payloads.lock();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].as_text(), Some("ping"));
    }

    #[tokio::test]
    async fn binary_forwarded_verbatim() {
        let processor = Arc::new(RecordingProcessor::default());
        let adapter = adapter_for(Arc::clone(&processor), chat_request());

        adapter.dispatch(ChannelEvent::Connect(StubSocket::open())).await;
        adapter
            .dispatch(ChannelEvent::Binary(Bytes::from_static(&[0xde, 0xad])))
            .await;

        let payloads = processor.payloads.lock();
        assert_eq!(payloads[0].as_binary().unwrap().as_ref(), &[0xde, 0xad]);
    }

    #[tokio::test]
    async fn close_dispatched_exactly_once() {
        let processor = Arc::new(RecordingProcessor::default());
        let adapter = adapter_for(Arc::clone(&processor), chat_request());

        adapter.dispatch(ChannelEvent::Connect(StubSocket::open())).await;
        adapter.dispatch(ChannelEvent::Close(CloseCode::NORMAL)).await;
        adapter.dispatch(ChannelEvent::Close(CloseCode::NORMAL)).await;

        assert_eq!(processor.closes.load(Ordering::SeqCst), 1);
        assert_eq!(processor.close_codes.lock().as_slice(), [CloseCode::NORMAL]);
    }

    #[tokio::test]
    async fn error_synthesizes_abnormal_close() {
        let processor = Arc::new(RecordingProcessor::default());
        let adapter = adapter_for(Arc::clone(&processor), chat_request());

        adapter.dispatch(ChannelEvent::Connect(StubSocket::open())).await;
        adapter
            .dispatch(ChannelEvent::Error("connection reset".into()))
            .await;

        assert_eq!(processor.closes.load(Ordering::SeqCst), 1);
        assert_eq!(
            processor.close_codes.lock().as_slice(),
            [CloseCode::ABNORMAL]
        );

        // No subsequent events are delivered for this channel.
        adapter.dispatch(ChannelEvent::Text("late".into())).await;
        adapter.dispatch(ChannelEvent::Close(CloseCode::NORMAL)).await;
        assert!(processor.payloads.lock().is_empty());
        assert_eq!(processor.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn snapshot_released_after_close() {
        let processor = Arc::new(RecordingProcessor::default());
        let adapter = adapter_for(Arc::clone(&processor), chat_request());

        adapter.dispatch(ChannelEvent::Connect(StubSocket::open())).await;
        assert!(adapter.snapshot.lock().is_some());

        adapter.dispatch(ChannelEvent::Close(CloseCode::GOING_AWAY)).await;
        assert!(adapter.snapshot.lock().is_none());
    }

    #[tokio::test]
    async fn snapshot_released_even_when_close_callback_fails() {
        let processor = Arc::new(RecordingProcessor::default());
        processor.fail_close.store(true, Ordering::SeqCst);
        let adapter = Arc::new(adapter_for(Arc::clone(&processor), chat_request()));

        adapter.dispatch(ChannelEvent::Connect(StubSocket::open())).await;

        // The close callback panics; the guard must still release.
        let inner = Arc::clone(&adapter);
        let result = tokio::spawn(async move {
            inner.dispatch(ChannelEvent::Close(CloseCode::NORMAL)).await;
        })
        .await;
        assert!(result.is_err(), "close callback failure should surface");
        assert!(adapter.snapshot.lock().is_none());
    }

    #[tokio::test]
    async fn close_before_connect_is_safe() {
        let processor = Arc::new(RecordingProcessor::default());
        let adapter = adapter_for(Arc::clone(&processor), chat_request());

        adapter.dispatch(ChannelEvent::Close(CloseCode::ABNORMAL)).await;
        // Nothing to close at the processor; no panic.
        assert_eq!(processor.closes.load(Ordering::SeqCst), 0);
        assert!(adapter.is_closed());
    }

    #[tokio::test]
    async fn message_before_connect_dropped() {
        let processor = Arc::new(RecordingProcessor::default());
        let adapter = adapter_for(Arc::clone(&processor), chat_request());

        adapter.dispatch(ChannelEvent::Text("early".into())).await;
        assert!(processor.payloads.lock().is_empty());
    }
}
