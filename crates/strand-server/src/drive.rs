//! Per-connection drive loop.
//!
//! Translates inbound transport frames into adapter events, one task per
//! connection, which is what gives a single channel its strictly sequential
//! event delivery. Idle and message-size limits are enforced here at the
//! transport boundary; the bridge core never re-checks them.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::StreamExt;
use metrics::{counter, gauge};
use strand_bridge::adapter::{ChannelEvent, ChannelEventAdapter};
use strand_bridge::handle::ChannelSocket;
use strand_bridge::negotiator::ChannelCreationDirective;
use strand_core::close::CloseCode;
use strand_core::config::ChannelConfig;
use tracing::{debug, trace};

use crate::metrics::{CHANNEL_CONNECTIONS_ACTIVE, CHANNEL_IDLE_TIMEOUTS_TOTAL};
use crate::socket::AxumSocket;

/// Drive one upgraded connection until it closes.
///
/// Invoked by the container from the transport's upgrade completion
/// callback. Consumes the socket; returns when the channel has fully
/// closed and its close event has been dispatched.
pub async fn drive(socket: WebSocket, directive: ChannelCreationDirective, config: ChannelConfig) {
    gauge!(CHANNEL_CONNECTIONS_ACTIVE).increment(1.0);

    let (sink, stream) = socket.split();
    let (channel_socket, open) = AxumSocket::start(sink);
    let adapter = ChannelEventAdapter::new(directive);

    adapter
        .dispatch(ChannelEvent::Connect(
            channel_socket as Arc<dyn ChannelSocket>,
        ))
        .await;

    read_loop(stream, &adapter, &open, config.idle_timeout()).await;

    gauge!(CHANNEL_CONNECTIONS_ACTIVE).decrement(1.0);
    debug!("channel drive loop finished");
}

async fn read_loop(
    mut stream: futures::stream::SplitStream<WebSocket>,
    adapter: &ChannelEventAdapter,
    open: &std::sync::atomic::AtomicBool,
    idle_timeout: Option<Duration>,
) {
    loop {
        let next = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    counter!(CHANNEL_IDLE_TIMEOUTS_TOTAL).increment(1);
                    open.store(false, Ordering::Release);
                    adapter
                        .dispatch(ChannelEvent::Error("idle timeout exceeded".into()))
                        .await;
                    return;
                }
            },
            None => stream.next().await,
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                adapter
                    .dispatch(ChannelEvent::Text(text.as_str().to_owned()))
                    .await;
            }
            Some(Ok(Message::Binary(data))) => {
                adapter.dispatch(ChannelEvent::Binary(data)).await;
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                // The transport answers pings itself; nothing to dispatch.
                trace!("keepalive frame");
            }
            Some(Ok(Message::Close(frame))) => {
                let code = frame.map_or(CloseCode::NORMAL, |f| CloseCode::from(f.code));
                open.store(false, Ordering::Release);
                adapter.dispatch(ChannelEvent::Close(code)).await;
                return;
            }
            Some(Err(e)) => {
                open.store(false, Ordering::Release);
                adapter.dispatch(ChannelEvent::Error(e.to_string())).await;
                return;
            }
            None => {
                // Stream ended without a close frame.
                open.store(false, Ordering::Release);
                adapter.dispatch(ChannelEvent::Close(CloseCode::ABNORMAL)).await;
                return;
            }
        }
    }
}
