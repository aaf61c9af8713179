//! # strand-bridge
//!
//! The transport-bridging state machine that lets a request/response
//! processing pipeline transparently host persistent, bidirectional,
//! message-oriented channels.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `exchange` | Per-exchange state (`NotChannel`/`Negotiating`/`Upgraded`/`Terminal`), response slot |
//! | `negotiator` | Handshake predicate evaluation, 403 rejection, channel-creation directive |
//! | `bridge` | The exchange state machine (`process`) and its pipeline/container seams |
//! | `handle` | Channel handle: soft-failing writes, idempotent close, live `is_open` |
//! | `adapter` | Transport event → protocol processor dispatch with exactly-once close |
//! | `processor` | Consumed capabilities: protocol processor + handshake predicate traits |
//!
//! ## Data Flow
//!
//! Inbound exchange → `bridge::ChannelBridge::process` → (upgrade accepted)
//! → transport completes the handshake → `adapter::ChannelEventAdapter`
//! delivers connect/text/binary/close into the `ProtocolProcessor` →
//! outbound data flows back through `handle::ChannelHandle`.
//!
//! The crate is transport-agnostic: the live axum binding lives in
//! `strand-server`, and every seam here is exercised with mock sockets,
//! containers, and pipelines in the tests.

#![deny(unsafe_code)]

pub mod adapter;
pub mod bridge;
pub mod exchange;
pub mod handle;
pub mod negotiator;
pub mod processor;

pub use adapter::{ChannelEvent, ChannelEventAdapter};
pub use bridge::{ChannelBridge, ChannelBridgeBuilder, ChannelContainer, ExchangePipeline};
pub use exchange::{ChannelState, Exchange, ExchangeResponse};
pub use handle::{ChannelHandle, ChannelSocket, WriteOutcome, WriteReceipt};
pub use negotiator::{ChannelCreationDirective, ContextSource, UpgradeDecision, UpgradeNegotiator};
pub use processor::{ChannelResponse, HandshakePredicate, ProtocolProcessor};
