//! # strand-server
//!
//! The axum transport binding for the strand channel bridge.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `shim` | Per-request dispatch shim: upgrade-candidate sniffing, outcome → HTTP response |
//! | `container` | `ChannelContainer` over axum's `WebSocketUpgrade`, config application |
//! | `socket` | Live `ChannelSocket`: writer task + bounded outbound queue |
//! | `drive` | Per-connection read loop: transport frames → adapter events, idle timeout |
//! | `metrics` | Prometheus recorder installer + metric-name constants |
//!
//! ## Data Flow
//!
//! `shim::serve_channel` builds the exchange and runs the bridge →
//! `container::AxumChannelContainer` performs the upgrade and spawns
//! `drive::drive` → inbound frames become adapter events, outbound writes
//! flow through `socket::AxumSocket` back to the peer.

#![deny(unsafe_code)]

pub mod container;
pub mod drive;
pub mod metrics;
pub mod shim;
pub mod socket;

pub use container::AxumChannelContainer;
pub use shim::{channel_router, serve_channel};
pub use socket::AxumSocket;
