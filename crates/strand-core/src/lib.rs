//! # strand-core
//!
//! Foundation types for the strand channel bridge.
//!
//! This crate provides the shared vocabulary the bridge and transport crates
//! depend on:
//!
//! - **Outcomes**: [`outcome::ExchangeOutcome`], the result contract of
//!   processing one exchange
//! - **Close codes**: [`close::CloseCode`] with the standard named constants
//! - **Payloads**: [`payload::MessagePayload`] for text/binary channel frames
//! - **Config**: [`config::ChannelConfig`], the startup-time channel knobs
//! - **Context**: [`context::RequestContext`], [`context::Session`], and
//!   [`context::ContextSnapshot`]: independently-owned request state that
//!   survives transport recycling
//! - **Errors**: [`errors::BridgeError`] hierarchy via `thiserror`
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by `strand-bridge` and `strand-server`.

#![deny(unsafe_code)]

pub mod close;
pub mod config;
pub mod context;
pub mod errors;
pub mod outcome;
pub mod payload;
