//! The channel subsystem over axum's WebSocket upgrade.
//!
//! Constructed once at startup with the channel config; the bridge reads
//! the shared reference thereafter. The dispatch shim parks the request's
//! upgrade token on the exchange; `upgrade` consumes it, applies the
//! configured limits, and parks the transport's switching-protocols
//! response back on the exchange for the shim to return.

use async_trait::async_trait;
use axum::extract::ws::WebSocketUpgrade;
use strand_bridge::bridge::ChannelContainer;
use strand_bridge::exchange::{Exchange, ExchangeResponse};
use strand_bridge::negotiator::ChannelCreationDirective;
use strand_core::config::ChannelConfig;
use strand_core::errors::BoxError;
use tracing::{debug, warn};

use crate::drive::drive;

/// `ChannelContainer` implementation backed by axum's WebSocket support.
pub struct AxumChannelContainer {
    config: ChannelConfig,
}

impl AxumChannelContainer {
    /// Build the container with the startup-time channel config.
    #[must_use]
    pub fn new(config: ChannelConfig) -> Self {
        Self { config }
    }

    /// The config this container applies to every upgrade.
    #[must_use]
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    fn apply_config(&self, mut ws: WebSocketUpgrade) -> WebSocketUpgrade {
        if let Some(size) = self.config.buffer_size {
            ws = ws.write_buffer_size(size);
        }
        if let Some(max) = self.config.max_message_size() {
            ws = ws.max_message_size(max);
        }
        ws
    }
}

#[async_trait]
impl ChannelContainer for AxumChannelContainer {
    async fn upgrade(
        &self,
        exchange: &Exchange,
        directive: ChannelCreationDirective,
    ) -> Result<(), BoxError> {
        let token = exchange
            .take_transport()
            .ok_or("no upgrade token parked on the exchange")?;
        let ws = token
            .downcast::<WebSocketUpgrade>()
            .map_err(|_| "unexpected transport state on the exchange")?;

        let mut ws = self.apply_config(*ws);
        if let Some(subprotocol) = exchange.subprotocol() {
            ws = ws.protocols([subprotocol]);
        }

        let exchange_id = exchange.id().to_owned();
        let config = self.config.clone();
        let response = ws
            .on_failed_upgrade(move |e| {
                warn!(exchange_id = %exchange_id, error = %e, "transport failed to complete upgrade");
            })
            .on_upgrade(move |socket| drive(socket, directive, config));

        debug!(exchange_id = %exchange.id(), "channel upgrade initiated");
        exchange.respond(ExchangeResponse::Upgrade(Box::new(response)));
        Ok(())
    }
}
