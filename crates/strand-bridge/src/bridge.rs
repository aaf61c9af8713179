//! The exchange state machine.
//!
//! [`ChannelBridge::process`] converts one pass over an [`Exchange`] into an
//! [`ExchangeOutcome`], negotiating the one-time upgrade when the exchange
//! is channel-eligible and delegating everything else to the injected
//! pipelines. The bridge owns no transport: the actual upgrade is performed
//! by the [`ChannelContainer`] configured once at startup.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use strand_core::errors::{BoxError, BridgeError};
use strand_core::outcome::ExchangeOutcome;
use tracing::{debug, error, warn};

use crate::exchange::{ChannelState, Exchange};
use crate::negotiator::{
    ChannelCreationDirective, REJECT_REASON, REJECT_STATUS, UpgradeDecision, UpgradeNegotiator,
};
use crate::processor::{HandshakePredicate, ProtocolProcessor};

/// Status sent when a resource demands channel transport the request
/// cannot deliver.
pub const NOT_SUPPORTED_STATUS: u16 = 501;
/// Reason sent alongside [`NOT_SUPPORTED_STATUS`].
pub const NOT_SUPPORTED_REASON: &str = "WebSocket transport not supported by this request.";
/// Status sent when the channel subsystem is unavailable.
pub const CONTAINER_UNAVAILABLE_STATUS: u16 = 503;
/// Reason sent alongside [`CONTAINER_UNAVAILABLE_STATUS`].
pub const CONTAINER_UNAVAILABLE_REASON: &str = "Channel subsystem unavailable.";

/// A delegated exchange pipeline (the non-channel fallback, or the shared
/// suspend/resume pipeline).
#[async_trait]
pub trait ExchangePipeline: Send + Sync {
    /// Service the exchange and report its outcome.
    async fn service(&self, exchange: &Exchange) -> Result<ExchangeOutcome, BoxError>;
}

/// The channel subsystem capability: performs the transport-level upgrade.
///
/// Written once during startup/configuration, read thereafter.
#[async_trait]
pub trait ChannelContainer: Send + Sync {
    /// Perform the upgrade for `exchange`, binding `directive` to the
    /// channel the transport will open.
    async fn upgrade(
        &self,
        exchange: &Exchange,
        directive: ChannelCreationDirective,
    ) -> Result<(), BoxError>;
}

/// Pipeline used when none is injected: completes request/response
/// exchanges immediately and parks channel re-entries.
struct DefaultPipeline(ExchangeOutcome);

#[async_trait]
impl ExchangePipeline for DefaultPipeline {
    async fn service(&self, _exchange: &Exchange) -> Result<ExchangeOutcome, BoxError> {
        Ok(self.0)
    }
}

/// Builder for [`ChannelBridge`].
pub struct ChannelBridgeBuilder {
    processor: Arc<dyn ProtocolProcessor>,
    predicate: Arc<dyn HandshakePredicate>,
    container: Option<Arc<dyn ChannelContainer>>,
    fallback: Arc<dyn ExchangePipeline>,
    suspended: Arc<dyn ExchangePipeline>,
    create_session: bool,
}

impl ChannelBridgeBuilder {
    /// The channel container. Leaving it unset models a channel subsystem
    /// that failed to initialize; channel-eligible exchanges are then
    /// rejected as a configuration defect.
    #[must_use]
    pub fn container(mut self, container: Arc<dyn ChannelContainer>) -> Self {
        self.container = Some(container);
        self
    }

    /// The non-channel exchange pipeline. Defaults to immediate Continue.
    #[must_use]
    pub fn fallback(mut self, pipeline: Arc<dyn ExchangePipeline>) -> Self {
        self.fallback = pipeline;
        self
    }

    /// The shared suspend/resume pipeline. Defaults to Suspend.
    #[must_use]
    pub fn suspended(mut self, pipeline: Arc<dyn ExchangePipeline>) -> Self {
        self.suspended = pipeline;
        self
    }

    /// Whether snapshots create a session when the request carries none.
    #[must_use]
    pub fn create_session(mut self, create: bool) -> Self {
        self.create_session = create;
        self
    }

    /// Build the bridge.
    #[must_use]
    pub fn build(self) -> ChannelBridge {
        ChannelBridge {
            negotiator: UpgradeNegotiator::new(self.predicate).create_session(self.create_session),
            processor: self.processor,
            container: self.container,
            fallback: self.fallback,
            suspended: self.suspended,
        }
    }
}

/// The transport-bridging state machine.
pub struct ChannelBridge {
    negotiator: UpgradeNegotiator,
    processor: Arc<dyn ProtocolProcessor>,
    container: Option<Arc<dyn ChannelContainer>>,
    fallback: Arc<dyn ExchangePipeline>,
    suspended: Arc<dyn ExchangePipeline>,
}

impl ChannelBridge {
    /// Start building a bridge around the two required capabilities.
    #[must_use]
    pub fn builder(
        processor: Arc<dyn ProtocolProcessor>,
        predicate: Arc<dyn HandshakePredicate>,
    ) -> ChannelBridgeBuilder {
        ChannelBridgeBuilder {
            processor,
            predicate,
            container: None,
            fallback: Arc::new(DefaultPipeline(ExchangeOutcome::Continue)),
            suspended: Arc::new(DefaultPipeline(ExchangeOutcome::Suspend)),
            create_session: true,
        }
    }

    /// Process one pass over an exchange.
    ///
    /// Re-entries of the same exchange are expected: the channel subsystem
    /// calls back in after the upgrade plumbing completes. Negotiation runs
    /// at most once per exchange.
    pub async fn process(&self, exchange: &Exchange) -> Result<ExchangeOutcome, BridgeError> {
        match exchange.state() {
            ChannelState::NotChannel => self.process_not_channel(exchange).await,
            ChannelState::Negotiating => self.process_negotiation(exchange).await,
            ChannelState::Upgraded => self.process_upgraded(exchange).await,
            ChannelState::Terminal => {
                debug!(exchange_id = %exchange.id(), "re-entry on terminal exchange");
                Ok(ExchangeOutcome::Cancelled)
            }
        }
    }

    async fn process_not_channel(&self, exchange: &Exchange) -> Result<ExchangeOutcome, BridgeError> {
        if exchange.demands_channel() {
            // The bound resource insists on a channel this request will
            // never deliver.
            warn!(
                exchange_id = %exchange.id(),
                path = %exchange.request().path(),
                "resource demands channel transport but request cannot upgrade"
            );
            exchange.reject(NOT_SUPPORTED_STATUS, NOT_SUPPORTED_REASON);
            exchange.set_state(ChannelState::Terminal);
            return Ok(ExchangeOutcome::Cancelled);
        }
        self.fallback
            .service(exchange)
            .await
            .map_err(|e| BridgeError::pipeline("fallback", e))
    }

    async fn process_negotiation(&self, exchange: &Exchange) -> Result<ExchangeOutcome, BridgeError> {
        let decision = self
            .negotiator
            .negotiate(exchange, Arc::clone(&self.processor));

        let UpgradeDecision::Accepted(directive) = decision else {
            counter!("channel_handshake_rejections_total").increment(1);
            exchange.reject(REJECT_STATUS, REJECT_REASON);
            exchange.set_state(ChannelState::Terminal);
            return Ok(ExchangeOutcome::Cancelled);
        };

        let Some(container) = &self.container else {
            // Not a per-request failure: the container must be fixed.
            error!(exchange_id = %exchange.id(), "channel container unavailable, rejecting upgrade");
            exchange.reject(CONTAINER_UNAVAILABLE_STATUS, CONTAINER_UNAVAILABLE_REASON);
            exchange.set_state(ChannelState::Terminal);
            return Ok(ExchangeOutcome::Cancelled);
        };

        // Mark initiated before the upgrade call so a re-entry can never
        // renegotiate, even if the transport calls back mid-upgrade.
        exchange.set_state(ChannelState::Upgraded);
        if let Err(e) = container.upgrade(exchange, directive).await {
            error!(exchange_id = %exchange.id(), error = %e, "channel upgrade failed");
            exchange.set_state(ChannelState::Terminal);
            return Err(BridgeError::upgrade(e));
        }

        counter!("channel_upgrades_total").increment(1);
        // The transport owns completing the upgrade from here; the same
        // logical exchange will be revisited by the channel subsystem.
        Ok(ExchangeOutcome::Continue)
    }

    async fn process_upgraded(&self, exchange: &Exchange) -> Result<ExchangeOutcome, BridgeError> {
        let outcome = self
            .suspended
            .service(exchange)
            .await
            .map_err(|e| BridgeError::pipeline("suspended", e))?;

        match outcome {
            ExchangeOutcome::Suspend => {
                // Channel stays open awaiting further events; no
                // exchange-level action.
                Ok(ExchangeOutcome::Suspend)
            }
            ExchangeOutcome::Resume => {
                exchange.mark_resumed();
                exchange.set_state(ChannelState::Terminal);
                Ok(ExchangeOutcome::Resume)
            }
            other => {
                if other.is_terminal() {
                    exchange.set_state(ChannelState::Terminal);
                }
                Ok(other)
            }
        }
    }
}
